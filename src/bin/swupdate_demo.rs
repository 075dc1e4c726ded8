//! Stand-alone front-end wiring every library piece together: reads a
//! package from disk (or stdin) and drives one [`coordinator::Session`]
//! against it. Registers just enough handlers -- a raw file/image writer
//! and a shellscript marker -- to install a realistic package on a
//! development machine with no real bootloader present.

use std::error::Error as StdError;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use argh::FromArgs;

use swupdate_crypto::registry::CryptoConfig;
use swupdate_rs::bootloader::none_file::NoneFileAdapter;
use swupdate_rs::config::AgentConfig;
use swupdate_rs::coordinator::Session;
use swupdate_rs::handler::{Handler, HandlerContext, HandlerRegistry, ScriptPhase};
use swupdate_rs::hwcompat::DeviceIdentity;
use swupdate_rs::manifest::grammar::GrammarRegistry;
use swupdate_rs::manifest::{Artifact, ArtifactClass, Target};
use swupdate_rs::notifier::NotifierBus;
use swupdate_rs::subprocess::ProcessSubprocessRunner;
use swupdate_rs::transform::Sink;

#[derive(FromArgs, Debug)]
/// Install an update package against a development bootloader-env file.
struct Args {
    /// path to the package to install, or - to read from stdin
    #[argh(option, short = 'p')]
    package: String,

    /// board name to use when no hardware identity file is available
    #[argh(option, short = 'b', default = "String::from(\"demo-board\")")]
    board: String,

    /// revision string to use alongside --board
    #[argh(option, short = 'r', default = "String::from(\"v1\")")]
    revision: String,

    /// directory images and files are written into
    #[argh(option, short = 'o', default = "String::from(\".\")")]
    output_dir: String,

    /// path to the bootloader-env file this run reads and writes
    #[argh(option, default = "String::from(\"./bootloader-env\")")]
    bootloader_env: String,

    /// disable sha256 verification (artifacts must then carry no hash)
    #[argh(switch)]
    no_hash_verification: bool,

    /// require a valid signature entry before trusting the manifest
    #[argh(switch)]
    signed: bool,

    /// path to an AES key file (`hexkey [hexiv]` on one line)
    #[argh(option)]
    key_file: Option<String>,

    /// path to an RSA public key file (PKCS8 or PKCS1 PEM)
    #[argh(option)]
    pubkey_file: Option<String>,

    /// currently installed version, used for downgrade/reinstall checks
    #[argh(option)]
    current_version: Option<String>,
}

/// Writes a data-carrying artifact's decoded bytes straight to a file
/// under the configured output directory, named after the artifact.
struct RawFileHandler {
    output_dir: PathBuf,
}

struct FileSink {
    file: File,
}

impl Sink for FileSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), Box<dyn StdError + Send + Sync>> {
        use std::io::Write;
        self.file.write_all(chunk)?;
        Ok(())
    }
}

impl Handler for RawFileHandler {
    fn name(&self) -> &str {
        "raw"
    }

    fn mask(&self) -> ArtifactClass {
        ArtifactClass::IMAGE | ArtifactClass::FILE | ArtifactClass::PARTITION
    }

    fn sink_for(&self, artifact: &Artifact, _ctx: &mut HandlerContext) -> swupdate_rs::Result<Box<dyn Sink + Send>> {
        let dest_name = match &artifact.target {
            Target::Path(path) => PathBuf::from(path),
            Target::Filesystem { path, .. } => PathBuf::from(path),
            _ => self.output_dir.join(&artifact.name),
        };
        let dest = if dest_name.is_absolute() { dest_name } else { self.output_dir.join(dest_name) };
        let file = File::create(&dest).map_err(|err| swupdate_rs::Error::OpenFile(dest, err))?;
        Ok(Box::new(FileSink { file }))
    }
}

/// A placeholder for artifact classes the coordinator never streams
/// archive data for (`bootloader`, `no-data`); staging the bootloader
/// variables is all there is to do.
struct NoopNoDataHandler;

impl Handler for NoopNoDataHandler {
    fn name(&self) -> &str {
        "bootloader-noop"
    }

    fn mask(&self) -> ArtifactClass {
        ArtifactClass::BOOTLOADER | ArtifactClass::NO_DATA
    }

    fn run_script(&self, _artifact: &Artifact, _phase: ScriptPhase, _ctx: &mut HandlerContext) -> swupdate_rs::Result<()> {
        Ok(())
    }
}

fn build_agent_config(args: &Args) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.device_identity_override = Some(DeviceIdentity {
        board: args.board.clone(),
        revision: args.revision.clone(),
    });
    config.hash_verification_enabled = !args.no_hash_verification;
    config.signed_image_mode = args.signed;
    config.aes_key_file = args.key_file.as_ref().map(PathBuf::from);
    config.public_key_file = args.pubkey_file.as_ref().map(PathBuf::from);
    config
}

fn open_package(path: &str) -> Result<Box<dyn io::Read>> {
    if path == "-" {
        Ok(Box::new(io::stdin()))
    } else {
        let file = File::open(path).with_context(|| format!("failed to open package {path:?}"))?;
        Ok(Box::new(file))
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Args = argh::from_env();

    let output_dir = Path::new(&args.output_dir);
    std::fs::create_dir_all(output_dir).with_context(|| format!("failed to create output directory {:?}", output_dir))?;

    let config = build_agent_config(&args);
    let device = config.resolve_device_identity().context("failed to resolve device identity")?;
    let crypto: CryptoConfig = config.build_crypto_config().context("failed to build crypto configuration")?;

    let mut handlers = HandlerRegistry::new();
    handlers
        .register(Arc::new(RawFileHandler { output_dir: output_dir.to_path_buf() }))
        .map_err(|err| anyhow!("failed to register raw handler: {err}"))?;
    handlers
        .register(Arc::new(NoopNoDataHandler))
        .map_err(|err| anyhow!("failed to register bootloader-noop handler: {err}"))?;

    let bootloader = NoneFileAdapter::at(PathBuf::from(&args.bootloader_env));
    let bus = NotifierBus::new();
    let subprocess_runner = ProcessSubprocessRunner;
    let grammars = GrammarRegistry::with_defaults();

    let package = open_package(&args.package)?;

    let session = Session {
        config: &config,
        device,
        grammars: &grammars,
        handlers: &mut handlers,
        bootloader: &bootloader,
        bus: &bus,
        subprocess_runner: &subprocess_runner,
        crypto,
        current_version: args.current_version.clone(),
        maximum_version: None,
        cancel: Arc::new(AtomicBool::new(false)),
    };

    match session.run(package) {
        Ok(outcome) => {
            println!(
                "installed {} {} -- transaction state now {:?}",
                outcome.plan.software.name, outcome.plan.software.version, outcome.final_state
            );
            Ok(())
        }
        Err(err) => bail!("update session failed: {err}"),
    }
}
