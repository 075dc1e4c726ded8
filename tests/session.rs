//! End-to-end scenarios driven entirely through [`coordinator::Session`]'s
//! public API: a synthetic "newc" cpio archive in, a [`SessionOutcome`] or
//! error out. No internal module is touched directly except to assemble
//! test fixtures.

use std::collections::HashMap;
use std::io::Write as _;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use sha2::{Digest, Sha256};

use swupdate_rs::bootloader::none_file::NoneFileAdapter;
use swupdate_rs::bootloader::TransactionState;
use swupdate_rs::config::AgentConfig;
use swupdate_rs::coordinator::Session;
use swupdate_rs::error::{Error, ValidationFailure};
use swupdate_rs::handler::{Handler, HandlerContext, HandlerRegistry};
use swupdate_rs::hwcompat::DeviceIdentity;
use swupdate_rs::manifest::grammar::GrammarRegistry;
use swupdate_rs::manifest::{Artifact, ArtifactClass};
use swupdate_rs::notifier::NotifierBus;
use swupdate_rs::subprocess::{SubprocessOutcome, SubprocessRunner};
use swupdate_rs::transform::Sink;

const MAGIC: &[u8; 6] = b"070701";
const HEADER_LEN: usize = 110;

fn hex8(v: u64) -> String {
    format!("{:08x}", v)
}

fn pad_for(len: u64) -> u8 {
    ((4 - (len % 4)) % 4) as u8
}

/// Encodes one "newc" cpio entry exactly as `swupdate_archive::ArchiveReader` expects it.
fn encode_entry(name: &str, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let namesize = name.len() + 1;
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(hex8(0).as_bytes()); // ino
    out.extend_from_slice(hex8(0o100644).as_bytes()); // mode
    out.extend_from_slice(hex8(0).as_bytes()); // uid
    out.extend_from_slice(hex8(0).as_bytes()); // gid
    out.extend_from_slice(hex8(1).as_bytes()); // nlink
    out.extend_from_slice(hex8(0).as_bytes()); // mtime
    out.extend_from_slice(hex8(data.len() as u64).as_bytes()); // filesize
    out.extend_from_slice(hex8(0).as_bytes()); // devmajor
    out.extend_from_slice(hex8(0).as_bytes()); // devminor
    out.extend_from_slice(hex8(0).as_bytes()); // rdevmajor
    out.extend_from_slice(hex8(0).as_bytes()); // rdevminor
    out.extend_from_slice(hex8(namesize as u64).as_bytes()); // namesize
    out.extend_from_slice(hex8(0).as_bytes()); // check
    assert_eq!(out.len(), HEADER_LEN);

    out.extend_from_slice(name.as_bytes());
    out.push(0);
    let pad = pad_for(out.len() as u64);
    out.extend(std::iter::repeat(0u8).take(pad as usize));

    out.extend_from_slice(data);
    let pad = pad_for(data.len() as u64);
    out.extend(std::iter::repeat(0u8).take(pad as usize));

    out
}

fn encode_trailer() -> Vec<u8> {
    encode_entry("TRAILER!!!", &[])
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

fn device(board: &str, revision: &str) -> DeviceIdentity {
    DeviceIdentity {
        board: board.to_string(),
        revision: revision.to_string(),
    }
}

/// Writes decoded artifact bytes into a shared in-memory buffer, so tests
/// can assert on exactly what a handler received.
struct MemHandler {
    mask: ArtifactClass,
    out: Arc<Mutex<Vec<u8>>>,
}

struct MemSink {
    out: Arc<Mutex<Vec<u8>>>,
}

impl Sink for MemSink {
    fn write_chunk(&mut self, chunk: &[u8]) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.out.lock().unwrap().extend_from_slice(chunk);
        Ok(())
    }
}

impl Handler for MemHandler {
    fn name(&self) -> &str {
        "raw"
    }

    fn mask(&self) -> ArtifactClass {
        self.mask
    }

    fn sink_for(&self, _artifact: &Artifact, _ctx: &mut HandlerContext) -> swupdate_rs::Result<Box<dyn Sink + Send>> {
        Ok(Box::new(MemSink { out: self.out.clone() }))
    }
}

/// A script-class handler with no real behavior: the coordinator itself
/// runs scripts via `SubprocessRunner`, so only the capability mask
/// matters for validation to accept the plan.
struct ScriptMarkerHandler;

impl Handler for ScriptMarkerHandler {
    fn name(&self) -> &str {
        "shellscript"
    }

    fn mask(&self) -> ArtifactClass {
        ArtifactClass::SCRIPT
    }
}

/// A subprocess runner whose exit code is scripted per phase and which
/// records every phase it was invoked with, for tests that exercise the
/// preinstall/postinstall/failure script paths without forking anything.
struct ScriptedSubprocessRunner {
    exit_codes: HashMap<String, i32>,
    invocations: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSubprocessRunner {
    fn new(exit_codes: HashMap<String, i32>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let invocations = Arc::new(Mutex::new(Vec::new()));
        (
            ScriptedSubprocessRunner {
                exit_codes,
                invocations: invocations.clone(),
            },
            invocations,
        )
    }
}

impl SubprocessRunner for ScriptedSubprocessRunner {
    fn run(&self, _script_path: &std::path::Path, args: &[String]) -> swupdate_rs::Result<SubprocessOutcome> {
        let phase = args.first().cloned().unwrap_or_default();
        self.invocations.lock().unwrap().push(phase.clone());
        let exit_code = *self.exit_codes.get(&phase).unwrap_or(&0);
        Ok(SubprocessOutcome {
            exit_code,
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

struct NoopSubprocessRunner;

impl SubprocessRunner for NoopSubprocessRunner {
    fn run(&self, _script_path: &std::path::Path, _args: &[String]) -> swupdate_rs::Result<SubprocessOutcome> {
        Ok(SubprocessOutcome {
            exit_code: 0,
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }
}

fn gzip_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn aes256_cbc_encrypt_pkcs7(key: &[u8; 32], iv: &[u8; 16], plaintext: &[u8]) -> Vec<u8> {
    use aes::cipher::generic_array::GenericArray;
    use aes::cipher::{BlockEncryptMut, KeyIvInit};

    const BLOCK_LEN: usize = 16;
    let padded_len = (plaintext.len() / BLOCK_LEN + 1) * BLOCK_LEN;
    let mut buf = plaintext.to_vec();
    let pad = padded_len - plaintext.len();
    buf.resize(padded_len, pad as u8);

    let mut cipher = cbc::Encryptor::<aes::Aes256>::new(key.into(), iv.into());
    for chunk in buf.chunks_mut(BLOCK_LEN) {
        cipher.encrypt_block_mut(GenericArray::from_mut_slice(chunk));
    }
    buf
}

fn run_session(
    manifest_json: String,
    entries: Vec<(&str, Vec<u8>)>,
    dev: DeviceIdentity,
    handlers: &mut HandlerRegistry,
    subprocess_runner: &dyn SubprocessRunner,
    crypto: swupdate_crypto::registry::CryptoConfig,
    current_version: Option<String>,
) -> swupdate_rs::Result<swupdate_rs::coordinator::SessionOutcome> {
    let mut archive = encode_entry("sw-description", manifest_json.as_bytes());
    for (name, data) in &entries {
        archive.extend(encode_entry(name, data));
    }
    archive.extend(encode_trailer());

    let config = AgentConfig::default();
    let grammars = GrammarRegistry::with_defaults();
    let bus = NotifierBus::new();
    let tmp = tempfile::tempdir().unwrap();
    let bootloader = NoneFileAdapter::at(tmp.path().join("env"));

    let session = Session {
        config: &config,
        device: dev,
        grammars: &grammars,
        handlers,
        bootloader: &bootloader,
        bus: &bus,
        subprocess_runner,
        crypto,
        current_version,
        maximum_version: None,
        cancel: Arc::new(AtomicBool::new(false)),
    };

    session.run(&archive[..])
}

#[test]
fn happy_path_single_raw_image() {
    let plaintext = b"a whole root filesystem, more or less".to_vec();
    let manifest = format!(
        r#"{{
            "software": {{"name": "demo-os", "version": "2.0.0", "hardware-compatibility": [{{"board": "demo-board", "revision": "v1"}}]}},
            "images": [{{"type": "raw", "filename": "rootfs.img", "sha256": "{}"}}]
        }}"#,
        sha256_hex(&plaintext)
    );

    let received = Arc::new(Mutex::new(Vec::new()));
    let mut handlers = HandlerRegistry::new();
    handlers
        .register(Arc::new(MemHandler {
            mask: ArtifactClass::IMAGE,
            out: received.clone(),
        }))
        .unwrap();

    let outcome = run_session(
        manifest,
        vec![("rootfs.img", plaintext.clone())],
        device("demo-board", "v1"),
        &mut handlers,
        &NoopSubprocessRunner,
        swupdate_crypto::registry::CryptoConfig::default(),
        None,
    )
    .expect("session should succeed");

    assert_eq!(outcome.final_state, TransactionState::Done);
    assert_eq!(*received.lock().unwrap(), plaintext);
    assert_eq!(outcome.plan.software.version, "2.0.0");
}

#[test]
fn hash_mismatch_aborts_the_session() {
    let plaintext = b"correct bytes".to_vec();
    let wrong_hash = sha256_hex(b"different bytes entirely");
    let manifest = format!(
        r#"{{
            "software": {{"name": "demo-os", "version": "2.0.0", "hardware-compatibility": [{{"board": "demo-board", "revision": "v1"}}]}},
            "images": [{{"type": "raw", "filename": "rootfs.img", "sha256": "{wrong_hash}"}}]
        }}"#
    );

    let mut handlers = HandlerRegistry::new();
    handlers
        .register(Arc::new(MemHandler {
            mask: ArtifactClass::IMAGE,
            out: Arc::new(Mutex::new(Vec::new())),
        }))
        .unwrap();

    let err = run_session(
        manifest,
        vec![("rootfs.img", plaintext)],
        device("demo-board", "v1"),
        &mut handlers,
        &NoopSubprocessRunner,
        swupdate_crypto::registry::CryptoConfig::default(),
        None,
    )
    .expect_err("hash mismatch must fail the session");

    assert!(matches!(err, Error::HashMismatch(_)));
}

#[test]
fn incompatible_hardware_is_rejected_before_install() {
    let manifest = r#"{
        "software": {"name": "demo-os", "version": "2.0.0", "hardware-compatibility": [{"board": "demo-board", "revision": "v1"}]},
        "images": [{"type": "raw", "filename": "rootfs.img"}]
    }"#
    .to_string();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register(Arc::new(MemHandler {
            mask: ArtifactClass::IMAGE,
            out: Arc::new(Mutex::new(Vec::new())),
        }))
        .unwrap();

    let mut config = AgentConfig::default();
    config.hash_verification_enabled = false;
    let grammars = GrammarRegistry::with_defaults();
    let bus = NotifierBus::new();
    let tmp = tempfile::tempdir().unwrap();
    let bootloader = NoneFileAdapter::at(tmp.path().join("env"));

    let mut archive = encode_entry("sw-description", manifest.as_bytes());
    archive.extend(encode_entry("rootfs.img", b"payload"));
    archive.extend(encode_trailer());

    let session = Session {
        config: &config,
        device: device("some-other-board", "v1"),
        grammars: &grammars,
        handlers: &mut handlers,
        bootloader: &bootloader,
        bus: &bus,
        subprocess_runner: &NoopSubprocessRunner,
        crypto: swupdate_crypto::registry::CryptoConfig::default(),
        current_version: None,
        maximum_version: None,
        cancel: Arc::new(AtomicBool::new(false)),
    };

    let err = session.run(&archive[..]).expect_err("incompatible hardware must be rejected");
    assert!(matches!(err, Error::Validation(ValidationFailure::NoMatchingHardware { .. })));
}

#[test]
fn downgrade_is_blocked_by_policy() {
    let manifest = r#"{
        "software": {"name": "demo-os", "version": "1.0.0", "hardware-compatibility": [{"board": "demo-board", "revision": "v1"}]},
        "policy": {"no-downgrading": true},
        "images": [{"type": "raw", "filename": "rootfs.img"}]
    }"#
    .to_string();

    let mut handlers = HandlerRegistry::new();
    handlers
        .register(Arc::new(MemHandler {
            mask: ArtifactClass::IMAGE,
            out: Arc::new(Mutex::new(Vec::new())),
        }))
        .unwrap();

    let mut config = AgentConfig::default();
    config.hash_verification_enabled = false;
    let grammars = GrammarRegistry::with_defaults();
    let bus = NotifierBus::new();
    let tmp = tempfile::tempdir().unwrap();
    let bootloader = NoneFileAdapter::at(tmp.path().join("env"));

    let mut archive = encode_entry("sw-description", manifest.as_bytes());
    archive.extend(encode_entry("rootfs.img", b"payload"));
    archive.extend(encode_trailer());

    let session = Session {
        config: &config,
        device: device("demo-board", "v1"),
        grammars: &grammars,
        handlers: &mut handlers,
        bootloader: &bootloader,
        bus: &bus,
        subprocess_runner: &NoopSubprocessRunner,
        crypto: swupdate_crypto::registry::CryptoConfig::default(),
        current_version: Some("2.0.0".to_string()),
        maximum_version: None,
        cancel: Arc::new(AtomicBool::new(false)),
    };

    let err = session.run(&archive[..]).expect_err("downgrade must be rejected");
    assert!(matches!(err, Error::Validation(ValidationFailure::Downgrade { .. })));
}

#[test]
fn preinstall_script_failure_runs_the_failure_phase() {
    let manifest = r#"{
        "software": {"name": "demo-os", "version": "2.0.0", "hardware-compatibility": [{"board": "demo-board", "revision": "v1"}]},
        "scripts": [{"type": "shellscript", "filename": "setup.sh", "properties": {"run-on-fail": ["true"]}}]
    }"#
    .to_string();

    let mut handlers = HandlerRegistry::new();
    handlers.register(Arc::new(ScriptMarkerHandler)).unwrap();

    let mut exit_codes = HashMap::new();
    exit_codes.insert("preinst".to_string(), 1);
    exit_codes.insert("failure".to_string(), 0);
    let (runner, invocations) = ScriptedSubprocessRunner::new(exit_codes);

    let mut config = AgentConfig::default();
    config.hash_verification_enabled = false;
    let grammars = GrammarRegistry::with_defaults();
    let bus = NotifierBus::new();
    let tmp = tempfile::tempdir().unwrap();
    let bootloader = NoneFileAdapter::at(tmp.path().join("env"));

    let mut archive = encode_entry("sw-description", manifest.as_bytes());
    archive.extend(encode_entry("setup.sh", b"#!/bin/sh\nexit 1\n"));
    archive.extend(encode_trailer());

    let session = Session {
        config: &config,
        device: device("demo-board", "v1"),
        grammars: &grammars,
        handlers: &mut handlers,
        bootloader: &bootloader,
        bus: &bus,
        subprocess_runner: &runner,
        crypto: swupdate_crypto::registry::CryptoConfig::default(),
        current_version: None,
        maximum_version: None,
        cancel: Arc::new(AtomicBool::new(false)),
    };

    let err = session.run(&archive[..]).expect_err("a failing preinstall script must fail the session");
    assert!(matches!(err, Error::Handler(..)));
    assert_eq!(*invocations.lock().unwrap(), vec!["preinst".to_string(), "failure".to_string()]);

    let state_code = NoneFileAdapter::at(tmp.path().join("env")).get("recovery_status").unwrap();
    assert_eq!(state_code, Some(TransactionState::Failed.as_code().to_string()));
}

#[test]
fn encrypted_and_compressed_artifact_round_trips_through_the_chain() {
    let key = [0x5au8; 32];
    let iv = [0x3bu8; 16];
    let plaintext = b"the bytes an encrypted, gzip-compressed artifact actually carries".to_vec();
    let compressed = gzip_compress(&plaintext);
    let ciphertext = aes256_cbc_encrypt_pkcs7(&key, &iv, &compressed);

    let iv_hex: String = iv.iter().map(|b| format!("{b:02x}")).collect();
    let manifest = format!(
        r#"{{
            "software": {{"name": "demo-os", "version": "2.0.0", "hardware-compatibility": [{{"board": "demo-board", "revision": "v1"}}]}},
            "images": [{{
                "type": "raw",
                "filename": "rootfs.img",
                "sha256": "{}",
                "encrypted": true,
                "ivt": "{iv_hex}",
                "compressed": "gzip"
            }}]
        }}"#,
        sha256_hex(&plaintext)
    );

    let received = Arc::new(Mutex::new(Vec::new()));
    let mut handlers = HandlerRegistry::new();
    handlers
        .register(Arc::new(MemHandler {
            mask: ArtifactClass::IMAGE,
            out: received.clone(),
        }))
        .unwrap();

    let mut crypto = swupdate_crypto::registry::CryptoConfig::default();
    crypto.aes_key = Some(Arc::new(key.to_vec()));

    let outcome = run_session(
        manifest,
        vec![("rootfs.img", ciphertext)],
        device("demo-board", "v1"),
        &mut handlers,
        &NoopSubprocessRunner,
        crypto,
        None,
    )
    .expect("encrypted+compressed artifact should install cleanly");

    assert_eq!(*received.lock().unwrap(), plaintext);
    assert_eq!(outcome.final_state, TransactionState::Done);
}
