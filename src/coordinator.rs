//! Transaction coordinator (§4.5): drives one update session end to end
//! over a single forward-only archive stream -- parse, preinstall,
//! install, postinstall, commit -- and collapses to the failure path on
//! the first error, exactly as described by the state diagram this crate
//! implements. This is the one place that owns an [`InstallPlan`] for the
//! duration of a session and invokes handlers; everything else in the
//! crate is a component the coordinator wires together.

use std::collections::HashMap;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use swupdate_archive::ArchiveReader;
use swupdate_crypto::registry::CryptoConfig;
use swupdate_crypto::sign::verify_rsa_pkcs_buf;

use crate::bootloader::{Bootloader, TransactionState};
use crate::config::AgentConfig;
use crate::error::{Error, Result};
use crate::handler::{Handler, HandlerContext, HandlerRegistry, ScriptPhase};
use crate::hwcompat::DeviceIdentity;
use crate::manifest::grammar::GrammarRegistry;
use crate::manifest::validate::{self, ValidationContext};
use crate::manifest::{ArtifactClass, InstallPlan};
use crate::notifier::{BusProgressReporter, Notification, NotifierBus, ProgressRecord, ProgressReporter, Status};
use crate::subprocess::{self, SubprocessRunner};
use crate::transform::{run_chain, ChainSpec};

const SW_DESCRIPTION_NAME: &str = "sw-description";
/// Signature entries are small; bound the read independently of the
/// manifest's own (much larger) size limit.
const MAX_SIGNATURE_SIZE: u64 = 4096;

/// Everything the coordinator needs to run a session that doesn't come
/// from the package itself: device identity, registries, the crypto
/// material, and the capabilities (bootloader, notifier, subprocess
/// runner) it drives.
pub struct Session<'a> {
    pub config: &'a AgentConfig,
    pub device: DeviceIdentity,
    pub grammars: &'a GrammarRegistry,
    pub handlers: &'a mut HandlerRegistry,
    pub bootloader: &'a dyn Bootloader,
    pub bus: &'a NotifierBus,
    pub subprocess_runner: &'a dyn SubprocessRunner,
    pub crypto: CryptoConfig,
    pub current_version: Option<String>,
    pub maximum_version: Option<String>,
    pub cancel: Arc<AtomicBool>,
}

/// Outcome of a completed session: the plan that was installed and the
/// persistent transaction state it ended in.
#[derive(Debug)]
pub struct SessionOutcome {
    pub plan: InstallPlan,
    pub final_state: TransactionState,
}

struct StepCounter<'a> {
    current: u32,
    total: u32,
    bus: &'a NotifierBus,
}

impl<'a> StepCounter<'a> {
    fn new(total: u32, bus: &'a NotifierBus) -> Self {
        StepCounter { current: 0, total, bus }
    }

    fn advance(&mut self, artifact_name: &str, handler_name: &str) {
        self.current += 1;
        let percent = if self.total == 0 { 100 } else { ((self.current as u64 * 100) / self.total as u64) as u8 };
        let reporter = BusProgressReporter { bus: self.bus };
        reporter.report(ProgressRecord {
            current_step: self.current,
            total_steps: self.total,
            current_artifact: artifact_name.to_string(),
            handler_name: handler_name.to_string(),
            percent,
            download_percent: 100,
        });
    }
}

impl<'a> Session<'a> {
    /// Runs one full update session over `source`, an arbitrary
    /// forward-only byte source (§4.1). Consumes `self` because a
    /// session's staged bootloader variables and script temp files are
    /// one-shot, and its session-lifetime handlers must not survive it.
    pub fn run<R: Read>(mut self, source: R) -> Result<SessionOutcome> {
        self.bus.notify(Notification::info(Status::Start, "update session starting"));
        self.set_transaction_state(TransactionState::InProgress)?;

        let result = self.run_inner(source);

        if result.is_err() {
            self.handlers.unregister_session_handlers();
        }
        result
    }

    fn run_inner<R: Read>(&mut self, source: R) -> Result<SessionOutcome> {
        let mut archive = ArchiveReader::open(source);

        let plan = match self.parse_and_validate(&mut archive) {
            Ok(plan) => plan,
            Err(err) => return Err(self.fail(err, &HashMap::new(), &InstallPlan::empty())),
        };

        let tmp_dir = tempfile::tempdir().map_err(Error::Io)?;
        let mut staged_vars = plan.bootloader_vars.clone();
        let mut script_paths: HashMap<usize, PathBuf> = HashMap::new();

        let non_script = plan.artifacts.iter().filter(|a| a.carries_data()).count() as u32;
        let script_count = plan.scripts().count() as u32;
        let no_data_count = plan.artifacts.iter().filter(|a| !a.carries_data() && !a.class.contains(ArtifactClass::SCRIPT)).count() as u32;
        let mut steps = StepCounter::new(non_script + 2 * script_count + no_data_count, self.bus);

        if let Err(err) = self.install_pass(&mut archive, &plan, tmp_dir.path(), &mut staged_vars, &mut script_paths, &mut steps) {
            return Err(self.fail(err, &script_paths, &plan));
        }

        if let Err(err) = self.postinstall_pass(&plan, &mut script_paths, &mut steps) {
            return Err(self.fail(err, &script_paths, &plan));
        }

        self.commit(&staged_vars)?;

        self.bus.notify(Notification::info(Status::Success, format!("update to {} {} installed successfully", plan.software.name, plan.software.version)));
        self.handlers.unregister_session_handlers();

        let final_state = if self.bootloader.has_native_transactions() { TransactionState::Testing } else { TransactionState::Done };
        Ok(SessionOutcome { plan, final_state })
    }

    fn parse_and_validate<R: Read>(&self, archive: &mut ArchiveReader<R>) -> Result<InstallPlan> {
        let header = archive.next()?.ok_or_else(|| Error::Parse("archive is empty".to_string()))?;
        if header.name != SW_DESCRIPTION_NAME {
            return Err(Error::Parse(format!("first archive entry must be named {SW_DESCRIPTION_NAME:?}, found {:?}", header.name)));
        }
        if header.filesize as usize > self.config.max_manifest_size {
            return Err(Error::ManifestTooLarge {
                limit: self.config.max_manifest_size,
                actual: header.filesize as usize,
            });
        }
        let mut manifest_bytes = Vec::with_capacity(header.filesize as usize);
        archive.payload().read_to_end(&mut manifest_bytes)?;

        if self.config.signed_image_mode {
            let sig_header = archive.next()?.ok_or(Error::MissingSignatureEntry)?;
            if sig_header.filesize > MAX_SIGNATURE_SIZE {
                return Err(Error::Signature(swupdate_crypto::Error::EmptySignature));
            }
            let mut sig_bytes = Vec::with_capacity(sig_header.filesize as usize);
            archive.payload().read_to_end(&mut sig_bytes)?;

            let public_key = self.crypto.public_key.as_ref().ok_or_else(|| Error::Config("signed-image mode is enabled but no public key is configured".to_string()))?;
            verify_rsa_pkcs_buf(&manifest_bytes, &sig_bytes, (**public_key).clone()).map_err(Error::Signature)?;
        }

        let plan = self.grammars.parse(&manifest_bytes)?;

        let ctx = ValidationContext {
            device: &self.device,
            handlers: self.handlers,
            hash_verification_enabled: self.config.hash_verification_enabled,
            signed_image_mode: self.config.signed_image_mode,
            current_version: self.current_version.as_deref(),
            maximum_version: self.maximum_version.as_deref(),
        };
        validate::validate(&plan, &ctx)?;

        self.bus.notify(Notification::info(
            Status::Run,
            format!("installing {} {} ({} artifacts)", plan.software.name, plan.software.version, plan.artifacts.len()),
        ));

        Ok(plan)
    }

    /// Single forward pass over the archive in plan order. Script
    /// artifacts are buffered to a temp file and immediately run with
    /// phase `pre`; data-bearing artifacts are streamed through the
    /// transform chain straight into their handler's sink; artifacts
    /// with neither (bootloader-only entries) carry no archive payload
    /// at all and are applied directly. Plan order guarantees every
    /// preinstall script completes before the first partition/image/file
    /// artifact is touched (§5).
    fn install_pass<R: Read>(
        &mut self,
        archive: &mut ArchiveReader<R>,
        plan: &InstallPlan,
        tmp_dir: &std::path::Path,
        staged_vars: &mut Vec<(String, String)>,
        script_paths: &mut HashMap<usize, PathBuf>,
        steps: &mut StepCounter,
    ) -> Result<()> {
        for (index, artifact) in plan.artifacts.iter().enumerate() {
            if artifact.class.contains(ArtifactClass::SCRIPT) {
                let header = archive.next()?.ok_or_else(|| Error::Parse(format!("archive ended before artifact {:?}", artifact.name)))?;
                if header.name != artifact.source_filename {
                    return Err(Error::Parse(format!("archive entry {:?} does not match expected artifact {:?}", header.name, artifact.source_filename)));
                }
                let mut buf = Vec::with_capacity(header.filesize as usize);
                archive.payload().read_to_end(&mut buf)?;
                let path = subprocess::write_script_file(tmp_dir, artifact, &buf)?;

                self.bus.notify(Notification::info(Status::Subprocess, format!("running preinstall script {:?}", artifact.name)));
                let outcome = self.subprocess_runner.run(&path, &[subprocess::phase_arg(ScriptPhase::Pre).to_string()])?;
                script_paths.insert(index, path);
                if !outcome.succeeded() {
                    return Err(Error::Handler(artifact.handler_type.clone(), format!("preinstall script {:?} exited {}", artifact.name, outcome.exit_code).into()));
                }
                steps.advance(&artifact.name, &artifact.handler_type);
            } else if artifact.carries_data() {
                let header = archive.next()?.ok_or_else(|| Error::Parse(format!("archive ended before artifact {:?}", artifact.name)))?;
                if header.name != artifact.source_filename {
                    return Err(Error::Parse(format!("archive entry {:?} does not match expected artifact {:?}", header.name, artifact.source_filename)));
                }

                let handler = self.handlers.get(&artifact.handler_type).ok_or_else(|| Error::UnknownHandler(artifact.handler_type.clone()))?.clone();

                let progress = BusProgressReporter { bus: self.bus };
                let mut ctx = HandlerContext {
                    plan,
                    staged_bootloader_vars: &mut *staged_vars,
                    progress: &progress,
                    tmp_dir: tmp_dir.to_path_buf(),
                };
                let mut sink = handler.sink_for(artifact, &mut ctx)?;

                let spec = ChainSpec {
                    encrypted: artifact.encrypted,
                    per_artifact_iv: artifact.iv,
                    compression: artifact.compressed,
                    expected_sha256: artifact.expected_sha256,
                };
                let cancel = self.cancel.clone();
                run_chain(archive.payload(), &spec, &self.crypto, sink.as_mut(), &move || cancel.load(Ordering::Relaxed))?;

                steps.advance(&artifact.name, &artifact.handler_type);
            } else {
                // Bootloader-only / no-data artifact: nothing streams
                // through the archive for it, it is just applied.
                let handler = self.handlers.get(&artifact.handler_type).ok_or_else(|| Error::UnknownHandler(artifact.handler_type.clone()))?.clone();

                let progress = BusProgressReporter { bus: self.bus };
                let mut ctx = HandlerContext {
                    plan,
                    staged_bootloader_vars: &mut *staged_vars,
                    progress: &progress,
                    tmp_dir: tmp_dir.to_path_buf(),
                };
                handler.run_script(artifact, ScriptPhase::Pre, &mut ctx)?;
                steps.advance(&artifact.name, &artifact.handler_type);
            }
        }

        // Consume the trailer; a well-formed archive yields `None` here.
        let _ = archive.next()?;
        Ok(())
    }

    fn postinstall_pass(&mut self, plan: &InstallPlan, script_paths: &mut HashMap<usize, PathBuf>, steps: &mut StepCounter) -> Result<()> {
        for (index, artifact) in plan.artifacts.iter().enumerate() {
            if !artifact.class.contains(ArtifactClass::SCRIPT) {
                continue;
            }
            let Some(path) = script_paths.get(&index) else { continue };

            self.bus.notify(Notification::info(Status::Subprocess, format!("running postinstall script {:?}", artifact.name)));
            let outcome = self.subprocess_runner.run(path, &[subprocess::phase_arg(ScriptPhase::Post).to_string()])?;
            steps.advance(&artifact.name, &artifact.handler_type);

            if !outcome.succeeded() {
                return Err(Error::Handler(artifact.handler_type.clone(), format!("postinstall script {:?} exited {}", artifact.name, outcome.exit_code).into()));
            }
        }
        Ok(())
    }

    /// Best-effort failure-phase pass: runs every script that opted in
    /// (via `run-on-fail`) using whichever temp files the install pass
    /// already wrote. Errors here are logged, never allowed to overwrite
    /// the original failure reason (§7 propagation policy).
    fn run_failure_scripts(&mut self, plan: &InstallPlan, script_paths: &HashMap<usize, PathBuf>) {
        for (index, artifact) in plan.artifacts.iter().enumerate() {
            if !artifact.runs_on_failure() {
                continue;
            }
            let Some(path) = script_paths.get(&index) else { continue };
            match self.subprocess_runner.run(path, &[subprocess::phase_arg(ScriptPhase::Failure).to_string()]) {
                Ok(outcome) if !outcome.succeeded() => {
                    log::warn!("failure-phase script {:?} exited {}", artifact.name, outcome.exit_code);
                }
                Err(err) => log::warn!("failure-phase script {:?} could not run: {err}", artifact.name),
                Ok(_) => {}
            }
        }
    }

    fn commit(&mut self, staged_vars: &[(String, String)]) -> Result<()> {
        self.bootloader.apply_list(staged_vars)?;
        let state = if self.bootloader.has_native_transactions() { TransactionState::Testing } else { TransactionState::Done };
        self.set_transaction_state(state)
    }

    fn set_transaction_state(&self, state: TransactionState) -> Result<()> {
        self.bootloader.set(&self.config.recovery_status_key, &state.as_code().to_string())?;
        self.bootloader.on_transaction_state(state)
    }

    /// Shared failure handling (§4.5, §7): run opted-in failure scripts
    /// on a best-effort basis, mark the persistent transaction state
    /// `failed`, and emit a single failure notification. Returns the
    /// original error unchanged so callers can propagate it.
    fn fail(&mut self, err: Error, script_paths: &HashMap<usize, PathBuf>, plan: &InstallPlan) -> Error {
        self.run_failure_scripts(plan, script_paths);
        if let Err(bootloader_err) = self.set_transaction_state(TransactionState::Failed) {
            log::error!("failed to record transaction failure: {bootloader_err}");
        }
        self.bus.notify(Notification::error(Status::Failure, 1, format!("update failed: {err}")));
        err
    }
}

impl InstallPlan {
    /// An empty plan used only to shape the failure path when a session
    /// fails before a real plan exists (during parse/validate): no
    /// artifacts, so nothing to clean up or run a failure phase against.
    fn empty() -> InstallPlan {
        InstallPlan {
            software: crate::manifest::SoftwareIdentity {
                name: String::new(),
                version: String::new(),
                description: None,
            },
            hardware_compat: crate::manifest::HardwareCompatList(Vec::new()),
            update_type: "default".to_string(),
            policy: crate::manifest::UpdatePolicy::default(),
            artifacts: Vec::new(),
            bootloader_vars: Vec::new(),
        }
    }
}
