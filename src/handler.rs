//! Handler registry and dispatch (§4.4): named installers selected by an
//! artifact's `type`, each declaring a capability mask over
//! `{image, file, partition, script, bootloader, no-data}`. Registration
//! is idempotent by name; handlers registered for one session only are
//! dropped at session end (mirrors the original project's distinction
//! between handlers registered once at process startup and ones a
//! script registers dynamically for itself).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result, ValidationFailure};
use crate::manifest::{Artifact, ArtifactClass, InstallPlan};
use crate::notifier::ProgressReporter;
use crate::transform::Sink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Pre,
    Post,
    Failure,
}

/// Shared, mutable-where-needed state handlers act on. The install plan
/// is read-only; the bootloader variable staging map and progress
/// reporter are the only things a handler may write to (§3 invariant).
pub struct HandlerContext<'a> {
    pub plan: &'a InstallPlan,
    pub staged_bootloader_vars: &'a mut Vec<(String, String)>,
    pub progress: &'a dyn ProgressReporter,
    pub tmp_dir: PathBuf,
}

impl<'a> HandlerContext<'a> {
    pub fn stage_bootloader_var(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.staged_bootloader_vars.push((key.into(), value.into()));
    }
}

pub trait Handler: Send + Sync {
    fn name(&self) -> &str;
    fn mask(&self) -> ArtifactClass;

    /// Builds the sink that receives decoded bytes for a data-bearing
    /// artifact. Default errors: handlers that only run scripts don't
    /// implement this.
    fn sink_for(&self, _artifact: &Artifact, _ctx: &mut HandlerContext) -> Result<Box<dyn Sink + Send>> {
        Err(Error::Handler(self.name().to_string(), format!("handler {:?} does not accept streamed artifact data", self.name()).into()))
    }

    /// Runs a script/no-data artifact for one phase. Default errors:
    /// handlers that only accept streamed data don't implement this.
    fn run_script(&self, _artifact: &Artifact, _phase: ScriptPhase, _ctx: &mut HandlerContext) -> Result<()> {
        Err(Error::Handler(self.name().to_string(), format!("handler {:?} does not support script phases", self.name()).into()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerLifetime {
    Global,
    Session,
}

struct Registration {
    handler: Arc<dyn Handler>,
    lifetime: HandlerLifetime,
}

#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Registration>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        HandlerRegistry { handlers: HashMap::new() }
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) -> Result<()> {
        self.register_with_lifetime(handler, HandlerLifetime::Global)
    }

    pub fn register_with_lifetime(&mut self, handler: Arc<dyn Handler>, lifetime: HandlerLifetime) -> Result<()> {
        let name = handler.name().to_string();
        if self.handlers.contains_key(&name) {
            return Err(Error::Validation(ValidationFailure::DuplicateHandlerName(name)));
        }
        self.handlers.insert(name, Registration { handler, lifetime });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Handler>> {
        self.handlers.get(name).map(|r| &r.handler)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Drops every handler registered with session lifetime. Called by
    /// the coordinator at the end of a session.
    pub fn unregister_session_handlers(&mut self) {
        self.handlers.retain(|_, reg| reg.lifetime == HandlerLifetime::Global);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Arc;

    pub struct DummyHandler {
        name: String,
        mask: ArtifactClass,
    }

    impl Handler for DummyHandler {
        fn name(&self) -> &str {
            &self.name
        }

        fn mask(&self) -> ArtifactClass {
            self.mask
        }

        fn sink_for(&self, _artifact: &Artifact, _ctx: &mut HandlerContext) -> Result<Box<dyn Sink + Send>> {
            let sink = |_: &[u8]| -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> { Ok(()) };
            Ok(Box::new(sink))
        }

        fn run_script(&self, _artifact: &Artifact, _phase: ScriptPhase, _ctx: &mut HandlerContext) -> Result<()> {
            Ok(())
        }
    }

    pub fn dummy_handler(name: &str, mask: ArtifactClass) -> Arc<dyn Handler> {
        Arc::new(DummyHandler { name: name.to_string(), mask })
    }
}
