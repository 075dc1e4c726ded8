//! Pluggable manifest grammars: JSON and libconfig-style parsers (plus
//! room for an externally registered one) all produce the same
//! [`InstallPlan`](super::InstallPlan). The registry tries each in turn;
//! the first successful parse wins (§4.2 step 3).

use crate::error::{Error, Result};
use crate::manifest::InstallPlan;

pub trait ManifestGrammar {
    /// Human-readable name, used only for logging which grammar matched.
    fn name(&self) -> &'static str;

    /// Attempts to parse `bytes` as a manifest in this grammar. Grammars
    /// should fail fast and cheaply on input that obviously isn't
    /// theirs, so the registry can move on to the next one.
    fn parse(&self, bytes: &[u8]) -> Result<InstallPlan>;
}

pub struct GrammarRegistry {
    grammars: Vec<Box<dyn ManifestGrammar + Send + Sync>>,
}

impl GrammarRegistry {
    pub fn new() -> Self {
        GrammarRegistry { grammars: Vec::new() }
    }

    /// Registers the built-in JSON and libconfig-style grammars, in the
    /// order they are tried.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(super::libconfig_grammar::LibconfigGrammar));
        registry.register(Box::new(super::json_grammar::JsonGrammar));
        registry
    }

    pub fn register(&mut self, grammar: Box<dyn ManifestGrammar + Send + Sync>) {
        self.grammars.push(grammar);
    }

    pub fn parse(&self, bytes: &[u8]) -> Result<InstallPlan> {
        for grammar in &self.grammars {
            match grammar.parse(bytes) {
                Ok(plan) => {
                    log::debug!("manifest parsed by grammar {:?}", grammar.name());
                    return Ok(plan);
                }
                Err(err) => {
                    log::trace!("grammar {:?} did not match: {err}", grammar.name());
                }
            }
        }
        Err(Error::NoGrammarMatched)
    }
}

impl Default for GrammarRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
