//! The install plan data model and the parse/validate pipeline that
//! produces it from a raw manifest entry (§3, §4.2).

pub(crate) mod common;
pub mod grammar;
pub mod json_grammar;
pub mod libconfig_grammar;
pub mod validate;

use std::collections::HashMap;

use crate::version::Version;

bitflags::bitflags! {
    /// Classification flags an artifact carries; must match the
    /// resolved handler's declared capability mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ArtifactClass: u8 {
        const IMAGE = 1 << 0;
        const FILE = 1 << 1;
        const PARTITION = 1 << 2;
        const SCRIPT = 1 << 3;
        const BOOTLOADER = 1 << 4;
        const NO_DATA = 1 << 5;
    }
}

#[derive(Debug, Clone)]
pub enum Target {
    Path(String),
    Filesystem { device: String, filesystem: String, path: String },
    Partition { volume: String },
    Mtd { name: String },
    None,
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub version: Option<String>,
    pub handler_type: String,
    pub source_filename: String,
    pub target: Target,
    pub expected_sha256: Option<[u8; 32]>,
    pub size: Option<u64>,
    pub compressed: crate::transform::CompressionSelector,
    pub encrypted: bool,
    pub iv: Option<[u8; 16]>,
    pub properties: HashMap<String, Vec<String>>,
    pub class: ArtifactClass,
    pub install_if_different: bool,
    pub install_if_higher: bool,
}

impl Artifact {
    pub fn carries_data(&self) -> bool {
        !self.class.intersects(ArtifactClass::SCRIPT | ArtifactClass::BOOTLOADER | ArtifactClass::NO_DATA)
    }

    /// Whether this script artifact opted in to a failure-phase
    /// invocation (§4.5 step 5), signalled by a `run-on-fail: true`
    /// property -- there being no dedicated manifest key for it.
    pub fn runs_on_failure(&self) -> bool {
        self.properties.get("run-on-fail").is_some_and(|values| values.iter().any(|v| v == "true"))
    }
}

#[derive(Debug, Clone, Default)]
pub struct UpdatePolicy {
    pub no_downgrading: bool,
    pub check_max_version: bool,
    pub no_reinstalling: bool,
}

#[derive(Debug, Clone)]
pub struct HardwareCompatList(pub Vec<crate::hwcompat::HardwareCompatEntry>);

#[derive(Debug, Clone)]
pub struct SoftwareIdentity {
    pub name: String,
    pub version: String,
    pub description: Option<String>,
}

impl SoftwareIdentity {
    pub fn parsed_version(&self) -> Version {
        Version::parse(&self.version)
    }
}

/// The frozen, validated install plan a manifest parses into. Immutable
/// after construction: handlers read it but never mutate artifact
/// metadata (§3 invariant).
#[derive(Debug, Clone)]
pub struct InstallPlan {
    pub software: SoftwareIdentity,
    pub hardware_compat: HardwareCompatList,
    pub update_type: String,
    pub policy: UpdatePolicy,
    pub artifacts: Vec<Artifact>,
    pub bootloader_vars: Vec<(String, String)>,
}

impl InstallPlan {
    /// Artifacts in plan order: scripts first, then partitions, then
    /// images/files. This is also the order their payloads appear in the
    /// archive, so a single forward pass satisfies both ordering
    /// guarantees the coordinator owes (§4.5, §5): every preinstall
    /// script completes before any image/file/partition artifact is
    /// touched, and partition artifacts install before image/file
    /// artifacts that may target them.
    pub fn artifacts_in_order(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter()
    }

    pub fn scripts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.class.contains(ArtifactClass::SCRIPT))
    }

    pub fn data_artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(|a| a.carries_data())
    }
}
