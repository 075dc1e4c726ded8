//! JSON manifest grammar. Produces the same [`InstallPlan`] the
//! libconfig-style grammar does; see §6 for the shared key names.

use std::collections::HashMap;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::hwcompat::HardwareCompatEntry;
use crate::manifest::common::{decode_iv, decode_sha256, parse_compressed};
use crate::manifest::grammar::ManifestGrammar;
use crate::manifest::{Artifact, ArtifactClass, HardwareCompatList, InstallPlan, SoftwareIdentity, Target, UpdatePolicy};

#[derive(Deserialize)]
struct RawRoot {
    software: RawSoftware,
    #[serde(default = "default_update_type")]
    #[serde(rename = "update-type")]
    update_type: String,
    #[serde(default)]
    policy: RawPolicy,
    #[serde(default)]
    images: Vec<RawArtifact>,
    #[serde(default)]
    files: Vec<RawArtifact>,
    #[serde(default)]
    scripts: Vec<RawArtifact>,
    #[serde(default)]
    partitions: Vec<RawArtifact>,
    #[serde(default)]
    bootenv: Vec<RawBootenvEntry>,
}

fn default_update_type() -> String {
    "default".to_string()
}

#[derive(Deserialize)]
struct RawSoftware {
    name: String,
    version: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(rename = "hardware-compatibility", default)]
    hardware_compatibility: Vec<RawHwCompat>,
}

#[derive(Deserialize)]
struct RawHwCompat {
    board: String,
    revision: String,
}

#[derive(Deserialize, Default)]
struct RawPolicy {
    #[serde(rename = "no-downgrading", default)]
    no_downgrading: bool,
    #[serde(rename = "check-max-version", default)]
    check_max_version: bool,
    #[serde(rename = "no-reinstalling", default)]
    no_reinstalling: bool,
}

#[derive(Deserialize)]
struct RawBootenvEntry {
    name: String,
    value: String,
}

#[derive(Deserialize)]
struct RawArtifact {
    name: Option<String>,
    version: Option<String>,
    #[serde(rename = "type")]
    handler_type: String,
    filename: Option<String>,
    volume: Option<String>,
    device: Option<String>,
    path: Option<String>,
    mtdname: Option<String>,
    filesystem: Option<String>,
    sha256: Option<String>,
    #[serde(default)]
    compressed: Option<serde_json::Value>,
    #[serde(default)]
    encrypted: bool,
    ivt: Option<String>,
    #[serde(default)]
    properties: HashMap<String, Vec<String>>,
    #[serde(rename = "install-if-different", default)]
    install_if_different: bool,
    #[serde(rename = "install-if-higher", default)]
    install_if_higher: bool,
}

impl RawArtifact {
    fn into_artifact(self, class: ArtifactClass) -> Result<Artifact> {
        let source_filename = self.filename.clone().unwrap_or_default();
        let target = if let Some(volume) = self.volume {
            Target::Partition { volume }
        } else if let Some(mtdname) = self.mtdname {
            Target::Mtd { name: mtdname }
        } else if let (Some(device), Some(filesystem), Some(path)) = (self.device.clone(), self.filesystem.clone(), self.path.clone()) {
            Target::Filesystem { device, filesystem, path }
        } else if let Some(path) = self.path {
            Target::Path(path)
        } else if class.contains(ArtifactClass::SCRIPT) {
            Target::None
        } else {
            Target::None
        };

        let compressed = match &self.compressed {
            None => crate::transform::CompressionSelector::None,
            Some(serde_json::Value::Bool(false)) => crate::transform::CompressionSelector::None,
            Some(serde_json::Value::Bool(true)) => crate::transform::CompressionSelector::ZlibGzip,
            Some(serde_json::Value::String(s)) => parse_compressed(s)?,
            Some(other) => return Err(Error::Parse(format!("unexpected `compressed` value: {other}"))),
        };

        let expected_sha256 = self.sha256.as_deref().map(decode_sha256).transpose()?;
        let iv = self.ivt.as_deref().map(decode_iv).transpose()?;

        Ok(Artifact {
            name: self.name.unwrap_or_else(|| source_filename.clone()),
            version: self.version,
            handler_type: self.handler_type,
            source_filename,
            target,
            expected_sha256,
            size: None,
            compressed,
            encrypted: self.encrypted,
            iv,
            properties: self.properties,
            class,
            install_if_different: self.install_if_different,
            install_if_higher: self.install_if_higher,
        })
    }
}

pub struct JsonGrammar;

impl ManifestGrammar for JsonGrammar {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, bytes: &[u8]) -> Result<InstallPlan> {
        let raw: RawRoot = serde_json::from_slice(bytes).map_err(|err| Error::Parse(format!("json: {err}")))?;

        let hardware_compat = HardwareCompatList(
            raw.software
                .hardware_compatibility
                .into_iter()
                .map(|h| HardwareCompatEntry {
                    board: h.board,
                    revision_pattern: h.revision,
                })
                .collect(),
        );

        let mut artifacts = Vec::new();
        for a in raw.scripts {
            artifacts.push(a.into_artifact(ArtifactClass::SCRIPT)?);
        }
        for a in raw.partitions {
            artifacts.push(a.into_artifact(ArtifactClass::PARTITION)?);
        }
        for a in raw.images {
            artifacts.push(a.into_artifact(ArtifactClass::IMAGE)?);
        }
        for a in raw.files {
            artifacts.push(a.into_artifact(ArtifactClass::FILE)?);
        }

        Ok(InstallPlan {
            software: SoftwareIdentity {
                name: raw.software.name,
                version: raw.software.version,
                description: raw.software.description,
            },
            hardware_compat,
            update_type: raw.update_type,
            policy: UpdatePolicy {
                no_downgrading: raw.policy.no_downgrading,
                check_max_version: raw.policy.check_max_version,
                no_reinstalling: raw.policy.no_reinstalling,
            },
            artifacts,
            bootloader_vars: raw.bootenv.into_iter().map(|e| (e.name, e.value)).collect(),
        })
    }
}
