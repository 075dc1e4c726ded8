//! Manifest validation (§4.2 step 4): hardware compatibility, handler
//! resolution, hash policy and version policy. Runs after a grammar has
//! produced an [`InstallPlan`] and before any handler is invoked.

use crate::error::{Error, Result, ValidationFailure};
use crate::handler::HandlerRegistry;
use crate::hwcompat::{self, DeviceIdentity};
use crate::manifest::{ArtifactClass, InstallPlan};
use crate::version::Version;

pub struct ValidationContext<'a> {
    pub device: &'a DeviceIdentity,
    pub handlers: &'a HandlerRegistry,
    pub hash_verification_enabled: bool,
    pub signed_image_mode: bool,
    pub current_version: Option<&'a str>,
    pub maximum_version: Option<&'a str>,
}

pub fn validate(plan: &InstallPlan, ctx: &ValidationContext) -> Result<()> {
    validate_hardware_compat(plan, ctx.device)?;
    validate_handlers(plan, ctx.handlers)?;
    validate_hash_policy(plan, ctx.hash_verification_enabled, ctx.signed_image_mode)?;
    validate_version_policy(plan, ctx)?;
    Ok(())
}

fn validate_hardware_compat(plan: &InstallPlan, device: &DeviceIdentity) -> Result<()> {
    if hwcompat::any_matches(&plan.hardware_compat.0, device)? {
        Ok(())
    } else {
        Err(Error::Validation(ValidationFailure::NoMatchingHardware {
            board: device.board.clone(),
            revision: device.revision.clone(),
        }))
    }
}

fn validate_handlers(plan: &InstallPlan, handlers: &HandlerRegistry) -> Result<()> {
    for artifact in plan.artifacts_in_order() {
        let handler = handlers
            .get(&artifact.handler_type)
            .ok_or_else(|| Error::Validation(ValidationFailure::MissingHandler(artifact.handler_type.clone())))?;
        if !handler_accepts(handler.mask(), artifact.class) {
            return Err(Error::Validation(ValidationFailure::HandlerCapabilityMismatch {
                handler: artifact.handler_type.clone(),
                artifact: artifact.name.clone(),
            }));
        }
    }
    Ok(())
}

fn handler_accepts(mask: ArtifactClass, class: ArtifactClass) -> bool {
    mask.intersects(class)
}

fn validate_hash_policy(plan: &InstallPlan, hash_verification_enabled: bool, signed_image_mode: bool) -> Result<()> {
    for artifact in plan.artifacts_in_order() {
        if !artifact.carries_data() {
            continue;
        }
        if signed_image_mode && artifact.expected_sha256.is_none() {
            return Err(Error::Validation(ValidationFailure::MissingHashInSignedMode(artifact.name.clone())));
        }
        if hash_verification_enabled && artifact.expected_sha256.is_none() {
            return Err(Error::Validation(ValidationFailure::HashMissingButVerificationEnabled(artifact.name.clone())));
        }
        if !hash_verification_enabled && artifact.expected_sha256.is_some() {
            return Err(Error::Validation(ValidationFailure::HashPresentButVerificationDisabled(artifact.name.clone())));
        }
    }
    Ok(())
}

fn validate_version_policy(plan: &InstallPlan, ctx: &ValidationContext) -> Result<()> {
    let package_version = plan.software.parsed_version();

    if plan.policy.no_downgrading {
        if let Some(current) = ctx.current_version {
            if package_version < Version::parse(current) {
                return Err(Error::Validation(ValidationFailure::Downgrade {
                    package: plan.software.version.clone(),
                    minimum: current.to_string(),
                }));
            }
        }
    }

    if plan.policy.check_max_version {
        if let Some(maximum) = ctx.maximum_version {
            if package_version > Version::parse(maximum) {
                return Err(Error::Validation(ValidationFailure::AboveMaxVersion {
                    package: plan.software.version.clone(),
                    maximum: maximum.to_string(),
                }));
            }
        }
    }

    if plan.policy.no_reinstalling {
        if let Some(current) = ctx.current_version {
            if package_version == Version::parse(current) {
                return Err(Error::Validation(ValidationFailure::Reinstall { version: plan.software.version.clone() }));
            }
        }
    }

    Ok(())
}
