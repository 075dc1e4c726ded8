//! Bootloader adapter (§4.6): a uniform interface over several backends,
//! probed in a fixed order at startup. DESIGN NOTES §9 reimplements the
//! original's function-pointer-table-plus-constructor-registered-probes
//! pattern as a trait with an explicit, ordered probe list.

pub mod cboot;
pub mod efi_bootguard;
pub(crate) mod env_file;
pub mod grub;
pub mod none_file;
pub mod uboot;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Available,
    InProgress,
    Testing,
    Failed,
    Done,
}

impl TransactionState {
    /// Single-character wire encoding that survives reboot (§3).
    pub fn as_code(&self) -> char {
        match self {
            TransactionState::Available => '0',
            TransactionState::InProgress => '1',
            TransactionState::Testing => '2',
            TransactionState::Failed => '3',
            TransactionState::Done => '4',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        Some(match c {
            '0' => TransactionState::Available,
            '1' => TransactionState::InProgress,
            '2' => TransactionState::Testing,
            '3' => TransactionState::Failed,
            '4' => TransactionState::Done,
            _ => return None,
        })
    }
}

/// A uniform key/value/transaction interface over a concrete bootloader.
/// Implementors that lack native transaction semantics (U-Boot, GRUB)
/// are thin key/value wrappers; the coordinator itself carries the
/// transaction semantics for those via `recovery_status`. Implementors
/// with native transaction semantics (EFI Boot Guard) additionally
/// interpret `recovery_status` writes as environment-revision
/// lifecycle calls.
pub trait Bootloader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns `true` if this backend is usable on the current device.
    /// Called once, in probe order, at startup.
    fn probe(&self) -> bool;

    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn unset(&self, key: &str) -> Result<()>;

    /// Bulk-applies `pairs` as a single write where the backend supports
    /// atomicity; backends without native atomicity apply them in order
    /// and make a best-effort of it (§9 open question).
    fn apply_list(&self, pairs: &[(String, String)]) -> Result<()> {
        for (key, value) in pairs {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Whether this backend has native transaction semantics (only
    /// EFI Boot Guard does, currently).
    fn has_native_transactions(&self) -> bool {
        false
    }

    /// For natively-transactional backends, reacts to a `recovery_status`
    /// state transition by invoking the backend's own lifecycle calls
    /// (create/finalize/acknowledge); a no-op for everything else.
    fn on_transaction_state(&self, _state: TransactionState) -> Result<()> {
        Ok(())
    }
}

/// Probes each backend in the fixed order the original project uses
/// (U-Boot, GRUB, EFI Boot Guard, none/file, cboot), returning the
/// first one that reports itself available.
pub fn probe_first_available(backends: &[Box<dyn Bootloader>]) -> Result<&dyn Bootloader> {
    for backend in backends {
        if backend.probe() {
            log::info!("selected bootloader backend: {}", backend.name());
            return Ok(backend.as_ref());
        }
    }
    Err(Error::NoBootloaderAvailable)
}

pub fn default_probe_order() -> Vec<Box<dyn Bootloader>> {
    vec![
        Box::new(uboot::UBootAdapter::default()),
        Box::new(grub::GrubAdapter::default()),
        Box::new(efi_bootguard::EfiBootGuardAdapter::default()),
        Box::new(none_file::NoneFileAdapter::default()),
        Box::new(cboot::CbootAdapter::default()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_state_code_roundtrip() {
        for state in [TransactionState::Available, TransactionState::InProgress, TransactionState::Testing, TransactionState::Failed, TransactionState::Done] {
            assert_eq!(TransactionState::from_code(state.as_code()), Some(state));
        }
    }

    #[test]
    fn probe_first_available_skips_unavailable_backends() {
        struct Unavailable;
        impl Bootloader for Unavailable {
            fn name(&self) -> &'static str {
                "unavailable"
            }
            fn probe(&self) -> bool {
                false
            }
            fn get(&self, _key: &str) -> Result<Option<String>> {
                Ok(None)
            }
            fn set(&self, _key: &str, _value: &str) -> Result<()> {
                Ok(())
            }
            fn unset(&self, _key: &str) -> Result<()> {
                Ok(())
            }
        }
        struct Available;
        impl Bootloader for Available {
            fn name(&self) -> &'static str {
                "available"
            }
            fn probe(&self) -> bool {
                true
            }
            fn get(&self, _key: &str) -> Result<Option<String>> {
                Ok(None)
            }
            fn set(&self, _key: &str, _value: &str) -> Result<()> {
                Ok(())
            }
            fn unset(&self, _key: &str) -> Result<()> {
                Ok(())
            }
        }
        let backends: Vec<Box<dyn Bootloader>> = vec![Box::new(Unavailable), Box::new(Available)];
        let selected = probe_first_available(&backends).unwrap();
        assert_eq!(selected.name(), "available");
    }

    #[test]
    fn no_backend_available_is_an_error() {
        let backends: Vec<Box<dyn Bootloader>> = Vec::new();
        assert!(probe_first_available(&backends).is_err());
    }
}
