//! Hardware-compatibility matching: a manifest's compatibility list entry
//! matches a device's `(board, revision)` either by literal equality of
//! the revision or, when prefixed with the regex marker, as an anchored
//! regular expression. Mirrors `core/hw-compatibility.c`'s behavior.

use regex::Regex;

use crate::error::{Error, Result};

/// Prefix that marks a hardware-compatibility pattern as a regex instead
/// of a literal string, following the manifest grammar's own convention.
const REGEX_MARKER: &str = "regex:";

#[derive(Debug, Clone)]
pub struct HardwareCompatEntry {
    pub board: String,
    pub revision_pattern: String,
}

/// The device's own identity, read from a fixed on-device file or
/// supplied by configuration override.
#[derive(Debug, Clone)]
pub struct DeviceIdentity {
    pub board: String,
    pub revision: String,
}

impl HardwareCompatEntry {
    fn matches(&self, device: &DeviceIdentity) -> Result<bool> {
        if self.board != device.board {
            return Ok(false);
        }
        match self.revision_pattern.strip_prefix(REGEX_MARKER) {
            Some(pattern) => {
                let anchored = format!("^(?:{pattern})$");
                let re = Regex::new(&anchored).map_err(|err| Error::Config(format!("bad hardware-compatibility regex {pattern:?}: {err}")))?;
                Ok(re.is_match(&device.revision))
            }
            None => Ok(self.revision_pattern == device.revision),
        }
    }
}

/// Returns `Ok(true)` if any entry in `list` matches `device`. Regex
/// compile errors in one entry do not short-circuit the others: a later
/// entry may still match literally, so we only propagate the compile
/// error if nothing matched.
pub fn any_matches(list: &[HardwareCompatEntry], device: &DeviceIdentity) -> Result<bool> {
    let mut first_error = None;
    for entry in list {
        match entry.matches(device) {
            Ok(true) => return Ok(true),
            Ok(false) => continue,
            Err(err) => first_error.get_or_insert(err),
        };
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(false),
    }
}
