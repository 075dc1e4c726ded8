//! Small pieces both grammars need to turn the raw manifest text into
//! the typed [`super::Artifact`]/[`super::InstallPlan`] fields: hex
//! decoding and the `compressed` field's three-state grammar.

use crate::error::{Error, Result};
use crate::transform::CompressionSelector;

pub(crate) fn parse_compressed(value: &str) -> Result<CompressionSelector> {
    match value {
        "false" | "none" => Ok(CompressionSelector::None),
        "true" | "zlib" | "gzip" => Ok(CompressionSelector::ZlibGzip),
        "zstd" => Ok(CompressionSelector::Zstd),
        other => Err(Error::Parse(format!("unknown value for `compressed`: {other:?}"))),
    }
}

pub(crate) fn decode_sha256(hex: &str) -> Result<[u8; 32]> {
    swupdate_crypto::hash::decode_sha256_hex(hex).map_err(|err| Error::Parse(format!("bad sha256: {err}")))
}

pub(crate) fn decode_iv(hex: &str) -> Result<[u8; 16]> {
    swupdate_crypto::hash::decode_iv_hex(hex).map_err(|err| Error::Parse(format!("bad ivt: {err}")))
}
