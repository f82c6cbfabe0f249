//! Minimal `pssh` box handling for license requests.
//!
//! The request builder only ever needs the system-specific payload carried
//! inside a `pssh` box, or a synthesized Widevine payload when the caller
//! supplies bare key ids. Full container parsing lives with the packaging
//! pipeline, not here.

use crate::{Error, Result};
use prost::Message;
use std::collections::BTreeSet;

/// Widevine pssh payload, as defined by the Widevine cenc header message.
/// Only the key-id field is needed for synthesized requests.
#[derive(Clone, PartialEq, Message)]
struct WidevinePsshData {
    #[prost(bytes = "vec", repeated, tag = "2")]
    key_ids: Vec<Vec<u8>>,
}

/// Strips the container framing from a full `pssh` box, returning the inner
/// system-specific payload.
///
/// The box must be a single, complete `pssh` box of version 0 or 1.
pub(crate) fn strip_pssh_box(pssh_box: &[u8]) -> Result<Vec<u8>> {
    // size(4) + type(4) + version/flags(4) + system id(16) + data size(4)
    if pssh_box.len() < 32 {
        return Err(Error::InvalidArgument(
            "data too short to be a valid pssh box".to_owned(),
        ));
    }

    let size = read_u32(pssh_box, 0)? as usize;
    if size != pssh_box.len() {
        return Err(Error::InvalidArgument(format!(
            "pssh box size field is {size} but {} bytes were given",
            pssh_box.len()
        )));
    }

    let box_type = &pssh_box[4..8];
    if box_type != b"pssh" {
        return Err(Error::InvalidArgument(format!(
            "expected a pssh box but found '{}'",
            String::from_utf8_lossy(box_type)
        )));
    }

    let version = pssh_box[8];
    if version > 1 {
        return Err(Error::InvalidArgument(format!(
            "unsupported pssh box version {version}"
        )));
    }

    // Skip version/flags and the 16-byte system id.
    let mut at = 12 + 16;

    if version == 1 {
        let key_id_count = read_u32(pssh_box, at)? as usize;
        at = at
            .checked_add(4 + key_id_count * 16)
            .filter(|end| *end <= pssh_box.len())
            .ok_or_else(|| {
                Error::InvalidArgument("pssh box key id list is truncated".to_owned())
            })?;
    }

    let data_size = read_u32(pssh_box, at)? as usize;
    at += 4;

    if at.checked_add(data_size) != Some(pssh_box.len()) {
        return Err(Error::InvalidArgument(
            "pssh box data length does not match the box size".to_owned(),
        ));
    }

    Ok(pssh_box[at..].to_vec())
}

/// Synthesizes a minimal Widevine pssh payload from a set of raw key ids.
///
/// Key ids are deduplicated and emitted in sorted order so the serialized
/// request is deterministic.
pub(crate) fn pssh_data_from_key_ids(key_ids: &[Vec<u8>]) -> Result<Vec<u8>> {
    if key_ids.is_empty() {
        return Err(Error::InvalidArgument(
            "at least one key id is required".to_owned(),
        ));
    }

    let unique: BTreeSet<&Vec<u8>> = key_ids.iter().collect();
    let payload = WidevinePsshData {
        key_ids: unique.into_iter().cloned().collect(),
    };

    Ok(payload.encode_to_vec())
}

fn read_u32(data: &[u8], at: usize) -> Result<u32> {
    data.get(at..at + 4)
        .map(|bytes| u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        .ok_or_else(|| Error::InvalidArgument("pssh box is truncated".to_owned()))
}
