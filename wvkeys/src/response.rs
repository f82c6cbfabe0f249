//! License response decoding and classification.

use crate::key::{COMMON_SYSTEM_ID, EncryptionKey, KeySystemInfo, TrackType, WIDEVINE_SYSTEM_ID};
use crate::request::DRM_TYPE;
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use log::debug;
use serde::Deserialize;
use std::collections::BTreeSet;

const STATUS_OK: &str = "OK";

/// License statuses that indicate a temporary server-side fault. Only these
/// are eligible for retry; every unrecognized status is fatal.
const TRANSIENT_STATUSES: [&str; 1] = ["INTERNAL_ERROR"];

#[derive(Deserialize)]
struct ResponseEnvelope {
    response: String,
}

#[derive(Deserialize)]
struct License {
    status: String,
    #[serde(default)]
    tracks: Vec<LicenseTrack>,
}

#[derive(Deserialize)]
struct LicenseTrack {
    #[serde(rename = "type")]
    track_type: String,
    key: String,
    // Absent for classic licenses.
    key_id: Option<String>,
    #[serde(default)]
    pssh: Vec<PsshEntry>,
    // Present in rotation mode only.
    crypto_period_index: Option<u32>,
}

#[derive(Deserialize)]
struct PsshEntry {
    drm_type: String,
    data: String,
}

/// One key decoded from a license, tagged with its track and, in rotation
/// mode, its crypto period.
#[derive(Clone, Debug)]
pub(crate) struct FetchedKey {
    pub track_type: TrackType,
    pub crypto_period_index: Option<u32>,
    pub key: EncryptionKey,
}

/// A successfully transported license server reply.
pub(crate) enum ServerReply {
    Keys(Vec<FetchedKey>),
    /// Server-internal fault; eligible for retry.
    Transient(String),
}

/// Decodes the response envelope and the license inside it.
///
/// Fatal license statuses come back as [`Error::Server`]; payloads that
/// cannot be decoded come back as [`Error::Internal`]. Neither is retried
/// here.
pub(crate) fn parse_response(raw: &str, add_common_system_info: bool) -> Result<ServerReply> {
    let envelope: ResponseEnvelope = serde_json::from_str(raw)
        .map_err(|e| Error::Internal(format!("malformed response envelope: {e}")))?;

    let license_json = BASE64
        .decode(&envelope.response)
        .map_err(|e| Error::Internal(format!("response field is not valid base64: {e}")))?;

    let license: License = serde_json::from_slice(&license_json)
        .map_err(|e| Error::Internal(format!("malformed license payload: {e}")))?;

    debug!("license status: {}", license.status);

    if license.status != STATUS_OK {
        if TRANSIENT_STATUSES.contains(&license.status.as_str()) {
            return Ok(ServerReply::Transient(license.status));
        }
        return Err(Error::Server(format!(
            "license status is {}",
            license.status
        )));
    }

    extract_keys(license.tracks, add_common_system_info).map(ServerReply::Keys)
}

fn extract_keys(
    tracks: Vec<LicenseTrack>,
    add_common_system_info: bool,
) -> Result<Vec<FetchedKey>> {
    let mut keys = Vec::with_capacity(tracks.len());

    for track in tracks {
        let track_type = TrackType::from_label(&track.track_type);
        if track_type == TrackType::Unknown {
            debug!("dropping track with unrecognized type '{}'", track.track_type);
            continue;
        }

        let key = decode_field(&track.key, "key")?;

        // No key id means classic output: key material only.
        let Some(key_id) = &track.key_id else {
            keys.push(FetchedKey {
                track_type,
                crypto_period_index: track.crypto_period_index,
                key: EncryptionKey {
                    key,
                    key_id: Vec::new(),
                    key_system_info: Vec::new(),
                },
            });
            continue;
        };
        let key_id = decode_field(key_id, "key_id")?;
        debug!(
            "decoded {} key with key id {}",
            track_type,
            hex::encode(&key_id)
        );

        let pssh_data = track
            .pssh
            .iter()
            .find(|entry| entry.drm_type == DRM_TYPE)
            .map(|entry| decode_field(&entry.data, "pssh data"))
            .transpose()?
            .unwrap_or_default();

        keys.push(FetchedKey {
            track_type,
            crypto_period_index: track.crypto_period_index,
            key: EncryptionKey {
                key,
                key_id: key_id.clone(),
                key_system_info: vec![KeySystemInfo {
                    system_id: WIDEVINE_SYSTEM_ID.to_vec(),
                    pssh_data,
                    key_ids: vec![key_id],
                }],
            },
        });
    }

    if add_common_system_info {
        add_common_entries(&mut keys);
    }

    Ok(keys)
}

/// Appends the common-system entry to every non-classic key: one shared
/// entry whose key-id set is the union of all key ids in the response.
fn add_common_entries(keys: &mut [FetchedKey]) {
    let union: BTreeSet<Vec<u8>> = keys
        .iter()
        .filter(|fetched| !fetched.key.key_id.is_empty())
        .map(|fetched| fetched.key.key_id.clone())
        .collect();

    if union.is_empty() {
        return;
    }
    let key_ids: Vec<Vec<u8>> = union.into_iter().collect();

    for fetched in keys.iter_mut().filter(|fetched| !fetched.key.key_id.is_empty()) {
        fetched.key.key_system_info.push(KeySystemInfo {
            system_id: COMMON_SYSTEM_ID.to_vec(),
            pssh_data: Vec::new(),
            key_ids: key_ids.clone(),
        });
    }
}

fn decode_field(field: &str, what: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(field)
        .map_err(|e| Error::Internal(format!("{what} is not valid base64: {e}")))
}
