//! License request bodies.
//!
//! Field order is part of the wire contract: the signature covers the exact
//! serialized bytes, so the structs below declare their fields in emission
//! order and the payload is serialized exactly once and passed through
//! untouched.

use crate::pssh;
use crate::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;

/// DRM system marker sent in every request and matched against the `pssh`
/// entries of license responses.
pub(crate) const DRM_TYPE: &str = "WIDEVINE";

/// Track types requested in every non-legacy mode, in wire order.
const REQUESTED_TRACKS: [&str; 3] = ["SD", "HD", "AUDIO"];

/// One license acquisition mode, matching the server's request field sets.
pub(crate) enum AcquisitionRequest<'a> {
    /// Content addressed by id, keyed under the named policy.
    ContentId {
        content_id: &'a [u8],
        policy: &'a str,
    },
    /// A complete `pssh` box; the container framing is stripped before
    /// encoding.
    PsshBox(&'a [u8]),
    /// A bare system-specific pssh payload, sent as-is.
    PsshData(&'a [u8]),
    /// Raw key ids; a minimal Widevine payload is synthesized from them.
    KeyIds(&'a [Vec<u8>]),
    /// Legacy asset-id addressing.
    AssetId(u32),
}

/// Crypto-period window parameters added to rotation-mode requests.
///
/// `first_index` is the actual window start, which is one less than the
/// nominal start of the window being served. The server expects exactly
/// that value; do not correct it.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RotationParams {
    pub first_index: u32,
    pub period_count: u32,
}

#[derive(Serialize)]
struct TrackEntry {
    #[serde(rename = "type")]
    track_type: &'static str,
}

// Declaration order below is the emission order the server signs against.
#[derive(Serialize)]
struct KeyRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    asset_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    crypto_period_count: Option<u32>,
    drm_types: [&'static str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    first_crypto_period_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pssh_data: Option<String>,
    tracks: Vec<TrackEntry>,
}

/// Builds the canonical request body for one acquisition.
pub(crate) fn build_request(
    request: &AcquisitionRequest<'_>,
    rotation: Option<RotationParams>,
) -> Result<String> {
    let mut body = KeyRequest {
        asset_id: None,
        content_id: None,
        crypto_period_count: None,
        drm_types: [DRM_TYPE],
        first_crypto_period_index: None,
        policy: None,
        pssh_data: None,
        tracks: REQUESTED_TRACKS
            .into_iter()
            .map(|track_type| TrackEntry { track_type })
            .collect(),
    };

    match request {
        AcquisitionRequest::ContentId { content_id, policy } => {
            body.content_id = Some(BASE64.encode(content_id));
            body.policy = Some((*policy).to_owned());
        }
        AcquisitionRequest::PsshBox(pssh_box) => {
            body.pssh_data = Some(BASE64.encode(pssh::strip_pssh_box(pssh_box)?));
        }
        AcquisitionRequest::PsshData(data) => {
            body.pssh_data = Some(BASE64.encode(data));
        }
        AcquisitionRequest::KeyIds(key_ids) => {
            body.pssh_data = Some(BASE64.encode(pssh::pssh_data_from_key_ids(key_ids)?));
        }
        AcquisitionRequest::AssetId(asset_id) => {
            body.asset_id = Some(*asset_id);
        }
    }

    if let Some(window) = rotation {
        body.crypto_period_count = Some(window.period_count);
        body.first_crypto_period_index = Some(window.first_index);
    }

    serde_json::to_string(&body)
        .map_err(|e| Error::Internal(format!("cannot serialize license request: {e}")))
}

// Emission order matters here too; the server decodes the `request` field
// and verifies `signature` over exactly those bytes.
#[derive(Serialize)]
struct SignedMessage<'a> {
    request: String,
    signature: String,
    signer: &'a str,
}

/// Wraps a request body and its signature into the signed POST envelope.
pub(crate) fn signed_message(request: &str, signature: &[u8], signer: &str) -> Result<String> {
    serde_json::to_string(&SignedMessage {
        request: BASE64.encode(request),
        signature: BASE64.encode(signature),
        signer,
    })
    .map_err(|e| Error::Internal(format!("cannot serialize signed message: {e}")))
}
