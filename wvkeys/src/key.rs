//! Track classification and the key material handed back to callers.

/// System id of the Widevine DRM system, as it appears in a `pssh` box
/// header.
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

/// System id of the common (`cenc`) pssh system, carried by the aggregated
/// key-id entry in common-system mode.
pub const COMMON_SYSTEM_ID: [u8; 16] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb, 0x4b,
];

/// Stream class a key applies to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum TrackType {
    Sd,
    Hd,
    Audio,
    Unknown,
}

impl TrackType {
    /// Matches a license server track label. Case sensitive; anything
    /// unrecognized maps to [`TrackType::Unknown`], which never has a key.
    pub fn from_label(label: &str) -> Self {
        match label {
            "SD" => TrackType::Sd,
            "HD" => TrackType::Hd,
            "AUDIO" => TrackType::Audio,
            _ => TrackType::Unknown,
        }
    }
}

impl std::fmt::Display for TrackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                TrackType::Sd => "SD",
                TrackType::Hd => "HD",
                TrackType::Audio => "AUDIO",
                TrackType::Unknown => "UNKNOWN",
            }
        )
    }
}

/// DRM-system-specific initialization metadata attached to a key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySystemInfo {
    /// 16-byte system id.
    pub system_id: Vec<u8>,
    /// System-specific pssh payload.
    pub pssh_data: Vec<u8>,
    /// Key ids covered by this entry.
    pub key_ids: Vec<Vec<u8>>,
}

/// A content encryption key returned by the license server.
///
/// Classic (asset-id addressed) licenses carry key material only; `key_id`
/// and `key_system_info` stay empty for them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptionKey {
    pub key: Vec<u8>,
    pub key_id: Vec<u8>,
    pub key_system_info: Vec<KeySystemInfo>,
}
