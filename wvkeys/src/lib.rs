//! Client for the Widevine modular DRM license server.
//!
//! Builds and signs content-key requests, performs the exchange over a
//! pluggable transport, classifies and retries transient server failures,
//! and keeps a rolling cache of keys for key-rotation workloads where a
//! packaging pipeline looks keys up per crypto period.
//!
//! # Quick start
//!
//! ```no_run
//! use wvkeys::{TrackType, WidevineKeySource};
//!
//! fn main() -> wvkeys::Result<()> {
//!     let source = WidevineKeySource::builder("https://license.example.com/getcontentkey")
//!         .common_system_info(true)
//!         .build()?;
//!
//!     source.fetch_keys(b"content-id", "streaming-policy")?;
//!     let key = source.get_key(TrackType::Hd)?;
//!     println!("HD key id: {}", hex::encode(&key.key_id));
//!     Ok(())
//! }
//! ```
//!
//! Requests are signed when a [`RequestSigner`] is configured; without one
//! the raw request body is sent, which only development servers accept.
//! The transport is the [`KeyFetcher`] capability, defaulting to a blocking
//! HTTP client ([`HttpKeyFetcher`]); both capabilities are injected at
//! construction so tests can substitute doubles.

mod error;
mod fetcher;
mod key;
mod key_source;
mod pssh;
mod request;
mod response;
mod retry;
mod rotation;
mod signer;

pub use error::Error;
pub use fetcher::{HttpKeyFetcher, KeyFetcher};
pub use key::{COMMON_SYSTEM_ID, EncryptionKey, KeySystemInfo, TrackType, WIDEVINE_SYSTEM_ID};
pub use key_source::{DEFAULT_CRYPTO_PERIOD_COUNT, WidevineKeySource, WidevineKeySourceBuilder};
pub use retry::RetryPolicy;
pub use signer::RequestSigner;

/// A `Result` alias where the `Err` case is `wvkeys::Error`.
pub type Result<T> = std::result::Result<T, Error>;
