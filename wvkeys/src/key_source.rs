//! The key source facade: builds, signs, fetches, parses, and caches.

use crate::fetcher::{HttpKeyFetcher, KeyFetcher};
use crate::key::{EncryptionKey, TrackType};
use crate::request::{self, AcquisitionRequest, RotationParams};
use crate::response::{self, FetchedKey, ServerReply};
use crate::retry::RetryPolicy;
use crate::rotation::KeyRotationCache;
use crate::signer::RequestSigner;
use crate::{Error, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Mutex;
use std::thread;

/// Number of crypto periods fetched per rotation window unless configured
/// otherwise.
pub const DEFAULT_CRYPTO_PERIOD_COUNT: u32 = 10;

/// Client for a Widevine license server.
///
/// One source per packaging session: it owns the signer and fetcher
/// capabilities and the key cache for its lifetime, and is safe to share
/// across the pipeline's per-track worker threads.
///
/// Call one of the `fetch_keys*` operations first, then read keys back with
/// [`get_key`](Self::get_key) or, in rotation mode,
/// [`get_crypto_period_key`](Self::get_crypto_period_key).
pub struct WidevineKeySource {
    server_url: String,
    add_common_system_info: bool,
    signer: Option<Box<dyn RequestSigner>>,
    fetcher: Box<dyn KeyFetcher>,
    retry_policy: RetryPolicy,
    cache: KeyRotationCache,
    state: Mutex<SourceState>,
}

#[derive(Default)]
struct SourceState {
    /// Keys from the latest successful non-rotation fetch, per track.
    batch: Option<HashMap<TrackType, EncryptionKey>>,
    /// Content id and policy recorded for later rotation window fetches.
    rotation_params: Option<(Vec<u8>, String)>,
}

/// Builder for [`WidevineKeySource`].
pub struct WidevineKeySourceBuilder {
    server_url: String,
    add_common_system_info: bool,
    signer: Option<Box<dyn RequestSigner>>,
    fetcher: Option<Box<dyn KeyFetcher>>,
    retry_policy: RetryPolicy,
    crypto_period_count: u32,
}

impl WidevineKeySourceBuilder {
    /// Also emit an aggregated common-system entry with every key, carrying
    /// the key ids of all tracks in the response.
    pub fn common_system_info(mut self, add: bool) -> Self {
        self.add_common_system_info = add;
        self
    }

    /// Sign requests with `signer`. Without one, the raw request body is
    /// sent unsigned; servers that enforce signing will reject it.
    pub fn signer(mut self, signer: Box<dyn RequestSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Replace the transport. Defaults to [`HttpKeyFetcher`].
    pub fn fetcher(mut self, fetcher: Box<dyn KeyFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Crypto periods per rotation window.
    pub fn crypto_period_count(mut self, count: u32) -> Self {
        self.crypto_period_count = count;
        self
    }

    pub fn build(self) -> Result<WidevineKeySource> {
        let fetcher = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Box::new(HttpKeyFetcher::new()?),
        };

        Ok(WidevineKeySource {
            server_url: self.server_url,
            add_common_system_info: self.add_common_system_info,
            signer: self.signer,
            fetcher,
            retry_policy: self.retry_policy,
            cache: KeyRotationCache::new(self.crypto_period_count),
            state: Mutex::new(SourceState::default()),
        })
    }
}

impl WidevineKeySource {
    pub fn builder(server_url: impl Into<String>) -> WidevineKeySourceBuilder {
        WidevineKeySourceBuilder {
            server_url: server_url.into(),
            add_common_system_info: false,
            signer: None,
            fetcher: None,
            retry_policy: RetryPolicy::default(),
            crypto_period_count: DEFAULT_CRYPTO_PERIOD_COUNT,
        }
    }

    /// Fetches keys for `content_id` under the named policy.
    ///
    /// Populates the non-rotation batch immediately and records the content
    /// id and policy so rotation windows can be fetched lazily through
    /// [`get_crypto_period_key`](Self::get_crypto_period_key).
    pub fn fetch_keys(&self, content_id: &[u8], policy: &str) -> Result<()> {
        let keys = self.fetch_internal(
            &AcquisitionRequest::ContentId { content_id, policy },
            None,
        )?;

        let mut state = self.state.lock().unwrap();
        state.batch = Some(batch_by_track(keys));
        state.rotation_params = Some((content_id.to_vec(), policy.to_owned()));
        Ok(())
    }

    /// Fetches keys for a complete `pssh` box. Single-shot, non-rotation.
    pub fn fetch_keys_with_pssh_box(&self, pssh_box: &[u8]) -> Result<()> {
        self.fetch_single_shot(&AcquisitionRequest::PsshBox(pssh_box))
    }

    /// Fetches keys for a bare pssh payload. Single-shot, non-rotation.
    pub fn fetch_keys_with_pssh_data(&self, pssh_data: &[u8]) -> Result<()> {
        self.fetch_single_shot(&AcquisitionRequest::PsshData(pssh_data))
    }

    /// Fetches keys for a set of raw key ids. Single-shot, non-rotation.
    pub fn fetch_keys_with_key_ids(&self, key_ids: &[Vec<u8>]) -> Result<()> {
        self.fetch_single_shot(&AcquisitionRequest::KeyIds(key_ids))
    }

    /// Fetches keys for a classic asset id. Single-shot, non-rotation; the
    /// returned keys carry no key ids or system info.
    pub fn fetch_keys_with_asset_id(&self, asset_id: u32) -> Result<()> {
        self.fetch_single_shot(&AcquisitionRequest::AssetId(asset_id))
    }

    /// Returns the batch key for `track_type`.
    pub fn get_key(&self, track_type: TrackType) -> Result<EncryptionKey> {
        let state = self.state.lock().unwrap();
        let Some(batch) = &state.batch else {
            return Err(Error::InvalidArgument(
                "no keys fetched yet; call a fetch_keys operation first".to_owned(),
            ));
        };

        batch
            .get(&track_type)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("no key for track {track_type}")))
    }

    /// Returns the rotation key for `crypto_period_index` and `track_type`,
    /// fetching further windows on demand.
    ///
    /// Needs a successful content-id [`fetch_keys`](Self::fetch_keys)
    /// first: rotation windows are requested with the recorded content id
    /// and policy.
    pub fn get_crypto_period_key(
        &self,
        crypto_period_index: u32,
        track_type: TrackType,
    ) -> Result<EncryptionKey> {
        let (content_id, policy) = {
            let state = self.state.lock().unwrap();
            if state.batch.is_none() {
                return Err(Error::InvalidArgument(
                    "no keys fetched yet; call fetch_keys first".to_owned(),
                ));
            }
            match &state.rotation_params {
                Some((content_id, policy)) => (content_id.clone(), policy.clone()),
                None => {
                    return Err(Error::InvalidArgument(
                        "key rotation needs a successful content-id fetch first".to_owned(),
                    ));
                }
            }
        };

        self.cache
            .get(crypto_period_index, track_type, |start, count| {
                self.fetch_internal(
                    &AcquisitionRequest::ContentId {
                        content_id: &content_id,
                        policy: &policy,
                    },
                    Some(RotationParams {
                        first_index: start,
                        period_count: count,
                    }),
                )
            })
    }

    fn fetch_single_shot(&self, acquisition: &AcquisitionRequest<'_>) -> Result<()> {
        let keys = self.fetch_internal(acquisition, None)?;

        let mut state = self.state.lock().unwrap();
        state.batch = Some(batch_by_track(keys));
        state.rotation_params = None;
        Ok(())
    }

    /// One acquisition: build the body once, then sign/send/parse per
    /// attempt until success, a fatal failure, or an exhausted retry
    /// budget. Nothing is cached here; callers commit on success.
    fn fetch_internal(
        &self,
        acquisition: &AcquisitionRequest<'_>,
        rotation: Option<RotationParams>,
    ) -> Result<Vec<FetchedKey>> {
        let body = request::build_request(acquisition, rotation)?;
        debug!("license request body: {body}");

        let max_attempts = self.retry_policy.max_attempts();
        let mut attempt = 1u32;

        loop {
            let message = self.generate_key_message(&body)?;

            let failure = match self.fetcher.fetch_keys(&self.server_url, &message) {
                Ok(raw) => match response::parse_response(&raw, self.add_common_system_info)? {
                    ServerReply::Keys(keys) => return Ok(keys),
                    ServerReply::Transient(status) => Error::Server(format!(
                        "license server reported transient status {status}"
                    )),
                },
                Err(e) if self.retry_policy.should_retry(&e) => e,
                Err(e) => return Err(e),
            };

            if attempt >= max_attempts {
                return Err(failure);
            }

            let delay = self.retry_policy.delay_after(attempt);
            warn!(
                "license fetch attempt {attempt}/{max_attempts} failed ({failure}), retrying in {delay:?}"
            );
            thread::sleep(delay);
            attempt += 1;
        }
    }

    /// Signs the request body when a signer is configured; the body goes
    /// out raw otherwise. The signer sees the exact serialized bytes.
    fn generate_key_message(&self, body: &str) -> Result<String> {
        match &self.signer {
            Some(signer) => {
                let signature = signer
                    .generate_signature(body.as_bytes())
                    .map_err(|e| Error::Internal(format!("Signature generation failed: {e}")))?;
                request::signed_message(body, &signature, signer.name())
            }
            None => Ok(body.to_owned()),
        }
    }
}

fn batch_by_track(keys: Vec<FetchedKey>) -> HashMap<TrackType, EncryptionKey> {
    keys.into_iter()
        .map(|fetched| (fetched.track_type, fetched.key))
        .collect()
}
