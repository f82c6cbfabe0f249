//! Rolling cache of key-rotation keys.

use crate::key::{EncryptionKey, TrackType};
use crate::response::FetchedKey;
use crate::{Error, Result};
use log::debug;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex};

/// Cache of keys per `(crypto period index, track type)`.
///
/// Windows of `period_count` consecutive periods are fetched on demand
/// through the closure handed to [`KeyRotationCache::get`]. The first
/// window starts one period before the requested index (the server expects
/// that offset); each later window starts right after the previous one.
///
/// While a window fetch is in flight, other callers missing the same window
/// wait on a condition instead of fetching it again, so at most one fetch
/// per window is ever outstanding. Committing a window advances the floor
/// and drops everything older than the previous window, bounding the cache
/// to two windows per track type.
pub(crate) struct KeyRotationCache {
    period_count: u32,
    inner: Mutex<CacheInner>,
    fetch_done: Condvar,
}

struct CacheInner {
    /// Lowest index still retained. Only ever increases.
    floor: u32,
    /// End (exclusive) of the highest fetched window; `None` before the
    /// first window fetch. Kept as u64 so the high-water mark never wraps.
    fetched_end: Option<u64>,
    fetch_in_flight: bool,
    keys: HashMap<(u32, TrackType), EncryptionKey>,
}

impl KeyRotationCache {
    pub fn new(period_count: u32) -> Self {
        Self {
            period_count: period_count.max(1),
            inner: Mutex::new(CacheInner {
                floor: 0,
                fetched_end: None,
                fetch_in_flight: false,
                keys: HashMap::new(),
            }),
            fetch_done: Condvar::new(),
        }
    }

    /// Point lookup, fetching windows as needed.
    ///
    /// `fetch_window(start, count)` performs the exchange for one window
    /// and runs with the cache lock released. A failed fetch mutates
    /// nothing and surfaces as-is.
    pub fn get<F>(&self, index: u32, track_type: TrackType, fetch_window: F) -> Result<EncryptionKey>
    where
        F: Fn(u32, u32) -> Result<Vec<FetchedKey>>,
    {
        let mut inner = self.inner.lock().unwrap();

        loop {
            if index < inner.floor {
                return Err(Error::InvalidArgument(format!(
                    "crypto period {index} is already evicted (floor is {})",
                    inner.floor
                )));
            }

            if let Some(end) = inner.fetched_end {
                if u64::from(index) < end {
                    return inner
                        .keys
                        .get(&(index, track_type))
                        .cloned()
                        .ok_or_else(|| {
                            Error::NotFound(format!(
                                "no key for track {track_type} in crypto period {index}"
                            ))
                        });
                }
            }

            if inner.fetch_in_flight {
                inner = self.fetch_done.wait(inner).unwrap();
                continue;
            }

            // The first window starts one period before the requested index.
            let start = match inner.fetched_end {
                Some(end) => end as u32,
                None => index.saturating_sub(1),
            };

            inner.fetch_in_flight = true;
            drop(inner);

            let fetched = fetch_window(start, self.period_count);

            inner = self.inner.lock().unwrap();
            inner.fetch_in_flight = false;
            self.fetch_done.notify_all();

            match fetched {
                Ok(keys) => inner.commit_window(start, self.period_count, keys),
                Err(e) => return Err(e),
            }
        }
    }
}

impl CacheInner {
    fn commit_window(&mut self, start: u32, count: u32, keys: Vec<FetchedKey>) {
        for fetched in keys {
            let Some(index) = fetched.crypto_period_index else {
                debug!("dropping rotation key without a crypto period index");
                continue;
            };
            self.keys.insert((index, fetched.track_type), fetched.key);
        }

        let end = u64::from(start) + u64::from(count);
        self.fetched_end = Some(self.fetched_end.unwrap_or(0).max(end));

        // Keep the previous window resident for stragglers; evict the rest.
        self.floor = self.floor.max(start.saturating_sub(count));
        let floor = self.floor;
        self.keys.retain(|(index, _), _| *index >= floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn window_keys(start: u32, count: u32) -> Vec<FetchedKey> {
        let mut keys = Vec::new();
        for index in start..start + count {
            for track_type in [TrackType::Sd, TrackType::Hd, TrackType::Audio] {
                keys.push(FetchedKey {
                    track_type,
                    crypto_period_index: Some(index),
                    key: EncryptionKey {
                        key: format!("key-{track_type}-{index}").into_bytes(),
                        key_id: Vec::new(),
                        key_system_info: Vec::new(),
                    },
                });
            }
        }
        keys
    }

    #[test]
    fn first_window_starts_one_period_early() {
        let cache = KeyRotationCache::new(10);
        let starts = Mutex::new(Vec::new());

        let key = cache
            .get(8, TrackType::Sd, |start, count| {
                starts.lock().unwrap().push(start);
                Ok(window_keys(start, count))
            })
            .unwrap();

        assert_eq!(key.key, b"key-SD-8");
        assert_eq!(*starts.lock().unwrap(), vec![7]);
    }

    #[test]
    fn windows_advance_consecutively_and_evict_old_periods() {
        let cache = KeyRotationCache::new(10);
        let fetches = AtomicU32::new(0);
        let fetch = |start: u32, count: u32| {
            fetches.fetch_add(1, Ordering::SeqCst);
            Ok(window_keys(start, count))
        };

        for index in [8, 17, 37, 38, 36, 39] {
            for track_type in [TrackType::Sd, TrackType::Hd, TrackType::Audio] {
                let key = cache.get(index, track_type, fetch).unwrap();
                assert_eq!(key.key, format!("key-{track_type}-{index}").into_bytes());
            }
        }

        // Windows [7,17), [17,27), [27,37), [37,47).
        assert_eq!(fetches.load(Ordering::SeqCst), 4);

        // Index 8 fell below the floor when the fourth window landed.
        let evicted = cache.get(8, TrackType::Sd, fetch).unwrap_err();
        assert!(matches!(evicted, Error::InvalidArgument(_)));
        assert_eq!(fetches.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn missing_track_inside_fetched_window_is_not_found() {
        let cache = KeyRotationCache::new(4);

        // The server only returned SD keys for this window.
        let err = cache
            .get(5, TrackType::Audio, |start, count| {
                Ok(window_keys(start, count)
                    .into_iter()
                    .filter(|key| key.track_type == TrackType::Sd)
                    .collect())
            })
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn failed_fetch_leaves_the_cache_usable() {
        let cache = KeyRotationCache::new(4);
        let err = cache
            .get(3, TrackType::Sd, |_, _| {
                Err(Error::TimeOut("license server did not answer".to_owned()))
            })
            .unwrap_err();
        assert!(matches!(err, Error::TimeOut(_)));

        let key = cache
            .get(3, TrackType::Sd, |start, count| Ok(window_keys(start, count)))
            .unwrap();
        assert_eq!(key.key, b"key-SD-3");
    }

    #[test]
    fn index_zero_window_starts_at_zero() {
        let cache = KeyRotationCache::new(4);
        let starts = Mutex::new(Vec::new());

        cache
            .get(0, TrackType::Sd, |start, count| {
                starts.lock().unwrap().push(start);
                Ok(window_keys(start, count))
            })
            .unwrap();

        assert_eq!(*starts.lock().unwrap(), vec![0]);
    }
}
