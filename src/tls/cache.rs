//! Process-wide security-context cache.
//!
//! Maps a [`TlsFingerprint`] (value snapshot of a [`TlsConfig`]) to an
//! `Arc<SecurityContext>`. Guarantees at-most-one construction per
//! fingerprint even when many client instances resolve the same
//! configuration concurrently: same-key callers serialize on a per-entry
//! once-cell and all observe the identical `Arc`, while different keys
//! construct fully in parallel.
//!
//! The outer map lock is held only to look up or insert the entry cell,
//! never across context construction.
//!
//! There is no eviction. The key space is the set of distinct security
//! configurations in one process, which is small and fixed by deployment
//! topology, so entries simply live for the process lifetime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use once_cell::sync::OnceCell;

use crate::config::{TlsConfig, TlsFingerprint};
use crate::error::Result;
use crate::tls::SecurityContext;

type Entry = Arc<OnceCell<Arc<SecurityContext>>>;

/// Concurrent fingerprint → context cache with at-most-one construction
/// per fingerprint.
#[derive(Default)]
pub struct SecurityContextCache {
    entries: Mutex<HashMap<TlsFingerprint, Entry>>,
}

impl SecurityContextCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the context for `tls`, building it first if no entry exists
    /// for its fingerprint.
    ///
    /// The fingerprint is computed once, here, from the current field
    /// values; mutating `tls` afterwards neither moves nor invalidates the
    /// entry installed by this call.
    ///
    /// On a build failure the error propagates and no context is installed:
    /// the fingerprint's slot stays uninitialized (invisible to
    /// [`contains`](Self::contains) and [`len`](Self::len)) and a later
    /// call for the same fingerprint retries the build in place. The slot
    /// is never removed, so a failure can never detach a concurrent
    /// caller's in-progress success from the map.
    pub fn get_or_build(&self, tls: &TlsConfig) -> Result<Arc<SecurityContext>> {
        self.get_or_build_with(tls.fingerprint(), || SecurityContext::build(tls))
    }

    /// Same as [`get_or_build`](Self::get_or_build) with an explicit build
    /// function. Used by tests to count constructions.
    pub(crate) fn get_or_build_with<F>(
        &self,
        fingerprint: TlsFingerprint,
        build: F,
    ) -> Result<Arc<SecurityContext>>
    where
        F: FnOnce() -> Result<SecurityContext>,
    {
        let cell = {
            let mut entries = self.lock_entries();
            entries.entry(fingerprint.clone()).or_default().clone()
        };

        match cell.get_or_try_init(|| build().map(Arc::new)) {
            Ok(context) => {
                tracing::debug!(?fingerprint, "security context resolved from cache");
                Ok(context.clone())
            }
            // The cell stays in the map uninitialized; the next caller for
            // this fingerprint retries through get_or_try_init.
            Err(e) => Err(e),
        }
    }

    /// Whether an entry exists for the current fingerprint of `tls`.
    pub fn contains(&self, tls: &TlsConfig) -> bool {
        self.contains_fingerprint(&tls.fingerprint())
    }

    /// Whether an initialized entry exists for `fingerprint`.
    pub fn contains_fingerprint(&self, fingerprint: &TlsFingerprint) -> bool {
        self.lock_entries()
            .get(fingerprint)
            .is_some_and(|cell| cell.get().is_some())
    }

    /// Number of initialized entries.
    pub fn len(&self) -> usize {
        self.lock_entries()
            .values()
            .filter(|cell| cell.get().is_some())
            .count()
    }

    /// Whether the cache holds no initialized entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<TlsFingerprint, Entry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The process-wide cache used by channel construction.
pub fn global_context_cache() -> &'static SecurityContextCache {
    static CACHE: OnceLock<SecurityContextCache> = OnceLock::new();
    CACHE.get_or_init(SecurityContextCache::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QuerywireError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn test_context() -> Result<SecurityContext> {
        SecurityContext::build(&TlsConfig::new())
    }

    #[test]
    fn test_equal_configs_share_one_context() {
        let cache = SecurityContextCache::new();

        let a = TlsConfig::new().with_provider("ring");
        let b = TlsConfig::new().with_provider("ring");

        let ctx_a = cache.get_or_build(&a).unwrap();
        let ctx_b = cache.get_or_build(&b).unwrap();

        // Distinct config instances, identical fields: same Arc identity.
        assert!(Arc::ptr_eq(&ctx_a, &ctx_b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_configs_get_distinct_entries() {
        let cache = SecurityContextCache::new();

        let a = TlsConfig::new();
        let b = TlsConfig::new().with_provider("aws-lc");

        let ctx_a = cache.get_or_build(&a).unwrap();
        let ctx_b = cache.get_or_build(&b).unwrap();

        assert!(!Arc::ptr_eq(&ctx_a, &ctx_b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_concurrent_same_fingerprint_builds_once() {
        const THREADS: usize = 16;

        let cache = Arc::new(SecurityContextCache::new());
        let builds = Arc::new(AtomicUsize::new(0));
        let fingerprint = TlsConfig::new().fingerprint();

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = cache.clone();
                let builds = builds.clone();
                let fingerprint = fingerprint.clone();
                std::thread::spawn(move || {
                    cache
                        .get_or_build_with(fingerprint, || {
                            builds.fetch_add(1, Ordering::SeqCst);
                            test_context()
                        })
                        .unwrap()
                })
            })
            .collect();

        let contexts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(builds.load(Ordering::SeqCst), 1);
        for ctx in &contexts[1..] {
            assert!(Arc::ptr_eq(&contexts[0], ctx));
        }
    }

    #[test]
    fn test_mutation_after_caching_leaves_entry_untouched() {
        let cache = SecurityContextCache::new();

        let mut config = TlsConfig::new();
        let original_fingerprint = config.fingerprint();
        let original = cache.get_or_build(&config).unwrap();

        // Owner mutates the config in place after the entry is installed.
        config.provider = Some("aws-lc".to_string());

        assert!(cache.contains_fingerprint(&original_fingerprint));
        assert_eq!(cache.len(), 1);

        // The mutated config resolves to a new entry; the old one survives
        // and still hands out the original context.
        let rebuilt = cache.get_or_build(&config).unwrap();
        assert!(!Arc::ptr_eq(&original, &rebuilt));
        assert_eq!(cache.len(), 2);

        let original_again = cache
            .get_or_build_with(original_fingerprint, || {
                panic!("cached entry must not be rebuilt")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&original, &original_again));
    }

    #[test]
    fn test_failed_build_installs_no_entry() {
        let cache = SecurityContextCache::new();
        let fingerprint = TlsConfig::new().fingerprint();

        let err = cache
            .get_or_build_with(fingerprint.clone(), || {
                Err(QuerywireError::SecurityMaterial("bad key material".into()))
            })
            .unwrap_err();
        assert!(matches!(err, QuerywireError::SecurityMaterial(_)));
        assert!(!cache.contains_fingerprint(&fingerprint));
        assert!(cache.is_empty());

        // A later well-formed attempt for the same fingerprint succeeds.
        let ctx = cache.get_or_build_with(fingerprint.clone(), test_context).unwrap();
        assert!(cache.contains_fingerprint(&fingerprint));
        drop(ctx);
    }

    #[test]
    fn test_failure_does_not_detach_concurrent_success() {
        use std::sync::mpsc;

        let cache = Arc::new(SecurityContextCache::new());
        let fingerprint = TlsConfig::new().fingerprint();

        // Loser fails its build while the winner is already queued on the
        // same entry; the winner's context must still land in the map.
        let (loser_entered_tx, loser_entered_rx) = mpsc::channel::<()>();
        let (loser_go_tx, loser_go_rx) = mpsc::channel::<()>();
        let loser = {
            let cache = cache.clone();
            let fingerprint = fingerprint.clone();
            std::thread::spawn(move || {
                cache.get_or_build_with(fingerprint, || {
                    loser_entered_tx.send(()).unwrap();
                    loser_go_rx.recv().unwrap();
                    Err(QuerywireError::SecurityMaterial("bad key material".into()))
                })
            })
        };
        loser_entered_rx.recv().unwrap();

        let (winner_go_tx, winner_go_rx) = mpsc::channel::<()>();
        let winner = {
            let cache = cache.clone();
            let fingerprint = fingerprint.clone();
            std::thread::spawn(move || {
                cache.get_or_build_with(fingerprint, || {
                    winner_go_rx.recv().unwrap();
                    test_context()
                })
            })
        };

        // Let the loser fail and fully return before the winner's build
        // completes.
        loser_go_tx.send(()).unwrap();
        assert!(loser.join().unwrap().is_err());
        winner_go_tx.send(()).unwrap();
        let winner_ctx = winner.join().unwrap().unwrap();

        // The winner's entry survives the loser's failure: a later caller
        // for the same fingerprint sees it without rebuilding.
        assert_eq!(cache.len(), 1);
        let later = cache
            .get_or_build_with(fingerprint, || {
                panic!("cached entry must not be rebuilt")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&winner_ctx, &later));
    }

    #[test]
    fn test_global_cache_is_shared() {
        assert!(std::ptr::eq(global_context_cache(), global_context_cache()));
    }
}
