//! Concurrency tests for the shared role directory cache.

use role_guard::{
    auth_context::{ContextAuthenticator, SessionContext},
    cache::{DirectorySnapshot, RoleDirectoryCache},
    directory::{MemoryDirectory, RoleDirectory},
    error::Result,
    guard::Guard,
    requirement::Requirement,
    role::{Priority, Role},
};
use std::{
    sync::{
        Arc, Barrier, RwLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
    time::Duration,
};

/// Directory that counts fetches and sleeps to widen race windows.
struct SlowDirectory {
    inner: MemoryDirectory,
    fetches: AtomicUsize,
    delay: Duration,
}

impl SlowDirectory {
    fn new(inner: MemoryDirectory, delay: Duration) -> Self {
        Self {
            inner,
            fetches: AtomicUsize::new(0),
            delay,
        }
    }
}

impl RoleDirectory for SlowDirectory {
    fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
        self.inner.fetch_all_roles()
    }
}

#[test]
fn test_concurrent_misses_fetch_once() {
    let directory = Arc::new(SlowDirectory::new(
        MemoryDirectory::with_roles([("ADMIN", 0), ("VIEWER", 10)]),
        Duration::from_millis(50),
    ));
    let cache = Arc::new(RoleDirectoryCache::new(Arc::clone(&directory)));
    let barrier = Arc::new(Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.load_all_roles().unwrap().generation()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 1);
    }
    assert_eq!(directory.fetches.load(Ordering::SeqCst), 1);
}

/// Every snapshot observed must be one of the two consistent directory states.
fn assert_consistent(snapshot: &DirectorySnapshot) {
    let admin = snapshot.priority_of("ADMIN");
    let editor = snapshot.priority_of("EDITOR");
    let viewer = snapshot.priority_of("VIEWER");

    let before = (Some(Priority::new(0)), Some(Priority::new(5)), Some(Priority::new(10)));
    let after = (Some(Priority::new(1)), Some(Priority::new(6)), Some(Priority::new(11)));

    assert!(
        (admin, editor, viewer) == before || (admin, editor, viewer) == after,
        "torn snapshot: {admin:?} {editor:?} {viewer:?}"
    );
}

/// Directory whose whole contents are replaced in one step.
struct SwappableDirectory {
    roles: RwLock<Vec<Role>>,
}

impl RoleDirectory for SwappableDirectory {
    fn fetch_all_roles(&self) -> Result<Vec<Role>> {
        Ok(self.roles.read().unwrap().clone())
    }
}

#[test]
fn test_readers_never_observe_half_updated_directory() {
    let before = vec![Role::new("ADMIN", 0), Role::new("EDITOR", 5), Role::new("VIEWER", 10)];
    let after = vec![Role::new("ADMIN", 1), Role::new("EDITOR", 6), Role::new("VIEWER", 11)];

    let directory = Arc::new(SwappableDirectory {
        roles: RwLock::new(before.clone()),
    });
    let cache = Arc::new(RoleDirectoryCache::new(Arc::clone(&directory)));
    cache.load_all_roles().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut observed = 0usize;
                loop {
                    let snapshot = cache.load_all_roles().unwrap();
                    assert_consistent(&snapshot);
                    observed += 1;
                    if stop.load(Ordering::SeqCst) {
                        break observed;
                    }
                }
            })
        })
        .collect();

    let mut last_generation = 1;
    for round in 0..50 {
        let roles = if round % 2 == 0 { &after } else { &before };
        *directory.roles.write().unwrap() = roles.clone();

        // Alternate between explicit refresh and invalidate-then-load.
        let snapshot = if round % 3 == 0 {
            cache.refresh().unwrap()
        } else {
            cache.invalidate();
            cache.load_all_roles().unwrap()
        };
        assert_consistent(&snapshot);
        assert!(snapshot.generation() > last_generation);
        last_generation = snapshot.generation();
    }

    stop.store(true, Ordering::SeqCst);
    for reader in readers {
        assert!(reader.join().unwrap() > 0);
    }
}

#[test]
fn test_invalidation_during_fetch_discards_stale_result() {
    let directory = Arc::new(SlowDirectory::new(
        MemoryDirectory::with_roles([("VIEWER", 10)]),
        Duration::from_millis(100),
    ));
    let cache = Arc::new(RoleDirectoryCache::new(Arc::clone(&directory)));

    let loader = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.load_all_roles().unwrap())
    };

    // Invalidate while the slow fetch is in flight.
    while directory.fetches.load(Ordering::SeqCst) == 0 {
        thread::yield_now();
    }
    cache.invalidate();

    // The in-flight caller still gets its answer...
    let snapshot = loader.join().unwrap();
    assert!(snapshot.contains("VIEWER"));

    // ...but it is not installed, so the next load fetches again.
    assert!(cache.cached().is_none());
    cache.load_all_roles().unwrap();
    assert_eq!(directory.fetches.load(Ordering::SeqCst), 2);
}

#[test]
fn test_guards_share_one_cache_across_threads() {
    let directory = Arc::new(SlowDirectory::new(
        MemoryDirectory::with_roles([("ADMIN", 0), ("EDITOR", 5), ("VIEWER", 10)]),
        Duration::from_millis(10),
    ));
    let cache = Arc::new(RoleDirectoryCache::new(Arc::clone(&directory)));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let guard = Guard::new(
                Arc::clone(&cache),
                ContextAuthenticator::<SessionContext>::new(),
            );
            thread::spawn(move || {
                let role = if i % 2 == 0 { "EDITOR" } else { "VIEWER" };
                let caller = SessionContext::active(format!("user-{i}"), [role]);
                (0..100)
                    .filter(|_| {
                        guard
                            .authorize(&Requirement::new("EDITOR"), Some(&caller))
                            .is_ok()
                    })
                    .count()
            })
        })
        .collect();

    let allowed: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    for (i, count) in allowed.iter().enumerate() {
        assert_eq!(*count, if i % 2 == 0 { 100 } else { 0 });
    }

    assert_eq!(directory.fetches.load(Ordering::SeqCst), 1);
    let summary = cache.metrics().summary();
    assert_eq!(summary.checks, 800);
    assert_eq!(summary.allowed, 400);
    assert_eq!(summary.cache_hits + summary.cache_misses, 800);
}
