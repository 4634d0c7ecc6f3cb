//! Host boundary for fetching packages.

use crate::resolver::PackageRequest;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Fetches package payloads on behalf of the resolver.
///
/// The resolver hands each outstanding fetch to the manager and walks
/// away; the manager answers whenever it likes through the request
/// itself. Answers may arrive synchronously, from inside
/// `load_package`, or long after it returned.
pub trait PackageManager: Send + Sync {
    /// Take ownership of one fetch.
    fn load_package(&self, request: PackageRequest);
}

impl<T: PackageManager + ?Sized> PackageManager for Arc<T> {
    fn load_package(&self, request: PackageRequest) {
        (**self).load_package(request);
    }
}

/// An in-memory [`PackageManager`] for tests and tools.
///
/// Requests for seeded payloads are answered synchronously; everything
/// else is parked until answered by hand.
#[derive(Debug, Default)]
pub struct MemoryPackageManager {
    store: Mutex<AHashMap<String, String>>,
    parked: Mutex<Vec<PackageRequest>>,
    resolved: AtomicUsize,
}

impl MemoryPackageManager {
    /// An empty manager; every request parks until seeded or answered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the payload served for a qualified `name:version`.
    pub fn put(&self, qualified: impl Into<String>, payload: impl Into<String>) {
        self.store.lock().insert(qualified.into(), payload.into());
    }

    /// Number of requests answered successfully so far.
    #[must_use]
    pub fn resolved_count(&self) -> usize {
        self.resolved.load(Ordering::Relaxed)
    }

    /// Number of parked requests.
    #[must_use]
    pub fn unresolved(&self) -> usize {
        self.parked.lock().len()
    }

    /// Qualified names of the parked requests, in arrival order.
    #[must_use]
    pub fn unresolved_names(&self) -> Vec<String> {
        self.parked
            .lock()
            .iter()
            .map(|request| request.request().reference().qualified_name())
            .collect()
    }

    /// Take every parked request. Dropping one makes its import
    /// permanently unanswerable.
    #[must_use]
    pub fn take_parked(&self) -> Vec<PackageRequest> {
        std::mem::take(&mut *self.parked.lock())
    }

    /// Answer the parked request for `qualified` with `payload`.
    /// Returns false when no such request is parked.
    pub fn succeed(&self, qualified: &str, payload: &str) -> bool {
        let Some(request) = self.take_named(qualified) else {
            return false;
        };
        self.resolved.fetch_add(1, Ordering::Relaxed);
        request.succeed(payload);
        true
    }

    /// Fail the parked request for `qualified`. Returns false when no
    /// such request is parked.
    pub fn fail(&self, qualified: &str, message: &str, code: i32) -> bool {
        let Some(request) = self.take_named(qualified) else {
            return false;
        };
        request.fail(message, code);
        true
    }

    fn take_named(&self, qualified: &str) -> Option<PackageRequest> {
        let mut parked = self.parked.lock();
        let index = parked
            .iter()
            .position(|request| request.request().reference().qualified_name() == qualified)?;
        Some(parked.remove(index))
    }
}

impl PackageManager for MemoryPackageManager {
    fn load_package(&self, request: PackageRequest) {
        // The store lock must not be held while answering: a
        // synchronous answer re-enters the resolver, which may call
        // straight back into load_package.
        let payload = self
            .store
            .lock()
            .get(&request.request().reference().qualified_name())
            .cloned();
        match payload {
            Some(payload) => {
                self.resolved.fetch_add(1, Ordering::Relaxed);
                request.succeed(&payload);
            }
            None => self.parked.lock().push(request),
        }
    }
}
