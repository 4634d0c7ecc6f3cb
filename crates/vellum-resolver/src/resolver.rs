//! Driving a pending import tree to completion.
//!
//! [`PackageResolver`] sits between a [`PendingImport`] tree and the
//! host's [`PackageManager`]. It drains request batches from the tree,
//! hands them to the manager as [`PackageRequest`]s, folds answers
//! back in, and fires the host's callbacks exactly once when the tree
//! settles.
//!
//! One load is active at a time. Loading again replaces the previous
//! load: callbacks that never fired are dropped. Answers always apply
//! to the tree their request was issued for, so in-flight fetches keep
//! driving that tree when it is still the active one and are inert
//! when it has been abandoned.

use crate::error::Error;
use crate::import::{ImportRef, ImportRequest};
use crate::manager::PackageManager;
use crate::package::Package;
use crate::pending::PendingImport;
use parking_lot::Mutex;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::debug;
use vellum_core::from_json;

/// Fired with the merge-ordered packages, root last.
pub type SuccessCallback = Box<dyn FnOnce(Vec<Arc<Package>>) + Send>;

/// Fired with the failed reference when one is known, the console
/// message, and the host-supplied failure code (zero otherwise).
pub type FailureCallback = Box<dyn FnOnce(Option<&ImportRef>, &str, i32) + Send>;

struct ActiveLoad {
    pending: Arc<Mutex<PendingImport>>,
    on_success: Option<SuccessCallback>,
    on_failure: Option<FailureCallback>,
}

struct ResolverInner {
    manager: Mutex<Arc<dyn PackageManager>>,
    active: Mutex<Option<ActiveLoad>>,
}

/// Resolves pending import trees through a [`PackageManager`].
pub struct PackageResolver {
    inner: Arc<ResolverInner>,
}

impl PackageResolver {
    /// A resolver fetching through `manager`.
    #[must_use]
    pub fn new(manager: Arc<dyn PackageManager>) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                manager: Mutex::new(manager),
                active: Mutex::new(None),
            }),
        }
    }

    /// Swap the manager used for subsequent fetches. In-flight
    /// requests already handed to the old manager stay with it.
    pub fn set_manager(&self, manager: Arc<dyn PackageManager>) {
        *self.inner.manager.lock() = manager;
    }

    /// Drive `pending` to completion, firing one of the callbacks when
    /// it settles. A tree that is already settled fires immediately,
    /// so loading the same tree again re-delivers its outcome.
    ///
    /// This replaces any previous load; callbacks of the replaced load
    /// that have not fired are dropped without being called.
    pub fn load(
        &self,
        pending: Arc<Mutex<PendingImport>>,
        on_success: impl FnOnce(Vec<Arc<Package>>) + Send + 'static,
        on_failure: impl FnOnce(Option<&ImportRef>, &str, i32) + Send + 'static,
    ) {
        {
            let mut active = self.inner.active.lock();
            if active.is_some() {
                debug!("replacing the active load");
            }
            *active = Some(ActiveLoad {
                pending,
                on_success: Some(Box::new(on_success)),
                on_failure: Some(Box::new(on_failure)),
            });
        }
        self.inner.drive();
    }
}

impl fmt::Debug for PackageResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageResolver")
            .field("loading", &self.inner.active.lock().is_some())
            .finish_non_exhaustive()
    }
}

impl ResolverInner {
    /// Settle the active tree if it can settle, otherwise dispatch the
    /// next batch of requests, until neither makes progress.
    fn drive(self: &Arc<Self>) {
        loop {
            if self.settle() {
                return;
            }
            let Some(pending) = self.active_pending() else {
                return;
            };
            let batch = pending.lock().requested_packages();
            if batch.is_empty() {
                // Waiting on answers still out with the manager.
                return;
            }
            let manager = Arc::clone(&*self.manager.lock());
            for request in batch {
                debug!(request = %request, "requesting package");
                manager.load_package(PackageRequest {
                    resolver: Arc::downgrade(self),
                    pending: Arc::clone(&pending),
                    request,
                });
            }
        }
    }

    /// Fire callbacks if the active tree has settled. Returns false
    /// only while the tree is still loading.
    fn settle(&self) -> bool {
        let Some(pending) = self.active_pending() else {
            return true;
        };

        enum Outcome {
            Success(Vec<Arc<Package>>),
            Failure(Option<ImportRef>, String, i32),
        }
        let outcome = {
            let pending = pending.lock();
            if pending.is_ready() {
                Outcome::Success(pending.ordered().map(<[Arc<Package>]>::to_vec).unwrap_or_default())
            } else if pending.is_error() {
                let message = pending.error().map_or_else(String::new, error_message);
                let code = pending.error().map_or(0, error_code);
                Outcome::Failure(pending.failed_reference().cloned(), message, code)
            } else {
                return false;
            }
        };

        // Callbacks fire outside every lock; one of them may load
        // again, re-entering the resolver.
        let (on_success, on_failure) = {
            let mut active = self.active.lock();
            match active.as_mut() {
                Some(load) => (load.on_success.take(), load.on_failure.take()),
                None => return true,
            }
        };
        match outcome {
            Outcome::Success(ordered) => {
                if let Some(callback) = on_success {
                    debug!(packages = ordered.len(), "import resolution complete");
                    callback(ordered);
                }
            }
            Outcome::Failure(reference, message, code) => {
                if let Some(callback) = on_failure {
                    callback(reference.as_ref(), &message, code);
                }
            }
        }
        true
    }

    fn active_pending(&self) -> Option<Arc<Mutex<PendingImport>>> {
        self.active
            .lock()
            .as_ref()
            .map(|load| Arc::clone(&load.pending))
    }

    fn answer_success(
        self: &Arc<Self>,
        pending: &Arc<Mutex<PendingImport>>,
        request: &ImportRequest,
        payload: &str,
    ) {
        let parsed = from_json::<Value>(payload)
            .map_err(Error::from)
            .and_then(|json| {
                Package::new(request.reference().qualified_name(), json).map(Arc::new)
            });
        {
            let mut pending = pending.lock();
            if !pending.is_waiting() {
                debug!(request = %request, "ignoring an answer for a settled tree");
                return;
            }
            match parsed {
                Ok(package) => pending.add_package(request, package),
                Err(error) => pending.fail(error, Some(request.reference().clone())),
            }
        }
        self.drive();
    }

    fn answer_failure(
        self: &Arc<Self>,
        pending: &Arc<Mutex<PendingImport>>,
        request: &ImportRequest,
        message: &str,
        code: i32,
    ) {
        {
            let mut pending = pending.lock();
            if !pending.is_waiting() {
                debug!(request = %request, "ignoring a failure for a settled tree");
                return;
            }
            pending.fail(
                Error::LoadFailed {
                    name: request.reference().qualified_name(),
                    message: message.to_string(),
                    code,
                },
                Some(request.reference().clone()),
            );
        }
        self.drive();
    }
}

fn error_code(error: &Error) -> i32 {
    match error {
        Error::LoadFailed { code, .. } => *code,
        _ => 0,
    }
}

// A fetch failure hands the host's own message back; the wrapped form
// is console output.
fn error_message(error: &Error) -> String {
    match error {
        Error::LoadFailed { message, .. } => message.clone(),
        _ => error.to_string(),
    }
}

/// One fetch obligation handed to the host.
///
/// Consuming it with [`succeed`](Self::succeed) or
/// [`fail`](Self::fail) is the only way to answer, so every request is
/// answered at most once. The answer lands in the tree the request was
/// issued for even if another load has replaced it since.
pub struct PackageRequest {
    resolver: Weak<ResolverInner>,
    pending: Arc<Mutex<PendingImport>>,
    request: ImportRequest,
}

impl PackageRequest {
    /// The import being fetched.
    #[must_use]
    pub fn request(&self) -> &ImportRequest {
        &self.request
    }

    /// Answer with the package payload, a JSON document in text form.
    pub fn succeed(self, payload: &str) {
        let Some(resolver) = self.resolver.upgrade() else {
            return;
        };
        resolver.answer_success(&self.pending, &self.request, payload);
    }

    /// Report that the package could not be fetched.
    pub fn fail(self, message: &str, code: i32) {
        let Some(resolver) = self.resolver.upgrade() else {
            return;
        };
        resolver.answer_failure(&self.pending, &self.request, message, code);
    }
}

impl fmt::Debug for PackageRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageRequest")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}
