//! The pending import tree.
//!
//! A [`PendingImport`] tracks one document's dependency closure from
//! first scan to a settled outcome. It hands out batches of
//! [`ImportRequest`]s for the host to fetch, folds answered packages
//! back in (scanning their own imports as they arrive, in any order),
//! and settles either ready, with the flattened merge-ordered package
//! list, or failed, with the first error that poisoned the tree.
//!
//! A stash of already loaded packages can be supplied up front; a
//! request whose qualified name matches a stashed package is satisfied
//! without a fetch, and the stashed package's imports are re-scanned
//! under the current context. A tree whose whole closure comes out of
//! the stash settles ready synchronously.

use crate::error::Error;
use crate::import::{ImportRef, ImportRequest, is_acceptable_replacement};
use crate::ordering;
use crate::package::Package;
use crate::record::{ImportContext, ImportRecord, RecordDefaults};
use ahash::AHashMap;
use indexmap::IndexMap;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use vellum_core::Session;

/// Bookkeeping while the tree is still loading.
#[derive(Debug, Default)]
struct Books {
    /// Requests not yet handed to the host.
    requested: BTreeSet<ImportRequest>,
    /// Requests handed out and awaiting an answer.
    pending: BTreeSet<ImportRequest>,
    /// Answered packages, keyed by the reference they satisfy.
    loaded: AHashMap<ImportRef, Arc<Package>>,
    /// Importer name to the references it imports, in document order.
    dependencies: IndexMap<String, Vec<ImportRef>>,
    /// Every distinct request seen for a package name, for
    /// accept-pattern reuse.
    by_name: AHashMap<String, Vec<ImportRequest>>,
}

#[derive(Debug)]
struct Failure {
    error: Error,
    reference: Option<ImportRef>,
}

#[derive(Debug)]
enum State {
    Loading(Books),
    Ready(Vec<Arc<Package>>),
    Failed(Failure),
}

/// A document's import tree, from first scan to settled outcome.
pub struct PendingImport {
    session: Arc<Session>,
    context: Option<Arc<dyn ImportContext>>,
    stash: Vec<Arc<Package>>,
    root: Option<Arc<Package>>,
    state: State,
}

impl PendingImport {
    /// Start resolving the imports of `root`.
    ///
    /// The tree settles synchronously when the document has no imports
    /// or the stash covers all of them; otherwise it waits for the
    /// requested packages to be added.
    #[must_use]
    pub fn new(
        root: Arc<Package>,
        context: Option<Arc<dyn ImportContext>>,
        session: Arc<Session>,
        stash: Vec<Arc<Package>>,
    ) -> Self {
        let mut tree = Self {
            session,
            context,
            stash,
            root: Some(Arc::clone(&root)),
            state: State::Loading(Books::default()),
        };
        tree.scan_imports(&root);
        tree.update_status();
        tree
    }

    /// Start from a single request instead of a root document. The
    /// package answering the request becomes the root of the tree.
    #[must_use]
    pub fn for_request(
        request: ImportRequest,
        context: Option<Arc<dyn ImportContext>>,
        session: Arc<Session>,
        stash: Vec<Arc<Package>>,
    ) -> Self {
        let mut tree = Self {
            session,
            context,
            stash,
            root: None,
            state: State::Loading(Books::default()),
        };
        tree.register(None, request);
        tree.update_status();
        tree
    }

    /// The root document, once known.
    #[must_use]
    pub fn root(&self) -> Option<&Arc<Package>> {
        self.root.as_ref()
    }

    /// True while requests are outstanding.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        matches!(self.state, State::Loading(_))
    }

    /// True once every package is loaded and ordered.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.state, State::Ready(_))
    }

    /// True once the tree has failed.
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self.state, State::Failed(_))
    }

    /// The merge-ordered packages, root last.
    #[must_use]
    pub fn ordered(&self) -> Option<&[Arc<Package>]> {
        match &self.state {
            State::Ready(ordered) => Some(ordered),
            _ => None,
        }
    }

    /// Qualified names of the loaded packages in merge order, without
    /// the root document.
    #[must_use]
    pub fn loaded_names(&self) -> Vec<String> {
        self.ordered()
            .and_then(<[Arc<Package>]>::split_last)
            .map(|(_root, rest)| rest.iter().map(|package| package.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// The error that poisoned the tree.
    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            State::Failed(failure) => Some(&failure.error),
            _ => None,
        }
    }

    /// The reference whose processing failed, when one is known.
    #[must_use]
    pub fn failed_reference(&self) -> Option<&ImportRef> {
        match &self.state {
            State::Failed(failure) => failure.reference.as_ref(),
            _ => None,
        }
    }

    /// Drain the batch of requests the host should fetch next.
    ///
    /// Drained requests move to the pending set and stay there until
    /// [`add_package`](Self::add_package) answers them. Scanning an
    /// answered package can surface another batch.
    pub fn requested_packages(&mut self) -> Vec<ImportRequest> {
        match &mut self.state {
            State::Loading(books) => {
                let drained: Vec<ImportRequest> =
                    std::mem::take(&mut books.requested).into_iter().collect();
                books.pending.extend(drained.iter().cloned());
                drained
            }
            _ => Vec::new(),
        }
    }

    /// Answer a drained request with its package.
    ///
    /// Answers may arrive in any order. An answer for a request that
    /// is not pending is ignored.
    pub fn add_package(&mut self, request: &ImportRequest, package: Arc<Package>) {
        let accepted = match &mut self.state {
            State::Loading(books) => books.pending.remove(request),
            _ => false,
        };
        if !accepted {
            warn!(request = %request, "ignoring a package that was not requested");
            return;
        }

        if self.root.is_none() {
            self.root = Some(Arc::clone(&package));
        }
        if let State::Loading(books) = &mut self.state {
            books.loaded.insert(request.reference().clone(), Arc::clone(&package));
        }
        self.scan_imports(&package);
        if self.is_error() {
            // Attribute the failure to the package that introduced it.
            if let State::Failed(failure) = &mut self.state {
                if failure.reference.is_none() {
                    failure.reference = Some(request.reference().clone());
                }
            }
        }
        self.update_status();
    }

    /// Record a failure. The first failure decides the tree's error;
    /// later ones still reach the session console.
    pub(crate) fn fail(&mut self, error: Error, reference: Option<ImportRef>) {
        self.session.console(error.to_string());
        let mut cause = std::error::Error::source(&error);
        while let Some(inner) = cause {
            self.session.console(inner.to_string());
            cause = inner.source();
        }
        if matches!(self.state, State::Failed(_)) {
            return;
        }
        self.state = State::Failed(Failure { error, reference });
    }

    /// Walk a package's import records and register the requests they
    /// expand to.
    fn scan_imports(&mut self, package: &Arc<Package>) {
        if self.is_error() {
            return;
        }
        let Some(import) = package.import_value() else {
            return;
        };
        let Some(records) = import.as_array() else {
            self.fail(Error::ImportNotArray, None);
            return;
        };

        let importer = package.name().to_string();
        for value in records {
            let expanded = ImportRecord::from_value(value).and_then(|record| {
                record.expand(&RecordDefaults::default(), self.context.as_deref(), &self.session)
            });
            match expanded {
                Ok(Some(requests)) => {
                    for request in requests {
                        self.register(Some(&importer), request);
                        if self.is_error() {
                            return;
                        }
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    self.fail(error, None);
                    return;
                }
            }
        }
    }

    /// Fold one request into the books: reuse an earlier request when
    /// acceptable, record the dependency edge, satisfy from the stash,
    /// or queue it for the host.
    fn register(&mut self, importer: Option<&str>, request: ImportRequest) {
        let request = match &mut self.state {
            State::Loading(books) => {
                let seen = books
                    .by_name
                    .entry(request.reference().name().to_string())
                    .or_default();
                let request = match seen
                    .iter()
                    .find(|existing| is_acceptable_replacement(existing.reference(), request.reference()))
                {
                    Some(existing) => existing.clone(),
                    None => {
                        seen.push(request.clone());
                        request
                    }
                };

                if let Some(importer) = importer {
                    books
                        .dependencies
                        .entry(importer.to_string())
                        .or_default()
                        .push(request.reference().clone());
                }

                if books.requested.contains(&request)
                    || books.pending.contains(&request)
                    || books.loaded.contains_key(request.reference())
                {
                    return;
                }
                request
            }
            _ => return,
        };

        let qualified = request.reference().qualified_name();
        if let Some(stashed) = self
            .stash
            .iter()
            .find(|package| package.name() == qualified)
            .cloned()
        {
            debug!(package = %qualified, "import satisfied from the stash");
            if let State::Loading(books) = &mut self.state {
                books.loaded.insert(request.reference().clone(), Arc::clone(&stashed));
            }
            if self.root.is_none() {
                self.root = Some(Arc::clone(&stashed));
            }
            // Re-scan under the current context; a stashed package can
            // still pull in a dependency it did not need before.
            self.scan_imports(&stashed);
            return;
        }

        if let State::Loading(books) = &mut self.state {
            books.requested.insert(request);
        }
    }

    /// Settle the tree once nothing is requested or pending.
    fn update_status(&mut self) {
        let result = match &self.state {
            State::Loading(books) if books.requested.is_empty() && books.pending.is_empty() => {
                let Some(root) = &self.root else { return };
                ordering::order_packages(root, &books.dependencies, &books.loaded)
            }
            _ => return,
        };
        match result {
            Ok(ordered) => {
                debug!(packages = ordered.len(), "import tree is ready");
                self.state = State::Ready(ordered);
            }
            Err(failure) => {
                self.session.console(failure.error.to_string());
                self.fail(Error::OrderingFailed, failure.reference);
            }
        }
    }
}

impl fmt::Debug for PendingImport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.state {
            State::Loading(_) => "loading",
            State::Ready(_) => "ready",
            State::Failed(_) => "failed",
        };
        f.debug_struct("PendingImport")
            .field("root", &self.root.as_ref().map(|package| package.name()))
            .field("state", &state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    fn payload(import: Value) -> Value {
        json!({"type": "vellum", "version": "1.0", "import": import})
    }

    fn root(import: Value) -> Arc<Package> {
        Arc::new(Package::new("main", payload(import)).unwrap())
    }

    fn tree(import: Value) -> PendingImport {
        PendingImport::new(root(import), None, Arc::new(Session::new()), Vec::new())
    }

    fn answer(tree: &mut PendingImport, request: &ImportRequest, import: Value) {
        let package =
            Package::new(request.reference().qualified_name(), payload(import)).unwrap();
        tree.add_package(request, Arc::new(package));
    }

    fn requested_names(requests: &[ImportRequest]) -> Vec<String> {
        requests
            .iter()
            .map(|request| request.reference().qualified_name())
            .collect()
    }

    #[test]
    fn no_imports_is_ready_synchronously() {
        let tree = tree(json!([]));
        assert!(tree.is_ready());
        assert!(tree.loaded_names().is_empty());
        assert_eq!(tree.ordered().unwrap().len(), 1);
    }

    #[test]
    fn single_import_round_trip() {
        let mut tree = tree(json!([{"name": "A", "version": "1.0"}]));
        assert!(tree.is_waiting());

        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["A:1.0"]);

        answer(&mut tree, &requests[0], json!([]));
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["A:1.0"]);
    }

    #[test]
    fn transitive_imports_surface_in_waves() {
        let mut tree = tree(json!([{"name": "A", "version": "1.0"}]));
        let first = tree.requested_packages();
        answer(&mut tree, &first[0], json!([{"name": "B", "version": "1.0"}]));
        assert!(tree.is_waiting());

        let second = tree.requested_packages();
        assert_eq!(requested_names(&second), ["B:1.0"]);
        answer(&mut tree, &second[0], json!([]));

        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["B:1.0", "A:1.0"]);
    }

    #[test]
    fn shared_import_is_fetched_once() {
        let mut tree = tree(json!([
            {"name": "A", "version": "1.0"},
            {"name": "B", "version": "1.0"}
        ]));
        let first = tree.requested_packages();
        assert_eq!(first.len(), 2);
        answer(&mut tree, &first[0], json!([{"name": "C", "version": "1.0"}]));
        answer(&mut tree, &first[1], json!([{"name": "C", "version": "1.0"}]));

        let second = tree.requested_packages();
        assert_eq!(requested_names(&second), ["C:1.0"]);
        answer(&mut tree, &second[0], json!([]));

        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["C:1.0", "A:1.0", "B:1.0"]);
    }

    #[test]
    fn answers_in_any_order() {
        let mut tree = tree(json!([
            {"name": "A", "version": "1.0"},
            {"name": "B", "version": "1.0"}
        ]));
        let requests = tree.requested_packages();
        answer(&mut tree, &requests[1], json!([]));
        assert!(tree.is_waiting());
        answer(&mut tree, &requests[0], json!([]));
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["A:1.0", "B:1.0"]);
    }

    #[test]
    fn repeated_import_collapses_to_the_first_request() {
        let mut tree = tree(json!([
            {"name": "B", "version": "1.0", "source": "custom/B.json"},
            {"name": "B", "version": "1.0"}
        ]));
        let requests = tree.requested_packages();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].source(), "custom/B.json");

        answer(&mut tree, &requests[0], json!([]));
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["B:1.0"]);
    }

    #[test]
    fn accept_pattern_reuses_a_requested_version() {
        let mut tree = tree(json!([
            {"name": "A", "version": "1.2"},
            {"name": "A", "version": "1.0", "accept": ">=1.1"}
        ]));
        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["A:1.2"]);

        answer(&mut tree, &requests[0], json!([]));
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["A:1.2"]);
    }

    #[test]
    fn accept_pattern_matches_an_already_loaded_version() {
        let mut tree = tree(json!([
            {"name": "A", "version": "1.2"},
            {"name": "B", "version": "1.2"}
        ]));
        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["A:1.2", "B:1.2"]);

        answer(&mut tree, &requests[1], json!([]));
        assert!(tree.is_waiting());
        // A wants a newer B but accepts the one that already arrived.
        answer(
            &mut tree,
            &requests[0],
            json!([{"name": "B", "version": "1.3", "accept": ">1.0"}]),
        );
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["B:1.2", "A:1.2"]);
    }

    #[test]
    fn accept_pattern_outside_the_range_requests_both() {
        let mut tree = tree(json!([
            {"name": "A", "version": "1.2"},
            {"name": "A", "version": "2.0", "accept": ">=2.0"}
        ]));
        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["A:1.2", "A:2.0"]);
    }

    #[test]
    fn import_property_must_be_an_array() {
        let tree = tree(json!("nope"));
        assert!(tree.is_error());
        assert_eq!(
            tree.error().unwrap().to_string(),
            "Document import property should be an array"
        );
    }

    #[test]
    fn guarded_import_is_skipped_without_a_context() {
        let mut tree = tree(json!([
            {"name": "conditional", "version": "1.0", "when": "${wide}"},
            {"name": "base", "version": "1.0"}
        ]));
        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["base:1.0"]);
    }

    #[test]
    fn guarded_import_follows_the_context() {
        let context: Arc<dyn ImportContext> = Arc::new(|expression: &str| expression == "${wide}");
        let mut tree = PendingImport::new(
            root(json!([
                {"name": "conditional", "version": "1.0", "when": "${wide}"},
                {"name": "base", "version": "1.0"}
            ])),
            Some(context),
            Arc::new(Session::new()),
            Vec::new(),
        );
        let requests = tree.requested_packages();
        assert_eq!(
            requested_names(&requests),
            ["base:1.0", "conditional:1.0"]
        );
    }

    #[test]
    fn load_after_orders_the_result() {
        let mut tree = tree(json!([
            {"name": "conditional", "version": "1.2", "loadAfter": "dbasic"},
            {"name": "dbasic", "version": "1.2"}
        ]));
        let requests = tree.requested_packages();
        for request in &requests {
            answer(&mut tree, request, json!([]));
        }
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["dbasic:1.2", "conditional:1.2"]);
    }

    #[test]
    fn missing_load_after_name_fails_with_both_messages() {
        let session = Arc::new(Session::new());
        let mut tree = PendingImport::new(
            root(json!([{"name": "salad", "version": "1.0", "loadAfter": "potatoes"}])),
            None,
            Arc::clone(&session),
            Vec::new(),
        );
        let requests = tree.requested_packages();
        answer(&mut tree, &requests[0], json!([]));

        assert!(tree.is_error());
        assert!(session.has_message("Required loadAfter package not available potatoes for salad"));
        assert!(session.has_message("Failure to order packages"));
        assert_eq!(tree.error().unwrap().to_string(), "Failure to order packages");
        assert_eq!(tree.failed_reference().unwrap().qualified_name(), "salad:1.0");
    }

    #[test]
    fn import_cycle_fails() {
        let session = Arc::new(Session::new());
        let mut tree = PendingImport::new(
            root(json!([{"name": "A", "version": "1.0"}])),
            None,
            Arc::clone(&session),
            Vec::new(),
        );
        let first = tree.requested_packages();
        answer(&mut tree, &first[0], json!([{"name": "B", "version": "1.0"}]));
        let second = tree.requested_packages();
        answer(&mut tree, &second[0], json!([{"name": "A", "version": "1.0"}]));

        assert!(tree.is_error());
        assert!(session.has_message("Circular package dependency 'A'"));
    }

    #[test]
    fn malformed_record_in_a_fetched_package_is_attributed() {
        let mut tree = tree(json!([{"name": "A", "version": "1.0"}]));
        let requests = tree.requested_packages();
        answer(&mut tree, &requests[0], json!([{}]));

        assert!(tree.is_error());
        assert_eq!(
            tree.error().unwrap().to_string(),
            "Malformed package import record"
        );
        assert_eq!(tree.failed_reference().unwrap().qualified_name(), "A:1.0");
    }

    #[test]
    fn first_failure_wins() {
        let session = Arc::new(Session::new());
        let mut tree = PendingImport::new(
            root(json!([
                {"name": "A", "version": "1.0"},
                {"name": "B", "version": "1.0"}
            ])),
            None,
            Arc::clone(&session),
            Vec::new(),
        );
        let _requests = tree.requested_packages();
        tree.fail(
            Error::LoadFailed {
                name: "A:1.0".into(),
                message: "not found".into(),
                code: 404,
            },
            None,
        );
        tree.fail(
            Error::LoadFailed {
                name: "B:1.0".into(),
                message: "timeout".into(),
                code: 408,
            },
            None,
        );

        assert!(tree.error().unwrap().to_string().contains("A:1.0"));
        assert!(session.has_message("not found"));
        assert!(session.has_message("timeout"));
    }

    #[test]
    fn unsolicited_answer_is_ignored() {
        let session = Arc::new(Session::new());
        let mut tree = PendingImport::new(
            root(json!([{"name": "A", "version": "1.0"}])),
            None,
            Arc::clone(&session),
            Vec::new(),
        );
        let _requests = tree.requested_packages();

        let foreign = ImportRequest::new(&session, ImportRef::new("Z", "9.9"));
        let package = Package::new("Z:9.9", payload(json!([]))).unwrap();
        tree.add_package(&foreign, Arc::new(package));

        assert!(tree.is_waiting());
    }

    #[test]
    fn stash_satisfies_imports_synchronously() {
        let mut first = tree(json!([{"name": "A", "version": "1.0"}]));
        let requests = first.requested_packages();
        answer(&mut first, &requests[0], json!([]));
        assert!(first.is_ready());

        let stash = first.ordered().unwrap().to_vec();
        let mut warmed = PendingImport::new(
            root(json!([{"name": "A", "version": "1.0"}])),
            None,
            Arc::new(Session::new()),
            stash,
        );
        assert!(warmed.is_ready());
        assert!(warmed.requested_packages().is_empty());
        assert_eq!(warmed.loaded_names(), ["A:1.0"]);
    }

    #[test]
    fn stashed_package_can_pull_in_a_new_dependency() {
        // First pass without a context: blue's guarded import is
        // skipped.
        let mut first = tree(json!([{"name": "blue", "version": "1.0"}]));
        let requests = first.requested_packages();
        answer(
            &mut first,
            &requests[0],
            json!([{"name": "deepblue", "version": "1.0", "when": "${pull}"}]),
        );
        assert!(first.is_ready());
        assert_eq!(first.loaded_names(), ["blue:1.0"]);

        // Second pass: blue comes from the stash, but its re-scan
        // under the new context needs deepblue.
        let context: Arc<dyn ImportContext> = Arc::new(|expression: &str| expression == "${pull}");
        let mut second = PendingImport::new(
            root(json!([{"name": "blue", "version": "1.0"}])),
            Some(context),
            Arc::new(Session::new()),
            first.ordered().unwrap().to_vec(),
        );
        assert!(second.is_waiting());

        let requests = second.requested_packages();
        assert_eq!(requested_names(&requests), ["deepblue:1.0"]);
        answer(&mut second, &requests[0], json!([]));

        assert!(second.is_ready());
        assert_eq!(second.loaded_names(), ["deepblue:1.0", "blue:1.0"]);
    }

    #[test]
    fn for_request_adopts_the_answer_as_root() {
        let session = Arc::new(Session::new());
        let request = ImportRequest::new(&session, ImportRef::new("A", "1.0"));
        let mut tree = PendingImport::for_request(request, None, session, Vec::new());
        assert!(tree.is_waiting());
        assert!(tree.root().is_none());

        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["A:1.0"]);
        answer(&mut tree, &requests[0], json!([{"name": "B", "version": "1.0"}]));

        assert_eq!(tree.root().unwrap().name(), "A:1.0");
        let second = tree.requested_packages();
        answer(&mut tree, &second[0], json!([]));
        assert!(tree.is_ready());
        assert_eq!(tree.loaded_names(), ["B:1.0"]);
    }

    #[test]
    fn one_of_fallback_flows_through_the_tree() {
        let context: Arc<dyn ImportContext> = Arc::new(|_: &str| false);
        let mut tree = PendingImport::new(
            root(json!([{
                "type": "oneOf",
                "version": "1.0",
                "items": [
                    {"name": "fancy", "when": "never"}
                ],
                "otherwise": [
                    {"name": "plain"}
                ]
            }])),
            Some(context),
            Arc::new(Session::new()),
            Vec::new(),
        );
        let requests = tree.requested_packages();
        assert_eq!(requested_names(&requests), ["plain:1.0"]);
    }
}
