//! Import references and requests.
//!
//! An [`ImportRef`] is the coordinate a document uses to name a
//! package dependency. Its identity is the `(name, version)` pair
//! alone; the source URL, `loadAfter` list, and `accept` pattern
//! ride along without distinguishing one reference from another, so
//! two records naming the same coordinate collapse onto a single
//! fetch.

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use vellum_core::{SemanticPattern, SemanticVersion, Session};

/// Names a package asks to be merged after. Most records list zero or
/// one.
pub type LoadAfter = SmallVec<[String; 2]>;

/// A reference to an imported package.
#[derive(Debug, Clone)]
pub struct ImportRef {
    name: String,
    version: String,
    source: Option<String>,
    load_after: LoadAfter,
    semantic_version: Option<Arc<SemanticVersion>>,
    accept: Option<Arc<SemanticPattern>>,
}

impl ImportRef {
    /// Create a reference to `name` at `version`.
    ///
    /// The version is additionally parsed as a semantic version when
    /// it happens to be one; versions that do not parse are kept as
    /// opaque strings and only ever compared for exact equality.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        let version = version.into();
        let semantic_version = SemanticVersion::parse(&version).ok().map(Arc::new);
        Self {
            name: name.into(),
            version,
            source: None,
            load_after: LoadAfter::new(),
            semantic_version,
            accept: None,
        }
    }

    /// Attach a source URL for the host to fetch from.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attach the names this package must be merged after.
    #[must_use]
    pub fn with_load_after(mut self, load_after: impl IntoIterator<Item = String>) -> Self {
        self.load_after = load_after.into_iter().collect();
        self
    }

    /// Attach an accept pattern describing substitutable versions.
    #[must_use]
    pub fn with_accept(mut self, accept: Arc<SemanticPattern>) -> Self {
        self.accept = Some(accept);
        self
    }

    /// The package name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The requested version string, exactly as written.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The source URL, if the record supplied one.
    #[must_use]
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    /// Names this package must be merged after.
    #[must_use]
    pub fn load_after(&self) -> &[String] {
        &self.load_after
    }

    /// The parsed form of [`version`](Self::version), when it parses.
    #[must_use]
    pub fn semantic_version(&self) -> Option<&SemanticVersion> {
        self.semantic_version.as_deref()
    }

    /// The accept pattern, if the record supplied a valid one.
    #[must_use]
    pub fn accept(&self) -> Option<&SemanticPattern> {
        self.accept.as_deref()
    }

    /// The `name:version` form used to key loaded packages.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}:{}", self.name, self.version)
    }

    /// A reference is usable when it names something and does not ask
    /// to load after itself.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.name.is_empty() && self.version.is_empty() {
            return false;
        }
        !self.load_after.iter().any(|entry| *entry == self.name)
    }
}

// Identity is the (name, version) coordinate only.

impl PartialEq for ImportRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version
    }
}

impl Eq for ImportRef {}

impl Hash for ImportRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for ImportRef {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImportRef {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.name, &self.version).cmp(&(&other.name, &other.version))
    }
}

impl fmt::Display for ImportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Decide whether a package loaded for `candidate` also satisfies
/// `requirement`.
///
/// The names must match. When the candidate's version parses
/// semantically and the requirement carries an accept pattern, the
/// pattern decides; in every other case only the exact version string
/// will do.
#[must_use]
pub fn is_acceptable_replacement(candidate: &ImportRef, requirement: &ImportRef) -> bool {
    if candidate.name != requirement.name {
        return false;
    }
    match (candidate.semantic_version(), requirement.accept()) {
        (Some(version), Some(accept)) => accept.matches(Some(version)),
        _ => candidate.version == requirement.version,
    }
}

/// A single outstanding fetch for an [`ImportRef`].
///
/// Requests are ordered by reference and then by source so drained
/// batches come out deterministically; the id records the order in
/// which the session first saw them.
#[derive(Debug, Clone)]
pub struct ImportRequest {
    reference: ImportRef,
    source: String,
    id: u64,
}

impl ImportRequest {
    /// Wrap `reference` in a request, drawing a fresh id from the
    /// session.
    pub fn new(session: &Session, reference: ImportRef) -> Self {
        let source = reference.source().unwrap_or_default().to_string();
        Self {
            source,
            id: session.next_request_id(),
            reference,
        }
    }

    /// The reference being fetched.
    #[must_use]
    pub fn reference(&self) -> &ImportRef {
        &self.reference
    }

    /// The source URL to fetch from, or empty for the default
    /// location.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Session-unique id, assigned in request order.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for ImportRequest {
    fn eq(&self, other: &Self) -> bool {
        self.reference == other.reference && self.source == other.source
    }
}

impl Eq for ImportRequest {}

impl PartialOrd for ImportRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImportRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.reference
            .cmp(&other.reference)
            .then_with(|| self.source.cmp(&other.source))
    }
}

impl fmt::Display for ImportRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.source.is_empty() {
            write!(f, "{}", self.reference)
        } else {
            write!(f, "{} ({})", self.reference, self.source)
        }
    }
}
