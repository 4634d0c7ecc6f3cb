//! Error types for import resolution.
//!
//! Most of these surface to document authors through the session
//! console. The console strings are author-visible output; embedders
//! and test harnesses match on them verbatim, so they are fixed even
//! where they read differently from ordinary Rust error messages.

use thiserror::Error;

/// Errors that can occur while resolving a document's imports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The document's `import` property is not a JSON array.
    #[error("Document import property should be an array")]
    ImportNotArray,

    /// An import record is not an object, or carries a wrongly typed
    /// field.
    #[error("Invalid import record in document")]
    InvalidImportRecord,

    /// An import record expanded to a reference with no usable name
    /// and version, or one that lists itself in `loadAfter`.
    #[error("Malformed package import record")]
    MalformedImportRecord,

    /// A selector record has no `items` array.
    #[error("Missing items field for the {selector} import")]
    MissingItems {
        /// Selector type, `oneOf` or `allOf`.
        selector: &'static str,
    },

    /// No `oneOf` item applied and the `otherwise` records could not
    /// all be applied in its place.
    #[error("Otherwise imports failed")]
    OtherwiseFailed {
        /// The failure that stopped the `otherwise` records, if any.
        #[source]
        source: Option<Box<Error>>,
    },

    /// Dependency ordering failed; the specific cause was reported
    /// separately.
    #[error("Failure to order packages")]
    OrderingFailed,

    /// A `loadAfter` name never became available among the loaded
    /// packages.
    #[error("Required loadAfter package not available {dependency} for {requester}")]
    LoadAfterUnavailable {
        /// Name the requester wants merged before itself.
        dependency: String,
        /// Name of the package that declared the `loadAfter`.
        requester: String,
    },

    /// Two packages each declare `loadAfter` on the other.
    #[error("Circular package loadAfter dependency between {first} and {second}")]
    LoadAfterCycle {
        /// The package whose deferral detected the cycle.
        first: String,
        /// The package it was waiting for.
        second: String,
    },

    /// A `loadAfter` cycle across three or more packages.
    #[error("Circular package loadAfter dependency chain")]
    LoadAfterChain,

    /// A package's imports lead back to a package currently being
    /// placed.
    #[error("Circular package dependency '{name}'")]
    CircularImport {
        /// Name of the reference that closed the cycle.
        name: String,
    },

    /// Ordering reached a reference with no loaded package. Indicates
    /// a bookkeeping hole rather than an authoring mistake.
    #[error("Package '{reference}' was never loaded")]
    PackageNotLoaded {
        /// Qualified `name:version` of the missing package.
        reference: String,
    },

    /// A fetched payload is not a valid package document.
    #[error("Package '{name}' is invalid: {reason}")]
    InvalidPackage {
        /// Qualified `name:version` of the offending package.
        name: String,
        /// What was wrong with the payload.
        reason: String,
    },

    /// The host reported that a package could not be fetched.
    #[error("Package '{name}' failed to load: {message} (code {code})")]
    LoadFailed {
        /// Qualified `name:version` of the failed package.
        name: String,
        /// Host-supplied failure message.
        message: String,
        /// Host-supplied failure code.
        code: i32,
    },

    /// A payload could not be parsed as JSON.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error bubbled up from the core types.
    #[error(transparent)]
    Core(#[from] vellum_core::Error),
}

impl Error {
    /// Build an [`Error::InvalidPackage`].
    pub fn invalid_package(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPackage {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Build an [`Error::OtherwiseFailed`], wrapping the error that
    /// stopped the fallback records if there was one.
    #[must_use]
    pub fn otherwise_failed(source: Option<Error>) -> Self {
        Self::OtherwiseFailed {
            source: source.map(Box::new),
        }
    }
}

/// Convenience alias for resolver results.
pub type Result<T> = std::result::Result<T, Error>;
