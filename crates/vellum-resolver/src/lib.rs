//! Package import resolution for the Vellum document engine.
//!
//! A Vellum document names the packages it depends on in its `import`
//! property. This crate turns that declaration into the flattened,
//! merge-ordered package list the document inflater consumes:
//!
//! - **Import records**: plain packages plus `oneOf` and `allOf`
//!   selectors with hoisted common fields, `otherwise` fallbacks, and
//!   `when` guards evaluated against a host [`ImportContext`].
//! - **Deduplication**: one fetch per `(name, version)` coordinate,
//!   and `accept` patterns let a request reuse an already requested
//!   version of the same package.
//! - **Ordering**: imports precede their importer, shared packages are
//!   placed once, and `loadAfter` reorders siblings, with circular
//!   dependencies reported to the session console.
//! - **Host plumbing**: a [`PackageManager`] trait owning the actual
//!   fetches, an in-memory implementation for tests, and a
//!   [`PackageResolver`] that drives a [`PendingImport`] tree to a
//!   single success or failure callback.
//!
//! # Example
//!
//! ```
//! use parking_lot::Mutex;
//! use serde_json::json;
//! use std::sync::Arc;
//! use vellum_resolver::{
//!     MemoryPackageManager, Package, PackageManager, PackageResolver, PendingImport, Session,
//! };
//!
//! # fn main() -> vellum_resolver::Result<()> {
//! let manager = Arc::new(MemoryPackageManager::new());
//! manager.put(
//!     "styles:1.2",
//!     json!({"type": "vellum", "version": "1.2"}).to_string(),
//! );
//!
//! let document = json!({
//!     "type": "vellum",
//!     "version": "1.0",
//!     "import": [{"name": "styles", "version": "1.2"}]
//! });
//! let root = Arc::new(Package::new("main", document)?);
//! let session = Arc::new(Session::new());
//! let pending = Arc::new(Mutex::new(PendingImport::new(root, None, session, Vec::new())));
//!
//! let resolver = PackageResolver::new(manager as Arc<dyn PackageManager>);
//! let ordered = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&ordered);
//! resolver.load(
//!     pending,
//!     move |packages| {
//!         *sink.lock() = packages
//!             .iter()
//!             .map(|package| package.name().to_string())
//!             .collect();
//!     },
//!     |_, message, _| panic!("import failed: {message}"),
//! );
//!
//! assert_eq!(*ordered.lock(), ["styles:1.2", "main"]);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod import;
pub mod manager;
mod ordering;
pub mod package;
pub mod pending;
pub mod record;
pub mod resolver;

pub use error::{Error, Result};
pub use import::{ImportRef, ImportRequest, LoadAfter, is_acceptable_replacement};
pub use manager::{MemoryPackageManager, PackageManager};
pub use package::Package;
pub use pending::PendingImport;
pub use record::{ImportContext, ImportRecord, RecordDefaults};
pub use resolver::{FailureCallback, PackageRequest, PackageResolver, SuccessCallback};

pub use vellum_core::{SemanticPattern, SemanticVersion, Session};

/// Commonly used imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::import::{ImportRef, ImportRequest};
    pub use crate::manager::{MemoryPackageManager, PackageManager};
    pub use crate::package::Package;
    pub use crate::pending::PendingImport;
    pub use crate::record::ImportContext;
    pub use crate::resolver::{PackageRequest, PackageResolver};
    pub use vellum_core::{SemanticPattern, SemanticVersion, Session};
}
