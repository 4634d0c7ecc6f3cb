//! Core primitives for the Vellum document engine's package layer.
//!
//! This crate holds the pieces the import resolver is built on:
//!
//! - **Session console**: author-facing diagnostics, buffered for the
//!   embedder and mirrored to `tracing`
//! - **Semantic versions**: the engine's version grammar with numeric and
//!   string prerelease elements, where numbers sort before strings and a
//!   release sorts after its own prereleases
//! - **Semantic patterns**: OR-of-AND comparison clauses with
//!   prerelease-validity rules for range operators
//! - **JSON helpers**: thin `serde_json` wrappers used across the engine
//!
//! # Example
//!
//! ```
//! use vellum_core::{SemanticPattern, SemanticVersion};
//!
//! let version = SemanticVersion::parse("1.2.0-beta.3").unwrap();
//! let pattern = SemanticPattern::parse(">=1.2.0-beta || 3.0").unwrap();
//! assert!(pattern.matches(Some(&version)));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod json;
pub mod pattern;
pub mod session;
pub mod version;

pub use error::{Error, Result};
pub use json::{from_json, from_json_slice, to_json, to_json_pretty};
pub use pattern::{PatternOp, SemanticPattern};
pub use session::Session;
pub use version::SemanticVersion;
