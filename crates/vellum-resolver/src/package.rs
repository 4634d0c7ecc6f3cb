//! Loaded package documents.

use crate::error::{Error, Result};
use serde_json::Value;
use std::sync::Arc;
use vellum_core::Session;

/// A validated package document.
///
/// Imported packages are named by their qualified `name:version`; the
/// root document carries whatever name the host gave it.
#[derive(Debug, Clone)]
pub struct Package {
    name: String,
    json: Value,
}

impl Package {
    /// Validate `json` as a package document named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPackage`] unless the payload is a JSON
    /// object with string `type` and `version` fields.
    pub fn new(name: impl Into<String>, json: Value) -> Result<Self> {
        let name = name.into();
        let Some(object) = json.as_object() else {
            return Err(Error::invalid_package(name, "payload is not a JSON object"));
        };
        if !matches!(object.get("type"), Some(Value::String(_))) {
            return Err(Error::invalid_package(
                name,
                "missing or non-string type field",
            ));
        }
        if !matches!(object.get("version"), Some(Value::String(_))) {
            return Err(Error::invalid_package(
                name,
                "missing or non-string version field",
            ));
        }
        Ok(Self { name, json })
    }

    /// Validate a package document, reporting any problem to the
    /// session console instead of returning it.
    pub fn create(session: &Session, name: impl Into<String>, json: Value) -> Option<Arc<Self>> {
        match Self::new(name, json) {
            Ok(package) => Some(Arc::new(package)),
            Err(error) => {
                session.console(error.to_string());
                None
            }
        }
    }

    /// The name this package was loaded under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The document type declared by the payload.
    #[must_use]
    pub fn doc_type(&self) -> &str {
        self.json["type"].as_str().unwrap_or_default()
    }

    /// The version declared by the payload.
    #[must_use]
    pub fn version(&self) -> &str {
        self.json["version"].as_str().unwrap_or_default()
    }

    /// The full document.
    #[must_use]
    pub fn json(&self) -> &Value {
        &self.json
    }

    /// The raw `import` property, if the document has one.
    #[must_use]
    pub fn import_value(&self) -> Option<&Value> {
        self.json.get("import")
    }
}
