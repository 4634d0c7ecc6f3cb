//! Import records.
//!
//! The `import` property of a document or package holds an array of
//! records. A record is either a plain package import or a selector
//! over further records: `oneOf` applies the first item that can be
//! applied, falling back to its `otherwise` records, while `allOf`
//! applies every item. Selectors hoist shared fields onto their items
//! and nest to any depth.
//!
//! Records may carry a `when` guard and data-bound field values; both
//! are evaluated against a host-supplied [`ImportContext`]. A guarded
//! record is skipped entirely when no context is available.

use crate::error::{Error, Result};
use crate::import::{ImportRef, ImportRequest, LoadAfter};
use serde_json::Value;
use smallvec::smallvec;
use vellum_core::{SemanticPattern, Session};

/// Host hook for evaluating data-bound record fields.
///
/// Documents may guard imports on runtime state and splice runtime
/// values into names, versions, and sources. The host decides what
/// expression language those strings use; the resolver only hands
/// them over.
pub trait ImportContext: Send + Sync {
    /// Evaluate a `when` guard expression to a boolean.
    fn evaluate_when(&self, expression: &str) -> bool;

    /// Expand a possibly data-bound string field. The default keeps
    /// the raw text.
    fn evaluate_string(&self, raw: &str) -> String {
        raw.to_string()
    }
}

impl<F> ImportContext for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn evaluate_when(&self, expression: &str) -> bool {
        self(expression)
    }
}

/// Fields a selector hoists onto the records beneath it.
///
/// A record's own field always wins over an inherited one. The source
/// URL is deliberately absent: a URL names one concrete artifact and
/// never makes sense shared across differing items.
#[derive(Debug, Clone, Default)]
pub struct RecordDefaults {
    name: Option<String>,
    version: Option<String>,
    load_after: Option<LoadAfter>,
    accept: Option<String>,
}

impl RecordDefaults {
    fn from_object(object: &serde_json::Map<String, Value>) -> Result<Self> {
        Ok(Self {
            name: optional_string(object, "name")?,
            version: optional_string(object, "version")?,
            load_after: optional_load_after(object)?,
            accept: optional_string(object, "accept")?,
        })
    }

    fn merged_over(&self, inherited: &RecordDefaults) -> RecordDefaults {
        RecordDefaults {
            name: self.name.clone().or_else(|| inherited.name.clone()),
            version: self.version.clone().or_else(|| inherited.version.clone()),
            load_after: self.load_after.clone().or_else(|| inherited.load_after.clone()),
            accept: self.accept.clone().or_else(|| inherited.accept.clone()),
        }
    }
}

/// A plain package import.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    when: Option<String>,
    name: Option<String>,
    version: Option<String>,
    source: Option<String>,
    load_after: Option<LoadAfter>,
    accept: Option<String>,
}

/// A `oneOf` or `allOf` group of records.
#[derive(Debug, Clone)]
pub struct SelectorRecord {
    when: Option<String>,
    common: RecordDefaults,
    items: Vec<ImportRecord>,
    otherwise: Vec<ImportRecord>,
}

/// One entry of an `import` array.
#[derive(Debug, Clone)]
pub enum ImportRecord {
    /// A single package import. Records without a recognized `type`
    /// are packages.
    Package(PackageRecord),
    /// The first item that can be applied wins; if none can, the
    /// `otherwise` records must all apply.
    OneOf(SelectorRecord),
    /// Every item that can be applied is.
    AllOf(SelectorRecord),
}

impl ImportRecord {
    /// Parse one record out of an `import` array entry.
    ///
    /// Selector items and `otherwise` records are parsed recursively
    /// up front, so a malformed record fails even inside a branch that
    /// selection would never reach.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImportRecord`] when the entry is not an
    /// object or has a wrongly typed field, and [`Error::MissingItems`]
    /// when a selector lacks its `items` array.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(object) = value.as_object() else {
            return Err(Error::InvalidImportRecord);
        };
        // A missing, non-string, or unrecognized type is a plain
        // package import.
        match object.get("type").and_then(Value::as_str) {
            Some("oneOf") => Ok(Self::OneOf(SelectorRecord::from_object(object, "oneOf")?)),
            Some("allOf") => Ok(Self::AllOf(SelectorRecord::from_object(object, "allOf")?)),
            _ => Ok(Self::Package(PackageRecord::from_object(object)?)),
        }
    }

    /// Expand this record into import requests.
    ///
    /// `Ok(None)` means the record was skipped, either because its
    /// `when` guard rejected it or because a guard could not be
    /// evaluated without a context. `Ok(Some(_))` means it applied;
    /// an applied selector may still contribute no requests.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedImportRecord`] for records that
    /// expand to an unusable reference, and [`Error::OtherwiseFailed`]
    /// when a `oneOf` falls through to `otherwise` records that do not
    /// all apply.
    pub fn expand(
        &self,
        inherited: &RecordDefaults,
        context: Option<&dyn ImportContext>,
        session: &Session,
    ) -> Result<Option<Vec<ImportRequest>>> {
        match self {
            Self::Package(record) => record.expand(inherited, context, session),
            Self::OneOf(selector) => selector.expand_one_of(inherited, context, session),
            Self::AllOf(selector) => selector.expand_all_of(inherited, context, session),
        }
    }
}

impl PackageRecord {
    fn from_object(object: &serde_json::Map<String, Value>) -> Result<Self> {
        Ok(Self {
            when: optional_string(object, "when")?,
            name: optional_string(object, "name")?,
            version: optional_string(object, "version")?,
            source: optional_string(object, "source")?,
            load_after: optional_load_after(object)?,
            accept: optional_string(object, "accept")?,
        })
    }

    fn expand(
        &self,
        inherited: &RecordDefaults,
        context: Option<&dyn ImportContext>,
        session: &Session,
    ) -> Result<Option<Vec<ImportRequest>>> {
        if !when_allows(self.when.as_deref(), context) {
            return Ok(None);
        }

        let name = resolve(self.name.as_deref(), inherited.name.as_deref(), context);
        let version = resolve(self.version.as_deref(), inherited.version.as_deref(), context);
        let mut reference = ImportRef::new(name, version);

        if let Some(source) = &self.source {
            reference = reference.with_source(evaluate(context, source));
        }
        let load_after = self.load_after.as_ref().or(inherited.load_after.as_ref());
        if let Some(load_after) = load_after {
            reference = reference
                .with_load_after(load_after.iter().map(|entry| evaluate(context, entry)));
        }
        let accept = self.accept.as_deref().or(inherited.accept.as_deref());
        if let Some(accept) = accept {
            let accept = evaluate(context, accept);
            // A pattern that does not parse is reported to the session
            // and the import proceeds without one.
            if let Some(pattern) = SemanticPattern::create(session, &accept) {
                reference = reference.with_accept(pattern);
            }
        }

        if !reference.is_valid() {
            return Err(Error::MalformedImportRecord);
        }
        Ok(Some(vec![ImportRequest::new(session, reference)]))
    }
}

impl SelectorRecord {
    fn from_object(object: &serde_json::Map<String, Value>, selector: &'static str) -> Result<Self> {
        let Some(items) = object.get("items").and_then(Value::as_array) else {
            return Err(Error::MissingItems { selector });
        };
        let items = items.iter().map(ImportRecord::from_value).collect::<Result<_>>()?;
        let otherwise = match object.get("otherwise") {
            None => Vec::new(),
            Some(Value::Array(records)) => records
                .iter()
                .map(ImportRecord::from_value)
                .collect::<Result<_>>()?,
            Some(_) => return Err(Error::InvalidImportRecord),
        };
        Ok(Self {
            when: optional_string(object, "when")?,
            common: RecordDefaults::from_object(object)?,
            items,
            otherwise,
        })
    }

    fn expand_one_of(
        &self,
        inherited: &RecordDefaults,
        context: Option<&dyn ImportContext>,
        session: &Session,
    ) -> Result<Option<Vec<ImportRequest>>> {
        if !when_allows(self.when.as_deref(), context) {
            return Ok(None);
        }
        let defaults = self.common.merged_over(inherited);

        for item in &self.items {
            if let Some(requests) = item.expand(&defaults, context, session)? {
                return Ok(Some(requests));
            }
        }

        // Nothing applied. Every otherwise record must apply in its
        // place, or the whole selector fails.
        let mut requests = Vec::new();
        for record in &self.otherwise {
            match record.expand(&defaults, context, session) {
                Ok(Some(mut expanded)) => requests.append(&mut expanded),
                Ok(None) => return Err(Error::otherwise_failed(None)),
                Err(error) => return Err(Error::otherwise_failed(Some(error))),
            }
        }
        Ok(Some(requests))
    }

    fn expand_all_of(
        &self,
        inherited: &RecordDefaults,
        context: Option<&dyn ImportContext>,
        session: &Session,
    ) -> Result<Option<Vec<ImportRequest>>> {
        if !when_allows(self.when.as_deref(), context) {
            return Ok(None);
        }
        let defaults = self.common.merged_over(inherited);

        let mut requests = Vec::new();
        for item in &self.items {
            if let Some(mut expanded) = item.expand(&defaults, context, session)? {
                requests.append(&mut expanded);
            }
        }
        Ok(Some(requests))
    }
}

fn when_allows(when: Option<&str>, context: Option<&dyn ImportContext>) -> bool {
    match (when, context) {
        (None, _) => true,
        // A guard with nothing to evaluate it against skips the record.
        (Some(_), None) => false,
        (Some(expression), Some(context)) => context.evaluate_when(expression),
    }
}

fn evaluate(context: Option<&dyn ImportContext>, raw: &str) -> String {
    context.map_or_else(|| raw.to_string(), |context| context.evaluate_string(raw))
}

fn resolve(own: Option<&str>, inherited: Option<&str>, context: Option<&dyn ImportContext>) -> String {
    own.or(inherited)
        .map(|raw| evaluate(context, raw))
        .unwrap_or_default()
}

fn optional_string(
    object: &serde_json::Map<String, Value>,
    key: &str,
) -> Result<Option<String>> {
    match object.get(key) {
        None => Ok(None),
        Some(Value::String(text)) => Ok(Some(text.clone())),
        Some(_) => Err(Error::InvalidImportRecord),
    }
}

fn optional_load_after(object: &serde_json::Map<String, Value>) -> Result<Option<LoadAfter>> {
    match object.get("loadAfter") {
        None => Ok(None),
        Some(Value::String(name)) => Ok(Some(smallvec![name.clone()])),
        Some(Value::Array(names)) => {
            let mut load_after = LoadAfter::new();
            for name in names {
                let Some(name) = name.as_str() else {
                    return Err(Error::InvalidImportRecord);
                };
                load_after.push(name.to_string());
            }
            Ok(Some(load_after))
        }
        Some(_) => Err(Error::InvalidImportRecord),
    }
}
