//! Path-addressed XML querying and in-place mutation.
//!
//! Documents are plain byte buffers; nothing here builds a DOM. A query
//! compiles a dot-separated path, walks the buffer with a scanner, and
//! returns a [`Value`] view. A mutation locates the target's byte range
//! and splices a replacement into a fresh buffer, leaving the original
//! untouched.
//!
//! Reads are infallible: a missing element, a malformed branch or a
//! breached resource ceiling degrades to the Null value. Mutations
//! validate eagerly and return typed errors instead.
//!
//! ```
//! let doc = r#"<catalog><book id="bk101"><title>XML Guide</title></book></catalog>"#;
//!
//! let title = xmlpath::get(doc, "catalog.book.title");
//! assert_eq!(title.as_str(), "XML Guide");
//!
//! let id = xmlpath::get(doc, "catalog.book.@id");
//! assert_eq!(id.as_str(), "bk101");
//!
//! let updated = xmlpath::set(doc, "catalog.book.title", "New Title").unwrap();
//! assert_eq!(
//!     xmlpath::get(&updated, "catalog.book.title").as_str(),
//!     "New Title"
//! );
//! ```

mod builder;
mod core;
mod modifier;
mod path;
mod query;
mod validate;

pub use query::{Kind, Value};
pub use validate::Validity;

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error as ThisError;

/// Mutation failure. Queries never produce these; they degrade to the
/// Null [`Value`] instead.
#[derive(Debug, ThisError)]
pub enum Error {
    /// The document failed well-formedness validation.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    /// The path does not compile, or addresses something a mutation
    /// cannot target.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// The value cannot be spliced in (oversized, or an invalid raw
    /// fragment).
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedDocument(msg.into())
    }

    pub(crate) fn invalid_path(msg: impl Into<String>) -> Self {
        Error::InvalidPath(msg.into())
    }

    pub(crate) fn invalid_value(msg: impl Into<String>) -> Self {
        Error::InvalidValue(msg.into())
    }
}

/// Per-call options.
#[derive(Debug, Clone)]
pub struct Options {
    /// Match element and attribute names exactly. When false, names
    /// compare ASCII case-insensitively.
    pub case_sensitive: bool,
    /// Indent unit for the `@pretty` modifier when the call carries no
    /// argument. Empty means the modifier's own default.
    pub indent: String,
    /// Prefix-to-URI declarations. Currently advisory: path segments
    /// match prefixed names as literal text; no URI resolution happens.
    pub namespaces: HashMap<String, String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            case_sensitive: true,
            indent: String::new(),
            namespaces: HashMap::new(),
        }
    }
}

/// A value to write. `Raw` splices markup verbatim after fragment
/// validation; every other variant is entity-encoded text.
#[derive(Debug, Clone)]
pub enum SetValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Raw(String),
    /// Remove the target instead of writing to it.
    Delete,
}

impl From<&str> for SetValue {
    fn from(s: &str) -> Self {
        SetValue::Text(s.to_string())
    }
}

impl From<String> for SetValue {
    fn from(s: String) -> Self {
        SetValue::Text(s)
    }
}

impl From<i64> for SetValue {
    fn from(n: i64) -> Self {
        SetValue::Int(n)
    }
}

impl From<f64> for SetValue {
    fn from(n: f64) -> Self {
        SetValue::Float(n)
    }
}

impl From<bool> for SetValue {
    fn from(b: bool) -> Self {
        SetValue::Bool(b)
    }
}

/// Query a document. Never fails: compile errors, missing targets and
/// malformed branches all yield the Null value.
pub fn get(doc: &str, path: &str) -> Value {
    get_with(doc, path, &Options::default())
}

/// Query with explicit options.
pub fn get_with(doc: &str, path: &str, opts: &Options) -> Value {
    run_query(doc.as_bytes(), path, opts)
}

/// Query raw bytes; the buffer does not need to be valid UTF-8.
pub fn get_bytes(doc: &[u8], path: &str) -> Value {
    run_query(doc, path, &Options::default())
}

/// Run several queries over one document.
pub fn get_many(doc: &str, paths: &[&str]) -> Vec<Value> {
    paths.iter().map(|p| get(doc, p)).collect()
}

fn run_query(doc: &[u8], path: &str, opts: &Options) -> Value {
    let compiled = match path::compile_cached(path) {
        Ok(c) => c,
        Err(_) => return Value::null(),
    };
    let value = query::execute(doc, &compiled, opts);
    if compiled.modifiers.is_empty() {
        return value;
    }
    // A bare @pretty picks up the configured indent unit
    if opts.indent.is_empty() {
        modifier::apply_pipeline(value, &compiled.modifiers)
    } else {
        let calls: Vec<path::ModifierCall> = compiled
            .modifiers
            .iter()
            .map(|c| {
                if c.name == "pretty" && c.arg.is_none() {
                    path::ModifierCall {
                        name: c.name.clone(),
                        arg: Some(opts.indent.clone()),
                    }
                } else {
                    c.clone()
                }
            })
            .collect();
        modifier::apply_pipeline(value, &calls)
    }
}

/// Write a value at a path, returning the new document. Missing
/// elements along the path are created as nested elements.
pub fn set(doc: &str, path: &str, value: impl Into<SetValue>) -> Result<String, Error> {
    set_with(doc, path, value, &Options::default())
}

/// Write with explicit options.
pub fn set_with(
    doc: &str,
    path: &str,
    value: impl Into<SetValue>,
    opts: &Options,
) -> Result<String, Error> {
    let out = builder::apply(doc.as_bytes(), path, &value.into(), opts)?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Splice a pre-built markup fragment at a path. The fragment must be
/// balanced and free of DOCTYPE/ENTITY declarations.
pub fn set_raw(doc: &str, path: &str, fragment: &str) -> Result<String, Error> {
    set(doc, path, SetValue::Raw(fragment.to_string()))
}

/// Byte-level write for callers holding non-UTF-8-checked buffers.
pub fn set_bytes(doc: &[u8], path: &str, value: impl Into<SetValue>) -> Result<Vec<u8>, Error> {
    builder::apply(doc, path, &value.into(), &Options::default())
}

/// Remove the element or attribute at a path. Deleting an absent target
/// returns the document unchanged.
pub fn delete(doc: &str, path: &str) -> Result<String, Error> {
    let out = builder::apply(
        doc.as_bytes(),
        path,
        &SetValue::Delete,
        &Options::default(),
    )?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Apply several writes in order. `paths` and `values` must pair up
/// one-to-one; later writes see the earlier writes' output.
pub fn set_many(doc: &str, paths: &[&str], values: &[SetValue]) -> Result<String, Error> {
    if paths.len() != values.len() {
        return Err(Error::invalid_path(format!(
            "{} paths but {} values",
            paths.len(),
            values.len()
        )));
    }
    let mut current = doc.to_string();
    for (path, value) in paths.iter().zip(values) {
        let out = builder::apply(current.as_bytes(), path, value, &Options::default())?;
        current = String::from_utf8_lossy(&out).into_owned();
    }
    Ok(current)
}

/// Remove several targets in order.
pub fn delete_many(doc: &str, paths: &[&str]) -> Result<String, Error> {
    let mut current = doc.to_string();
    for path in paths {
        let out = builder::apply(
            current.as_bytes(),
            path,
            &SetValue::Delete,
            &Options::default(),
        )?;
        current = String::from_utf8_lossy(&out).into_owned();
    }
    Ok(current)
}

/// Check a document for well-formedness without mutating it.
pub fn validate(doc: &str) -> Validity {
    validate::validate(doc.as_bytes())
}

/// Register a custom modifier for use in `|@name` path suffixes.
/// Built-in and already-registered names are rejected.
pub fn register_modifier<F>(name: &str, f: F) -> Result<(), Error>
where
    F: Fn(Value, Option<&str>) -> Value + Send + Sync + 'static,
{
    modifier::register(name, Arc::new(f))
}

/// Remove a custom modifier. Built-ins cannot be removed.
pub fn unregister_modifier(name: &str) -> Result<(), Error> {
    modifier::unregister(name)
}
