//! Result modifiers
//!
//! A compiled path may end in `|@name[:arg]` calls. Each modifier is a
//! pure function from one [`Value`] to another, applied left to right
//! after the executor runs. Built-ins cover the common reshaping needs;
//! callers can register their own under fresh names. An unknown name
//! leaves the value unchanged, keeping reads infallible.

use crate::core::element::skip_to_next_element_start;
use crate::core::entities;
use crate::core::limits::RECURSIVE_OP_BUDGET;
use crate::core::Scanner;
use crate::path::ModifierCall;
use crate::query::{ChildIter, Kind, Value};
use crate::Error;
use lazy_static::lazy_static;
use memchr::memchr;
use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

pub(crate) type ModifierFn = dyn Fn(Value, Option<&str>) -> Value + Send + Sync;

lazy_static! {
    static ref CUSTOM: RwLock<HashMap<String, Arc<ModifierFn>>> = RwLock::new(HashMap::new());
}

const BUILTINS: &[&str] = &[
    "reverse", "sort", "first", "last", "keys", "values", "flatten", "pretty", "ugly", "raw",
];

fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Register a caller-supplied modifier. Built-in names and already
/// registered names are rejected.
pub fn register(name: &str, f: Arc<ModifierFn>) -> Result<(), Error> {
    if is_builtin(name) {
        return Err(Error::invalid_value(format!(
            "modifier '{}' is built in",
            name
        )));
    }
    let mut map = CUSTOM
        .write()
        .map_err(|_| Error::invalid_value("modifier registry poisoned"))?;
    if map.contains_key(name) {
        return Err(Error::invalid_value(format!(
            "modifier '{}' is already registered",
            name
        )));
    }
    map.insert(name.to_string(), f);
    Ok(())
}

/// Remove a caller-supplied modifier. Built-ins cannot be removed;
/// removing an unknown name is a no-op.
pub fn unregister(name: &str) -> Result<(), Error> {
    if is_builtin(name) {
        return Err(Error::invalid_value(format!(
            "modifier '{}' is built in",
            name
        )));
    }
    let mut map = CUSTOM
        .write()
        .map_err(|_| Error::invalid_value("modifier registry poisoned"))?;
    map.remove(name);
    Ok(())
}

/// Run a modifier chain over one executor result.
pub(crate) fn apply_pipeline(mut value: Value, calls: &[ModifierCall]) -> Value {
    for call in calls {
        let arg = call.arg.as_deref();
        value = match call.name.as_str() {
            "reverse" => reverse(value),
            "sort" => sort(value),
            "first" => first(value),
            "last" => last(value),
            "keys" => keys(value),
            "values" => values(value),
            "flatten" => flatten(value),
            "pretty" => pretty(value, arg),
            "ugly" => ugly(value),
            "raw" => raw(value),
            name => match CUSTOM.read().ok().and_then(|m| m.get(name).cloned()) {
                Some(f) => f(value, arg),
                None => value,
            },
        };
    }
    value
}

fn reverse(mut v: Value) -> Value {
    if v.kind == Kind::Array {
        v.children.reverse();
    }
    v
}

fn sort(mut v: Value) -> Value {
    if v.kind == Kind::Array {
        v.children.sort_by(compare_values);
    }
    v
}

/// Numeric order when both sides parse as numbers, byte order otherwise.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (x, y) = (a.f64(), b.f64());
    if !x.is_nan() && !y.is_nan() {
        x.partial_cmp(&y).unwrap_or(Ordering::Equal)
    } else {
        a.as_str().cmp(b.as_str())
    }
}

fn first(v: Value) -> Value {
    match v.kind {
        Kind::Array => v.children.into_iter().next().unwrap_or_else(Value::null),
        _ => v,
    }
}

fn last(v: Value) -> Value {
    match v.kind {
        Kind::Array => v.children.into_iter().last().unwrap_or_else(Value::null),
        _ => v,
    }
}

/// Child element names of an Element result, in document order.
fn keys(v: Value) -> Value {
    match v.kind {
        Kind::Element => {
            let names: Vec<Value> = fragment_children(v.str_val.as_bytes())
                .into_iter()
                .map(|(name, _)| Value::string(name))
                .collect();
            if names.is_empty() {
                Value::null()
            } else {
                Value::array(names)
            }
        }
        Kind::Array => {
            let mut out = Vec::new();
            for child in v.children {
                let k = keys(child);
                if k.kind == Kind::Array {
                    out.extend(k.children);
                }
            }
            if out.is_empty() {
                Value::null()
            } else {
                Value::array(out)
            }
        }
        _ => Value::null(),
    }
}

/// Child element values of an Element result, in document order.
fn values(v: Value) -> Value {
    match v.kind {
        Kind::Element => {
            let vals: Vec<Value> = fragment_children(v.str_val.as_bytes())
                .into_iter()
                .map(|(_, val)| val)
                .collect();
            if vals.is_empty() {
                Value::null()
            } else {
                Value::array(vals)
            }
        }
        _ => Value::null(),
    }
}

/// Parse the direct children of a markup fragment into name/value pairs.
fn fragment_children(fragment: &[u8]) -> Vec<(String, Value)> {
    let budget = Cell::new(RECURSIVE_OP_BUDGET);
    ChildIter::new(fragment, 0..fragment.len(), &budget)
        .map(|loc| {
            let inner = &fragment[loc.content_start..loc.content_end];
            let mut s = Scanner::at(fragment, loc.content_start);
            let has_markup =
                skip_to_next_element_start(&mut s) && s.position() < loc.content_end;
            let val = if has_markup {
                Value::element(
                    String::from_utf8_lossy(inner).into_owned(),
                    (loc.open_start, loc.close_end),
                )
            } else {
                Value::string(entities::decode_to_string(inner))
            };
            (loc.name, val)
        })
        .collect()
}

/// Collapse one level of nested arrays.
fn flatten(v: Value) -> Value {
    if v.kind != Kind::Array {
        return v;
    }
    let mut out = Vec::with_capacity(v.children.len());
    for child in v.children {
        if child.kind == Kind::Array {
            out.extend(child.children);
        } else {
            out.push(child);
        }
    }
    Value::array(out)
}

/// Re-indent an Element result's markup. The argument overrides the
/// two-space default indent unit.
fn pretty(mut v: Value, arg: Option<&str>) -> Value {
    if v.kind == Kind::Element {
        let indent = arg.unwrap_or("  ");
        v.str_val = pretty_fragment(&v.str_val, indent);
    }
    v
}

/// Strip whitespace runs that sit entirely between tags.
fn ugly(mut v: Value) -> Value {
    if v.kind == Kind::Element {
        v.str_val = ugly_fragment(&v.str_val);
    }
    v
}

/// The undecoded string form.
fn raw(v: Value) -> Value {
    Value::string(v.raw().to_string())
}

fn pretty_fragment(src: &str, indent: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len() + src.len() / 4);
    let mut depth = 0usize;
    let mut pos = 0usize;

    while pos < bytes.len() {
        let lt = match memchr(b'<', &bytes[pos..]) {
            Some(i) => pos + i,
            None => {
                push_text(&mut out, &src[pos..], depth, indent);
                break;
            }
        };
        if lt > pos {
            push_text(&mut out, &src[pos..lt], depth, indent);
        }
        let gt = match tag_end(bytes, lt) {
            Some(g) => g,
            None => {
                push_text(&mut out, &src[lt..], depth, indent);
                break;
            }
        };
        let tag = &src[lt..=gt];

        if tag.starts_with("</") {
            depth = depth.saturating_sub(1);
            push_line(&mut out, tag, depth, indent);
            pos = gt + 1;
        } else if tag.starts_with("<!--")
            || tag.starts_with("<![CDATA[")
            || tag.starts_with("<?")
            || tag.ends_with("/>")
        {
            push_line(&mut out, tag, depth, indent);
            pos = gt + 1;
        } else if let Some(close_end) = leaf_extent(src, gt + 1, tag) {
            // text-only element: keep it on one line
            push_line(&mut out, &src[lt..close_end], depth, indent);
            pos = close_end;
        } else {
            push_line(&mut out, tag, depth, indent);
            depth += 1;
            pos = gt + 1;
        }
    }
    out
}

/// If the content after an opening tag is pure text followed by the
/// matching closing tag, return the offset just past that closing tag.
fn leaf_extent(src: &str, content_start: usize, open_tag: &str) -> Option<usize> {
    let bytes = src.as_bytes();
    let name_end = open_tag[1..]
        .find(|c: char| c == '>' || c.is_ascii_whitespace())
        .map(|i| i + 1)
        .unwrap_or(open_tag.len());
    let name = &open_tag[1..name_end];

    let lt = content_start + memchr(b'<', &bytes[content_start..])?;
    let close = format!("</{}>", name);
    if src[lt..].starts_with(&close) {
        Some(lt + close.len())
    } else {
        None
    }
}

fn tag_end(bytes: &[u8], lt: usize) -> Option<usize> {
    let rest = &bytes[lt..];
    let terminator: &[u8] = if rest.starts_with(b"<!--") {
        b"-->"
    } else if rest.starts_with(b"<![CDATA[") {
        b"]]>"
    } else if rest.starts_with(b"<?") {
        b"?>"
    } else {
        return Scanner::at(bytes, lt).find_tag_end_quoted();
    };
    rest.windows(terminator.len())
        .position(|w| w == terminator)
        .map(|i| lt + i + terminator.len() - 1)
}

fn push_line(out: &mut String, line: &str, depth: usize, indent: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    for _ in 0..depth {
        out.push_str(indent);
    }
    out.push_str(line);
}

fn push_text(out: &mut String, text: &str, depth: usize, indent: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        push_line(out, trimmed, depth, indent);
    }
}

fn ugly_fragment(src: &str) -> String {
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut i = 0usize;
    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            let between_tags = (start == 0 || bytes[start - 1] == b'>')
                && (i == bytes.len() || bytes[i] == b'<');
            if !between_tags {
                out.push_str(&src[start..i]);
            }
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            out.push_str(&src[start..i]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::ModifierCall;

    fn call(name: &str) -> ModifierCall {
        ModifierCall {
            name: name.to_string(),
            arg: None,
        }
    }

    fn arr(items: &[&str]) -> Value {
        Value::array(items.iter().map(|s| Value::string(*s)).collect())
    }

    #[test]
    fn test_reverse() {
        let v = apply_pipeline(arr(&["a", "b", "c"]), &[call("reverse")]);
        assert_eq!(v.members()[0].as_str(), "c");
        assert_eq!(v.members()[2].as_str(), "a");
    }

    #[test]
    fn test_sort_numeric_and_lexical() {
        let v = apply_pipeline(arr(&["10", "2", "1"]), &[call("sort")]);
        assert_eq!(v.members()[0].as_str(), "1");
        assert_eq!(v.members()[2].as_str(), "10");
        let v = apply_pipeline(arr(&["b", "a", "c"]), &[call("sort")]);
        assert_eq!(v.members()[0].as_str(), "a");
    }

    #[test]
    fn test_first_and_last() {
        assert_eq!(apply_pipeline(arr(&["x", "y"]), &[call("first")]).as_str(), "x");
        assert_eq!(apply_pipeline(arr(&["x", "y"]), &[call("last")]).as_str(), "y");
        // scalars pass through
        assert_eq!(
            apply_pipeline(Value::string("s"), &[call("first")]).as_str(),
            "s"
        );
    }

    #[test]
    fn test_keys_and_values() {
        let elem = Value::element("<a>1</a><b><c>2</c></b>", (0, 0));
        let k = apply_pipeline(elem.clone(), &[call("keys")]);
        assert_eq!(k.members().len(), 2);
        assert_eq!(k.members()[0].as_str(), "a");
        assert_eq!(k.members()[1].as_str(), "b");

        let v = apply_pipeline(elem, &[call("values")]);
        assert_eq!(v.members()[0].as_str(), "1");
        assert_eq!(v.members()[1].kind, Kind::Element);
        assert_eq!(v.members()[1].raw(), "<c>2</c>");
    }

    #[test]
    fn test_flatten() {
        let nested = Value::array(vec![arr(&["a", "b"]), Value::string("c")]);
        let v = apply_pipeline(nested, &[call("flatten")]);
        assert_eq!(v.members().len(), 3);
        assert_eq!(v.members()[2].as_str(), "c");
    }

    #[test]
    fn test_unknown_modifier_is_identity() {
        let v = apply_pipeline(arr(&["a"]), &[call("no_such_thing")]);
        assert_eq!(v.members().len(), 1);
    }

    #[test]
    fn test_chained_modifiers() {
        let v = apply_pipeline(arr(&["b", "c", "a"]), &[call("sort"), call("last")]);
        assert_eq!(v.as_str(), "c");
    }

    #[test]
    fn test_pretty_and_ugly() {
        let elem = Value::element("<a>1</a><b><c>2</c></b>", (0, 0));
        let p = apply_pipeline(elem, &[call("pretty")]);
        assert_eq!(p.raw(), "<a>1</a>\n<b>\n  <c>2</c>\n</b>");

        let loose = Value::element("<a>1</a>\n  <b>2</b>\n", (0, 0));
        let u = apply_pipeline(loose, &[call("ugly")]);
        assert_eq!(u.raw(), "<a>1</a><b>2</b>");
    }

    #[test]
    fn test_pretty_custom_indent() {
        let elem = Value::element("<b><c>2</c></b>", (0, 0));
        let p = apply_pipeline(
            elem,
            &[ModifierCall {
                name: "pretty".to_string(),
                arg: Some("\t".to_string()),
            }],
        );
        assert_eq!(p.raw(), "<b>\n\t<c>2</c>\n</b>");
    }

    #[test]
    fn test_register_and_unregister() {
        let f: Arc<ModifierFn> =
            Arc::new(|v, _| Value::string(v.as_str().to_uppercase()));
        register("upcase_test", Arc::clone(&f)).unwrap();
        assert!(register("upcase_test", f).is_err());
        assert!(register("reverse", Arc::new(|v, _| v)).is_err());

        let v = apply_pipeline(Value::string("hi"), &[call("upcase_test")]);
        assert_eq!(v.as_str(), "HI");

        unregister("upcase_test").unwrap();
        assert!(unregister("reverse").is_err());
        let v = apply_pipeline(Value::string("hi"), &[call("upcase_test")]);
        assert_eq!(v.as_str(), "hi");
    }
}
