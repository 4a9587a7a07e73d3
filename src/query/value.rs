//! Query result type
//!
//! A [`Value`] is a read-only view produced by the executor: a tagged
//! kind, string and numeric representations, an optional span back into
//! the source buffer, and children when the kind is Array. Producing a
//! Value never mutates the document.

/// The type tag of a query result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Kind {
    /// Absent result; also what malformed branches degrade to.
    #[default]
    Null,
    String,
    Number,
    Bool,
    Array,
    /// An element with markup children; `raw` holds its inner markup.
    Element,
}

/// A query result.
#[derive(Debug, Clone, Default)]
#[must_use]
pub struct Value {
    pub kind: Kind,
    /// String representation (decoded text, or raw inner markup for Element).
    pub str_val: String,
    /// Numeric representation for Number results.
    pub num: f64,
    /// Child results, in traversal order, when kind is Array.
    pub children: Vec<Value>,
    /// Byte span in the source document backing this result, if any.
    pub span: Option<(usize, usize)>,
    /// Ordinal among sibling matches (hint for callers walking arrays).
    pub index: usize,
}

impl Value {
    /// The absent result.
    pub fn null() -> Self {
        Value::default()
    }

    pub fn string(s: impl Into<String>) -> Self {
        Value {
            kind: Kind::String,
            str_val: s.into(),
            ..Value::default()
        }
    }

    pub fn number(n: f64) -> Self {
        Value {
            kind: Kind::Number,
            str_val: format_number(n),
            num: n,
            ..Value::default()
        }
    }

    pub fn boolean(b: bool) -> Self {
        Value {
            kind: Kind::Bool,
            str_val: if b { "true" } else { "false" }.to_string(),
            num: if b { 1.0 } else { 0.0 },
            ..Value::default()
        }
    }

    pub fn array(children: Vec<Value>) -> Self {
        Value {
            kind: Kind::Array,
            children,
            ..Value::default()
        }
    }

    pub fn element(raw_inner: impl Into<String>, span: (usize, usize)) -> Self {
        Value {
            kind: Kind::Element,
            str_val: raw_inner.into(),
            span: Some(span),
            ..Value::default()
        }
    }

    /// True unless this is the Null result.
    pub fn exists(&self) -> bool {
        self.kind != Kind::Null
    }

    /// String form of the result. Arrays join their children's strings
    /// with nothing between them only when asked via `raw`; here they
    /// render the first child, matching first-match ergonomics.
    pub fn as_str(&self) -> &str {
        match self.kind {
            Kind::Array => self.children.first().map(|c| c.as_str()).unwrap_or(""),
            _ => &self.str_val,
        }
    }

    /// Owned string form.
    pub fn to_string_value(&self) -> String {
        self.as_str().to_string()
    }

    /// Numeric form; non-numeric strings yield NaN.
    pub fn f64(&self) -> f64 {
        match self.kind {
            Kind::Number | Kind::Bool => self.num,
            _ => self.as_str().trim().parse().unwrap_or(f64::NAN),
        }
    }

    pub fn i64(&self) -> i64 {
        match self.kind {
            Kind::Number => self.num as i64,
            _ => self.as_str().trim().parse().unwrap_or(0),
        }
    }

    pub fn u64(&self) -> u64 {
        match self.kind {
            Kind::Number if self.num >= 0.0 => self.num as u64,
            Kind::Number => 0,
            _ => self.as_str().trim().parse().unwrap_or(0),
        }
    }

    /// Boolean form: recognizes true/false/1/0 case-insensitively.
    pub fn bool(&self) -> bool {
        match self.kind {
            Kind::Bool => self.num != 0.0,
            Kind::Number => self.num != 0.0 && !self.num.is_nan(),
            _ => {
                let s = self.as_str();
                s.eq_ignore_ascii_case("true") || s == "1"
            }
        }
    }

    /// Children for Array results; non-arrays yield an empty slice.
    pub fn members(&self) -> &[Value] {
        match self.kind {
            Kind::Array => &self.children,
            _ => &[],
        }
    }

    /// Undecoded text backing this result (raw inner markup for elements,
    /// the string form otherwise).
    pub fn raw(&self) -> &str {
        &self.str_val
    }
}

/// Render a number the short way: integers without a fraction.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == n.trunc() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
