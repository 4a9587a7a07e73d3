//! Compiled path representation
//!
//! A path string compiles once into an ordered list of typed segments
//! plus a trailing modifier chain. Compiled paths are immutable; the
//! builder defensively copies a segment list before resolving an append
//! intent so a cached path is never mutated by a write.

use super::filter::FilterExpr;

/// Sentinel index meaning "insert as new last sibling".
pub const APPEND_INDEX: i64 = -1;

/// The kind of one path step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    /// A literal element name, possibly prefix-qualified.
    ElementName,
    /// `@name` — an attribute of the current element.
    Attribute,
    /// A non-negative ordinal, or the append sentinel `-1`.
    Index,
    /// `#` in final position — count of sibling matches.
    Count,
    /// `*` — every direct child once.
    Wildcard,
    /// `**` — depth-first over all descendants.
    RecursiveWildcard,
    /// `%` — concatenated direct text children.
    DirectText,
    /// `#(expr)` or `#(expr)#` — sibling filter.
    Filter,
    /// `#.field` — one named sub-value out of every sibling.
    FieldExtract,
}

/// One atomic step of a compiled path.
#[derive(Debug, Clone)]
pub struct PathSegment {
    pub kind: SegmentKind,
    /// Element/attribute/field name; empty for structural segments.
    pub literal: String,
    /// Ordinal for `Index` segments; `APPEND_INDEX` marks append intent.
    pub index: i64,
    /// Embedded comparison for `Filter` segments.
    pub filter: Option<FilterExpr>,
    /// True for the all-matches form `#(expr)#`.
    pub filter_all: bool,
}

impl PathSegment {
    pub fn name(kind: SegmentKind, literal: impl Into<String>) -> Self {
        PathSegment {
            kind,
            literal: literal.into(),
            index: 0,
            filter: None,
            filter_all: false,
        }
    }

    pub fn bare(kind: SegmentKind) -> Self {
        Self::name(kind, "")
    }

    pub fn index(index: i64) -> Self {
        PathSegment {
            kind: SegmentKind::Index,
            literal: String::new(),
            index,
            filter: None,
            filter_all: false,
        }
    }

    pub fn filter(expr: FilterExpr, all: bool) -> Self {
        PathSegment {
            kind: SegmentKind::Filter,
            literal: String::new(),
            index: 0,
            filter: Some(expr),
            filter_all: all,
        }
    }

    /// True for an `Index` segment carrying the append sentinel.
    pub fn is_append(&self) -> bool {
        self.kind == SegmentKind::Index && self.index == APPEND_INDEX
    }
}

/// One trailing `|@name[:arg]` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifierCall {
    pub name: String,
    pub arg: Option<String>,
}

/// A fully compiled path: segments plus the modifier pipeline.
#[derive(Debug, Clone)]
pub struct CompiledPath {
    pub segments: Vec<PathSegment>,
    pub modifiers: Vec<ModifierCall>,
}
