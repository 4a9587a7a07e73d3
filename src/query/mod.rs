//! Query executor
//!
//! Walks a compiled segment list against the document through the
//! scanner, one scope (element content range) at a time. Reads never
//! error: malformed input, breached ceilings and exhausted budgets all
//! degrade to the Null result or stop collection early.

pub mod value;

pub use value::{Kind, Value};

use crate::core::element::{
    self, names_equal, parse_element_at, skip_to_next_element_start, ElementLocation,
};
use crate::core::limits::{
    MAX_DOCUMENT_SIZE, MAX_NESTING_DEPTH, MAX_WILDCARD_RESULTS, RECURSIVE_OP_BUDGET,
};
use crate::core::{entities, Scanner};
use crate::path::{compile_cached, CompiledPath, FilterExpr, PathSegment, SegmentKind};
use crate::Options;
use std::cell::Cell;
use std::ops::Range;

/// Run a compiled path against a document. The modifier pipeline is
/// applied by the caller afterwards.
pub fn execute(doc: &[u8], compiled: &CompiledPath, opts: &Options) -> Value {
    if doc.len() > MAX_DOCUMENT_SIZE || compiled.segments.is_empty() {
        return Value::null();
    }
    let exec = Executor {
        doc,
        opts,
        budget: Cell::new(RECURSIVE_OP_BUDGET),
        depth: Cell::new(0),
    };
    exec.eval_scope(0..doc.len(), &compiled.segments)
}

/// Resolve a filter sub-path inside one element on behalf of the
/// mutation builder, which shares the executor's sibling matching.
pub(crate) fn filter_operand_for(
    doc: &[u8],
    loc: &ElementLocation,
    sub_path: &str,
    opts: &Options,
) -> Option<String> {
    let exec = Executor {
        doc,
        opts,
        budget: Cell::new(RECURSIVE_OP_BUDGET),
        depth: Cell::new(0),
    };
    exec.filter_operand(loc, sub_path)
}

/// Per-call traversal state. Owns the recursion budget and the nesting
/// depth counter; both are Cells so sibling branches observe each
/// other's spend without threading &mut through the walk.
struct Executor<'a> {
    doc: &'a [u8],
    opts: &'a Options,
    budget: Cell<usize>,
    depth: Cell<usize>,
}

/// Scope-guard for the nesting-depth counter: increments on acquire,
/// decrements on every exit path via Drop, so one branch's early return
/// never leaks depth into its siblings.
struct DepthGuard<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> DepthGuard<'a> {
    fn acquire(depth: &'a Cell<usize>) -> Option<Self> {
        if depth.get() >= MAX_NESTING_DEPTH {
            return None;
        }
        depth.set(depth.get() + 1);
        Some(DepthGuard { depth })
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get().saturating_sub(1));
    }
}

/// Streams the direct child elements of a scope in document order.
/// Malformed children end the stream; each yielded element costs one
/// unit of the shared traversal budget.
pub(crate) struct ChildIter<'a, 'b> {
    doc: &'a [u8],
    pos: usize,
    end: usize,
    budget: &'b Cell<usize>,
}

impl<'a, 'b> ChildIter<'a, 'b> {
    pub(crate) fn new(doc: &'a [u8], scope: Range<usize>, budget: &'b Cell<usize>) -> Self {
        ChildIter {
            doc,
            pos: scope.start,
            end: scope.end,
            budget,
        }
    }
}

impl Iterator for ChildIter<'_, '_> {
    type Item = ElementLocation;

    fn next(&mut self) -> Option<ElementLocation> {
        if self.pos >= self.end {
            return None;
        }
        let mut s = Scanner::at(self.doc, self.pos);
        if !skip_to_next_element_start(&mut s) || s.position() >= self.end {
            self.pos = self.end;
            return None;
        }
        let budget = self.budget.get();
        if budget == 0 {
            self.pos = self.end;
            return None;
        }
        self.budget.set(budget - 1);

        match parse_element_at(self.doc, s.position()) {
            Some(loc) if loc.close_end <= self.end => {
                self.pos = loc.close_end;
                Some(loc)
            }
            _ => {
                // Inconsistency mid-traversal: this branch yields nothing
                self.pos = self.end;
                None
            }
        }
    }
}

impl<'a> Executor<'a> {
    fn children<'b>(&'b self, scope: Range<usize>) -> ChildIter<'a, 'b> {
        ChildIter::new(self.doc, scope, &self.budget)
    }

    /// Evaluate segments against one scope.
    fn eval_scope(&self, scope: Range<usize>, segs: &[PathSegment]) -> Value {
        let seg = match segs.first() {
            Some(s) => s,
            None => return Value::null(),
        };
        let _guard = match DepthGuard::acquire(&self.depth) {
            Some(g) => g,
            None => return Value::null(),
        };

        match seg.kind {
            SegmentKind::ElementName => self.element_name_step(scope, segs),
            SegmentKind::Wildcard => self.wildcard_step(scope, &segs[1..]),
            SegmentKind::RecursiveWildcard => self.recursive_step(scope, &segs[1..]),
            SegmentKind::DirectText if segs.len() == 1 => self.direct_text_value(scope),
            SegmentKind::Index if seg.index >= 0 => self.index_step(scope, segs),
            // Count/Filter/FieldExtract need a preceding element name;
            // append intent is meaningless on the read path.
            _ => Value::null(),
        }
    }

    /// The ElementName state: scan siblings, honoring a lookahead Index,
    /// Count, Filter or FieldExtract segment.
    fn element_name_step(&self, scope: Range<usize>, segs: &[PathSegment]) -> Value {
        let seg = &segs[0];
        let next = segs.get(1);

        match next.map(|n| n.kind) {
            Some(SegmentKind::Count) => {
                // Counting is bounded by the shared traversal budget, not
                // the collection ceiling; no results are materialized.
                let count = self.matching_children(scope, &seg.literal).count();
                // Observed deviation: zero matches yields the absent
                // result, not Number 0.
                if count == 0 {
                    Value::null()
                } else {
                    Value::number(count as f64)
                }
            }
            Some(SegmentKind::Index) => {
                let want = next.map(|n| n.index).unwrap_or(0);
                if want < 0 {
                    return Value::null();
                }
                match self.matching_children(scope, &seg.literal).nth(want as usize) {
                    Some(loc) => self.continue_into(&loc, &segs[2..], want as usize),
                    None => Value::null(),
                }
            }
            Some(SegmentKind::Filter) => {
                let filter_seg = next.unwrap_or(seg);
                let expr = match &filter_seg.filter {
                    Some(e) => e,
                    None => return Value::null(),
                };
                self.filter_step(scope, &seg.literal, expr, filter_seg.filter_all, &segs[2..])
            }
            Some(SegmentKind::FieldExtract) => {
                let field = next.map(|n| n.literal.as_str()).unwrap_or("");
                self.field_extract(scope, &seg.literal, field)
            }
            _ => match self.matching_children(scope, &seg.literal).next() {
                Some(loc) => self.continue_into(&loc, &segs[1..], 0),
                None => Value::null(),
            },
        }
    }

    fn matching_children<'b>(
        &'b self,
        scope: Range<usize>,
        name: &'b str,
    ) -> impl Iterator<Item = ElementLocation> + 'b {
        let case_sensitive = self.opts.case_sensitive;
        self.children(scope)
            .filter(move |loc| names_equal(&loc.name, name, case_sensitive))
    }

    /// Continue evaluation inside a matched element.
    fn continue_into(&self, loc: &ElementLocation, rest: &[PathSegment], index: usize) -> Value {
        if !loc.is_coherent(self.doc.len()) {
            return Value::null();
        }
        match rest.first() {
            None => {
                let mut v = self.element_value(loc);
                v.index = index;
                v
            }
            Some(seg) if seg.kind == SegmentKind::Attribute => {
                if rest.len() > 1 {
                    return Value::null();
                }
                match loc.attr(&seg.literal, self.opts.case_sensitive) {
                    Some(v) => Value::string(v),
                    None => Value::null(),
                }
            }
            Some(seg) if seg.kind == SegmentKind::DirectText && rest.len() == 1 => {
                self.direct_text_value(loc.content_start..loc.content_end)
            }
            Some(_) => self.eval_scope(loc.content_start..loc.content_end, rest),
        }
    }

    /// `*` — every direct child once.
    fn wildcard_step(&self, scope: Range<usize>, rest: &[PathSegment]) -> Value {
        // `*.#` counts every direct child, bounded by the budget only
        if rest.len() == 1 && rest[0].kind == SegmentKind::Count {
            let count = self.children(scope).count();
            return if count == 0 {
                Value::null()
            } else {
                Value::number(count as f64)
            };
        }

        let mut results = Vec::new();
        for (i, loc) in self.children(scope).enumerate() {
            if results.len() >= MAX_WILDCARD_RESULTS {
                break;
            }
            let v = self.continue_into(&loc, rest, i);
            if v.exists() {
                results.push(v);
            }
        }
        if results.is_empty() {
            Value::null()
        } else {
            Value::array(results)
        }
    }

    /// `**` — depth-first over all descendants, bounded by the result
    /// ceiling and the shared traversal budget.
    fn recursive_step(&self, scope: Range<usize>, rest: &[PathSegment]) -> Value {
        let mut results = Vec::new();
        self.recursive_collect(scope, rest, &mut results);
        if results.is_empty() {
            Value::null()
        } else {
            Value::array(results)
        }
    }

    fn recursive_collect(&self, scope: Range<usize>, rest: &[PathSegment], out: &mut Vec<Value>) {
        let _guard = match DepthGuard::acquire(&self.depth) {
            Some(g) => g,
            None => return,
        };
        for loc in self.children(scope) {
            if out.len() >= MAX_WILDCARD_RESULTS || self.budget.get() == 0 {
                return;
            }
            let v = self.match_descendant(&loc, rest, out.len());
            if v.exists() {
                out.push(v);
            }
            self.recursive_collect(loc.content_start..loc.content_end, rest, out);
        }
    }

    /// Try the remaining segments against one visited descendant.
    fn match_descendant(&self, loc: &ElementLocation, rest: &[PathSegment], index: usize) -> Value {
        match rest.first() {
            None => {
                let mut v = self.element_value(loc);
                v.index = index;
                v
            }
            Some(seg) if seg.kind == SegmentKind::ElementName => {
                if names_equal(&loc.name, &seg.literal, self.opts.case_sensitive) {
                    self.continue_into(loc, &rest[1..], index)
                } else {
                    Value::null()
                }
            }
            Some(seg)
                if seg.kind == SegmentKind::Attribute || seg.kind == SegmentKind::DirectText =>
            {
                self.continue_into(loc, rest, index)
            }
            Some(_) => Value::null(),
        }
    }

    /// Bare ordinal over all children regardless of name.
    fn index_step(&self, scope: Range<usize>, segs: &[PathSegment]) -> Value {
        let want = segs[0].index as usize;
        match self.children(scope).nth(want) {
            Some(loc) => self.continue_into(&loc, &segs[1..], want),
            None => Value::null(),
        }
    }

    /// `#(expr)` / `#(expr)#` over the siblings matched by `name`.
    fn filter_step(
        &self,
        scope: Range<usize>,
        name: &str,
        expr: &FilterExpr,
        all: bool,
        rest: &[PathSegment],
    ) -> Value {
        let mut results = Vec::new();
        // Collect first: the iterator borrows the shared budget cell,
        // and descending re-enters the executor.
        let candidates: Vec<ElementLocation> = self
            .matching_children(scope, name)
            .take(MAX_WILDCARD_RESULTS)
            .collect();

        for (i, loc) in candidates.iter().enumerate() {
            let candidate = match self.filter_operand(loc, &expr.path) {
                Some(v) => v,
                None => continue,
            };
            if !expr.compare(&candidate) {
                continue;
            }
            let v = self.continue_into(loc, rest, i);
            if !all {
                return v;
            }
            if v.exists() {
                results.push(v);
            }
            if results.len() >= MAX_WILDCARD_RESULTS {
                break;
            }
        }

        if !all || results.is_empty() {
            Value::null()
        } else {
            Value::array(results)
        }
    }

    /// Resolve a filter sub-path inside one candidate element: `%`,
    /// `@attr`, or a nested path; a single plain name falls back to an
    /// attribute of that name when no child element matches.
    fn filter_operand(&self, loc: &ElementLocation, sub_path: &str) -> Option<String> {
        if sub_path == "%" {
            return Some(
                self.direct_text_value(loc.content_start..loc.content_end)
                    .to_string_value(),
            );
        }
        if let Some(attr_name) = sub_path.strip_prefix('@') {
            return loc
                .attr(attr_name, self.opts.case_sensitive)
                .map(str::to_string);
        }

        let compiled = compile_cached(sub_path).ok()?;
        let v = self.eval_scope(loc.content_start..loc.content_end, &compiled.segments);
        if v.exists() {
            return Some(v.to_string_value());
        }
        if !sub_path.contains('.') {
            return loc
                .attr(sub_path, self.opts.case_sensitive)
                .map(str::to_string);
        }
        None
    }

    /// `#.field` — one named sub-value out of every matching sibling.
    fn field_extract(&self, scope: Range<usize>, name: &str, field: &str) -> Value {
        let candidates: Vec<ElementLocation> = self
            .matching_children(scope, name)
            .take(MAX_WILDCARD_RESULTS)
            .collect();

        let mut results = Vec::new();
        for loc in &candidates {
            if results.len() >= MAX_WILDCARD_RESULTS {
                break;
            }
            let v = self.extract_field(loc, field);
            if v.exists() {
                results.push(v);
            }
        }
        if results.is_empty() {
            Value::null()
        } else {
            Value::array(results)
        }
    }

    fn extract_field(&self, loc: &ElementLocation, field: &str) -> Value {
        if field == "%" {
            return self.direct_text_value(loc.content_start..loc.content_end);
        }
        if let Some(attr_name) = field.strip_prefix('@') {
            return match loc.attr(attr_name, self.opts.case_sensitive) {
                Some(v) => Value::string(v),
                None => Value::null(),
            };
        }
        match self
            .matching_children(loc.content_start..loc.content_end, field)
            .next()
        {
            Some(child) => self.element_value(&child),
            None => Value::null(),
        }
    }

    /// Terminal value of an element: decoded text for leaf elements,
    /// an Element view (raw inner markup) when markup children exist.
    fn element_value(&self, loc: &ElementLocation) -> Value {
        let inner = loc.content_start..loc.content_end;
        if self.has_element_child(inner.clone()) {
            let raw = String::from_utf8_lossy(&self.doc[inner]).into_owned();
            Value::element(raw, (loc.open_start, loc.close_end))
        } else {
            let mut v = self.direct_text_value(inner);
            if !v.exists() {
                v = Value::string("");
            }
            v.span = Some((loc.open_start, loc.close_end));
            v
        }
    }

    fn has_element_child(&self, scope: Range<usize>) -> bool {
        let mut s = Scanner::at(self.doc, scope.start);
        skip_to_next_element_start(&mut s) && s.position() < scope.end
    }

    /// `%` — concatenated text nodes that are direct children only,
    /// excluding nested element text. Nested elements are stepped over
    /// with an explicit nesting counter rather than a re-entrant parse.
    fn direct_text_value(&self, scope: Range<usize>) -> Value {
        let mut out = String::new();
        let mut s = Scanner::at(self.doc, scope.start);
        let mut nesting = 0usize;

        while s.position() < scope.end {
            let lt = match s.find_byte(b'<') {
                Some(pos) if pos < scope.end => pos,
                _ => {
                    if nesting == 0 {
                        out.push_str(&entities::decode_to_string(
                            s.slice(s.position(), scope.end),
                        ));
                    }
                    break;
                }
            };
            if nesting == 0 && lt > s.position() {
                out.push_str(&entities::decode_to_string(s.slice(s.position(), lt)));
            }
            s.set_position(lt);

            if s.starts_with(b"<!--") {
                element::skip_comment(&mut s);
            } else if s.starts_with(b"<![CDATA[") {
                let content_start = lt + 9;
                element::skip_cdata(&mut s);
                if nesting == 0 {
                    let content_end = s.position().saturating_sub(3).max(content_start);
                    out.push_str(&String::from_utf8_lossy(
                        s.slice(content_start, content_end),
                    ));
                }
            } else if s.starts_with(b"<?") {
                element::skip_pi(&mut s);
            } else if s.starts_with(b"</") {
                if nesting == 0 {
                    break;
                }
                nesting -= 1;
                match s.find_byte(b'>') {
                    Some(gt) => s.set_position(gt + 1),
                    None => break,
                }
            } else {
                match s.find_tag_end_quoted() {
                    Some(gt) => {
                        let self_closing = gt > 0 && self.doc[gt - 1] == b'/';
                        if !self_closing {
                            nesting += 1;
                            if nesting > MAX_NESTING_DEPTH {
                                break;
                            }
                        }
                        s.set_position(gt + 1);
                    }
                    None => break,
                }
            }
        }

        if out.is_empty() {
            Value::null()
        } else {
            Value::string(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::parser::compile;

    fn run(doc: &str, path: &str) -> Value {
        let compiled = compile(path).unwrap();
        execute(doc.as_bytes(), &compiled, &Options::default())
    }

    #[test]
    fn test_simple_lookup() {
        let v = run(
            "<catalog><book id=\"1\"><title>Go</title></book></catalog>",
            "catalog.book.title",
        );
        assert_eq!(v.as_str(), "Go");
        assert_eq!(v.kind, Kind::String);
    }

    #[test]
    fn test_attribute_lookup() {
        let v = run("<user id=\"123\"><name>John</name></user>", "user.@id");
        assert_eq!(v.as_str(), "123");
    }

    #[test]
    fn test_missing_yields_null() {
        assert!(!run("<a><b>x</b></a>", "a.c").exists());
        assert!(!run("<a><b>x</b></a>", "z.b").exists());
    }

    #[test]
    fn test_index_selection() {
        let doc = "<r><i>a</i><i>b</i><i>c</i></r>";
        assert_eq!(run(doc, "r.i.0").as_str(), "a");
        assert_eq!(run(doc, "r.i.2").as_str(), "c");
        assert!(!run(doc, "r.i.3").exists());
    }

    #[test]
    fn test_count() {
        let doc = "<r><i>a</i><x/><i>b</i></r>";
        let v = run(doc, "r.i.#");
        assert_eq!(v.kind, Kind::Number);
        assert_eq!(v.i64(), 2);
    }

    #[test]
    fn test_count_beyond_collection_ceiling() {
        // Counting is not truncated at the wildcard-result ceiling
        let mut doc = String::from("<r>");
        for _ in 0..12_000 {
            doc.push_str("<i/>");
        }
        doc.push_str("</r>");
        assert_eq!(run(&doc, "r.i.#").i64(), 12_000);
        assert_eq!(run(&doc, "r.*.#").i64(), 12_000);
    }

    #[test]
    fn test_count_zero_matches_is_empty() {
        // Known deviation: zero matches is the absent result, not 0
        let v = run("<r><x/></r>", "r.i.#");
        assert!(!v.exists());
        assert_eq!(v.as_str(), "");
    }

    #[test]
    fn test_filter_first_match() {
        let doc = concat!(
            "<c><b status=\"active\"><p>44.99</p></b>",
            "<b status=\"off\"><p>19.99</p></b></c>"
        );
        assert_eq!(run(doc, "c.b.#(status==active).p").as_str(), "44.99");
    }

    #[test]
    fn test_filter_child_element_subpath() {
        let doc = "<c><b><s>on</s><p>1</p></b><b><s>off</s><p>2</p></b></c>";
        assert_eq!(run(doc, "c.b.#(s==off).p").as_str(), "2");
    }

    #[test]
    fn test_filter_all_matches() {
        let doc = "<c><b><p>5</p></b><b><p>15</p></b><b><p>25</p></b></c>";
        let v = run(doc, "c.b.#(p>10)#.p");
        assert_eq!(v.kind, Kind::Array);
        assert_eq!(v.members().len(), 2);
        assert_eq!(v.members()[1].as_str(), "25");
    }

    #[test]
    fn test_filter_numeric_comparison() {
        let doc = "<c><b><p>44.99</p></b><b><p>19.99</p></b></c>";
        assert_eq!(run(doc, "c.b.#(p<20).p").as_str(), "19.99");
    }

    #[test]
    fn test_field_extraction() {
        let doc = "<r><i><t>a</t></i><i><t>b</t></i></r>";
        let v = run(doc, "r.i.#.t");
        assert_eq!(v.kind, Kind::Array);
        assert_eq!(v.members().len(), 2);
        assert_eq!(v.members()[0].as_str(), "a");
    }

    #[test]
    fn test_field_extraction_attribute() {
        let doc = "<r><i id=\"1\"/><i id=\"2\"/></r>";
        let v = run(doc, "r.i.#.@id");
        assert_eq!(v.members().len(), 2);
        assert_eq!(v.members()[1].as_str(), "2");
    }

    #[test]
    fn test_wildcard() {
        let doc = "<r><a>1</a><b>2</b></r>";
        let v = run(doc, "r.*");
        assert_eq!(v.kind, Kind::Array);
        assert_eq!(v.members().len(), 2);
        assert_eq!(v.members()[1].as_str(), "2");
    }

    #[test]
    fn test_recursive_wildcard() {
        let doc = "<r><a><t>x</t></a><b><c><t>y</t></c></b></r>";
        let v = run(doc, "r.**.t");
        assert_eq!(v.kind, Kind::Array);
        assert_eq!(v.members().len(), 2);
        assert_eq!(v.members()[0].as_str(), "x");
        assert_eq!(v.members()[1].as_str(), "y");
    }

    #[test]
    fn test_direct_text_excludes_nested() {
        let doc = "<r>hello <b>bold</b> world</r>";
        assert_eq!(run(doc, "r.%").as_str(), "hello  world");
    }

    #[test]
    fn test_direct_text_includes_cdata() {
        let doc = "<r>a<![CDATA[<raw>]]>b</r>";
        assert_eq!(run(doc, "r.%").as_str(), "a<raw>b");
    }

    #[test]
    fn test_entity_decoding_in_text() {
        let doc = "<r><t>a &lt;b&gt; &amp; c</t></r>";
        assert_eq!(run(doc, "r.t").as_str(), "a <b> & c");
    }

    #[test]
    fn test_element_value_with_children() {
        let doc = "<r><a><b>x</b></a></r>";
        let v = run(doc, "r.a");
        assert_eq!(v.kind, Kind::Element);
        assert_eq!(v.raw(), "<b>x</b>");
    }

    #[test]
    fn test_case_insensitive_mode() {
        let doc = "<Root><Item>x</Item></Root>";
        let opts = Options {
            case_sensitive: false,
            ..Options::default()
        };
        let compiled = compile("root.item").unwrap();
        assert_eq!(execute(doc.as_bytes(), &compiled, &opts).as_str(), "x");
        assert!(!run(doc, "root.item").exists());
    }

    #[test]
    fn test_multi_root_fragment() {
        let doc = "<item>a</item><item>b</item>";
        assert_eq!(run(doc, "item.1").as_str(), "b");
        assert_eq!(run(doc, "item.#").i64(), 2);
    }

    #[test]
    fn test_malformed_degrades_to_null() {
        assert!(!run("<a><b>x", "a.b").exists());
        assert!(!run("<a><b>x</c></a>", "a.b").exists());
    }

    #[test]
    fn test_doctype_and_prolog_skipped() {
        let doc = "<?xml version=\"1.0\"?><!DOCTYPE r [<!ENTITY e \"v\">]><r><t>x</t></r>";
        assert_eq!(run(doc, "r.t").as_str(), "x");
    }

    #[test]
    fn test_entity_reference_not_expanded() {
        let doc = "<!DOCTYPE r [<!ENTITY e \"v\">]><r><t>&e;</t></r>";
        assert_eq!(run(doc, "r.t").as_str(), "&e;");
    }

    #[test]
    fn test_append_sentinel_reads_null() {
        assert!(!run("<r><i>a</i></r>", "r.i.-1").exists());
    }

    #[test]
    fn test_deep_nesting_bounded() {
        let mut doc = String::new();
        for _ in 0..300 {
            doc.push_str("<d>");
        }
        doc.push('x');
        for _ in 0..300 {
            doc.push_str("</d>");
        }
        let path = vec!["d"; 300].join(".");
        // Must terminate and not panic; depth ceiling makes this absent
        let v = run(&doc, &path);
        assert!(!v.exists());
    }
}
