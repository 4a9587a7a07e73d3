//! Mutation builder
//!
//! Every write is a splice: locate the target's byte range, replace it,
//! and return a new buffer. The original document is never touched.
//! Validation happens eagerly, before any locate work, so a malformed
//! document is rejected with a typed error instead of silently mangled.
//!
//! Mutation paths are a restricted subset of the query language: literal
//! names, ordinals and filters to steer, plus a terminal attribute or
//! append sentinel. Wildcards, counts and extraction segments address
//! many nodes at once and are rejected.

use crate::core::element::{names_equal, ElementLocation};
use crate::core::entities;
use crate::core::limits::{MAX_BASE_OFFSET, MAX_DOCUMENT_SIZE, MAX_VALUE_SIZE, RECURSIVE_OP_BUDGET};
use crate::path::{compile_cached, PathSegment, SegmentKind};
use crate::query::{self, ChildIter};
use crate::{validate, Error, Options, SetValue};
use std::cell::Cell;
use std::ops::Range;

/// Apply one mutation and return the new document bytes.
pub(crate) fn apply(
    doc: &[u8],
    path: &str,
    value: &SetValue,
    opts: &Options,
) -> Result<Vec<u8>, Error> {
    if doc.len() > MAX_DOCUMENT_SIZE {
        return Err(Error::malformed("document exceeds size ceiling"));
    }
    if let Err((pos, msg)) = validate::check(doc) {
        return Err(Error::malformed(format!("{} at byte {}", msg, pos)));
    }

    let compiled = compile_cached(path)?;
    if !compiled.modifiers.is_empty() {
        return Err(Error::invalid_path("modifiers are not allowed in mutation paths"));
    }
    // Work on a copy: the cached path is shared across callers and must
    // never be altered while append intent is resolved.
    let segments: Vec<PathSegment> = compiled.segments.clone();
    check_mutable(&segments)?;

    let b = Builder {
        doc,
        opts,
        budget: Cell::new(RECURSIVE_OP_BUDGET),
    };
    match value {
        SetValue::Delete => b.delete(&segments),
        _ => {
            let payload = encode_value(value)?;
            b.set(&segments, &payload)
        }
    }
}

/// Reject segments that cannot address a single mutation target.
fn check_mutable(segs: &[PathSegment]) -> Result<(), Error> {
    if segs.len() > crate::core::limits::MAX_NESTING_DEPTH {
        return Err(Error::invalid_path("path exceeds nesting ceiling"));
    }
    let last = segs.len() - 1;
    for (i, seg) in segs.iter().enumerate() {
        match seg.kind {
            SegmentKind::ElementName | SegmentKind::Filter => {}
            SegmentKind::Index if seg.index >= 0 => {}
            SegmentKind::Index if seg.is_append() => {
                if i != last {
                    return Err(Error::invalid_path(
                        "nested paths not supported after append",
                    ));
                }
                if i == 0 || segs[i - 1].kind != SegmentKind::ElementName {
                    return Err(Error::invalid_path(
                        "append must follow an element name",
                    ));
                }
            }
            SegmentKind::Attribute => {
                if i != last {
                    return Err(Error::invalid_path(
                        "attribute segment must be the final segment",
                    ));
                }
                if i == 0 {
                    return Err(Error::invalid_path(
                        "attribute segment requires an element path",
                    ));
                }
            }
            _ => {
                return Err(Error::invalid_path(
                    "wildcards, counts and extraction segments cannot be mutated",
                ));
            }
        }
    }
    Ok(())
}

/// The content to splice in. `raw` payloads skip entity encoding.
struct Payload {
    text: String,
    raw: bool,
}

impl Payload {
    fn rendered(&self) -> String {
        if self.raw {
            self.text.clone()
        } else {
            entities::encode(&self.text).into_owned()
        }
    }
}

fn encode_value(value: &SetValue) -> Result<Payload, Error> {
    let payload = match value {
        SetValue::Text(s) => Payload {
            text: s.clone(),
            raw: false,
        },
        SetValue::Int(n) => Payload {
            text: n.to_string(),
            raw: false,
        },
        SetValue::Float(n) => Payload {
            text: crate::query::value::format_number(*n),
            raw: false,
        },
        SetValue::Bool(b) => Payload {
            text: if *b { "true" } else { "false" }.to_string(),
            raw: false,
        },
        SetValue::Raw(s) => {
            validate::check_fragment(s.as_bytes()).map_err(Error::invalid_value)?;
            Payload {
                text: s.clone(),
                raw: true,
            }
        }
        SetValue::Delete => {
            return Err(Error::invalid_value("delete is not a settable value"));
        }
    };
    if payload.text.len() > MAX_VALUE_SIZE {
        return Err(Error::invalid_value("value exceeds size ceiling"));
    }
    Ok(payload)
}

struct Builder<'a> {
    doc: &'a [u8],
    opts: &'a Options,
    budget: Cell<usize>,
}

impl<'a> Builder<'a> {
    fn children<'b>(&'b self, scope: Range<usize>) -> ChildIter<'a, 'b> {
        ChildIter::new(self.doc, scope, &self.budget)
    }

    fn matching<'b>(
        &'b self,
        scope: Range<usize>,
        name: &'b str,
    ) -> impl Iterator<Item = ElementLocation> + 'b {
        let case_sensitive = self.opts.case_sensitive;
        self.children(scope)
            .filter(move |loc| names_equal(&loc.name, name, case_sensitive))
    }

    /// Resolve a segment list to one element, or None when a step finds
    /// no match. Only name, ordinal and filter steps reach here.
    fn locate(
        &self,
        scope: Range<usize>,
        segs: &[PathSegment],
    ) -> Result<Option<ElementLocation>, Error> {
        if scope.start > MAX_BASE_OFFSET {
            return Err(Error::malformed("document offset overflow"));
        }
        let seg = match segs.first() {
            Some(s) => s,
            None => return Ok(None),
        };

        let (loc, rest) = match seg.kind {
            SegmentKind::ElementName => match segs.get(1) {
                Some(next) if next.kind == SegmentKind::Index && next.index >= 0 => {
                    let loc = self
                        .matching(scope, &seg.literal)
                        .nth(next.index as usize);
                    (loc, &segs[2..])
                }
                Some(next) if next.kind == SegmentKind::Filter => {
                    let expr = match &next.filter {
                        Some(e) => e,
                        None => return Ok(None),
                    };
                    let mut found = None;
                    let candidates: Vec<ElementLocation> =
                        self.matching(scope, &seg.literal).collect();
                    for loc in candidates {
                        let operand =
                            query::filter_operand_for(self.doc, &loc, &expr.path, self.opts);
                        if operand.map(|v| expr.compare(&v)).unwrap_or(false) {
                            found = Some(loc);
                            break;
                        }
                    }
                    (found, &segs[2..])
                }
                _ => {
                    let loc = self.matching(scope, &seg.literal).next();
                    (loc, &segs[1..])
                }
            },
            SegmentKind::Index if seg.index >= 0 => {
                let loc = self.children(scope).nth(seg.index as usize);
                (loc, &segs[1..])
            }
            _ => return Ok(None),
        };

        match loc {
            None => Ok(None),
            Some(l) if rest.is_empty() => Ok(Some(l)),
            Some(l) => self.locate(l.content_start..l.content_end, rest),
        }
    }

    fn set(&self, segs: &[PathSegment], payload: &Payload) -> Result<Vec<u8>, Error> {
        let last = &segs[segs.len() - 1];
        match last.kind {
            SegmentKind::Attribute => self.set_attribute(segs, payload),
            SegmentKind::Index if last.is_append() => self.append(segs, payload),
            _ => self.set_element(segs, payload),
        }
    }

    fn set_element(&self, segs: &[PathSegment], payload: &Payload) -> Result<Vec<u8>, Error> {
        match self.locate(0..self.doc.len(), segs)? {
            Some(loc) if loc.self_closing => {
                // `<tag .../>` becomes `<tag ...>payload</tag>`
                let expanded = format!(
                    "{}>{}</{}>",
                    self.tag_text_without_slash(&loc),
                    payload.rendered(),
                    loc.name
                );
                self.splice(loc.open_start..loc.close_end, &expanded)
            }
            Some(loc) => self.splice(loc.content_start..loc.content_end, &payload.rendered()),
            None => self.create_chain(segs, payload),
        }
    }

    /// `path.to.name.-1` — insert a new sibling after the last match,
    /// or at the end of the parent's content when none exist yet.
    fn append(&self, segs: &[PathSegment], payload: &Payload) -> Result<Vec<u8>, Error> {
        let name = &segs[segs.len() - 2].literal;
        let parent_segs = &segs[..segs.len() - 2];
        let element = format!("<{}>{}</{}>", name, payload.rendered(), name);

        let scope = if parent_segs.is_empty() {
            0..self.doc.len()
        } else {
            match self.locate(0..self.doc.len(), parent_segs)? {
                Some(p) if p.self_closing => {
                    let expanded = format!(
                        "{}>{}</{}>",
                        self.tag_text_without_slash(&p),
                        element,
                        p.name
                    );
                    return self.splice(p.open_start..p.close_end, &expanded);
                }
                Some(p) => p.content_start..p.content_end,
                // Missing parent: create the whole chain with the new
                // element as its first member.
                None => return self.create_chain(&segs[..segs.len() - 1], payload),
            }
        };

        let insert_at = self
            .matching(scope.clone(), name)
            .last()
            .map(|loc| loc.close_end)
            .unwrap_or(scope.end);
        self.splice(insert_at..insert_at, &element)
    }

    /// Build the missing suffix of a path as nested elements inside the
    /// deepest ancestor that does exist.
    fn create_chain(&self, segs: &[PathSegment], payload: &Payload) -> Result<Vec<u8>, Error> {
        for split in (1..segs.len()).rev() {
            if let Some(anc) = self.locate(0..self.doc.len(), &segs[..split])? {
                let missing = &segs[split..];
                let nested = nested_markup(missing, payload)?;
                return self.insert_into(&anc, &nested);
            }
        }

        // No ancestor matched: the chain starts at the top level, after
        // any existing root elements (or into an empty document).
        let nested = nested_markup(segs, payload)?;
        let insert_at = self
            .children(0..self.doc.len())
            .last()
            .map(|loc| loc.close_end)
            .unwrap_or(self.doc.len());
        self.splice(insert_at..insert_at, &nested)
    }

    /// Insert markup at the end of an element's content, expanding a
    /// self-closing tag first.
    fn insert_into(&self, loc: &ElementLocation, markup: &str) -> Result<Vec<u8>, Error> {
        if loc.self_closing {
            let expanded = format!(
                "{}>{}</{}>",
                self.tag_text_without_slash(loc),
                markup,
                loc.name
            );
            self.splice(loc.open_start..loc.close_end, &expanded)
        } else {
            self.splice(loc.content_end..loc.content_end, markup)
        }
    }

    fn set_attribute(&self, segs: &[PathSegment], payload: &Payload) -> Result<Vec<u8>, Error> {
        if payload.raw {
            return Err(Error::invalid_value(
                "raw fragments cannot be attribute values",
            ));
        }
        let attr = &segs[segs.len() - 1].literal;
        let parent_segs = &segs[..segs.len() - 1];

        match self.locate(0..self.doc.len(), parent_segs)? {
            Some(p) => self.rebuild_tag(&p, Some((attr, &payload.text)), None),
            None => {
                // Create the element chain empty, then re-run against the
                // new buffer to place the attribute.
                let empty = Payload {
                    text: String::new(),
                    raw: false,
                };
                let created = self.create_chain(parent_segs, &empty)?;
                let b = Builder {
                    doc: &created,
                    opts: self.opts,
                    budget: Cell::new(RECURSIVE_OP_BUDGET),
                };
                match b.locate(0..created.len(), parent_segs)? {
                    Some(p) => b.rebuild_tag(&p, Some((attr, &payload.text)), None),
                    None => Err(Error::invalid_path("cannot create attribute parent")),
                }
            }
        }
    }

    fn delete(&self, segs: &[PathSegment]) -> Result<Vec<u8>, Error> {
        let last = &segs[segs.len() - 1];
        if last.is_append() {
            return Err(Error::invalid_path("cannot delete an append target"));
        }
        if last.kind == SegmentKind::Attribute {
            let attr = &last.literal;
            let parent_segs = &segs[..segs.len() - 1];
            return match self.locate(0..self.doc.len(), parent_segs)? {
                Some(p) if p.attr(attr, self.opts.case_sensitive).is_some() => {
                    self.rebuild_tag(&p, None, Some(attr))
                }
                // Absent attribute or element: the document is unchanged
                _ => Ok(self.doc.to_vec()),
            };
        }
        match self.locate(0..self.doc.len(), segs)? {
            Some(loc) => self.splice(loc.open_start..loc.close_end, ""),
            None => Ok(self.doc.to_vec()),
        }
    }

    /// Rewrite an element's opening tag with one attribute set or
    /// removed. Attributes are emitted sorted by name so repeated
    /// mutations produce identical bytes.
    fn rebuild_tag(
        &self,
        loc: &ElementLocation,
        set: Option<(&str, &str)>,
        remove: Option<&str>,
    ) -> Result<Vec<u8>, Error> {
        let mut attrs = loc.attributes.clone();
        if let Some((name, value)) = set {
            match attrs
                .iter_mut()
                .find(|(k, _)| names_equal(k, name, self.opts.case_sensitive))
            {
                Some(pair) => pair.1 = value.to_string(),
                None => attrs.push((name.to_string(), value.to_string())),
            }
        }
        if let Some(name) = remove {
            attrs.retain(|(k, _)| !names_equal(k, name, self.opts.case_sensitive));
        }
        attrs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut tag = String::with_capacity(loc.name.len() + attrs.len() * 16 + 3);
        tag.push('<');
        tag.push_str(&loc.name);
        for (k, v) in &attrs {
            tag.push(' ');
            tag.push_str(k);
            tag.push_str("=\"");
            tag.push_str(&entities::encode(v));
            tag.push('"');
        }
        if loc.self_closing {
            tag.push_str("/>");
            self.splice(loc.open_start..loc.close_end, &tag)
        } else {
            tag.push('>');
            self.splice(loc.open_start..loc.content_start, &tag)
        }
    }

    /// Opening tag text with the trailing `/>` stripped back to the
    /// attribute list, for expanding a self-closing element.
    fn tag_text_without_slash(&self, loc: &ElementLocation) -> String {
        let raw = &self.doc[loc.open_start..loc.close_end];
        let mut end = raw.len();
        while end > 0 && (raw[end - 1] == b'>' || raw[end - 1] == b'/') {
            end -= 1;
        }
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }

    fn splice(&self, range: Range<usize>, replacement: &str) -> Result<Vec<u8>, Error> {
        if range.start > range.end || range.end > self.doc.len() {
            return Err(Error::malformed("splice range out of bounds"));
        }
        let mut out =
            Vec::with_capacity(self.doc.len() - range.len() + replacement.len());
        out.extend_from_slice(&self.doc[..range.start]);
        out.extend_from_slice(replacement.as_bytes());
        out.extend_from_slice(&self.doc[range.end..]);
        if out.len() > MAX_DOCUMENT_SIZE {
            return Err(Error::invalid_value("mutation exceeds document size ceiling"));
        }
        Ok(out)
    }
}

/// `<a><b>payload</b></a>` for a run of plain name segments.
fn nested_markup(segs: &[PathSegment], payload: &Payload) -> Result<String, Error> {
    for seg in segs {
        if seg.kind != SegmentKind::ElementName {
            return Err(Error::invalid_path(
                "only plain element names can be created",
            ));
        }
    }
    let mut out = String::new();
    for seg in segs {
        out.push('<');
        out.push_str(&seg.literal);
        out.push('>');
    }
    out.push_str(&payload.rendered());
    for seg in segs.iter().rev() {
        out.push_str("</");
        out.push_str(&seg.literal);
        out.push('>');
    }
    Ok(out)
}
