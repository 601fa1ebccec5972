//! Depth-first evaluation of a compiled rule tree against a byte buffer.

use crate::{
    entry::{EntryId, MagicEntry, OffsetExpr},
    magic_set::MagicSet,
    matcher::{Operation, StrTest, Value},
};
use once_cell::sync::Lazy;

/// Aggregate state of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    NoMatch,
    /// A criterion matched but contributed no description.
    PartialMatch,
    FullMatch,
}

/// Scratch accumulated while walking one root; read-only afterwards.
#[derive(Debug)]
pub struct MatchingResult {
    pub(crate) state: MatchState,
    pub(crate) level: usize,
    pub(crate) description: String,
    pub(crate) mime: Option<String>,
}

impl MatchingResult {
    fn new() -> Self {
        Self {
            state: MatchState::NoMatch,
            level: 0,
            description: String::new(),
            mime: None,
        }
    }

    pub fn state(&self) -> MatchState {
        self.state
    }

    /// Deepest level at which an entry matched.
    pub fn matching_level(&self) -> usize {
        self.level
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    /// Messages join with a single space; a leading backspace (decoded
    /// `\b`) eats the separator.
    fn append_description(&mut self, msg: &str) {
        match msg.strip_prefix('\u{8}') {
            Some(rest) => self.description.push_str(rest.trim_start_matches('\u{8}')),
            None => {
                if !self.description.is_empty() && !msg.is_empty() {
                    self.description.push(' ');
                }
                self.description.push_str(msg);
            }
        }
    }
}

/// The answer of [`MagicSet::find`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentInfo {
    pub description: String,
    pub mime: Option<String>,
    /// First token of the description; `unknown` for partial matches.
    pub name: String,
    pub partial: bool,
}

static EMPTY: Lazy<ContentInfo> = Lazy::new(|| ContentInfo {
    description: "empty".to_owned(),
    mime: None,
    name: "empty".to_owned(),
    partial: false,
});

impl ContentInfo {
    /// The distinguished result for zero-length buffers.
    pub fn empty() -> &'static Self {
        &EMPTY
    }

    fn from_result(r: MatchingResult) -> Self {
        let name = r
            .description
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_owned();
        Self {
            description: r.description,
            mime: r.mime,
            name,
            partial: r.state == MatchState::PartialMatch,
        }
    }
}

/// A text criterion that matched without a message still describes the
/// buffer by what it matched. Numeric criteria and instructions stay
/// silent, which is what makes partial matches possible.
fn fallback_text(op: &Operation, value: Option<&Value>) -> Option<String> {
    let text_literal = match op {
        Operation::Str(t) => matches!(t.test, StrTest::Literal(_)),
        Operation::Search(_) | Operation::String16(_) | Operation::Pstring(_) => true,
        _ => false,
    };
    if !text_literal {
        return None;
    }
    match value {
        Some(Value::Bytes(b)) => Some(String::from_utf8_lossy(b).into_owned()),
        Some(Value::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

pub(crate) struct Evaluator<'a> {
    set: &'a MagicSet,
    buf: &'a [u8],
    /// Nested `use`/`indirect` invocations above this frame.
    depth: usize,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(set: &'a MagicSet, buf: &'a [u8]) -> Self {
        Self { set, buf, depth: 0 }
    }

    pub(crate) fn find(&self) -> Option<ContentInfo> {
        if self.buf.is_empty() {
            return Some(ContentInfo::empty().clone());
        }
        self.scan().map(ContentInfo::from_result)
    }

    /// Indexed candidates first; the main root list only for a FULL match
    /// the index did not produce. The first PARTIAL seen anywhere is the
    /// fallback.
    fn scan(&self) -> Option<MatchingResult> {
        let mut partial: Option<MatchingResult> = None;
        let slot = self.set.index_slot(self.buf[0]);
        for &id in slot {
            if let Some(full) = self.eval_root(id, &mut partial) {
                return Some(full);
            }
        }
        for &id in self.set.roots() {
            if slot.contains(&id) {
                continue;
            }
            if let Some(full) = self.eval_root(id, &mut partial) {
                return Some(full);
            }
        }
        partial
    }

    /// Returns a FULL result, stashing the first PARTIAL into `partial`.
    fn eval_root(&self, id: EntryId, partial: &mut Option<MatchingResult>) -> Option<MatchingResult> {
        let mut result = MatchingResult::new();
        if !self.walk(id, 0, false, &mut result) {
            return None;
        }
        if result.description.is_empty() {
            result.state = MatchState::PartialMatch;
            if partial.is_none() {
                *partial = Some(result);
            }
            None
        } else {
            result.state = MatchState::FullMatch;
            Some(result)
        }
    }

    fn walk(&self, id: EntryId, parent_end: usize, invert: bool, out: &mut MatchingResult) -> bool {
        let entry = self.set.entry(id);
        let Some(offset) = self.resolve_offset(&entry.offset, parent_end) else {
            return false;
        };
        match &entry.op {
            Operation::Use { ident, flip_endian } => {
                self.walk_use(entry, ident, offset, invert, *flip_endian, out)
            }
            Operation::Indirect { .. } => self.walk_indirect(entry, offset, invert, out),
            op => {
                let Some(hit) = op.matches(self.buf, offset, invert) else {
                    return false;
                };
                self.emit(entry, hit.value.as_ref(), out);
                self.walk_children(entry, hit.end, invert, out);
                true
            }
        }
    }

    fn emit(&self, entry: &MagicEntry, value: Option<&Value>, out: &mut MatchingResult) {
        if let Some(template) = &entry.message {
            let rendered = self.set.formatter().format(template, value);
            out.append_description(&rendered);
        } else if let Some(text) = fallback_text(&entry.op, value) {
            out.append_description(&text);
        }
        if out.mime.is_none() {
            out.mime.clone_from(&entry.mime);
        }
        out.level = out.level.max(entry.level);
    }

    /// Children in order; `default` entries run only when no non-optional
    /// sibling matched. Optional children still append output on success
    /// but stay out of the sibling-group decision.
    fn walk_children(
        &self,
        entry: &MagicEntry,
        parent_end: usize,
        invert: bool,
        out: &mut MatchingResult,
    ) {
        let mut any = false;
        for &child in &entry.children {
            let node = self.set.entry(child);
            if matches!(node.op, Operation::Default) {
                continue;
            }
            if self.walk(child, parent_end, invert, out) && !node.optional {
                any = true;
            }
        }
        if any {
            return;
        }
        for &child in &entry.children {
            if matches!(self.set.entry(child).op, Operation::Default) {
                self.walk(child, parent_end, invert, out);
            }
        }
    }

    /// Invoke a named pattern at `offset`. The target subtree sees the
    /// buffer tail, so its offsets count from the invocation point.
    fn walk_use(
        &self,
        entry: &MagicEntry,
        ident: &str,
        offset: usize,
        invert: bool,
        flip: bool,
        out: &mut MatchingResult,
    ) -> bool {
        if self.depth >= self.set.options().max_recursion {
            return false;
        }
        let Some(target) = self.set.named_lookup(ident) else {
            return false;
        };
        self.emit(entry, None, out);
        let sub = Evaluator {
            set: self.set,
            buf: &self.buf[offset..],
            depth: self.depth + 1,
        };
        sub.walk(target, 0, invert ^ flip, out);
        self.walk_children(entry, offset, invert, out);
        true
    }

    /// Re-enter the whole rule set at `offset`; matches only if that scan
    /// produces a full result.
    fn walk_indirect(
        &self,
        entry: &MagicEntry,
        offset: usize,
        invert: bool,
        out: &mut MatchingResult,
    ) -> bool {
        if self.depth >= self.set.options().max_recursion {
            return false;
        }
        let sub = Evaluator {
            set: self.set,
            buf: &self.buf[offset..],
            depth: self.depth + 1,
        };
        let Some(inner) = sub.scan() else {
            return false;
        };
        if inner.state != MatchState::FullMatch {
            return false;
        }
        self.emit(entry, None, out);
        out.append_description(&inner.description);
        if out.mime.is_none() {
            out.mime = inner.mime;
        }
        self.walk_children(entry, offset, invert, out);
        true
    }

    /// Compute the absolute read position, or `None` when any read leaves
    /// the buffer. Positions in `[0, len]` are valid.
    fn resolve_offset(&self, expr: &OffsetExpr, parent_end: usize) -> Option<usize> {
        let len = self.buf.len() as i64;
        let absolute = match expr {
            OffsetExpr::Absolute(n) => *n,
            OffsetExpr::Relative(n) => (parent_end as i64).checked_add(*n)?,
            OffsetExpr::Indirect(ind) => {
                let base = ind
                    .base
                    .checked_add(if ind.relative { parent_end as i64 } else { 0 })?;
                if base < 0 {
                    return None;
                }
                let read = ind.read;
                let mut value = if read.id3 {
                    read.order.decode_id3(self.buf, base as usize)? as i64
                } else {
                    read.order
                        .decode_int(self.buf, base as usize, read.width as usize)?
                };
                if let Some((op, operand)) = ind.op {
                    value = op.apply(value, operand)?;
                }
                value
            }
        };
        (0..=len).contains(&absolute).then(|| absolute as usize)
    }
}
