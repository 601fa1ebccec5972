//! The compiled rule set: entry arena, name table, first-byte index and
//! the public API surface.

use crate::{
    entry::{EntryId, MagicEntry, OffsetExpr},
    eval::{ContentInfo, Evaluator},
    format::{Formatter, PrintfFormatter},
    matcher::Operation,
    parser::{self, ParseErrorKind, ParsedLine, RawEntry, RuleError},
};
use ahash::{HashMap, HashMapExt};
use educe::Educe;
use log::{error, warn};
use std::io::{self, BufRead};

/// Tunable limits of parsing and evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagicSetOptions {
    /// Deepest `>` nesting the parser accepts.
    pub max_levels: usize,
    /// Ceiling on nested `use`/`indirect` invocations per evaluation.
    pub max_recursion: usize,
    /// Honor `!:optional` directives.
    pub honor_optional: bool,
    /// Build the first-byte index at finalize.
    pub index_roots: bool,
}

impl Default for MagicSetOptions {
    fn default() -> Self {
        Self {
            max_levels: 20,
            max_recursion: 15,
            honor_optional: true,
            index_roots: true,
        }
    }
}

/// An immutable-after-[`finalize`](Self::finalize) database of magic rules.
///
/// Built once from one or more rule readers, then consulted from any number
/// of threads; evaluation allocates only per-call scratch.
#[derive(Educe)]
#[educe(Debug)]
pub struct MagicSet {
    options: MagicSetOptions,
    entries: Vec<MagicEntry>,
    roots: Vec<EntryId>,
    names: HashMap<String, EntryId>,
    /// Slot `b` lists roots whose buffers must start with byte `b`.
    index: Vec<Vec<EntryId>>,
    finalized: bool,
    #[educe(Debug(ignore))]
    formatter: Box<dyn Formatter>,
}

impl Default for MagicSet {
    fn default() -> Self {
        Self::new()
    }
}

impl MagicSet {
    pub fn new() -> Self {
        Self::with_options(MagicSetOptions::default())
    }

    pub fn with_options(options: MagicSetOptions) -> Self {
        Self {
            options,
            entries: Vec::new(),
            roots: Vec::new(),
            names: HashMap::new(),
            index: Vec::new(),
            finalized: false,
            formatter: Box::new(PrintfFormatter),
        }
    }

    /// Parse rule lines, logging skipped lines through the `log` facade.
    pub fn add_rules<R: BufRead>(&mut self, reader: R) -> io::Result<()> {
        self.add_rules_with(reader, &mut |e| error!("skipping magic line: {e}"))
    }

    /// Parse rule lines, reporting each skipped line to `on_error`. Only
    /// I/O errors from `reader` abort the build.
    pub fn add_rules_with<R: BufRead>(
        &mut self,
        mut reader: R,
        on_error: &mut dyn FnMut(RuleError<'_>),
    ) -> io::Result<()> {
        let mut last_at_level: Vec<Option<EntryId>> = vec![None; self.options.max_levels + 1];
        let mut last_entry: Option<EntryId> = None;
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            while line.last().is_some_and(|&b| b == b'\n' || b == b'\r') {
                line.pop();
            }
            match parser::parse_line(&line) {
                Ok(ParsedLine::Ignored) => {}
                Ok(ParsedLine::Mime(mime)) => {
                    if let Some(id) = last_entry {
                        self.entries[id.idx()].mime = Some(mime);
                    }
                }
                Ok(ParsedLine::Optional) => {
                    if self.options.honor_optional {
                        if let Some(id) = last_entry {
                            self.entries[id.idx()].optional = true;
                        }
                    }
                }
                Ok(ParsedLine::Entry(raw)) => match self.attach(raw, &mut last_at_level) {
                    Ok(id) => last_entry = Some(id),
                    Err(kind) => on_error(RuleError {
                        line: String::from_utf8_lossy(&line),
                        kind,
                    }),
                },
                Err(kind) => on_error(RuleError {
                    line: String::from_utf8_lossy(&line),
                    kind,
                }),
            }
        }
        self.finalized = false;
        Ok(())
    }

    fn attach(
        &mut self,
        raw: RawEntry,
        last_at_level: &mut [Option<EntryId>],
    ) -> Result<EntryId, ParseErrorKind> {
        if raw.level > self.options.max_levels {
            return Err(ParseErrorKind::InvalidLevel(raw.level));
        }
        let parent = if raw.level == 0 {
            None
        } else {
            Some(last_at_level[raw.level - 1].ok_or(ParseErrorKind::Orphan(raw.level))?)
        };
        let id = EntryId(self.entries.len() as u32);
        self.entries.push(MagicEntry {
            level: raw.level,
            offset: raw.offset,
            typ: raw.typ,
            op: raw.op,
            message: raw.message,
            mime: None,
            optional: false,
            children: Vec::new(),
        });
        if let Operation::Name(ident) = &self.entries[id.idx()].op {
            // later definitions win
            self.names.insert(ident.clone(), id);
        }
        match parent {
            Some(parent) => self.entries[parent.idx()].children.push(id),
            // name entries are callable targets, not scan roots
            None => {
                if !matches!(self.entries[id.idx()].op, Operation::Name(_)) {
                    self.roots.push(id);
                }
            }
        }
        last_at_level[raw.level] = Some(id);
        Ok(id)
    }

    /// Build the first-byte index and check `use` targets. Idempotent.
    pub fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.index = vec![Vec::new(); 256];
        if self.options.index_roots {
            for &id in &self.roots {
                let entry = &self.entries[id.idx()];
                if entry.offset != OffsetExpr::Absolute(0) {
                    continue;
                }
                if let Some(bytes) = entry.op.starting_bytes() {
                    if let Some(&first) = bytes.first() {
                        self.index[first as usize].push(id);
                    }
                }
            }
        }
        for entry in &self.entries {
            if let Operation::Use { ident, .. } = &entry.op {
                if !self.names.contains_key(ident) {
                    warn!("use references unknown pattern {ident:?}");
                }
            }
        }
        self.finalized = true;
    }

    /// Identify `buf`. `None` when nothing matched, not even partially.
    pub fn find(&self, buf: &[u8]) -> Option<ContentInfo> {
        Evaluator::new(self, buf).find()
    }

    /// Resolve a `name` pattern registered by the rules.
    pub fn named_lookup(&self, ident: &str) -> Option<EntryId> {
        self.names.get(ident).copied()
    }

    pub fn get(&self, id: EntryId) -> Option<&MagicEntry> {
        self.entries.get(id.idx())
    }

    /// Replace the message formatter.
    pub fn set_formatter(&mut self, formatter: Box<dyn Formatter>) {
        self.formatter = formatter;
    }

    pub(crate) fn entry(&self, id: EntryId) -> &MagicEntry {
        &self.entries[id.idx()]
    }

    pub(crate) fn roots(&self) -> &[EntryId] {
        &self.roots
    }

    pub(crate) fn index_slot(&self, byte: u8) -> &[EntryId] {
        self.index
            .get(byte as usize)
            .map_or(&[][..], Vec::as_slice)
    }

    pub(crate) fn options(&self) -> &MagicSetOptions {
        &self.options
    }

    pub(crate) fn formatter(&self) -> &dyn Formatter {
        &*self.formatter
    }
}

#[cfg(test)]
mod tests;
