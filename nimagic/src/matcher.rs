//! Value extraction and comparison criteria of rule entries.

use crate::{
    endian::{ByteOrder, EncodedBytes},
    entry::{CompareOp, NumFlavor, NumType, StrFlags},
};
use educe::Educe;
use log::error;
use once_cell::sync::OnceCell;
use regex::bytes::{Regex, RegexBuilder};

/// Candidate positions examined by `search` when no count is given.
pub(crate) const DEFAULT_SEARCH_RANGE: usize = 8192;
/// Hard cap on the window a `regex` test examines.
pub(crate) const MAX_REGEX_WINDOW: usize = 8192;
/// Lines included in a `regex` window when no count is given.
pub(crate) const DEFAULT_REGEX_LINES: usize = 1;

/// A value extracted from the buffer, consumed by the message formatter.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Str(String),
}

/// Successful criterion evaluation: the extracted value (if the criterion
/// reads one) and the position just past the read window.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Hit {
    pub value: Option<Value>,
    pub end: usize,
}

impl Hit {
    fn new(value: Value, end: usize) -> Self {
        Self {
            value: Some(value),
            end,
        }
    }

    pub(crate) fn empty(end: usize) -> Self {
        Self { value: None, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum NumTest {
    /// The `x` test: match anything, extract the value.
    Any,
    Int(i64),
    Float(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct NumericTest {
    pub num: NumType,
    pub mask: Option<u64>,
    pub op: CompareOp,
    pub test: NumTest,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StrTest {
    Any,
    Literal(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StringTest {
    pub op: CompareOp,
    pub flags: StrFlags,
    pub test: StrTest,
}

/// Length-prefix layout of a `pstring`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PstrPrefix {
    pub order: ByteOrder,
    pub width: u8,
    /// `J`: the stored length counts the prefix bytes too.
    pub includes_self: bool,
}

impl Default for PstrPrefix {
    fn default() -> Self {
        Self {
            order: ByteOrder::Big,
            width: 1,
            includes_self: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PstringTest {
    pub prefix: PstrPrefix,
    pub flags: StrFlags,
    pub op: CompareOp,
    pub expected: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SearchTest {
    pub expected: Vec<u8>,
    pub range: usize,
    pub flags: StrFlags,
}

#[derive(Debug, Educe)]
#[educe(PartialEq)]
pub(crate) struct RegexTest {
    pub pattern: Vec<u8>,
    pub lines: usize,
    pub case_insensitive: bool,
    /// `s`: window and `.` extend across newlines.
    pub match_newlines: bool,
    #[educe(PartialEq(ignore))]
    compiled: OnceCell<Option<Regex>>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct String16Test {
    pub order: ByteOrder,
    pub op: CompareOp,
    pub expected: Vec<u16>,
}

/// The operation a rule entry performs: a typed comparison criterion or a
/// control-flow instruction.
#[derive(Debug, PartialEq)]
pub(crate) enum Operation {
    Num(NumericTest),
    Str(StringTest),
    Pstring(PstringTest),
    Search(SearchTest),
    Regex(RegexTest),
    String16(String16Test),
    Name(String),
    Use { ident: String, flip_endian: bool },
    Indirect { relative: bool },
    Default,
}

impl RegexTest {
    pub(crate) fn new(
        pattern: Vec<u8>,
        lines: usize,
        case_insensitive: bool,
        match_newlines: bool,
    ) -> Self {
        Self {
            pattern,
            lines,
            case_insensitive,
            match_newlines,
            compiled: OnceCell::new(),
        }
    }

    /// Compiled on first use; a pattern that fails to compile never matches.
    fn regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| {
                let source = String::from_utf8_lossy(&self.pattern);
                RegexBuilder::new(&source)
                    .case_insensitive(self.case_insensitive)
                    .dot_matches_new_line(self.match_newlines)
                    .build()
                    .map_err(|e| error!("regex test {source:?} did not compile: {e}"))
                    .ok()
            })
            .as_ref()
    }
}

fn compare_int(op: CompareOp, value: i64, expected: i64) -> bool {
    match op {
        CompareOp::Equal => value == expected,
        CompareOp::NotEqual => value != expected,
        CompareOp::Less => value < expected,
        CompareOp::Greater => value > expected,
        CompareOp::AllSet => value & expected == expected,
        CompareOp::AllClear => value & expected == 0,
        CompareOp::Negated => value == !expected,
    }
}

fn compare_float(op: CompareOp, value: f64, expected: f64) -> bool {
    match op {
        CompareOp::Equal => value == expected,
        CompareOp::NotEqual => value != expected,
        CompareOp::Less => value < expected,
        CompareOp::Greater => value > expected,
        // bit operators are meaningless on floats
        CompareOp::AllSet | CompareOp::AllClear | CompareOp::Negated => false,
    }
}

fn byte_eq(expected: u8, actual: u8, flags: StrFlags) -> bool {
    if expected == actual {
        return true;
    }
    if flags.contains(StrFlags::LOWER_MATCH_BOTH)
        && expected.is_ascii_lowercase()
        && expected == actual.to_ascii_lowercase()
    {
        return true;
    }
    flags.contains(StrFlags::UPPER_MATCH_BOTH)
        && expected.is_ascii_uppercase()
        && expected == actual.to_ascii_uppercase()
}

/// Match `expected` against `buf[offset..]` honoring blank/case flags.
/// Returns the position just past the consumed input on success.
fn match_literal(expected: &[u8], buf: &[u8], offset: usize, flags: StrFlags) -> Option<usize> {
    let blanks = flags.intersects(StrFlags::COMPACT_BLANKS | StrFlags::OPTIONAL_BLANKS);
    let mut i = offset;
    let mut k = 0;
    while k < expected.len() {
        if blanks && expected[k] == b' ' {
            while k < expected.len() && expected[k] == b' ' {
                k += 1;
            }
            let run_start = i;
            while i < buf.len() && buf[i] == b' ' {
                i += 1;
            }
            if flags.contains(StrFlags::COMPACT_BLANKS) && i == run_start {
                return None;
            }
            continue;
        }
        if !byte_eq(expected[k], *buf.get(i)?, flags) {
            return None;
        }
        i += 1;
        k += 1;
    }
    Some(i)
}

/// Bytes at `offset` up to the first NUL, for `x` string tests and `%s`.
fn extract_c_string(buf: &[u8], offset: usize) -> Option<&[u8]> {
    let tail = buf.get(offset..)?;
    let end = memchr::memchr(0, tail).unwrap_or(tail.len());
    Some(&tail[..end])
}

fn eval_num(t: &NumericTest, buf: &[u8], offset: usize, invert: bool) -> Option<Hit> {
    let order = if invert {
        t.num.order.invert()
    } else {
        t.num.order
    };
    let width = t.num.width as usize;
    let end = offset.checked_add(width)?;
    match t.num.flavor {
        NumFlavor::Int | NumFlavor::Id3 => {
            let mut value = if t.num.flavor == NumFlavor::Id3 {
                order.decode_id3(buf, offset)? as i64
            } else {
                order.decode_int(buf, offset, width)?
            };
            if let Some(mask) = t.mask {
                value = (value as u64 & mask) as i64;
            }
            let matched = match t.test {
                NumTest::Any => true,
                NumTest::Int(expected) => compare_int(t.op, value, expected),
                NumTest::Float(_) => false,
            };
            matched.then(|| Hit::new(Value::Int(value), end))
        }
        NumFlavor::Float => {
            let value = f64::from(order.decode_f32(buf, offset)?);
            eval_float(t, value, end)
        }
        NumFlavor::Double => {
            let value = order.decode_f64(buf, offset)?;
            eval_float(t, value, end)
        }
    }
}

fn eval_float(t: &NumericTest, value: f64, end: usize) -> Option<Hit> {
    let matched = match t.test {
        NumTest::Any => true,
        NumTest::Float(expected) => compare_float(t.op, value, expected),
        NumTest::Int(expected) => compare_float(t.op, value, expected as f64),
    };
    matched.then(|| Hit::new(Value::Float(value), end))
}

fn eval_str(t: &StringTest, buf: &[u8], offset: usize) -> Option<Hit> {
    match &t.test {
        StrTest::Any => {
            let s = extract_c_string(buf, offset)?;
            Some(Hit::new(Value::Bytes(s.to_vec()), offset + s.len()))
        }
        StrTest::Literal(expected) => match t.op {
            CompareOp::Equal => {
                let end = match_literal(expected, buf, offset, t.flags)?;
                Some(Hit::new(Value::Bytes(buf[offset..end].to_vec()), end))
            }
            CompareOp::Less | CompareOp::Greater => {
                let tail = buf.get(offset..)?;
                let len = expected.len().min(tail.len());
                let slice = &tail[..len];
                let ord = slice.cmp(&expected[..]);
                let matched = if t.op == CompareOp::Less {
                    ord.is_lt()
                } else {
                    ord.is_gt()
                };
                if !matched {
                    return None;
                }
                let s = extract_c_string(buf, offset)?;
                Some(Hit::new(Value::Bytes(s.to_vec()), offset + s.len()))
            }
            _ => None,
        },
    }
}

fn eval_pstring(t: &PstringTest, buf: &[u8], offset: usize, invert: bool) -> Option<Hit> {
    let order = if invert {
        t.prefix.order.invert()
    } else {
        t.prefix.order
    };
    let prefix_width = t.prefix.width as usize;
    let stored = order.decode_uint(buf, offset, prefix_width)? as usize;
    let payload_len = if t.prefix.includes_self {
        stored.checked_sub(prefix_width)?
    } else {
        stored
    };
    let start = offset.checked_add(prefix_width)?;
    let end = start.checked_add(payload_len)?;
    let payload = buf.get(start..end)?;
    let matched = match t.op {
        CompareOp::Equal => match_literal(&t.expected, payload, 0, t.flags) == Some(payload.len()),
        CompareOp::Less => payload.cmp(&t.expected[..]).is_lt(),
        CompareOp::Greater => payload.cmp(&t.expected[..]).is_gt(),
        _ => false,
    };
    matched.then(|| Hit::new(Value::Bytes(payload.to_vec()), end))
}

fn eval_search(t: &SearchTest, buf: &[u8], offset: usize) -> Option<Hit> {
    if offset > buf.len() {
        return None;
    }
    if t.flags.is_empty() {
        // last permitted start is offset + range - 1
        let cap = offset
            .saturating_add(t.range)
            .saturating_add(t.expected.len().saturating_sub(1))
            .min(buf.len());
        let window = &buf[offset..cap];
        let pos = memchr::memmem::find(window, &t.expected)?;
        if pos >= t.range {
            return None;
        }
        let start = offset + pos;
        let end = start + t.expected.len();
        return Some(Hit::new(Value::Bytes(t.expected.clone()), end));
    }
    for pos in 0..t.range {
        let start = offset + pos;
        if start > buf.len() {
            return None;
        }
        if let Some(end) = match_literal(&t.expected, buf, start, t.flags) {
            return Some(Hit::new(Value::Bytes(buf[start..end].to_vec()), end));
        }
    }
    None
}

fn eval_regex(t: &RegexTest, buf: &[u8], offset: usize) -> Option<Hit> {
    if offset > buf.len() {
        return None;
    }
    let mut end = buf.len().min(offset + MAX_REGEX_WINDOW);
    if !t.match_newlines {
        if let Some(pos) = memchr::memchr_iter(b'\n', &buf[offset..end]).nth(t.lines.max(1) - 1) {
            end = offset + pos + 1;
        }
    }
    let found = t.regex()?.find(&buf[offset..end])?;
    Some(Hit::new(
        Value::Bytes(found.as_bytes().to_vec()),
        offset + found.end(),
    ))
}

fn eval_string16(t: &String16Test, buf: &[u8], offset: usize, invert: bool) -> Option<Hit> {
    let order = if invert { t.order.invert() } else { t.order };
    let mut units = Vec::with_capacity(t.expected.len());
    for i in 0..t.expected.len() {
        units.push(order.decode_uint(buf, offset + 2 * i, 2)? as u16);
    }
    let matched = match t.op {
        CompareOp::Equal => units == t.expected,
        CompareOp::Less => units.cmp(&t.expected).is_lt(),
        CompareOp::Greater => units.cmp(&t.expected).is_gt(),
        _ => false,
    };
    matched.then(|| {
        Hit::new(
            Value::Str(String::from_utf16_lossy(&units)),
            offset + 2 * t.expected.len(),
        )
    })
}

impl Operation {
    /// Evaluate a comparison criterion at `offset`. Control-flow
    /// instructions report a zero-width hit; their semantics live in the
    /// evaluator.
    pub(crate) fn matches(&self, buf: &[u8], offset: usize, invert: bool) -> Option<Hit> {
        match self {
            Self::Num(t) => eval_num(t, buf, offset, invert),
            Self::Str(t) => eval_str(t, buf, offset),
            Self::Pstring(t) => eval_pstring(t, buf, offset, invert),
            Self::Search(t) => eval_search(t, buf, offset),
            Self::Regex(t) => eval_regex(t, buf, offset),
            Self::String16(t) => eval_string16(t, buf, offset, invert),
            Self::Name(_) | Self::Use { .. } | Self::Indirect { .. } | Self::Default => {
                Some(Hit::empty(offset))
            }
        }
    }

    /// The fixed bytes any buffer must start with for this operation to
    /// match at offset zero, if determinable. Feeds the first-byte index.
    pub(crate) fn starting_bytes(&self) -> Option<EncodedBytes> {
        match self {
            Self::Num(t) => {
                if t.op != CompareOp::Equal || t.mask.is_some() || t.num.flavor != NumFlavor::Int {
                    return None;
                }
                let NumTest::Int(expected) = t.test else {
                    return None;
                };
                t.num.order.encode(expected as u64, t.num.width as usize)
            }
            Self::Str(t) => {
                if t.op != CompareOp::Equal || !t.flags.is_empty() {
                    return None;
                }
                let StrTest::Literal(expected) = &t.test else {
                    return None;
                };
                if expected.is_empty() {
                    return None;
                }
                Some(EncodedBytes::from_slice(
                    &expected[..expected.len().min(8)],
                ))
            }
            _ => None,
        }
    }
}
