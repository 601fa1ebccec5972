//! Line-oriented parser of the magic(5) rule grammar.
//!
//! Each line is parsed in isolation; a malformed line produces a
//! [`ParseErrorKind`] that the caller reports and then skips, so one bad
//! rule never poisons the rest of a database.

use crate::{
    endian::ByteOrder,
    entry::{CompareOp, IndirectOffset, IndirectRead, MagicType, OffsetExpr, OffsetOp, StrFlags},
    matcher::{
        NumTest, NumericTest, Operation, PstrPrefix, PstringTest, RegexTest, SearchTest, StrTest,
        String16Test, StringTest, DEFAULT_REGEX_LINES, DEFAULT_SEARCH_RANGE,
    },
};
use nom::{
    branch::alt,
    bytes::complete::tag_no_case,
    character::complete::{char, digit1, hex_digit1, oct_digit1, one_of},
    combinator::{all_consuming, map, map_res, opt},
    sequence::{pair, preceded},
    IResult,
};
use std::{borrow::Cow, str::FromStr};

// Set `nom::error::VerboseError` for detailed errors in debug builds.
#[cfg(not(debug_assertions))]
pub(crate) type RuleParseError<'a> = nom::error::Error<&'a [u8]>;
#[cfg(debug_assertions)]
pub(crate) type RuleParseError<'a> = nom::error::VerboseError<&'a [u8]>;
pub(crate) type RuleParseResult<'a, O> = IResult<&'a [u8], O, RuleParseError<'a>>;

/// Why a rule line was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("invalid level {0}")]
    InvalidLevel(usize),
    #[error("no preceding rule at level {0}")]
    Orphan(usize),
    #[error("unknown type {0:?}")]
    UnknownType(String),
    #[error("malformed offset")]
    MalformedOffset,
    #[error("malformed type token")]
    MalformedType,
    #[error("malformed test value")]
    MalformedTest,
    #[error("bad escape sequence")]
    BadEscape,
    #[error("unterminated field")]
    UnterminatedField,
    #[error("missing extension field")]
    MissingExtensionField,
}

/// A skipped line, handed to the error callback of
/// [`MagicSet::add_rules_with`](crate::MagicSet::add_rules_with).
#[derive(Debug)]
pub struct RuleError<'a> {
    pub line: Cow<'a, str>,
    pub kind: ParseErrorKind,
}

impl RuleError<'_> {
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    pub fn cause(&self) -> &ParseErrorKind {
        &self.kind
    }
}

impl std::fmt::Display for RuleError<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {:?}", self.kind, self.line)
    }
}

/// Outcome of parsing one line.
#[derive(Debug, PartialEq)]
pub(crate) enum ParsedLine {
    /// Blank, comment, or an unrecognized `!:` directive.
    Ignored,
    Mime(String),
    Optional,
    Entry(RawEntry),
}

/// A pattern line before it is attached to the tree.
#[derive(Debug, PartialEq)]
pub(crate) struct RawEntry {
    pub level: usize,
    pub offset: OffsetExpr,
    pub typ: MagicType,
    pub op: Operation,
    pub message: Option<String>,
}

pub(crate) fn parse_line(line: &[u8]) -> Result<ParsedLine, ParseErrorKind> {
    if line.iter().all(u8::is_ascii_whitespace) || line.starts_with(b"#") {
        return Ok(ParsedLine::Ignored);
    }
    if let Some(rest) = line.strip_prefix(b"!:") {
        return parse_extension(rest);
    }
    parse_entry(line)
}

fn parse_extension(rest: &[u8]) -> Result<ParsedLine, ParseErrorKind> {
    let word_len = rest
        .iter()
        .take_while(|b| !b.is_ascii_whitespace())
        .count();
    let (word, value) = rest.split_at(word_len);
    match word {
        b"mime" => {
            let value = String::from_utf8_lossy(value).trim().to_owned();
            if value.is_empty() {
                return Err(ParseErrorKind::MissingExtensionField);
            }
            Ok(ParsedLine::Mime(value))
        }
        b"optional" => Ok(ParsedLine::Optional),
        // !:strength, !:apple, !:ext and anything else
        _ => Ok(ParsedLine::Ignored),
    }
}

fn parse_entry(line: &[u8]) -> Result<ParsedLine, ParseErrorKind> {
    let level = line.iter().take_while(|&&b| b == b'>').count();
    let (rest, offset) =
        offset_expr(&line[level..]).map_err(|_| ParseErrorKind::MalformedOffset)?;
    if let Some(&b) = rest.first() {
        // junk fused to the offset, e.g. `0abc`
        if !b.is_ascii_whitespace() {
            return Err(ParseErrorKind::MalformedOffset);
        }
    }

    let rest = skip_ws1(rest)?;
    let (type_token, rest) = take_field(rest);
    let spec = parse_type_token(type_token)?;

    let rest = skip_ws1(rest)?;
    let (raw_test, rest) = take_field(rest);
    if raw_test.is_empty() {
        return Err(ParseErrorKind::UnterminatedField);
    }
    let op = build_operation(&spec, raw_test)?;

    let message = parse_message(rest)?;
    Ok(ParsedLine::Entry(RawEntry {
        level,
        offset,
        typ: spec.typ,
        op,
        message,
    }))
}

/// Split off one whitespace-delimited field; a backslash escapes the
/// following byte, so `h\ ello` stays a single field.
fn take_field(input: &[u8]) -> (&[u8], &[u8]) {
    let mut i = 0;
    while i < input.len() {
        match input[i] {
            b'\\' if i + 1 < input.len() => i += 2,
            b' ' | b'\t' => break,
            _ => i += 1,
        }
    }
    input.split_at(i)
}

fn skip_ws1(input: &[u8]) -> Result<&[u8], ParseErrorKind> {
    let n = input
        .iter()
        .take_while(|&&b| b == b' ' || b == b'\t')
        .count();
    if n == 0 {
        return Err(ParseErrorKind::UnterminatedField);
    }
    Ok(&input[n..])
}

fn parse_message(rest: &[u8]) -> Result<Option<String>, ParseErrorKind> {
    let trimmed = rest
        .iter()
        .position(|&b| b != b' ' && b != b'\t')
        .map_or(&[][..], |n| &rest[n..]);
    if trimmed.is_empty() {
        return Ok(None);
    }
    let decoded = decode_escapes(trimmed)?;
    Ok(Some(String::from_utf8_lossy(&decoded).into_owned()))
}

fn unsigned_literal(input: &[u8]) -> RuleParseResult<'_, u64> {
    alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |d: &[u8]| {
            u64::from_str_radix(&String::from_utf8_lossy(d), 16)
        }),
        map_res(preceded(char('0'), oct_digit1), |d: &[u8]| {
            u64::from_str_radix(&String::from_utf8_lossy(d), 8)
        }),
        map_res(digit1, |d: &[u8]| String::from_utf8_lossy(d).parse::<u64>()),
    ))(input)
}

fn signed_literal(input: &[u8]) -> RuleParseResult<'_, i64> {
    let (input, sign) = opt(one_of("+-"))(input)?;
    let (input, v) = unsigned_literal(input)?;
    let v = v as i64;
    Ok((input, if sign == Some('-') { v.wrapping_neg() } else { v }))
}

fn indirect_offset(input: &[u8]) -> RuleParseResult<'_, IndirectOffset> {
    let (input, rel_out) = opt(char('&'))(input)?;
    let (input, _) = char('(')(input)?;
    let (input, rel_in) = opt(char('&'))(input)?;
    let (input, base) = signed_literal(input)?;
    let (input, read) = opt(preceded(char('.'), one_of("bBsSlLqQiIm")))(input)?;
    let (input, op) = opt(pair(one_of("+-*/%&|^"), signed_literal))(input)?;
    let (input, _) = char(')')(input)?;
    Ok((
        input,
        IndirectOffset {
            base,
            relative: rel_out.is_some() || rel_in.is_some(),
            read: read
                .and_then(|c| IndirectRead::from_type_char(c as u8))
                .unwrap_or_default(),
            op: op.and_then(|(c, operand)| Some((OffsetOp::from_byte(c as u8)?, operand))),
        },
    ))
}

fn offset_expr(input: &[u8]) -> RuleParseResult<'_, OffsetExpr> {
    alt((
        map(indirect_offset, OffsetExpr::Indirect),
        map(preceded(char('&'), signed_literal), OffsetExpr::Relative),
        map(signed_literal, OffsetExpr::Absolute),
    ))(input)
}

/// The `<type>[&mask][/flags]` token, decomposed.
struct TypeSpec {
    typ: MagicType,
    mask: Option<u64>,
    flags: StrFlags,
    count: Option<usize>,
    pstr: PstrPrefix,
    regex_dot_all: bool,
    indirect_rel: bool,
}

fn parse_type_token(token: &[u8]) -> Result<TypeSpec, ParseErrorKind> {
    let name_len = token
        .iter()
        .take_while(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
        .count();
    let (name, mut rest) = token.split_at(name_len);
    let name = String::from_utf8_lossy(name);
    let typ = MagicType::from_str(&name)
        .map_err(|_| ParseErrorKind::UnknownType(name.into_owned()))?;

    let mut spec = TypeSpec {
        typ,
        mask: None,
        flags: StrFlags::empty(),
        count: None,
        pstr: PstrPrefix::default(),
        regex_dot_all: false,
        indirect_rel: false,
    };
    while let Some(&b) = rest.first() {
        match b {
            b'&' => {
                let (r, mask) = unsigned_literal(&rest[1..])
                    .map_err(|_| ParseErrorKind::MalformedType)?;
                spec.mask = Some(mask);
                rest = r;
            }
            b'/' => {
                let n = rest[1..]
                    .iter()
                    .take_while(|&&c| c != b'&' && c != b'/')
                    .count();
                apply_flags(&mut spec, &rest[1..1 + n]);
                rest = &rest[1 + n..];
            }
            _ => return Err(ParseErrorKind::MalformedType),
        }
    }
    Ok(spec)
}

fn apply_flags(spec: &mut TypeSpec, chars: &[u8]) {
    for &c in chars {
        if c.is_ascii_digit() {
            let digit = (c - b'0') as usize;
            spec.count = Some(spec.count.unwrap_or(0).saturating_mul(10) + digit);
            continue;
        }
        if spec.typ == MagicType::Pstring {
            match c {
                b'B' => spec.pstr.width = 1,
                b'H' => spec.pstr = pstr_prefix(2, ByteOrder::Big, spec.pstr.includes_self),
                b'h' => spec.pstr = pstr_prefix(2, ByteOrder::Little, spec.pstr.includes_self),
                b'L' => spec.pstr = pstr_prefix(4, ByteOrder::Big, spec.pstr.includes_self),
                b'l' => spec.pstr = pstr_prefix(4, ByteOrder::Little, spec.pstr.includes_self),
                b'J' => spec.pstr.includes_self = true,
                _ => {}
            }
            continue;
        }
        match c {
            b'B' => spec.flags |= StrFlags::COMPACT_BLANKS,
            b'b' => spec.flags |= StrFlags::OPTIONAL_BLANKS,
            b'c' => spec.flags |= StrFlags::LOWER_MATCH_BOTH,
            b'C' => spec.flags |= StrFlags::UPPER_MATCH_BOTH,
            b's' => spec.regex_dot_all = true,
            b'r' => spec.indirect_rel = true,
            // t, T, w, W and friends keep plain compare semantics
            _ => {}
        }
    }
}

fn pstr_prefix(width: u8, order: ByteOrder, includes_self: bool) -> PstrPrefix {
    PstrPrefix {
        order,
        width,
        includes_self,
    }
}

fn split_num_op(raw: &[u8]) -> (CompareOp, &[u8]) {
    let op = match raw.first() {
        Some(b'=') => CompareOp::Equal,
        Some(b'<') => CompareOp::Less,
        Some(b'>') => CompareOp::Greater,
        Some(b'&') => CompareOp::AllSet,
        Some(b'^') => CompareOp::AllClear,
        Some(b'~') => CompareOp::Negated,
        Some(b'!') => CompareOp::NotEqual,
        _ => return (CompareOp::Equal, raw),
    };
    (op, &raw[1..])
}

fn split_str_op(raw: &[u8]) -> (CompareOp, &[u8]) {
    let op = match raw.first() {
        Some(b'=') => CompareOp::Equal,
        Some(b'<') => CompareOp::Less,
        Some(b'>') => CompareOp::Greater,
        _ => return (CompareOp::Equal, raw),
    };
    (op, &raw[1..])
}

fn parse_i64_field(raw: &[u8]) -> Result<i64, ParseErrorKind> {
    all_consuming(signed_literal)(raw)
        .map(|(_, v)| v)
        .map_err(|_| ParseErrorKind::MalformedTest)
}

fn parse_f64_field(raw: &[u8]) -> Result<f64, ParseErrorKind> {
    String::from_utf8_lossy(raw)
        .parse()
        .map_err(|_| ParseErrorKind::MalformedTest)
}

fn build_operation(spec: &TypeSpec, raw: &[u8]) -> Result<Operation, ParseErrorKind> {
    use crate::entry::TypeClass;
    match spec.typ.class() {
        TypeClass::Num(num) => {
            if raw == b"x" {
                return Ok(Operation::Num(NumericTest {
                    num,
                    mask: spec.mask,
                    op: CompareOp::Equal,
                    test: NumTest::Any,
                }));
            }
            let (op, rest) = split_num_op(raw);
            if rest.is_empty() {
                return Err(ParseErrorKind::UnterminatedField);
            }
            let test = match num.flavor {
                crate::entry::NumFlavor::Float | crate::entry::NumFlavor::Double => {
                    NumTest::Float(parse_f64_field(rest)?)
                }
                _ => NumTest::Int(parse_i64_field(rest)?),
            };
            Ok(Operation::Num(NumericTest {
                num,
                mask: spec.mask,
                op,
                test,
            }))
        }
        TypeClass::Str => {
            if raw == b"x" {
                return Ok(Operation::Str(StringTest {
                    op: CompareOp::Equal,
                    flags: spec.flags,
                    test: StrTest::Any,
                }));
            }
            let (op, rest) = split_str_op(raw);
            Ok(Operation::Str(StringTest {
                op,
                flags: spec.flags,
                test: StrTest::Literal(decode_escapes(rest)?),
            }))
        }
        TypeClass::Pstring => {
            let (op, rest) = split_str_op(raw);
            Ok(Operation::Pstring(PstringTest {
                prefix: spec.pstr,
                flags: spec.flags,
                op,
                expected: decode_escapes(rest)?,
            }))
        }
        TypeClass::Search => {
            let (_, rest) = split_str_op(raw);
            Ok(Operation::Search(SearchTest {
                expected: decode_escapes(rest)?,
                range: spec.count.unwrap_or(DEFAULT_SEARCH_RANGE),
                flags: spec.flags,
            }))
        }
        TypeClass::Regex => {
            let (_, rest) = split_str_op(raw);
            Ok(Operation::Regex(RegexTest::new(
                decode_escapes(rest)?,
                spec.count.unwrap_or(DEFAULT_REGEX_LINES),
                spec.flags.contains(StrFlags::LOWER_MATCH_BOTH),
                spec.regex_dot_all,
            )))
        }
        TypeClass::String16(order) => {
            let (op, rest) = split_str_op(raw);
            let decoded = decode_escapes(rest)?;
            let expected = String::from_utf8_lossy(&decoded).encode_utf16().collect();
            Ok(Operation::String16(String16Test {
                order,
                op,
                expected,
            }))
        }
        TypeClass::Name => {
            let ident = ident_field(raw)?;
            Ok(Operation::Name(ident))
        }
        TypeClass::Use => {
            let (flip, rest) = match raw.strip_prefix(b"^") {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let ident = ident_field(rest)?;
            Ok(Operation::Use {
                ident,
                flip_endian: flip,
            })
        }
        TypeClass::Indirect => Ok(Operation::Indirect {
            relative: spec.indirect_rel,
        }),
        TypeClass::Default => Ok(Operation::Default),
    }
}

fn ident_field(raw: &[u8]) -> Result<String, ParseErrorKind> {
    if raw.is_empty() {
        return Err(ParseErrorKind::MalformedTest);
    }
    Ok(String::from_utf8_lossy(raw).into_owned())
}

/// Decode the C-style escapes magic(5) honors in test and message fields.
pub(crate) fn decode_escapes(raw: &[u8]) -> Result<Vec<u8>, ParseErrorKind> {
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        i += 1;
        if b != b'\\' {
            out.push(b);
            continue;
        }
        let Some(&c) = raw.get(i) else {
            return Err(ParseErrorKind::BadEscape);
        };
        i += 1;
        match c {
            b'\\' => out.push(b'\\'),
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'a' => out.push(0x07),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'v' => out.push(0x0b),
            b' ' => out.push(b' '),
            b'0'..=b'7' => {
                let mut value = u32::from(c - b'0');
                for _ in 0..2 {
                    match raw.get(i) {
                        Some(&d @ b'0'..=b'7') => {
                            value = (value << 3) | u32::from(d - b'0');
                            i += 1;
                        }
                        _ => break,
                    }
                }
                out.push(value as u8);
            }
            b'x' => {
                let mut digits = 0;
                let mut value = 0u32;
                while digits < 2 {
                    match raw.get(i) {
                        Some(&d) if d.is_ascii_hexdigit() => {
                            let d = char::from(d).to_digit(16).unwrap_or(0);
                            value = (value << 4) | d;
                            digits += 1;
                            i += 1;
                        }
                        _ => break,
                    }
                }
                if digits == 0 {
                    return Err(ParseErrorKind::BadEscape);
                }
                out.push(value as u8);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
