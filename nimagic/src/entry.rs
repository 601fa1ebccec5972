//! Data model for compiled magic rules: type table, offsets and the
//! pattern-tree arena node.

use crate::{endian::ByteOrder, matcher::Operation};
use bitflags::bitflags;

/// Index of an entry in the [`MagicSet`](crate::MagicSet) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    pub(crate) fn idx(self) -> usize {
        self.0 as usize
    }
}

/// The closed set of rule type names of magic(5).
///
/// Names outside this set (`clear`, `der`, unsigned variants) are reported
/// as unknown types by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::EnumString, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum MagicType {
    Byte,
    Short,
    Long,
    Quad,
    Float,
    Double,
    String,
    Pstring,
    Date,
    Qdate,
    Ldate,
    Qldate,
    Beid3,
    Beshort,
    Belong,
    Bequad,
    Befloat,
    Bedouble,
    Bedate,
    Beqdate,
    Beldate,
    Beqldate,
    Bestring16,
    Leid3,
    Leshort,
    Lelong,
    Lequad,
    Lefloat,
    Ledouble,
    Ledate,
    Leqdate,
    Leldate,
    Leqldate,
    Lestring16,
    Melong,
    Medate,
    Meldate,
    Regex,
    Search,
    Name,
    Use,
    Indirect,
    Default,
}

/// How a numeric type extracts its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NumFlavor {
    Int,
    Id3,
    Float,
    Double,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct NumType {
    pub order: ByteOrder,
    pub width: u8,
    pub flavor: NumFlavor,
}

impl NumType {
    const fn new(order: ByteOrder, width: u8, flavor: NumFlavor) -> Self {
        Self {
            order,
            width,
            flavor,
        }
    }
}

/// Extraction/comparison class of a [`MagicType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TypeClass {
    Num(NumType),
    Str,
    Pstring,
    String16(ByteOrder),
    Search,
    Regex,
    Name,
    Use,
    Indirect,
    Default,
}

impl MagicType {
    pub(crate) fn class(self) -> TypeClass {
        use ByteOrder::{Big, Little, Middle, Native};
        use NumFlavor::{Double, Float, Id3, Int};
        match self {
            Self::Byte => TypeClass::Num(NumType::new(Native, 1, Int)),
            Self::Short => TypeClass::Num(NumType::new(Native, 2, Int)),
            Self::Long | Self::Date | Self::Ldate => TypeClass::Num(NumType::new(Native, 4, Int)),
            Self::Quad | Self::Qdate | Self::Qldate => TypeClass::Num(NumType::new(Native, 8, Int)),
            Self::Float => TypeClass::Num(NumType::new(Native, 4, Float)),
            Self::Double => TypeClass::Num(NumType::new(Native, 8, Double)),
            Self::Beshort => TypeClass::Num(NumType::new(Big, 2, Int)),
            Self::Belong | Self::Bedate | Self::Beldate => {
                TypeClass::Num(NumType::new(Big, 4, Int))
            }
            Self::Bequad | Self::Beqdate | Self::Beqldate => {
                TypeClass::Num(NumType::new(Big, 8, Int))
            }
            Self::Befloat => TypeClass::Num(NumType::new(Big, 4, Float)),
            Self::Bedouble => TypeClass::Num(NumType::new(Big, 8, Double)),
            Self::Beid3 => TypeClass::Num(NumType::new(Big, 4, Id3)),
            Self::Leshort => TypeClass::Num(NumType::new(Little, 2, Int)),
            Self::Lelong | Self::Ledate | Self::Leldate => {
                TypeClass::Num(NumType::new(Little, 4, Int))
            }
            Self::Lequad | Self::Leqdate | Self::Leqldate => {
                TypeClass::Num(NumType::new(Little, 8, Int))
            }
            Self::Lefloat => TypeClass::Num(NumType::new(Little, 4, Float)),
            Self::Ledouble => TypeClass::Num(NumType::new(Little, 8, Double)),
            Self::Leid3 => TypeClass::Num(NumType::new(Little, 4, Id3)),
            Self::Melong | Self::Medate | Self::Meldate => {
                TypeClass::Num(NumType::new(Middle, 4, Int))
            }
            Self::String => TypeClass::Str,
            Self::Pstring => TypeClass::Pstring,
            Self::Bestring16 => TypeClass::String16(Big),
            Self::Lestring16 => TypeClass::String16(Little),
            Self::Search => TypeClass::Search,
            Self::Regex => TypeClass::Regex,
            Self::Name => TypeClass::Name,
            Self::Use => TypeClass::Use,
            Self::Indirect => TypeClass::Indirect,
            Self::Default => TypeClass::Default,
        }
    }
}

/// Comparison operator of a test field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    /// `&`: all expected bits set in the extracted value.
    AllSet,
    /// `^`: all expected bits clear in the extracted value.
    AllClear,
    /// `~`: equal to the bitwise negation of the expected value.
    Negated,
}

bitflags! {
    /// Modifier flags of `string`/`search`/`pstring` tests.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StrFlags: u8 {
        /// `B`: a run of blanks in the expected value matches one or more.
        const COMPACT_BLANKS = 1;
        /// `b`: blanks in the expected value are optional in the input.
        const OPTIONAL_BLANKS = 1 << 1;
        /// `c`: lower-case expected characters match both cases.
        const LOWER_MATCH_BOTH = 1 << 2;
        /// `C`: upper-case expected characters match both cases.
        const UPPER_MATCH_BOTH = 1 << 3;
    }
}

/// Arithmetic applied to an indirectly-read offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OffsetOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
}

impl OffsetOp {
    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        Some(match b {
            b'+' => Self::Add,
            b'-' => Self::Sub,
            b'*' => Self::Mul,
            b'/' => Self::Div,
            b'%' => Self::Mod,
            b'&' => Self::And,
            b'|' => Self::Or,
            b'^' => Self::Xor,
            _ => return None,
        })
    }

    pub(crate) fn apply(self, lhs: i64, rhs: i64) -> Option<i64> {
        Some(match self {
            Self::Add => lhs.wrapping_add(rhs),
            Self::Sub => lhs.wrapping_sub(rhs),
            Self::Mul => lhs.wrapping_mul(rhs),
            Self::Div => lhs.checked_div(rhs)?,
            Self::Mod => lhs.checked_rem(rhs)?,
            Self::And => lhs & rhs,
            Self::Or => lhs | rhs,
            Self::Xor => lhs ^ rhs,
        })
    }
}

/// Pointer read performed by an indirect offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndirectRead {
    pub order: ByteOrder,
    pub width: u8,
    pub id3: bool,
}

impl Default for IndirectRead {
    // magic(5) reads a little-endian long when no type char is given
    fn default() -> Self {
        Self {
            order: ByteOrder::Little,
            width: 4,
            id3: false,
        }
    }
}

impl IndirectRead {
    pub(crate) fn from_type_char(c: u8) -> Option<Self> {
        let (order, width, id3) = match c {
            b'b' => (ByteOrder::Little, 1, false),
            b'B' => (ByteOrder::Big, 1, false),
            b's' => (ByteOrder::Little, 2, false),
            b'S' => (ByteOrder::Big, 2, false),
            b'l' => (ByteOrder::Little, 4, false),
            b'L' => (ByteOrder::Big, 4, false),
            b'q' => (ByteOrder::Little, 8, false),
            b'Q' => (ByteOrder::Big, 8, false),
            b'i' => (ByteOrder::Little, 4, true),
            b'I' => (ByteOrder::Big, 4, true),
            b'm' => (ByteOrder::Middle, 4, false),
            _ => return None,
        };
        Some(Self { order, width, id3 })
    }
}

/// An indirect offset expression: read a pointer out of the buffer, then
/// optionally combine it with a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IndirectOffset {
    pub base: i64,
    /// `&` prefix: base counts from the end of the parent's read window.
    pub relative: bool,
    pub read: IndirectRead,
    pub op: Option<(OffsetOp, i64)>,
}

/// Where an entry reads its value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OffsetExpr {
    Absolute(i64),
    /// `&N`: N bytes past the end of the parent's read window.
    Relative(i64),
    Indirect(IndirectOffset),
}

/// One compiled rule line; a node of the pattern tree.
#[derive(Debug)]
pub struct MagicEntry {
    pub(crate) level: usize,
    pub(crate) offset: OffsetExpr,
    pub(crate) typ: MagicType,
    pub(crate) op: Operation,
    pub(crate) message: Option<String>,
    pub(crate) mime: Option<String>,
    pub(crate) optional: bool,
    pub(crate) children: Vec<EntryId>,
}

impl MagicEntry {
    pub fn level(&self) -> usize {
        self.level
    }

    pub fn magic_type(&self) -> MagicType {
        self.typ
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn children(&self) -> &[EntryId] {
        &self.children
    }
}

#[cfg(test)]
mod tests;
