//! Identify the content type of byte buffers by matching them against a
//! compiled database of magic(5) rules, the textual pattern format of the
//! Unix `file` utility.
//!
//! ```
//! use nimagic::MagicSet;
//!
//! let rules = b"0 string %PDF- PDF document\n!:mime application/pdf\n";
//! let mut set = MagicSet::new();
//! set.add_rules(&rules[..]).unwrap();
//! set.finalize();
//!
//! let info = set.find(b"%PDF-1.7 blah").unwrap();
//! assert_eq!("PDF document", info.description);
//! assert_eq!(Some("application/pdf"), info.mime.as_deref());
//! ```
#![deny(clippy::dbg_macro)]
mod endian;
mod entry;
mod eval;
mod format;
mod magic_set;
mod matcher;
mod parser;

pub use endian::ByteOrder;
pub use entry::{CompareOp, EntryId, MagicEntry, MagicType, StrFlags};
pub use eval::{ContentInfo, MatchState, MatchingResult};
pub use format::{Formatter, PrintfFormatter};
pub use magic_set::{MagicSet, MagicSetOptions};
pub use matcher::Value;
pub use parser::{ParseErrorKind, RuleError};
