use std::fmt;

use serde::{Deserialize, Serialize};

/// The closed set of ISO 8583 field kinds.
///
/// Each kind fixes the length discipline (exact vs. prefixed maximum),
/// the width of the ASCII length prefix, and whether the payload is
/// textual or raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsoType {
    /// Fixed length, ASCII digits, left-padded with '0'
    Numeric,
    /// Fixed length, text, right-padded with space
    Alpha,
    /// Variable length text up to 99 bytes, 2-digit prefix
    Llvar,
    /// Variable length text up to 999 bytes, 3-digit prefix
    Lllvar,
    /// MMddHHmmss, local time
    Date10,
    /// MMdd
    Date4,
    /// yyMM card expiry
    DateExp,
    /// HHmmss
    Time,
    /// 12 ASCII digits, implied 2 decimals
    Amount,
    /// Fixed length raw bytes
    Binary,
    /// Variable length raw bytes up to 99, 2-digit prefix
    Llbin,
    /// Variable length raw bytes up to 999, 3-digit prefix
    Lllbin,
}

impl IsoType {
    /// Whether the on-wire length is exactly the declared length.
    pub fn is_fixed(self) -> bool {
        !matches!(
            self,
            IsoType::Llvar | IsoType::Lllvar | IsoType::Llbin | IsoType::Lllbin
        )
    }

    /// Whether the declared length comes from configuration rather than
    /// being intrinsic to the kind.
    pub fn needs_length(self) -> bool {
        matches!(self, IsoType::Numeric | IsoType::Alpha | IsoType::Binary)
    }

    /// Intrinsic length of the kinds that have one.
    pub fn intrinsic_length(self) -> Option<usize> {
        match self {
            IsoType::Date10 => Some(10),
            IsoType::Date4 | IsoType::DateExp => Some(4),
            IsoType::Time => Some(6),
            IsoType::Amount => Some(12),
            _ => None,
        }
    }

    /// Maximum payload length for the variable kinds.
    pub fn max_length(self) -> usize {
        match self {
            IsoType::Llvar | IsoType::Llbin => 99,
            IsoType::Lllvar | IsoType::Lllbin => 999,
            _ => 0,
        }
    }

    /// Width of the ASCII length prefix in digits (0 for fixed kinds).
    pub fn prefix_digits(self) -> usize {
        match self {
            IsoType::Llvar | IsoType::Llbin => 2,
            IsoType::Lllvar | IsoType::Lllbin => 3,
            _ => 0,
        }
    }

    /// Whether the payload is raw bytes rather than text.
    pub fn is_binary(self) -> bool {
        matches!(self, IsoType::Binary | IsoType::Llbin | IsoType::Lllbin)
    }

    pub fn is_date(self) -> bool {
        matches!(
            self,
            IsoType::Date10 | IsoType::Date4 | IsoType::DateExp | IsoType::Time
        )
    }
}

impl fmt::Display for IsoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IsoType::Numeric => "NUMERIC",
            IsoType::Alpha => "ALPHA",
            IsoType::Llvar => "LLVAR",
            IsoType::Lllvar => "LLLVAR",
            IsoType::Date10 => "DATE10",
            IsoType::Date4 => "DATE4",
            IsoType::DateExp => "DATE_EXP",
            IsoType::Time => "TIME",
            IsoType::Amount => "AMOUNT",
            IsoType::Binary => "BINARY",
            IsoType::Llbin => "LLBIN",
            IsoType::Lllbin => "LLLBIN",
        };
        f.write_str(name)
    }
}
