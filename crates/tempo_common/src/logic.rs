//! Four-state logic values as sampled from a simulated wire.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single 4-state logic value.
///
/// The four states represent:
/// - `Zero`: driven low
/// - `One`: driven high
/// - `X`: unknown, uninitialized, or conflicting drivers
/// - `Z`: high-impedance (nobody is driving the wire)
///
/// Only `Zero` and `One` are *resolvable*; a bus engine that needs a
/// concrete bit treats `X` and `Z` as undefined data.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[repr(u8)]
pub enum Logic {
    /// Logic low (0).
    Zero = 0,
    /// Logic high (1).
    One = 1,
    /// Unknown or uninitialized.
    X = 2,
    /// High-impedance (tri-state).
    Z = 3,
}

impl Logic {
    /// Converts a character to a [`Logic`] value.
    ///
    /// Accepts '0', '1', 'x'/'X', and 'z'/'Z'.
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '0' => Some(Logic::Zero),
            '1' => Some(Logic::One),
            'x' | 'X' => Some(Logic::X),
            'z' | 'Z' => Some(Logic::Z),
            _ => None,
        }
    }

    /// Maps a boolean onto a driven logic level.
    pub fn from_bool(value: bool) -> Self {
        if value {
            Logic::One
        } else {
            Logic::Zero
        }
    }

    /// Returns the boolean level, or `None` for `X` and `Z`.
    pub fn to_bool(self) -> Option<bool> {
        match self {
            Logic::Zero => Some(false),
            Logic::One => Some(true),
            Logic::X | Logic::Z => None,
        }
    }

    /// Returns true for `Zero` and `One`.
    pub fn is_resolvable(self) -> bool {
        matches!(self, Logic::Zero | Logic::One)
    }

    /// Decodes the 2-bit packed representation used by [`LogicVec`](crate::LogicVec).
    pub(crate) fn from_bits(bits: u64) -> Self {
        match bits & 0b11 {
            0 => Logic::Zero,
            1 => Logic::One,
            2 => Logic::X,
            _ => Logic::Z,
        }
    }
}

impl fmt::Display for Logic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logic::Zero => write!(f, "0"),
            Logic::One => write!(f, "1"),
            Logic::X => write!(f, "X"),
            Logic::Z => write!(f, "Z"),
        }
    }
}
