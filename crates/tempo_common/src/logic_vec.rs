//! Packed vectors of 4-state logic values carrying signal values.

use crate::logic::Logic;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A vector of 4-state [`Logic`] values packed for efficient storage.
///
/// Each logic value occupies 2 bits (encoding 4 states), with 32 values packed
/// per `u64` word. Index 0 is the least significant bit. This is the value
/// type exchanged with the simulation host for every signal read and write.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogicVec {
    width: u32,
    /// Packed storage: 2 bits per logic value, 32 values per u64.
    data: Vec<u64>,
}

/// Number of logic values packed per u64 word.
const VALUES_PER_WORD: u32 = 32;

/// Packed word with every 2-bit lane holding `X` (0b10).
const ALL_X_WORD: u64 = 0xAAAA_AAAA_AAAA_AAAA;

impl LogicVec {
    /// Creates a new `LogicVec` of the given width, initialized to all `Zero`.
    pub fn new(width: u32) -> Self {
        Self {
            width,
            data: vec![0; word_count(width)],
        }
    }

    /// Creates a `LogicVec` of the given width with every bit unknown (`X`).
    ///
    /// This is the power-on value of an undriven signal in the reference host.
    pub fn unknown(width: u32) -> Self {
        let mut v = Self {
            width,
            data: vec![ALL_X_WORD; word_count(width)],
        };
        v.clear_unused_lanes();
        v
    }

    /// Returns the number of logic values in this vector.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Gets the logic value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn get(&self, index: u32) -> Logic {
        assert!(
            index < self.width,
            "index {index} out of bounds for width {}",
            self.width
        );
        let word_idx = (index / VALUES_PER_WORD) as usize;
        let bit_offset = (index % VALUES_PER_WORD) * 2;
        Logic::from_bits(self.data[word_idx] >> bit_offset)
    }

    /// Sets the logic value at the given index.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.width()`.
    pub fn set(&mut self, index: u32, value: Logic) {
        assert!(
            index < self.width,
            "index {index} out of bounds for width {}",
            self.width
        );
        let word_idx = (index / VALUES_PER_WORD) as usize;
        let bit_offset = (index % VALUES_PER_WORD) * 2;
        let mask = !(0b11u64 << bit_offset);
        self.data[word_idx] = (self.data[word_idx] & mask) | ((value as u64) << bit_offset);
    }

    /// Creates a single-bit `LogicVec` from a boolean value.
    pub fn from_bool(value: bool) -> Self {
        let mut v = Self::new(1);
        v.set(0, Logic::from_bool(value));
        v
    }

    /// Creates a `LogicVec` from a `u64` value with the given width.
    ///
    /// Bits beyond the given width are ignored.
    pub fn from_u64(value: u64, width: u32) -> Self {
        Self::from_u128(u128::from(value), width)
    }

    /// Creates a `LogicVec` from a `u128` value with the given width.
    ///
    /// Bits beyond the given width are ignored; bits beyond 128 are zero.
    pub fn from_u128(value: u128, width: u32) -> Self {
        let mut v = Self::new(width);
        for i in 0..width.min(128) {
            if (value >> i) & 1 != 0 {
                v.set(i, Logic::One);
            }
        }
        v
    }

    /// Converts the vector to a `u64`, if all bits are resolvable.
    ///
    /// Returns `None` if the vector contains X or Z values, or if the width
    /// exceeds 64 bits.
    pub fn to_u64(&self) -> Option<u64> {
        if self.width > 64 {
            return None;
        }
        self.to_u128().map(|v| v as u64)
    }

    /// Converts the vector to a `u128`, if all bits are resolvable.
    ///
    /// Returns `None` if the vector contains X or Z values, or if the width
    /// exceeds 128 bits.
    pub fn to_u128(&self) -> Option<u128> {
        if self.width > 128 {
            return None;
        }
        let mut result = 0u128;
        for i in 0..self.width {
            match self.get(i) {
                Logic::Zero => {}
                Logic::One => result |= 1 << i,
                Logic::X | Logic::Z => return None,
            }
        }
        Some(result)
    }

    /// Returns true if every bit is `Zero` or `One`.
    pub fn is_resolvable(&self) -> bool {
        (0..self.width).all(|i| self.get(i).is_resolvable())
    }

    /// Returns true if the value is resolvable and non-zero.
    ///
    /// Control signals such as `valid` and `ready` are sampled with this:
    /// an unknown level never counts as asserted.
    pub fn is_high(&self) -> bool {
        let mut any_one = false;
        for i in 0..self.width {
            match self.get(i) {
                Logic::One => any_one = true,
                Logic::Zero => {}
                Logic::X | Logic::Z => return false,
            }
        }
        any_one
    }

    /// Extracts `len` bits starting at bit `lo` into a new vector.
    ///
    /// # Panics
    ///
    /// Panics if `lo + len > self.width()`.
    pub fn slice(&self, lo: u32, len: u32) -> LogicVec {
        assert!(
            lo + len <= self.width,
            "slice [{lo}, {}) out of bounds for width {}",
            lo + len,
            self.width
        );
        let mut out = LogicVec::new(len);
        for i in 0..len {
            out.set(i, self.get(lo + i));
        }
        out
    }

    /// Writes `value` into this vector starting at bit `lo`.
    ///
    /// # Panics
    ///
    /// Panics if the value does not fit.
    pub fn write_slice(&mut self, lo: u32, value: &LogicVec) {
        assert!(
            lo + value.width <= self.width,
            "slice write [{lo}, {}) out of bounds for width {}",
            lo + value.width,
            self.width
        );
        for i in 0..value.width {
            self.set(lo + i, value.get(i));
        }
    }

    /// Parses a binary string like `"10XZ"` into a `LogicVec`.
    ///
    /// The leftmost character is the most significant bit (highest index).
    /// Underscores are accepted as digit separators. Returns `None` if the
    /// string contains invalid characters.
    pub fn from_binary_str(s: &str) -> Option<Self> {
        let digits: Vec<char> = s.chars().filter(|c| *c != '_').collect();
        let mut v = Self::new(digits.len() as u32);
        for (i, c) in digits.iter().rev().enumerate() {
            v.set(i as u32, Logic::from_char(*c)?);
        }
        Some(v)
    }

    /// Resets the storage lanes past `width` to zero so equality ignores them.
    fn clear_unused_lanes(&mut self) {
        let used = self.width % VALUES_PER_WORD;
        if used != 0 {
            if let Some(last) = self.data.last_mut() {
                *last &= (1u64 << (used * 2)) - 1;
            }
        }
    }
}

impl fmt::Display for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in (0..self.width).rev() {
            write!(f, "{}", self.get(i))?;
        }
        Ok(())
    }
}

impl fmt::Debug for LogicVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LogicVec({self})")
    }
}

/// Returns the number of u64 words needed to store `width` logic values.
fn word_count(width: u32) -> usize {
    width.div_ceil(VALUES_PER_WORD) as usize
}
