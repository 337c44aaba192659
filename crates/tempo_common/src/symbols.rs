//! Symbol layout of a data word: splitting words into bytes and back.
//!
//! A streaming data word carries `width / bits_per_symbol` symbols. The
//! *first* symbol of the word sits in the most significant bits when
//! `first_symbol_high` is set (big-endian symbol order), and in the least
//! significant bits otherwise. The same rule governs which symbols an
//! `empty` count removes: padding always trails the first symbol, so with
//! big-endian order the padding occupies the low-order bits and with
//! little-endian order it occupies the high-order bits.
//!
//! Each symbol is emitted as `ceil(bits_per_symbol / 8)` bytes, most
//! significant byte first. With the usual 8-bit symbol this is exactly one
//! byte per symbol.

use crate::logic_vec::LogicVec;

/// Errors raised while mapping words onto symbols.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// The symbol width is zero or wider than 64 bits.
    #[error("unsupported symbol width {0} (must be 1..=64 bits)")]
    UnsupportedSymbolWidth(u32),

    /// The data word width is not a whole number of symbols.
    #[error("data width {width} is not a multiple of the {bits}-bit symbol width")]
    PartialSymbol {
        /// The data word width in bits.
        width: u32,
        /// The symbol width in bits.
        bits: u32,
    },

    /// A symbol contained X or Z bits.
    #[error("symbol {index} is unresolvable: {value}")]
    Unresolvable {
        /// Position of the symbol counted from the first symbol.
        index: u32,
        /// The raw symbol bits.
        value: String,
    },

    /// More bytes were supplied than a word can hold.
    #[error("{bytes} bytes do not fit in a word of {symbols} symbols")]
    Overflow {
        /// Number of bytes supplied.
        bytes: usize,
        /// Number of symbols in the word.
        symbols: u32,
    },

    /// The byte count is not a whole number of symbols.
    #[error("{bytes} bytes is not a whole number of {bytes_per_symbol}-byte symbols")]
    RaggedBytes {
        /// Number of bytes supplied.
        bytes: usize,
        /// Bytes that make up one symbol.
        bytes_per_symbol: usize,
    },

    /// A requested symbol count exceeds the word.
    #[error("requested {requested} symbols from a word of {symbols}")]
    TooManySymbols {
        /// Number of symbols requested.
        requested: u32,
        /// Number of symbols in the word.
        symbols: u32,
    },
}

/// Symbol width and ordering for one interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolLayout {
    bits_per_symbol: u32,
    first_symbol_high: bool,
}

impl SymbolLayout {
    /// Creates a layout, rejecting symbol widths outside `1..=64`.
    pub fn new(bits_per_symbol: u32, first_symbol_high: bool) -> Result<Self, SymbolError> {
        if bits_per_symbol == 0 || bits_per_symbol > 64 {
            return Err(SymbolError::UnsupportedSymbolWidth(bits_per_symbol));
        }
        Ok(Self {
            bits_per_symbol,
            first_symbol_high,
        })
    }

    /// The symbol width in bits.
    pub fn bits_per_symbol(&self) -> u32 {
        self.bits_per_symbol
    }

    /// Whether the first symbol occupies the high-order bits.
    pub fn first_symbol_high(&self) -> bool {
        self.first_symbol_high
    }

    /// Number of bytes each decoded symbol produces.
    pub fn bytes_per_symbol(&self) -> usize {
        self.bits_per_symbol.div_ceil(8) as usize
    }

    /// Number of symbols in a word of `width` bits.
    pub fn symbols_in(&self, width: u32) -> Result<u32, SymbolError> {
        if width == 0 || width % self.bits_per_symbol != 0 {
            return Err(SymbolError::PartialSymbol {
                width,
                bits: self.bits_per_symbol,
            });
        }
        Ok(width / self.bits_per_symbol)
    }

    /// Bit offset of the symbol at position `index` (0 = first symbol).
    fn symbol_offset(&self, index: u32, symbols: u32) -> u32 {
        if self.first_symbol_high {
            (symbols - 1 - index) * self.bits_per_symbol
        } else {
            index * self.bits_per_symbol
        }
    }

    /// Decodes every symbol of `word` into bytes, first symbol first.
    pub fn decode(&self, word: &LogicVec) -> Result<Vec<u8>, SymbolError> {
        let symbols = self.symbols_in(word.width())?;
        self.decode_prefix(word, symbols)
    }

    /// Decodes only the first `count` symbols of `word`.
    ///
    /// The trailing symbols are ignored entirely, so X or Z bits in them are
    /// not an error. This is how `empty` padding is masked off.
    pub fn decode_prefix(&self, word: &LogicVec, count: u32) -> Result<Vec<u8>, SymbolError> {
        let symbols = self.symbols_in(word.width())?;
        if count > symbols {
            return Err(SymbolError::TooManySymbols {
                requested: count,
                symbols,
            });
        }
        let bytes_per_symbol = self.bytes_per_symbol();
        let mut out = Vec::with_capacity(count as usize * bytes_per_symbol);
        for index in 0..count {
            let bits = word.slice(self.symbol_offset(index, symbols), self.bits_per_symbol);
            let value = bits.to_u64().ok_or_else(|| SymbolError::Unresolvable {
                index,
                value: bits.to_string(),
            })?;
            let be = value.to_be_bytes();
            out.extend_from_slice(&be[8 - bytes_per_symbol..]);
        }
        Ok(out)
    }

    /// Encodes `bytes` as the first symbols of a `width`-bit word.
    ///
    /// Returns the word and the number of unused trailing symbols (the value
    /// an `empty` signal should carry). Unused symbols are driven to zero.
    pub fn encode(&self, bytes: &[u8], width: u32) -> Result<(LogicVec, u32), SymbolError> {
        let symbols = self.symbols_in(width)?;
        let bytes_per_symbol = self.bytes_per_symbol();
        if bytes.len() % bytes_per_symbol != 0 {
            return Err(SymbolError::RaggedBytes {
                bytes: bytes.len(),
                bytes_per_symbol,
            });
        }
        let used = (bytes.len() / bytes_per_symbol) as u32;
        if used > symbols {
            return Err(SymbolError::Overflow {
                bytes: bytes.len(),
                symbols,
            });
        }
        let mut word = LogicVec::new(width);
        for (index, chunk) in bytes.chunks(bytes_per_symbol).enumerate() {
            let value = chunk
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            let symbol = LogicVec::from_u64(value, self.bits_per_symbol);
            word.write_slice(self.symbol_offset(index as u32, symbols), &symbol);
        }
        Ok((word, symbols - used))
    }
}

impl Default for SymbolLayout {
    /// 8-bit symbols, first symbol in the high-order bits.
    fn default() -> Self {
        Self {
            bits_per_symbol: 8,
            first_symbol_high: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn big_endian_decode() {
        let layout = SymbolLayout::new(8, true).unwrap();
        let word = LogicVec::from_u64(0x1122_3344, 32);
        assert_eq!(layout.decode(&word).unwrap(), vec![0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn little_endian_decode() {
        let layout = SymbolLayout::new(8, false).unwrap();
        let word = LogicVec::from_u64(0x1122_3344, 32);
        assert_eq!(layout.decode(&word).unwrap(), vec![0x44, 0x33, 0x22, 0x11]);
    }

    #[test]
    fn roundtrip_across_layouts() {
        for bits in [4u32, 8, 16] {
            for first_high in [true, false] {
                let layout = SymbolLayout::new(bits, first_high).unwrap();
                let word = LogicVec::from_u64(0xDEAD_BEEF, 32);
                let bytes = layout.decode(&word).unwrap();
                let (back, empty) = layout.encode(&bytes, 32).unwrap();
                assert_eq!(back, word, "bits={bits} first_high={first_high}");
                assert_eq!(empty, 0);
            }
        }
    }

    #[test]
    fn prefix_skips_padding_in_low_bits_for_big_endian() {
        let layout = SymbolLayout::new(8, true).unwrap();
        let mut word = LogicVec::from_u64(0xAABB_0000, 32);
        for i in 0..16 {
            word.set(i, crate::Logic::X);
        }
        assert!(layout.decode(&word).is_err());
        assert_eq!(layout.decode_prefix(&word, 2).unwrap(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn prefix_skips_padding_in_high_bits_for_little_endian() {
        let layout = SymbolLayout::new(8, false).unwrap();
        let mut word = LogicVec::from_u64(0x0000_BBAA, 32);
        for i in 16..32 {
            word.set(i, crate::Logic::Z);
        }
        assert_eq!(layout.decode_prefix(&word, 2).unwrap(), vec![0xAA, 0xBB]);
    }

    #[test]
    fn unresolvable_symbol_reports_index() {
        let layout = SymbolLayout::default();
        let mut word = LogicVec::from_u64(0x1234, 16);
        word.set(0, crate::Logic::X);
        match layout.decode(&word) {
            Err(SymbolError::Unresolvable { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected unresolvable, got {other:?}"),
        }
    }

    #[test]
    fn encode_reports_empty_symbols() {
        let layout = SymbolLayout::default();
        let (word, empty) = layout.encode(&[0x01, 0x02, 0x03], 32).unwrap();
        assert_eq!(empty, 1);
        assert_eq!(word.to_u64(), Some(0x0102_0300));
    }

    #[test]
    fn wide_symbols_span_two_bytes() {
        let layout = SymbolLayout::new(16, true).unwrap();
        let word = LogicVec::from_u64(0xABCD_0123, 32);
        assert_eq!(layout.decode(&word).unwrap(), vec![0xAB, 0xCD, 0x01, 0x23]);
        assert!(matches!(
            layout.encode(&[1, 2, 3], 32),
            Err(SymbolError::RaggedBytes { .. })
        ));
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(SymbolLayout::new(0, true).is_err());
        assert!(SymbolLayout::new(65, true).is_err());
        let layout = SymbolLayout::default();
        assert!(matches!(
            layout.symbols_in(12),
            Err(SymbolError::PartialSymbol { width: 12, bits: 8 })
        ));
        assert!(matches!(
            layout.encode(&[0; 5], 32),
            Err(SymbolError::Overflow { .. })
        ));
    }
}
