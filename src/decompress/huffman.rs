//! Two-level canonical Huffman tables for DEFLATE.
//!
//! A table is a flat array of 16-bit entries. The first 256 entries are
//! indexed by the next 8 input bits. Each entry is either
//!
//! - a value: bits 0-8 hold the symbol, bits 9-11 hold `code_length - 1`
//!   (codes of 1-8 bits), or
//! - a secondary pointer (bit 12 set): bits 0-8 hold the offset of a
//!   secondary table that starts at index `0x100 + offset`, and bits
//!   9-11 hold how many further bits index it (1-7).
//!
//! Secondary entries hold the symbol and the number of bits consumed past
//! the first 8.
//!
//! Codes are stored MSB first in the bit stream, but the reader hands us
//! bits LSB first, so every table index is the bit-reversed code.

use super::bit_reader::BitReader;
use super::{DecompressError, Result};

/// Maximum code length in bits.
pub const MAX_CODE_LENGTH: usize = 15;

/// Primary region plus room for the worst-case set of secondary tables.
pub const HUFFMAN_TABLE_SIZE: usize = 1024;

/// Most symbols any DEFLATE alphabet has (288 literal/length codes).
pub const MAX_SYMBOLS: usize = 288;

const PRIMARY_BITS: u32 = 8;
const PRIMARY_SIZE: usize = 1 << PRIMARY_BITS;

const VALUE_MASK: u16 = 0x01ff;
const BITS_SHIFT: u32 = 9;
const BITS_MASK: u16 = 0x7;
const SECONDARY_FLAG: u16 = 1 << 12;

/// Decoding table built from a list of code lengths.
#[derive(Clone)]
pub struct HuffmanTable {
    entries: [u16; HUFFMAN_TABLE_SIZE],
}

impl Default for HuffmanTable {
    fn default() -> Self {
        Self {
            entries: [0; HUFFMAN_TABLE_SIZE],
        }
    }
}

/// Reverse the low `len` bits of `code`.
#[inline]
fn reverse(code: u32, len: u32) -> u32 {
    u32::from((code as u16).reverse_bits() >> (16 - len))
}

impl HuffmanTable {
    /// Build a table from per-symbol code lengths (0 means unused).
    pub fn new(lengths: &[u8]) -> Result<Self> {
        let mut table = Self::default();
        table.build(lengths)?;
        Ok(table)
    }

    /// Rebuild this table in place.
    ///
    /// Fails if a length exceeds 15, more codes of one length are asked
    /// for than the code space allows, or two codes claim the same slot.
    pub fn build(&mut self, lengths: &[u8]) -> Result<()> {
        if lengths.len() > MAX_SYMBOLS {
            return Err(DecompressError::InvalidHuffmanTable);
        }

        let mut count = [0u16; MAX_CODE_LENGTH + 1];
        for &len in lengths {
            if usize::from(len) > MAX_CODE_LENGTH {
                return Err(DecompressError::InvalidHuffmanTable);
            }
            count[usize::from(len)] += 1;
        }
        count[0] = 0;

        // Symbols grouped by length, in symbol order within a length.
        let mut offsets = [0usize; MAX_CODE_LENGTH + 2];
        for len in 1..=MAX_CODE_LENGTH {
            offsets[len + 1] = offsets[len] + usize::from(count[len]);
        }
        let mut sorted = [0u16; MAX_SYMBOLS];
        let mut fill = offsets;
        for (symbol, &len) in lengths.iter().enumerate() {
            if len != 0 {
                sorted[fill[usize::from(len)]] = symbol as u16;
                fill[usize::from(len)] += 1;
            }
        }

        // First canonical code of each length.
        let mut first_code = [0u32; MAX_CODE_LENGTH + 1];
        let mut code = 0u32;
        for len in 1..=MAX_CODE_LENGTH {
            code <<= 1;
            first_code[len] = code;
            code += u32::from(count[len]);
            if code > 1 << len {
                return Err(DecompressError::InvalidHuffmanTable);
            }
        }

        self.entries.fill(0);

        for len in 1..=PRIMARY_BITS as usize {
            let symbols = &sorted[offsets[len]..offsets[len + 1]];
            for (i, &symbol) in symbols.iter().enumerate() {
                let entry = symbol | (((len - 1) as u16) << BITS_SHIFT);
                let start = reverse(first_code[len] + i as u32, len as u32) as usize;
                // Short codes own every slot whose low bits match.
                for slot in (start..PRIMARY_SIZE).step_by(1 << len) {
                    if self.entries[slot] != 0 {
                        return Err(DecompressError::InvalidHuffmanTable);
                    }
                    self.entries[slot] = entry;
                }
            }
        }

        // Widest secondary tables first so narrower ones can nest inside.
        let mut next_secondary = 0usize;
        for len in (PRIMARY_BITS as usize + 1..=MAX_CODE_LENGTH).rev() {
            let symbols = &sorted[offsets[len]..offsets[len + 1]];
            let extra = (len - PRIMARY_BITS as usize) as u32;
            let mut primary = PRIMARY_SIZE;
            let mut secondary = 0usize;
            let mut secondary_bits = 0u32;

            for (i, &symbol) in symbols.iter().enumerate() {
                let rev = reverse(first_code[len] + i as u32, len as u32) as usize;

                if rev & 0xff != primary {
                    primary = rev & 0xff;
                    let existing = self.entries[primary];
                    if existing == 0 {
                        if next_secondary & usize::from(VALUE_MASK) != next_secondary {
                            return Err(DecompressError::InvalidHuffmanTable);
                        }
                        secondary = next_secondary;
                        secondary_bits = extra;
                        next_secondary += 1 << secondary_bits;
                        self.entries[primary] =
                            secondary as u16 | ((extra as u16) << BITS_SHIFT) | SECONDARY_FLAG;
                    } else {
                        if existing & SECONDARY_FLAG == 0 {
                            return Err(DecompressError::InvalidHuffmanTable);
                        }
                        secondary = usize::from(existing & VALUE_MASK);
                        secondary_bits = u32::from((existing >> BITS_SHIFT) & BITS_MASK);
                        if secondary_bits < extra {
                            return Err(DecompressError::InvalidHuffmanTable);
                        }
                    }
                }

                let entry = symbol | ((extra as u16) << BITS_SHIFT);
                for index in ((rev >> 8)..(1 << secondary_bits)).step_by(1 << extra) {
                    let slot = self
                        .entries
                        .get_mut(PRIMARY_SIZE + secondary + index)
                        .ok_or(DecompressError::InvalidHuffmanTable)?;
                    if *slot != 0 {
                        return Err(DecompressError::InvalidHuffmanTable);
                    }
                    *slot = entry;
                }
            }
        }

        Ok(())
    }

    pub fn entries(&self) -> &[u16] {
        &self.entries
    }
}

/// Decode one symbol using `table`, which may be a full [`HuffmanTable`]
/// or one of the fixed tables below.
#[inline]
pub fn decode_symbol(table: &[u16], reader: &mut BitReader) -> Result<u16> {
    reader.refill();
    let bits = reader.peek_bits(MAX_CODE_LENGTH as u32) as usize;
    let entry = *table
        .get(bits & 0xff)
        .ok_or(DecompressError::InvalidHuffmanCode)?;
    let length = u32::from((entry >> BITS_SHIFT) & BITS_MASK);

    if entry & SECONDARY_FLAG == 0 {
        reader.consume(length + 1)?;
        return Ok(entry & VALUE_MASK);
    }

    let index = PRIMARY_SIZE + usize::from(entry & VALUE_MASK) + ((bits >> 8) & ((1 << length) - 1));
    let entry = *table.get(index).ok_or(DecompressError::InvalidHuffmanCode)?;
    let extra = u32::from((entry >> BITS_SHIFT) & BITS_MASK);
    reader.consume(extra + PRIMARY_BITS)?;
    Ok(entry & VALUE_MASK)
}

/// Literal/length lengths for block type 1 (RFC 1951 3.2.6).
pub fn fixed_literal_lengths() -> [u8; 288] {
    let mut lengths = [8u8; 288];
    lengths[144..256].fill(9);
    lengths[256..280].fill(7);
    lengths
}

/// Table for the fixed literal/length code, as produced by
/// [`HuffmanTable::build`] from [`fixed_literal_lengths`].
pub static FIXED_LITERAL_TABLE: [u16; 0x170] = [
    0xd00, 0xe50, 0xe10, 0xf18, 0xd10, 0xe70, 0xe30, 0x1230,
    0xd08, 0xe60, 0xe20, 0x1210, 0xe00, 0xe80, 0xe40, 0x1250,
    0xd04, 0xe58, 0xe18, 0x1200, 0xd14, 0xe78, 0xe38, 0x1240,
    0xd0c, 0xe68, 0xe28, 0x1220, 0xe08, 0xe88, 0xe48, 0x1260,
    0xd02, 0xe54, 0xe14, 0xf1c, 0xd12, 0xe74, 0xe34, 0x1238,
    0xd0a, 0xe64, 0xe24, 0x1218, 0xe04, 0xe84, 0xe44, 0x1258,
    0xd06, 0xe5c, 0xe1c, 0x1208, 0xd16, 0xe7c, 0xe3c, 0x1248,
    0xd0e, 0xe6c, 0xe2c, 0x1228, 0xe0c, 0xe8c, 0xe4c, 0x1268,
    0xd01, 0xe52, 0xe12, 0xf1a, 0xd11, 0xe72, 0xe32, 0x1234,
    0xd09, 0xe62, 0xe22, 0x1214, 0xe02, 0xe82, 0xe42, 0x1254,
    0xd05, 0xe5a, 0xe1a, 0x1204, 0xd15, 0xe7a, 0xe3a, 0x1244,
    0xd0d, 0xe6a, 0xe2a, 0x1224, 0xe0a, 0xe8a, 0xe4a, 0x1264,
    0xd03, 0xe56, 0xe16, 0xf1e, 0xd13, 0xe76, 0xe36, 0x123c,
    0xd0b, 0xe66, 0xe26, 0x121c, 0xe06, 0xe86, 0xe46, 0x125c,
    0xd07, 0xe5e, 0xe1e, 0x120c, 0xd17, 0xe7e, 0xe3e, 0x124c,
    0xd0f, 0xe6e, 0xe2e, 0x122c, 0xe0e, 0xe8e, 0xe4e, 0x126c,
    0xd00, 0xe51, 0xe11, 0xf19, 0xd10, 0xe71, 0xe31, 0x1232,
    0xd08, 0xe61, 0xe21, 0x1212, 0xe01, 0xe81, 0xe41, 0x1252,
    0xd04, 0xe59, 0xe19, 0x1202, 0xd14, 0xe79, 0xe39, 0x1242,
    0xd0c, 0xe69, 0xe29, 0x1222, 0xe09, 0xe89, 0xe49, 0x1262,
    0xd02, 0xe55, 0xe15, 0xf1d, 0xd12, 0xe75, 0xe35, 0x123a,
    0xd0a, 0xe65, 0xe25, 0x121a, 0xe05, 0xe85, 0xe45, 0x125a,
    0xd06, 0xe5d, 0xe1d, 0x120a, 0xd16, 0xe7d, 0xe3d, 0x124a,
    0xd0e, 0xe6d, 0xe2d, 0x122a, 0xe0d, 0xe8d, 0xe4d, 0x126a,
    0xd01, 0xe53, 0xe13, 0xf1b, 0xd11, 0xe73, 0xe33, 0x1236,
    0xd09, 0xe63, 0xe23, 0x1216, 0xe03, 0xe83, 0xe43, 0x1256,
    0xd05, 0xe5b, 0xe1b, 0x1206, 0xd15, 0xe7b, 0xe3b, 0x1246,
    0xd0d, 0xe6b, 0xe2b, 0x1226, 0xe0b, 0xe8b, 0xe4b, 0x1266,
    0xd03, 0xe57, 0xe17, 0xf1f, 0xd13, 0xe77, 0xe37, 0x123e,
    0xd0b, 0xe67, 0xe27, 0x121e, 0xe07, 0xe87, 0xe47, 0x125e,
    0xd07, 0xe5f, 0xe1f, 0x120e, 0xd17, 0xe7f, 0xe3f, 0x124e,
    0xd0f, 0xe6f, 0xe2f, 0x122e, 0xe0f, 0xe8f, 0xe4f, 0x126e,
    0x290, 0x291, 0x292, 0x293, 0x294, 0x295, 0x296, 0x297,
    0x298, 0x299, 0x29a, 0x29b, 0x29c, 0x29d, 0x29e, 0x29f,
    0x2a0, 0x2a1, 0x2a2, 0x2a3, 0x2a4, 0x2a5, 0x2a6, 0x2a7,
    0x2a8, 0x2a9, 0x2aa, 0x2ab, 0x2ac, 0x2ad, 0x2ae, 0x2af,
    0x2b0, 0x2b1, 0x2b2, 0x2b3, 0x2b4, 0x2b5, 0x2b6, 0x2b7,
    0x2b8, 0x2b9, 0x2ba, 0x2bb, 0x2bc, 0x2bd, 0x2be, 0x2bf,
    0x2c0, 0x2c1, 0x2c2, 0x2c3, 0x2c4, 0x2c5, 0x2c6, 0x2c7,
    0x2c8, 0x2c9, 0x2ca, 0x2cb, 0x2cc, 0x2cd, 0x2ce, 0x2cf,
    0x2d0, 0x2d1, 0x2d2, 0x2d3, 0x2d4, 0x2d5, 0x2d6, 0x2d7,
    0x2d8, 0x2d9, 0x2da, 0x2db, 0x2dc, 0x2dd, 0x2de, 0x2df,
    0x2e0, 0x2e1, 0x2e2, 0x2e3, 0x2e4, 0x2e5, 0x2e6, 0x2e7,
    0x2e8, 0x2e9, 0x2ea, 0x2eb, 0x2ec, 0x2ed, 0x2ee, 0x2ef,
    0x2f0, 0x2f1, 0x2f2, 0x2f3, 0x2f4, 0x2f5, 0x2f6, 0x2f7,
    0x2f8, 0x2f9, 0x2fa, 0x2fb, 0x2fc, 0x2fd, 0x2fe, 0x2ff,
];

/// Table for the fixed distance code (32 five-bit codes), which repeats
/// the same 32 entries across the primary region.
pub static FIXED_DISTANCE_TABLE: [u16; 0x100] = {
    let mut table = [0u16; 0x100];
    let mut i = 0;
    while i < 0x100 {
        // Value is the 5-bit index reversed, length field 4 (= 5 - 1).
        let low = i & 0x1f;
        let mut rev = 0;
        let mut b = 0;
        while b < 5 {
            rev |= ((low >> b) & 1) << (4 - b);
            b += 1;
        }
        table[i] = 0x800 | rev as u16;
        i += 1;
    }
    table
};

#[cfg(test)]
mod tests {
    use super::*;

    /// Pack `codes` (value, length) MSB-first into an LSB-first byte stream
    /// the way a DEFLATE encoder writes Huffman codes.
    fn pack_codes(codes: &[(u32, u32)]) -> Vec<u8> {
        let mut out = Vec::new();
        let mut acc = 0u64;
        let mut nbits = 0;
        for &(code, len) in codes {
            acc |= u64::from(reverse(code, len)) << nbits;
            nbits += len;
            while nbits >= 8 {
                out.push(acc as u8);
                acc >>= 8;
                nbits -= 8;
            }
        }
        if nbits > 0 {
            out.push(acc as u8);
        }
        out.extend_from_slice(&[0, 0, 0, 0]);
        out
    }

    /// Canonical codes per RFC 1951 3.2.2.
    fn canonical_codes(lengths: &[u8]) -> Vec<(u32, u32)> {
        let mut bl_count = [0u32; 16];
        for &l in lengths {
            bl_count[l as usize] += 1;
        }
        bl_count[0] = 0;
        let mut next = [0u32; 16];
        let mut code = 0;
        for bits in 1..16 {
            code = (code + bl_count[bits - 1]) << 1;
            next[bits] = code;
        }
        lengths
            .iter()
            .map(|&l| {
                if l == 0 {
                    (0, 0)
                } else {
                    let c = next[l as usize];
                    next[l as usize] += 1;
                    (c, u32::from(l))
                }
            })
            .collect()
    }

    fn assert_every_symbol_decodes(lengths: &[u8]) {
        let table = HuffmanTable::new(lengths).unwrap();
        let codes = canonical_codes(lengths);
        for (symbol, &(code, len)) in codes.iter().enumerate() {
            if len == 0 {
                continue;
            }
            let data = pack_codes(&[(code, len)]);
            let mut reader = BitReader::new(&data);
            assert_eq!(
                decode_symbol(table.entries(), &mut reader).unwrap(),
                symbol as u16,
                "symbol {symbol} (len {len})"
            );
        }
    }

    #[test]
    fn test_fixed_literal_table_matches_builder() {
        let table = HuffmanTable::new(&fixed_literal_lengths()).unwrap();
        assert_eq!(&table.entries()[..FIXED_LITERAL_TABLE.len()], &FIXED_LITERAL_TABLE[..]);
        assert!(table.entries()[FIXED_LITERAL_TABLE.len()..].iter().all(|&e| e == 0));
    }

    #[test]
    fn test_fixed_distance_table_matches_builder() {
        let table = HuffmanTable::new(&[5u8; 32]).unwrap();
        assert_eq!(&table.entries()[..0x100], &FIXED_DISTANCE_TABLE[..]);
        assert_eq!(FIXED_DISTANCE_TABLE[..4], [0x800, 0x810, 0x808, 0x818]);
    }

    #[test]
    fn test_every_symbol_decodes_short_codes() {
        assert_every_symbol_decodes(&[2, 1, 3, 3]);
        assert_every_symbol_decodes(&[3, 3, 3, 3, 3, 2, 4, 4]);
    }

    #[test]
    fn test_every_symbol_decodes_fixed_literals() {
        assert_every_symbol_decodes(&fixed_literal_lengths());
    }

    #[test]
    fn test_every_symbol_decodes_long_codes() {
        // A complete code using every length from 1 to 15 (the last one twice).
        let mut lengths: Vec<u8> = (1..=15).collect();
        lengths.push(15);
        assert_every_symbol_decodes(&lengths);
    }

    #[test]
    fn test_mixed_secondary_widths() {
        // 1 + 1/4 + ... with a mix of 9..12 bit codes sharing prefixes.
        let mut lengths = vec![1u8, 2, 3, 4, 5, 6, 7, 8];
        lengths.extend_from_slice(&[9, 10, 11, 12, 12]);
        assert_every_symbol_decodes(&lengths);
    }

    #[test]
    fn test_oversubscribed_rejected() {
        assert_eq!(
            HuffmanTable::new(&[1, 1, 1]).err(),
            Some(DecompressError::InvalidHuffmanTable)
        );
        assert!(HuffmanTable::new(&[2, 2, 2, 2, 2]).is_err());
        assert!(HuffmanTable::new(&[8u8; 300]).is_err());
    }

    #[test]
    fn test_length_over_15_rejected() {
        assert!(HuffmanTable::new(&[16, 1]).is_err());
    }

    #[test]
    fn test_fixed_table_decodes_end_of_block() {
        // End of block (256) is the 7-bit code 0000000.
        let data = [0u8; 4];
        let mut reader = BitReader::new(&data);
        assert_eq!(decode_symbol(&FIXED_LITERAL_TABLE, &mut reader).unwrap(), 256);
    }
}
