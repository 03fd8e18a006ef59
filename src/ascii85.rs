//! A Tcl-safe variant of ASCII85.
//!
//! Differs from standard ASCII85 in four ways:
//!
//! 1. the 85-symbol alphabet excludes the target language's interpolation
//!    and grouping metacharacters `" $ { } [ ] \`; the five excluded slots
//!    are remapped to otherwise-unused letters (`v w x y |`);
//! 2. each 4-byte group is packed **least-significant-byte-first** into the
//!    32-bit word that gets base-85 digitized, so a short trailing group
//!    produces *trailing* `!` symbols (value 0) rather than leading ones,
//!    and those trailing symbols can simply be dropped;
//! 3. an all-zero 4-byte group collapses to the single character `z`;
//! 4. a short final group of `k` bytes (1 <= k < 4) emits exactly `k + 1`
//!    symbols instead of the full 5 (the rest are recoverable zeros).
//!
//! Output is wrapped at 72 symbols per line.

use crate::error::{Error, Result};

/// `encodeMap[i]` is the symbol for base-85 digit `i`.
pub const ENCODE_MAP: [u8; 85] = [
    b'!', b'v', b'#', b'w', b'%', b'&', b'\'', b'(', b')', b'*', b'+', b',', b'-', b'.', b'/',
    b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b':', b';', b'<', b'=', b'>',
    b'?', b'@', b'A', b'B', b'C', b'D', b'E', b'F', b'G', b'H', b'I', b'J', b'K', b'L', b'M',
    b'N', b'O', b'P', b'Q', b'R', b'S', b'T', b'U', b'V', b'W', b'X', b'Y', b'Z', b'x', b'y',
    b'|', b'^', b'_', b'`', b'a', b'b', b'c', b'd', b'e', b'f', b'g', b'h', b'i', b'j', b'k',
    b'l', b'm', b'n', b'o', b'p', b'q', b'r', b's', b't', b'u',
];

/// The maximum number of symbols written per output line before a line
/// terminator is inserted.
pub const LINE_WIDTH: usize = 72;

fn decode_map() -> [i8; 256] {
    let mut map = [-1i8; 256];
    for (digit, &symbol) in ENCODE_MAP.iter().enumerate() {
        map[symbol as usize] = digit as i8;
    }
    map
}

/// Streaming ASCII85 encoder: buffers output symbols and inserts a newline
/// every `LINE_WIDTH` symbols, mirroring the original `A85EncodeContext`.
pub struct Encoder {
    out: Vec<u8>,
    col: usize,
}

impl Encoder {
    pub fn new() -> Self {
        Encoder { out: Vec::new(), col: 0 }
    }

    fn put(&mut self, byte: u8) {
        self.out.push(byte);
        self.col += 1;
        if self.col == LINE_WIDTH {
            self.out.push(b'\n');
            self.col = 0;
        }
    }

    /// Feeds an arbitrary byte slice through the encoder.
    pub fn update(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(4) {
            if chunk.len() == 4 && chunk == [0, 0, 0, 0] {
                self.put(b'z');
                continue;
            }
            // Least-significant-byte-first packing: chunk[0] is the low
            // byte of the 32-bit word.
            let mut word: u32 = 0;
            for (i, &b) in chunk.iter().enumerate() {
                word |= (b as u32) << (8 * i);
            }
            let mut digits = [0u8; 5];
            let mut w = word;
            for d in digits.iter_mut() {
                *d = (w % 85) as u8;
                w /= 85;
            }
            // digits[0] is the least-significant base-85 digit; the
            // standard encoding order writes most-significant digit first,
            // but because the word itself was packed LSB-first, emitting
            // digits in this (already least-significant-first) order is
            // what makes a short group's padding land as trailing `!`s.
            let symbols = chunk.len() + 1;
            for &d in digits.iter().take(symbols) {
                self.put(ENCODE_MAP[d as usize]);
            }
        }
    }

    /// Flushes the encoder, writing any buffered output plus the final line
    /// terminator, and returns the accumulated text.
    pub fn finish(mut self) -> Vec<u8> {
        self.out.push(b'\n');
        self.out
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Encodes `bytes` in a single call, returning the line-wrapped ASCII text
/// (including the trailing line terminator).
pub fn encode(bytes: &[u8]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.update(bytes);
    enc.finish()
}

/// Decodes a complete ASCII85 text (as produced by [`encode`]) back into raw
/// bytes. Whitespace (including the line-wrap newlines) is ignored.
pub fn decode(text: &[u8]) -> Result<Vec<u8>> {
    let map = decode_map();
    let mut out = Vec::new();
    let mut group = [0i8; 5];
    let mut group_len = 0usize;

    for &byte in text {
        if byte == b'\n' || byte == b'\r' {
            continue;
        }
        if byte == b'z' {
            if group_len != 0 {
                return Err(Error::Malformed(
                    "'z' shorthand may not appear inside a partial group".into(),
                ));
            }
            out.extend_from_slice(&[0, 0, 0, 0]);
            continue;
        }
        let digit = map[byte as usize];
        if digit < 0 {
            return Err(Error::Malformed(format!(
                "byte {byte:#x} is not in the ASCII85 safe alphabet"
            )));
        }
        group[group_len] = digit;
        group_len += 1;
        if group_len == 5 {
            decode_group(&group, 5, &mut out)?;
            group_len = 0;
        }
    }
    if group_len != 0 {
        if group_len == 1 {
            return Err(Error::Malformed(
                "a trailing ASCII85 group of a single symbol is invalid".into(),
            ));
        }
        decode_group(&group, group_len, &mut out)?;
    }
    Ok(out)
}

fn decode_group(group: &[i8; 5], len: usize, out: &mut Vec<u8>) -> Result<()> {
    // The digits are ordered least-significant-first (see the encoder). A
    // short group only ever omits its highest-order digits, and those are
    // always 0 — that's exactly why the encoder was allowed to drop them —
    // so padding the missing trailing symbols with digit 0 reconstructs the
    // original word exactly.
    let mut digits = *group;
    for d in digits.iter_mut().skip(len) {
        *d = 0;
    }
    // Accumulate in u64 so a malformed digit (out-of-range input) can't
    // trip a debug-mode overflow panic; the final bounds check below turns
    // that case into a proper error instead.
    let mut word: u64 = 0;
    for (i, &d) in digits.iter().enumerate() {
        word += (d as u64) * 85u64.pow(i as u32);
    }
    if word > u32::MAX as u64 {
        return Err(Error::Malformed(
            "ASCII85 group decodes to a value wider than 32 bits".into(),
        ));
    }
    let bytes = (word as u32).to_le_bytes();
    out.extend_from_slice(&bytes[..len - 1]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(bytes: &[u8]) {
        let encoded = encode(bytes);
        let decoded = decode(&encoded).expect("decode failed");
        assert_eq!(decoded, bytes, "roundtrip mismatch for {bytes:?}");
    }

    #[test]
    fn empty_input_roundtrips() {
        roundtrip(&[]);
    }

    #[test]
    fn all_zero_group_uses_z_shorthand() {
        let encoded = encode(&[0, 0, 0, 0]);
        assert_eq!(&encoded[..1], b"z");
        roundtrip(&[0, 0, 0, 0]);
    }

    #[test]
    fn short_groups_roundtrip_for_every_length_mod_4() {
        for len in 1..=16 {
            let bytes: Vec<u8> = (0..len as u8).collect();
            roundtrip(&bytes);
        }
    }

    #[test]
    fn encoded_output_avoids_unsafe_characters() {
        let bytes: Vec<u8> = (0..=255).collect();
        let encoded = encode(&bytes);
        for &c in &encoded {
            assert!(
                !matches!(c, b'"' | b'$' | b'{' | b'}' | b'[' | b']' | b'\\'),
                "unsafe byte {c:#x} leaked into encoded output"
            );
        }
    }

    #[test]
    fn lines_are_wrapped_at_72_symbols() {
        let bytes = vec![0xAB; 1000];
        let encoded = encode(&bytes);
        for line in encoded.split(|&b| b == b'\n') {
            assert!(line.len() <= LINE_WIDTH);
        }
    }

    #[test]
    fn random_byte_sequences_roundtrip() {
        let mut seed: u32 = 0x2545F491;
        let mut bytes = Vec::new();
        for _ in 0..512 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            bytes.push((seed & 0xff) as u8);
        }
        roundtrip(&bytes);
    }
}
