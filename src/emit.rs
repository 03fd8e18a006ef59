//! The field emitter (component B): primitive writers for decimal ints,
//! characters, raw strings, and ASCII85 byte sequences, all landing on an
//! arbitrary `io::Write` sink with a caller-chosen separator.

use std::io::{self, Write};

use crate::ascii85;

/// Default field separator. The format is line-oriented; every primitive
/// writes this unless a caller has a reason to pass something else (none of
/// the components in this crate do — kept as a parameter for symmetry with
/// the original writer, which plumbed an arbitrary separator byte through
/// every `Emit*` call).
pub const SEP: u8 = b'\n';

/// Thin wrapper around a `Write` sink providing the four emission
/// primitives §4.B names. Kept as a struct (rather than free functions
/// taking `&mut dyn Write`) so it can later grow buffering without changing
/// call sites.
pub struct Emitter<W: Write> {
    sink: W,
}

impl<W: Write> Emitter<W> {
    pub fn new(sink: W) -> Self {
        Emitter { sink }
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Escape hatch for the rare payload (`NewForeachInfo`'s combined
    /// `"num_lists loop_temp\n"` line) that doesn't decompose into the four
    /// named primitives.
    pub fn sink_mut(&mut self) -> &mut W {
        &mut self.sink
    }

    /// Writes a single byte value followed by the separator.
    pub fn char(&mut self, c: u8, sep: u8) -> io::Result<()> {
        self.sink.write_all(&[c])?;
        self.sink.write_all(&[sep])
    }

    /// Writes the decimal representation of `n` followed by the separator.
    pub fn int(&mut self, n: i64, sep: u8) -> io::Result<()> {
        write!(self.sink, "{n}")?;
        self.sink.write_all(&[sep])
    }

    /// Writes the raw bytes of `s` followed by the separator. Reserved for
    /// header fields and other trusted, already-length-prefixed content —
    /// never for values that might themselves contain the separator or an
    /// unsafe character, which must go through [`Emitter::bytes`] instead.
    pub fn string(&mut self, s: &str, sep: u8) -> io::Result<()> {
        self.sink.write_all(s.as_bytes())?;
        self.sink.write_all(&[sep])
    }

    /// Writes an opaque byte sequence as a decimal length line followed by
    /// line-wrapped ASCII85 text (component A).
    pub fn bytes(&mut self, b: &[u8]) -> io::Result<()> {
        self.int(b.len() as i64, SEP)?;
        let encoded = ascii85::encode(b);
        self.sink.write_all(&encoded)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_and_char_use_the_given_separator() {
        let mut buf = Vec::new();
        {
            let mut e = Emitter::new(&mut buf);
            e.int(42, b' ').unwrap();
            e.char(b'x', b'\n').unwrap();
        }
        assert_eq!(buf, b"42 x\n");
    }

    #[test]
    fn bytes_field_is_length_prefixed() {
        let mut buf = Vec::new();
        {
            let mut e = Emitter::new(&mut buf);
            e.bytes(b"hi").unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("2\n"));
    }
}
