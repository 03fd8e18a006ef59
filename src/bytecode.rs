//! §3 data model (the `ByteCode` image) and component D, the image
//! serializer.

use std::io::Write;

use crate::emit::{Emitter, SEP};
use crate::error::Result;
use crate::literal::{AuxData, ExcRangeType, Literal};

/// One command's entry in the location map: the offset and length, in code
/// bytes, of the command's instructions, plus its (optional) source-text
/// counterpart.
#[derive(Debug, Clone, Copy, Default)]
pub struct CmdLocation {
    pub code_offset: u32,
    pub code_length: u32,
    /// Only meaningful when the `srcmap` feature is enabled; see §4.D.
    pub src_offset: u32,
    pub src_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionRange {
    Loop {
        nesting_level: u32,
        code_offset: u32,
        code_length: u32,
        break_offset: u32,
        continue_offset: u32,
    },
    Catch {
        nesting_level: u32,
        code_offset: u32,
        code_length: u32,
        catch_offset: u32,
    },
}

impl ExceptionRange {
    pub fn kind(&self) -> ExcRangeType {
        match self {
            ExceptionRange::Loop { .. } => ExcRangeType::Loop,
            ExceptionRange::Catch { .. } => ExcRangeType::Catch,
        }
    }

    pub fn code_offset(&self) -> u32 {
        match *self {
            ExceptionRange::Loop { code_offset, .. } => code_offset,
            ExceptionRange::Catch { code_offset, .. } => code_offset,
        }
    }

    pub fn code_length(&self) -> u32 {
        match *self {
            ExceptionRange::Loop { code_length, .. } => code_length,
            ExceptionRange::Catch { code_length, .. } => code_length,
        }
    }

    pub fn set_code_offset(&mut self, offset: u32) {
        match self {
            ExceptionRange::Loop { code_offset, .. } => *code_offset = offset,
            ExceptionRange::Catch { code_offset, .. } => *code_offset = offset,
        }
    }

    pub fn set_code_length(&mut self, length: u32) {
        match self {
            ExceptionRange::Loop { code_length, .. } => *code_length = length,
            ExceptionRange::Catch { code_length, .. } => *code_length = length,
        }
    }

    /// All offsets this range targets (control-flow edges), used by the
    /// rewriter to patch them under `Δ`.
    pub fn target_offsets_mut(&mut self) -> Vec<&mut u32> {
        match self {
            ExceptionRange::Loop { break_offset, continue_offset, .. } => {
                vec![break_offset, continue_offset]
            }
            ExceptionRange::Catch { catch_offset, .. } => vec![catch_offset],
        }
    }

    fn serialize<W: Write>(&self, emitter: &mut Emitter<W>) -> Result<()> {
        emitter.char(self.kind().as_char(), b' ')?;
        match *self {
            ExceptionRange::Loop {
                nesting_level,
                code_offset,
                code_length,
                break_offset,
                continue_offset,
            } => {
                emitter.int(nesting_level as i64, b' ')?;
                emitter.int(code_offset as i64, b' ')?;
                emitter.int(code_length as i64, b' ')?;
                emitter.int(break_offset as i64, b' ')?;
                emitter.int(continue_offset as i64, b' ')?;
                emitter.int(0, SEP)?; // catch_or_0
            }
            ExceptionRange::Catch { nesting_level, code_offset, code_length, catch_offset } => {
                emitter.int(nesting_level as i64, b' ')?;
                emitter.int(code_offset as i64, b' ')?;
                emitter.int(code_length as i64, b' ')?;
                emitter.int(0, b' ')?; // break_or_catch placeholder unused
                emitter.int(0, b' ')?; // continue_or_0
                emitter.int(catch_offset as i64, SEP)?;
            }
        }
        Ok(())
    }
}

/// The central entity: a compiled script or procedure body, ready to be
/// serialized. Owns its literal table, exception ranges, aux data, and code
/// bytes (§3 "Ownership").
#[derive(Debug, Clone, Default)]
pub struct ByteCode {
    pub code: Vec<u8>,
    pub literals: Vec<Literal>,
    pub exception_ranges: Vec<ExceptionRange>,
    pub aux_data: Vec<AuxData>,
    pub cmd_locations: Vec<CmdLocation>,
    pub max_except_depth: u32,
    pub max_stack_depth: u32,
}

impl ByteCode {
    pub fn num_commands(&self) -> usize {
        self.cmd_locations.len()
    }

    /// Encodes the four location-map arrays (§4.D / §4.E): deltas between
    /// consecutive command code-offsets, per-command code lengths, and
    /// (when `srcmap` is enabled) the source-text equivalents. Each value
    /// is one byte if it fits in `0..255`, otherwise a `0xFF` tag byte
    /// followed by a big-endian `u32`.
    fn encode_cmd_location_arrays(&self) -> (Vec<u8>, Vec<u8>, Vec<u8>, Vec<u8>) {
        let mut code_delta = Vec::new();
        let mut code_length = Vec::new();
        let mut src_delta = Vec::new();
        let mut src_length = Vec::new();

        // Deltas are start-to-start (this command's offset minus the
        // previous command's offset), not end-to-start: for contiguous code
        // that equals the previous command's length, and `codeOffset`
        // reconstructs on the loader side as a running sum of these deltas.
        let mut prev_code_start = 0u32;
        let mut prev_src_start = 0u32;
        for loc in &self.cmd_locations {
            push_delta(&mut code_delta, loc.code_offset.wrapping_sub(prev_code_start));
            push_delta(&mut code_length, loc.code_length);
            prev_code_start = loc.code_offset;

            if cfg!(feature = "srcmap") {
                push_delta(&mut src_delta, loc.src_offset.wrapping_sub(prev_src_start));
                push_delta(&mut src_length, loc.src_length);
                prev_src_start = loc.src_offset;
            }
        }
        (code_delta, code_length, src_delta, src_length)
    }

    /// Component D: emits the header line, code bytes, location-map arrays,
    /// literal table, exception-range table, and aux-data table, in that
    /// fixed order.
    pub fn serialize<W: Write>(&self, emitter: &mut Emitter<W>) -> Result<()> {
        let (code_delta, code_length, src_delta, src_length) = self.encode_cmd_location_arrays();
        let cmd_loc_bytes = code_delta.len() + code_length.len() + src_delta.len() + src_length.len();

        emitter.int(self.num_commands() as i64, b' ')?;
        emitter.int(0, b' ')?;
        emitter.int(self.code.len() as i64, b' ')?;
        emitter.int(self.literals.len() as i64, b' ')?;
        emitter.int(self.exception_ranges.len() as i64, b' ')?;
        emitter.int(self.aux_data.len() as i64, b' ')?;
        emitter.int(cmd_loc_bytes as i64, b' ')?;
        emitter.int(self.max_except_depth as i64, b' ')?;
        emitter.int(self.max_stack_depth as i64, SEP)?;

        emitter.int(code_delta.len() as i64, b' ')?;
        emitter.int(code_length.len() as i64, b' ')?;
        if cfg!(feature = "srcmap") {
            emitter.int(src_delta.len() as i64, b' ')?;
            emitter.int(src_length.len() as i64, SEP)?;
        } else {
            emitter.int(-1, b' ')?;
            emitter.int(-1, SEP)?;
        }

        emitter.bytes(&self.code)?;
        emitter.bytes(&code_delta)?;
        emitter.bytes(&code_length)?;
        if cfg!(feature = "srcmap") {
            emitter.bytes(&src_delta)?;
            emitter.bytes(&src_length)?;
        }

        for lit in &self.literals {
            lit.serialize(emitter)?;
        }
        for range in &self.exception_ranges {
            range.serialize(emitter)?;
        }
        for aux in &self.aux_data {
            aux.serialize(emitter)?;
        }
        Ok(())
    }
}

fn push_delta(out: &mut Vec<u8>, value: u32) {
    if value < 255 {
        out.push(value as u8);
    } else {
        out.push(0xFF);
        out.extend_from_slice(&value.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bytecode_serializes_zeroed_header() {
        let code = ByteCode::default();
        let mut buf = Vec::new();
        {
            let mut emitter = Emitter::new(&mut buf);
            code.serialize(&mut emitter).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, "0 0 0 0 0 0 0 0 0");
    }

    #[test]
    fn cmd_location_deltas_use_0xff_escape_for_large_values() {
        let mut code = ByteCode::default();
        code.cmd_locations.push(CmdLocation { code_offset: 0, code_length: 300, ..Default::default() });
        let (_, code_length, _, _) = code.encode_cmd_location_arrays();
        assert_eq!(code_length[0], 0xFF);
        assert_eq!(code_length.len(), 5);
    }
}
