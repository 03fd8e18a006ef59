//! Component C: the literal/AuxData serializer.
//!
//! `Literal` is the closed sum type §3 and §9 describe ("dynamic types ->
//! tagged variants"): every value that can live in a bytecode image's
//! literal table, tagged by a single wire character and dispatched through
//! [`Literal::serialize`]. `AuxData` is the analogous sum type for
//! compile-time auxiliary metadata (jump tables, dict-update variable
//! lists, extended foreach descriptors).

use std::io::Write;

use crate::bytecode::ByteCode;
use crate::emit::{Emitter, SEP};
use crate::error::{Error, Result};
use crate::procbody::ProcDescriptor;

/// One-character tags from `cmpInt.h`'s `CMP_*_CODE` defines.
pub mod tag {
    pub const INT: u8 = b'i';
    pub const DOUBLE: u8 = b'd';
    pub const BOOLEAN: u8 = b'b';
    pub const STRING: u8 = b's';
    pub const OPAQUE: u8 = b'x';
    pub const PROC_BODY: u8 = b'p';
    pub const BYTECODE: u8 = b'c';
}

#[derive(Debug, Clone)]
pub enum Literal {
    Int(i64),
    Double(f64),
    Boolean(bool),
    /// A short string with a known, trusted byte representation.
    String(String),
    /// A value whose runtime type is not one of the recognized primitives
    /// (or any opaque/binary payload); serialized as ASCII85 bytes using
    /// its string form, per §4.C's fallback rule.
    Opaque(Vec<u8>),
    /// A procedure body, installed by the body compiler driver (§4.H) once
    /// a proc-site's body has been recompiled.
    ProcBody(Box<ProcDescriptor>),
    /// A nested bytecode image (used by, e.g., `apply` lambdas compiled
    /// inline; not produced by the fixture frontend but part of the closed
    /// type per §3).
    Bytecode(Box<ByteCode>),
}

impl Literal {
    pub fn tag(&self) -> u8 {
        match self {
            Literal::Int(_) => tag::INT,
            Literal::Double(_) => tag::DOUBLE,
            Literal::Boolean(_) => tag::BOOLEAN,
            Literal::String(_) => tag::STRING,
            Literal::Opaque(_) => tag::OPAQUE,
            Literal::ProcBody(_) => tag::PROC_BODY,
            Literal::Bytecode(_) => tag::BYTECODE,
        }
    }

    /// A short string value, convenience constructor used throughout the
    /// proc-site pipeline (names, "proc", loader-proc literal, ...).
    pub fn string<S: Into<String>>(s: S) -> Literal {
        Literal::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Literal::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn serialize<W: Write>(&self, emitter: &mut Emitter<W>) -> Result<()> {
        emitter.char(self.tag(), SEP)?;
        match self {
            Literal::Int(n) => {
                emitter.int(*n, SEP)?;
            }
            Literal::Double(d) => {
                emitter.string(&format!("{d}"), SEP)?;
            }
            Literal::Boolean(b) => {
                emitter.int(if *b { 1 } else { 0 }, SEP)?;
            }
            Literal::String(s) => {
                emitter.int(s.len() as i64, SEP)?;
                emitter.string(s, SEP)?;
            }
            Literal::Opaque(bytes) => {
                emitter.bytes(bytes)?;
            }
            Literal::ProcBody(desc) => {
                desc.serialize(emitter)?;
            }
            Literal::Bytecode(code) => {
                code.serialize(emitter)?;
            }
        }
        Ok(())
    }
}

/// §3's exception-range kinds, with the `cmpInt.h` tag characters pinned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcRangeType {
    Loop,
    Catch,
}

impl ExcRangeType {
    pub fn as_char(self) -> u8 {
        match self {
            ExcRangeType::Loop => b'L',
            ExcRangeType::Catch => b'C',
        }
    }

    pub fn from_char(c: u8) -> Result<ExcRangeType> {
        match c {
            b'L' => Ok(ExcRangeType::Loop),
            b'C' => Ok(ExcRangeType::Catch),
            other => Err(Error::Format(format!(
                "no exception-range type mapping for tag '{}'",
                other as char
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub enum AuxData {
    JumpTable(JumpTableInfo),
    DictUpdate(DictUpdateInfo),
    NewForeach(NewForeachInfo),
}

pub mod aux_tag {
    pub const JUMP_TABLE: u8 = b'J';
    pub const DICT_UPDATE: u8 = b'D';
    pub const NEW_FOREACH: u8 = b'f';
}

#[derive(Debug, Clone, Default)]
pub struct JumpTableInfo {
    /// `(target_offset, key)` pairs; key is emitted as ASCII85 bytes of the
    /// key's string representation (a hashed-key jump table).
    pub entries: Vec<(i64, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct DictUpdateInfo {
    /// One compiled-local variable index per updated dict key.
    pub var_indices: Vec<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewForeachInfo {
    pub loop_temp: i64,
    /// One entry per `foreach` variable list; each inner vec is that list's
    /// compiled-local variable indices.
    pub var_lists: Vec<Vec<i64>>,
}

impl AuxData {
    pub fn tag(&self) -> u8 {
        match self {
            AuxData::JumpTable(_) => aux_tag::JUMP_TABLE,
            AuxData::DictUpdate(_) => aux_tag::DICT_UPDATE,
            AuxData::NewForeach(_) => aux_tag::NEW_FOREACH,
        }
    }

    pub fn serialize<W: Write>(&self, emitter: &mut Emitter<W>) -> Result<()> {
        emitter.char(self.tag(), SEP)?;
        match self {
            AuxData::JumpTable(info) => {
                emitter.int(info.entries.len() as i64, SEP)?;
                for (target, key) in &info.entries {
                    emitter.int(*target, SEP)?;
                    emitter.bytes(key.as_bytes())?;
                }
            }
            AuxData::DictUpdate(info) => {
                emitter.int(info.var_indices.len() as i64, SEP)?;
                for idx in &info.var_indices {
                    emitter.int(*idx, SEP)?;
                }
            }
            AuxData::NewForeach(info) => {
                write!(emitter_sink(emitter), "{} {}\n", info.var_lists.len(), info.loop_temp)
                    .map_err(Error::Io)?;
                for list in &info.var_lists {
                    emitter.int(list.len() as i64, SEP)?;
                    for idx in list {
                        emitter.int(*idx, SEP)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Small helper so `NewForeach`'s combined `"num_lists loop_temp\n"` line
/// (the one payload that isn't a simple sequence of `int`/`bytes` calls) can
/// still go through the same sink the rest of `serialize` uses.
fn emitter_sink<W: Write>(emitter: &mut Emitter<W>) -> &mut W {
    emitter.sink_mut()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literal_roundtrips_through_tag() {
        let lit = Literal::string("set");
        assert_eq!(lit.tag(), tag::STRING);
        assert_eq!(lit.as_str(), Some("set"));
    }

    #[test]
    fn exc_range_type_chars_match_original_constants() {
        assert_eq!(ExcRangeType::Loop.as_char(), b'L');
        assert_eq!(ExcRangeType::Catch.as_char(), b'C');
        assert!(ExcRangeType::from_char(b'Q').is_err());
    }
}
