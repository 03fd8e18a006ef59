//! `tbcwriter`: a post-compile bytecode rewriter and object-file serializer
//! for a dynamically-typed scripting language. See the crate's `DESIGN.md`
//! for where each module is grounded and `SPEC_FULL.md` for the full
//! requirements this implements.
//!
//! The public surface mirrors §6's three operations:
//! [`orchestrator::compile`] / [`orchestrator::compile_file`],
//! [`orchestrator::bytecode_extension`], and [`orchestrator::host_version`].

pub mod analyzer;
pub mod ascii85;
pub mod bytecode;
pub mod constants;
pub mod context;
pub mod emit;
pub mod error;
pub mod frontend;
pub mod instructions;
pub mod literal;
pub mod orchestrator;
pub mod procbody;
pub mod procsite;
pub mod rewriter;
pub mod unshare;

pub use error::{Error, Result};
