//! The compiler frontend is out of scope (§1): it parses source, emits
//! instructions, builds the literal table, and decides exception ranges
//! and aux data. This module defines only the seam this crate needs on it
//! — a trait, rather than a runtime patch of a global command table, per
//! §9's "coroutine-style frontend hook" design note — plus one small
//! in-crate implementation sized to make the §8 scenarios constructible.

use std::collections::HashMap;

use crate::bytecode::{ByteCode, CmdLocation};
use crate::error::{Error, Result};
use crate::instructions::{inst_len, INST_START_CMD, INVOKE_STK1, PUSH1, PUSH4};
use crate::literal::Literal;
use crate::procbody::{split_tcl_list, Local};
use crate::procsite::ProcHook;

/// Seam between the post-processing pipeline and whatever compiles source
/// text into a `ByteCode`. A real binding would implement this over the
/// host interpreter's actual compiler; `ScriptFrontend` below is a fixture.
pub trait CompileFrontend {
    /// Compiles a full top-level script, driving `hook` once per command
    /// exactly as §4.E describes.
    fn compile_script(&mut self, source: &str, hook: &mut dyn ProcHook) -> Result<ByteCode>;

    /// Recompiles one procedure body in the context of a command bound to
    /// `dummy_command_name` with the given formal-argument locals already
    /// installed (§4.H steps 3-4).
    fn compile_proc_body(
        &mut self,
        dummy_command_name: &str,
        locals: &[Local],
        body_text: &str,
    ) -> Result<ByteCode>;

    /// Returns a fresh, process-unique dummy command name (§5: "a dummy-
    /// command name counter is process-global... must be monotonic").
    fn next_dummy_command_name(&mut self) -> String;
}

/// A small command-list compiler: `;`-or-newline-separated commands, each a
/// whitespace-separated list of words (with `{...}` grouping), compiled as
/// `push` each word literal followed by one `invoke_stk`. Every command
/// except the first is preceded by a speculative 9-byte `inst_start_cmd`
/// prologue that is retroactively dropped when the command turns out to be
/// a `proc` invocation — see `procsite.rs`'s module doc for why.
///
/// This is deliberately not a real script compiler: it does no variable
/// resolution, arithmetic, or control flow. It exists to produce the exact
/// instruction shapes (`push push push push invoke_stk1 4`, shared literal
/// indices, `proc`-at-offset-0`) the post-processing pipeline and its test
/// scenarios need.
#[derive(Default)]
pub struct ScriptFrontend {
    dummy_counter: u32,
}

impl ScriptFrontend {
    pub fn new() -> Self {
        ScriptFrontend::default()
    }

    fn compile_commands(&self, source: &str, mut hook: Option<&mut dyn ProcHook>) -> ByteCode {
        let mut code = Vec::new();
        let mut cmd_locations = Vec::new();
        let mut literals: Vec<Literal> = Vec::new();
        let mut interned: HashMap<String, usize> = HashMap::new();
        let mut max_words = 0usize;

        let commands: Vec<&str> = source
            .split(|c| c == ';' || c == '\n')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();

        for (i, command) in commands.iter().enumerate() {
            let words = split_tcl_list(command);
            max_words = max_words.max(words.len());
            let is_proc = words.first().map(|w| w.as_str()) == Some("proc");

            let prologue_start = code.len();
            if i > 0 {
                code.push(INST_START_CMD);
                code.extend_from_slice(&[0u8; 8]);
            }
            let speculative_offset = code.len() as u32;
            if let Some(hook) = hook.as_deref_mut() {
                hook.on_command(i as u32, speculative_offset, is_proc);
            }
            if is_proc && i > 0 {
                code.truncate(prologue_start);
            }

            let cmd_start = code.len();
            for word in &words {
                let index = *interned.entry(word.clone()).or_insert_with(|| {
                    literals.push(Literal::string(word.clone()));
                    literals.len() - 1
                });
                if index < 255 {
                    code.push(PUSH1);
                    code.push(index as u8);
                } else {
                    code.push(PUSH4);
                    code.extend_from_slice(&(index as u32).to_be_bytes());
                }
            }
            code.push(INVOKE_STK1);
            code.push(words.len() as u8);
            cmd_locations.push(CmdLocation {
                code_offset: cmd_start as u32,
                code_length: (code.len() - cmd_start) as u32,
                ..Default::default()
            });
        }

        ByteCode {
            code,
            literals,
            exception_ranges: Vec::new(),
            aux_data: Vec::new(),
            cmd_locations,
            max_except_depth: 0,
            max_stack_depth: max_words as u32,
        }
    }
}

impl CompileFrontend for ScriptFrontend {
    fn compile_script(&mut self, source: &str, hook: &mut dyn ProcHook) -> Result<ByteCode> {
        Ok(self.compile_commands(source, Some(hook)))
    }

    fn compile_proc_body(
        &mut self,
        _dummy_command_name: &str,
        _locals: &[Local],
        body_text: &str,
    ) -> Result<ByteCode> {
        if body_text.trim().is_empty() {
            return Err(Error::compile("procedure body is empty"));
        }
        Ok(self.compile_commands(body_text, None))
    }

    fn next_dummy_command_name(&mut self) -> String {
        self.dummy_counter += 1;
        format!("$$compiler$$dummy{}", self.dummy_counter)
    }
}

/// Sanity-checks that a decoded instruction stream at `offset` is exactly
/// `push* "proc"`, `push* name`, `push* args`, `push* body`,
/// `invoke_stk1 4` — used by both `analyzer.rs` (§4.F step 1) and this
/// module's own tests.
pub fn instruction_widths_at(code: &[u8], mut offset: usize, count: usize) -> Vec<usize> {
    let mut widths = Vec::with_capacity(count);
    for _ in 0..count {
        let op = code[offset];
        let len = inst_len(op);
        widths.push(len);
        offset += len;
    }
    widths
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::procsite::ProcSiteLocator;

    #[test]
    fn empty_script_compiles_to_empty_bytecode() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let code = frontend.compile_script("", &mut hook).unwrap();
        assert_eq!(code.num_commands(), 0);
        assert!(code.code.is_empty());
    }

    #[test]
    fn set_command_pushes_three_words_then_invokes() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let code = frontend.compile_script("set x 1", &mut hook).unwrap();
        assert_eq!(code.num_commands(), 1);
        assert_eq!(code.literals.len(), 3);
        // push1 push1 push1 invoke_stk1 = 2+2+2+2 bytes
        assert_eq!(code.code.len(), 8);
    }

    #[test]
    fn proc_command_at_top_level_is_recorded_with_no_prologue() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let code = frontend
            .compile_script("proc p {a b} {return 1}", &mut hook)
            .unwrap();
        assert_eq!(hook.sites.len(), 1);
        assert_eq!(hook.sites[0].proc_offset, 0);
        assert_eq!(code.code[0], PUSH1);
    }

    #[test]
    fn second_command_proc_site_has_prologue_correctly_dropped() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let code = frontend
            .compile_script("set x 1\nproc p {} {return 1}", &mut hook)
            .unwrap();
        assert_eq!(hook.sites.len(), 1);
        let site_offset = hook.sites[0].proc_offset as usize;
        assert_eq!(code.code[site_offset], PUSH1);
    }
}
