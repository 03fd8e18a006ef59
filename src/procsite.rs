//! §3 `ProcSite` and component E, the proc-call-site locator.
//!
//! The real frontend speculatively emits a command prologue
//! (`inst_start_cmd`) before it knows whether a command will compile
//! inline; when the command turns out to be a `proc` invocation, inlining
//! is suppressed and the prologue is retroactively dropped. The hook fires
//! at the moment the prologue *would* have been kept, so the offset it
//! observes is 9 bytes ahead of where the instruction stream will actually
//! begin once the prologue is removed — except for the very first command,
//! which never gets a speculative prologue in the first place.

use crate::instructions::INST_START_CMD_LEN;

/// Callback the compile frontend drives once per command, immediately
/// before deciding whether to compile it inline.
pub trait ProcHook {
    fn on_command(&mut self, command_index: u32, first_push_offset: u32, is_proc_invocation: bool);
}

/// Transient, lifetime-of-one-compile record naming one `proc` call at top
/// level (§3 "Proc-site record").
#[derive(Debug, Clone)]
pub struct ProcSite {
    pub command_index: u32,
    /// Offset of the first instruction of this command (the `push "proc"`).
    pub proc_offset: u32,
    /// Literal-table index of the pushed proc name, once §4.F has run.
    pub name_index: i64,
    pub args_index: i64,
    pub body_orig_index: i64,
    /// -1 if the body is not compilable (§4.F step 1 deviation).
    pub body_new_index: i64,
    /// Offset of the instruction that pushes the body literal.
    pub body_offset: u32,
}

impl ProcSite {
    fn new(command_index: u32, proc_offset: u32) -> ProcSite {
        ProcSite {
            command_index,
            proc_offset,
            name_index: -1,
            args_index: -1,
            body_orig_index: -1,
            body_new_index: -1,
            body_offset: 0,
        }
    }

    pub fn is_compilable(&self) -> bool {
        self.body_new_index != -1
    }
}

/// Component E: records one `ProcSite` per `proc` invocation the frontend
/// reports through [`ProcHook::on_command`].
#[derive(Debug, Default)]
pub struct ProcSiteLocator {
    pub sites: Vec<ProcSite>,
}

impl ProcHook for ProcSiteLocator {
    fn on_command(&mut self, command_index: u32, first_push_offset: u32, is_proc_invocation: bool) {
        if !is_proc_invocation {
            return;
        }
        let proc_offset = if command_index == 0 {
            first_push_offset
        } else {
            first_push_offset - INST_START_CMD_LEN as u32
        };
        self.sites.push(ProcSite::new(command_index, proc_offset));
    }
}
