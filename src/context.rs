//! §5: per-interpreter compiler state.
//!
//! The original keys a small bundle of state of one `Tcl_Interp*`: a literal
//! table that's saved before a compile and restored after (so a compile
//! failure, or a literal created purely as compiler scratch space, can't leak
//! into the interpreter's steady-state table), and a process-global counter
//! used to mint unique dummy command names for proc-body recompilation
//! (§4.H step 3). This module models both, plus the registry that keys a
//! `CompilerContext` by interpreter handle the way the original keys its
//! state off `Tcl_Interp*` identity.

use std::collections::HashMap;

/// Opaque stand-in for whatever identifies a host interpreter instance.
/// A real embedding would use its own interpreter handle type here.
pub type InterpHandle = u64;

/// A small hash-table-backed literal interner, snapshotted and restored
/// around a compile the way `Compiler_CompileFile` saves and restores the
/// interpreter's literal table (§2 supplement 1: "small hash table, rebuild
/// multiplier 3" in the original — modeled here simply as a plain map since
/// this crate has no steady-state table of its own to protect, only the
/// save/restore *shape* to reproduce).
#[derive(Debug, Clone, Default)]
pub struct LiteralInterner {
    entries: HashMap<String, u32>,
    next_index: u32,
}

impl LiteralInterner {
    pub fn new() -> Self {
        LiteralInterner::default()
    }

    /// Returns the existing index for `s`, or allocates and returns a new
    /// one.
    pub fn intern(&mut self, s: &str) -> u32 {
        if let Some(&index) = self.entries.get(s) {
            return index;
        }
        let index = self.next_index;
        self.next_index += 1;
        self.entries.insert(s.to_string(), index);
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Captures the current table so it can be handed back to [`restore`].
    pub fn snapshot(&self) -> LiteralInterner {
        self.clone()
    }

    /// Replaces the live table with a previously captured snapshot,
    /// discarding anything interned since. §4.J step 5 calls this
    /// unconditionally on every exit path — success, compile error, or I/O
    /// error alike.
    pub fn restore(&mut self, snapshot: LiteralInterner) {
        *self = snapshot;
    }
}

/// Per-interpreter compiler state: the literal interner plus the dummy
/// command name counter (§4.H step 3 / §5: "a dummy-command name counter is
/// process-global... must be monotonic" so two overlapping compiles, or two
/// recompiles of the same proc body across runs, never collide).
#[derive(Debug, Default)]
pub struct CompilerContext {
    interner: LiteralInterner,
    dummy_counter: u32,
}

impl CompilerContext {
    pub fn new() -> Self {
        CompilerContext::default()
    }

    pub fn interner_mut(&mut self) -> &mut LiteralInterner {
        &mut self.interner
    }

    /// Snapshots the interner ahead of a compile; pair with [`end_compile`].
    pub fn begin_compile(&mut self) -> LiteralInterner {
        self.interner.snapshot()
    }

    /// Restores the interner to the state [`begin_compile`] captured,
    /// regardless of whether the compile succeeded.
    pub fn end_compile(&mut self, saved: LiteralInterner) {
        self.interner.restore(saved);
    }

    pub fn next_dummy_command_name(&mut self) -> String {
        self.dummy_counter += 1;
        format!("$$compiler$$dummy{}", self.dummy_counter)
    }
}

/// Keys one `CompilerContext` per interpreter handle, torn down completely
/// on every exit path (§5: "full teardown on every exit path" — here,
/// simply dropping the map entry).
#[derive(Debug, Default)]
pub struct ContextRegistry {
    contexts: HashMap<InterpHandle, CompilerContext>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        ContextRegistry::default()
    }

    pub fn get_or_create(&mut self, interp: InterpHandle) -> &mut CompilerContext {
        self.contexts.entry(interp).or_default()
    }

    pub fn teardown(&mut self, interp: InterpHandle) {
        self.contexts.remove(&interp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dummy_command_names_are_monotonic() {
        let mut ctx = CompilerContext::new();
        let a = ctx.next_dummy_command_name();
        let b = ctx.next_dummy_command_name();
        assert_ne!(a, b);
        assert!(a.ends_with("dummy1"));
        assert!(b.ends_with("dummy2"));
    }

    #[test]
    fn interner_restore_discards_entries_added_since_the_snapshot() {
        let mut interner = LiteralInterner::new();
        interner.intern("set");
        let snapshot = interner.snapshot();
        interner.intern("scratch-during-compile");
        assert_eq!(interner.len(), 2);
        interner.restore(snapshot);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn registry_teardown_drops_context_state() {
        let mut registry = ContextRegistry::new();
        registry.get_or_create(1).next_dummy_command_name();
        registry.teardown(1);
        let fresh = registry.get_or_create(1);
        assert_eq!(fresh.next_dummy_command_name(), "$$compiler$$dummy1");
    }
}
