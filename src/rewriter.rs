//! Component I: the rewriter. After every proc-site's body has been
//! compiled (§4.H), the push of the literal `"proc"` at each site must be
//! changed to push the loader's replacement-for-proc literal instead. This
//! module also folds in the body-literal operand patch for unshared sites
//! (§4.G), since both patches are subject to the same width constraints and
//! the original resolves them together in its final sweep.
//!
//! **Design decision (resolves §9's first open question):** rather than
//! interleaving a per-site local shift with a possible later global
//! expansion — which the original does without proving convergence — this
//! implementation always takes the global-expansion path (§4.I steps 2-5)
//! whenever *any* patch would overflow its instruction's current operand
//! width, and reserves the localized-shift path for the case the original
//! reserves it for: widening needed, but the code contains no jump
//! instruction anywhere to begin with. See DESIGN.md.

use std::collections::HashMap;

use crate::bytecode::ByteCode;
use crate::instructions::{
    inst_len, is_push1, is_short_jump, read_jump_offset, read_u32, widen, JUMP4, JUMP_FALSE4,
    JUMP_TRUE4, PUSH1, PUSH4,
};
use crate::procsite::ProcSite;

/// Appends the loader-proc replacement literal to the table and returns
/// its index (`k` in §4.I).
pub fn append_loader_proc_literal(code: &mut ByteCode) -> usize {
    code.literals.push(crate::literal::Literal::string(crate::constants::qualified_proc_command()));
    code.literals.len() - 1
}

/// Runs the full rewrite: patches every site's `proc` push to `k`, patches
/// every unshared site's body push to its new index, and performs whatever
/// shifting either of those patches forces.
pub fn rewrite(code: &mut ByteCode, sites: &mut [ProcSite], k: usize) {
    let overrides = compute_overrides(sites, k as u32);
    if overrides.is_empty() {
        return;
    }

    if !needs_widening(&code.code, &overrides) {
        for (&offset, &value) in &overrides {
            apply_override_in_place(&mut code.code, offset, value);
        }
        return;
    }

    if !has_short_jump(&code.code) {
        apply_local_shifts(code, sites, &overrides);
    } else {
        apply_global_expansion(code, sites, &overrides);
    }
}

fn compute_overrides(sites: &[ProcSite], k: u32) -> HashMap<usize, u32> {
    let mut overrides = HashMap::new();
    for site in sites {
        if !site.is_compilable() {
            continue;
        }
        overrides.insert(site.proc_offset as usize, k);
        if site.body_new_index != site.body_orig_index {
            overrides.insert(site.body_offset as usize, site.body_new_index as u32);
        }
    }
    overrides
}

fn needs_widening(code: &[u8], overrides: &HashMap<usize, u32>) -> bool {
    overrides.iter().any(|(&offset, &value)| is_push1(code[offset]) && value >= 255)
}

fn has_short_jump(code: &[u8]) -> bool {
    let mut offset = 0;
    while offset < code.len() {
        let op = code[offset];
        if is_short_jump(op) {
            return true;
        }
        offset += inst_len(op);
    }
    false
}

fn apply_override_in_place(code: &mut [u8], offset: usize, value: u32) {
    let op = code[offset];
    if op == PUSH1 {
        debug_assert!(value < 255, "in-place patch must fit a push1 operand");
        code[offset + 1] = value as u8;
    } else {
        debug_assert_eq!(op, PUSH4);
        code[offset + 1..offset + 5].copy_from_slice(&value.to_be_bytes());
    }
}

/// The no-jumps-anywhere branch of §4.I step 1: each overflowing push1 is
/// expanded one at a time, with every downstream offset-bearing table
/// shifted by the insertion size as it happens.
fn apply_local_shifts(code: &mut ByteCode, sites: &mut [ProcSite], overrides: &HashMap<usize, u32>) {
    let mut patches: Vec<(usize, u32)> = overrides.iter().map(|(&o, &v)| (o, v)).collect();
    patches.sort_by_key(|(offset, _)| *offset);

    // Offsets shift as earlier insertions land; track the running
    // cumulative shift and translate each subsequent patch's offset.
    let mut shift_so_far = 0i64;
    for (orig_offset, value) in patches {
        let offset = (orig_offset as i64 + shift_so_far) as usize;
        if code.code[offset] == PUSH4 || value < 255 {
            apply_override_in_place(&mut code.code, offset, value);
            continue;
        }
        // push1 -> push4: insert 3 bytes right after the opcode+operand.
        code.code[offset] = PUSH4;
        let operand_pos = offset + 1;
        let mut wide = [0u8; 4];
        wide.copy_from_slice(&value.to_be_bytes());
        code.code.splice(operand_pos..operand_pos + 1, wide.iter().copied());
        shift_following_tables(code, sites, offset, 3);
        shift_so_far += 3;
    }
}

/// Adds `delta` to every code_offset/code_length/target that lies at or
/// after `insertion_point` (the byte offset a 3-byte gap was just opened
/// at). Mirrors `ShiftByteCodes`'s direct `offset >= startOffset` test.
fn shift_following_tables(code: &mut ByteCode, sites: &mut [ProcSite], insertion_point: usize, delta: u32) {
    for loc in &mut code.cmd_locations {
        if loc.code_offset as usize > insertion_point {
            loc.code_offset += delta;
        } else if (loc.code_offset + loc.code_length) as usize > insertion_point {
            loc.code_length += delta;
        }
    }
    for range in &mut code.exception_ranges {
        let start = range.code_offset() as usize;
        let end = start + range.code_length() as usize;
        if start > insertion_point {
            range.set_code_offset(range.code_offset() + delta);
        } else if end > insertion_point {
            range.set_code_length(range.code_length() + delta);
        }
        for target in range.target_offsets_mut() {
            if *target as usize > insertion_point {
                *target += delta;
            }
        }
    }
    for site in sites.iter_mut() {
        if site.proc_offset as usize > insertion_point {
            site.proc_offset += delta;
        }
        if site.body_offset as usize > insertion_point {
            site.body_offset += delta;
        }
    }
}

/// The global-expansion branch: every `push1` and every short jump in the
/// entire code stream widens, in one pass, using a shift table `Δ`.
fn apply_global_expansion(code: &mut ByteCode, sites: &mut [ProcSite], overrides: &HashMap<usize, u32>) {
    let old_code = &code.code;
    let len = old_code.len();

    // Δ[offset] = cumulative growth strictly to the left of `offset`.
    // Defined at every byte position so `Δ[target]` is always valid for a
    // jump target, which the boundary invariant guarantees lands on an
    // instruction start.
    let mut delta = vec![0u32; len + 1];
    {
        let mut offset = 0usize;
        let mut running = 0u32;
        while offset < len {
            let op = old_code[offset];
            let l = inst_len(op);
            for pos in offset..offset + l {
                delta[pos] = running;
            }
            let growth = if op == PUSH1 || is_short_jump(op) { 3 } else { 0 };
            running += growth;
            offset += l;
        }
        delta[len] = running;
    }
    let total_growth = delta[len];
    if total_growth == 0 {
        // No jump and no push1 anywhere wide enough to matter: only the
        // overrides that already fit need applying.
        for (&offset, &value) in overrides {
            apply_override_in_place(&mut code.code, offset, value);
        }
        return;
    }

    let mut new_code = Vec::with_capacity(len + total_growth as usize);
    {
        let mut offset = 0usize;
        while offset < len {
            let op = old_code[offset];
            let l = inst_len(op);
            if op == PUSH1 {
                let old_index = old_code[offset + 1] as u32;
                let value = overrides.get(&offset).copied().unwrap_or(old_index);
                new_code.push(PUSH4);
                new_code.extend_from_slice(&value.to_be_bytes());
            } else if op == PUSH4 {
                let old_index = read_u32(old_code, offset + 1);
                let value = overrides.get(&offset).copied().unwrap_or(old_index);
                new_code.push(PUSH4);
                new_code.extend_from_slice(&value.to_be_bytes());
            } else if is_short_jump(op) || matches!(op, JUMP4 | JUMP_TRUE4 | JUMP_FALSE4) {
                let wide = matches!(op, JUMP4 | JUMP_TRUE4 | JUMP_FALSE4);
                let off = read_jump_offset(old_code, offset, wide);
                let target = (offset as i64 + off as i64) as usize;
                let new_off = off + (delta[target] as i64 - delta[offset] as i64) as i32;
                let new_op = if wide { op } else { widen(op) };
                new_code.push(new_op);
                new_code.extend_from_slice(&new_off.to_be_bytes());
            } else {
                new_code.extend_from_slice(&old_code[offset..offset + l]);
            }
            offset += l;
        }
    }
    code.code = new_code;

    for loc in &mut code.cmd_locations {
        let old_start = loc.code_offset as usize;
        let old_end = old_start + loc.code_length as usize;
        let new_length = loc.code_length + (delta[old_end] - delta[old_start]);
        loc.code_offset += delta[old_start];
        loc.code_length = new_length;
    }
    for range in &mut code.exception_ranges {
        let old_start = range.code_offset() as usize;
        let old_end = old_start + range.code_length() as usize;
        let new_length = range.code_length() + (delta[old_end] - delta[old_start]);
        range.set_code_offset(range.code_offset() + delta[old_start]);
        range.set_code_length(new_length);
        for target in range.target_offsets_mut() {
            let t = *target as usize;
            *target += delta[t];
        }
    }
    for site in sites.iter_mut() {
        let po = site.proc_offset as usize;
        site.proc_offset += delta[po];
        let bo = site.body_offset as usize;
        site.body_offset += delta[bo];
    }

    // Step 6's tail sweep is unnecessary here: every override was already
    // folded into the transform pass above (the `overrides.get(&offset)`
    // lookups), so every push now carries its final value directly.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::bytecode::CmdLocation;
    use crate::frontend::{CompileFrontend, ScriptFrontend};
    use crate::instructions::{INVOKE_STK1, JUMP1};
    use crate::literal::Literal;
    use crate::procsite::ProcSiteLocator;
    use crate::unshare::unshare_bodies;

    #[test]
    fn small_k_patches_proc_push_in_place() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let mut code = frontend
            .compile_script("proc p {a b} {return 1}", &mut hook)
            .unwrap();
        let mut sites = hook.sites;
        let mut analysis = analyze(&code, &mut sites);
        unshare_bodies(&mut code, &mut sites, &mut analysis);

        let k = append_loader_proc_literal(&mut code);
        rewrite(&mut code, &mut sites, k);

        assert_eq!(code.code[0], PUSH1);
        assert_eq!(code.code[1], k as u8);
    }

    #[test]
    fn forcing_k_past_254_triggers_global_expansion_and_removes_all_push1() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let mut code = frontend
            .compile_script("proc p {} {return 1}", &mut hook)
            .unwrap();
        // Pad the literal table so the loader-proc literal lands at index
        // >= 255 once appended, forcing §4.I's case 2.
        for i in 0..300 {
            code.literals.push(Literal::Int(i));
        }
        // A short jump anywhere forces the global path rather than the
        // local-shift path.
        code.code.push(JUMP1);
        code.code.push(0);
        code.cmd_locations.push(CmdLocation {
            code_offset: (code.code.len() - 2) as u32,
            code_length: 2,
            ..Default::default()
        });

        let mut sites = hook.sites;
        let mut analysis = analyze(&code, &mut sites);
        unshare_bodies(&mut code, &mut sites, &mut analysis);
        let k = append_loader_proc_literal(&mut code);
        assert!(k >= 255);
        rewrite(&mut code, &mut sites, k);

        let mut offset = 0;
        while offset < code.code.len() {
            let op = code.code[offset];
            assert_ne!(op, PUSH1, "push1 should not survive global expansion");
            assert_ne!(op, JUMP1, "jump1 should not survive global expansion");
            offset += inst_len(op);
        }
        // The proc push now carries k as a push4 operand.
        let proc_offset = sites[0].proc_offset as usize;
        assert_eq!(code.code[proc_offset], PUSH4);
        assert_eq!(read_u32(&code.code, proc_offset + 1) as usize, k);
    }

    #[test]
    fn rewrite_is_noop_when_there_are_no_proc_sites() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let mut code = frontend.compile_script("set x 1", &mut hook).unwrap();
        let before = code.code.clone();
        let k = append_loader_proc_literal(&mut code);
        let mut sites: Vec<ProcSite> = Vec::new();
        rewrite(&mut code, &mut sites, k);
        assert_eq!(code.code, before);
        assert!(code.code.contains(&INVOKE_STK1));
    }
}
