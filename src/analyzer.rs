//! Component F: the literal reference analyzer.

use std::collections::HashMap;

use crate::bytecode::ByteCode;
use crate::instructions::{inst_len, is_push, read_u32, read_u8, INVOKE_STK1, PUSH4};
use crate::procsite::ProcSite;

/// §3 "Literal-reference record", keyed by the literal's *original* index.
#[derive(Debug, Default, Clone, Copy)]
pub struct LiteralRef {
    pub num_references: u32,
    pub num_proc_references: u32,
    pub num_unshares: u32,
}

/// Result of walking a `ByteCode`'s proc-sites and instruction stream.
#[derive(Debug, Default)]
pub struct ReferenceAnalysis {
    pub refs: HashMap<usize, LiteralRef>,
}

impl ReferenceAnalysis {
    pub fn get(&self, literal_index: usize) -> LiteralRef {
        self.refs.get(&literal_index).copied().unwrap_or_default()
    }
}

fn read_push_operand(code: &[u8], offset: usize) -> (usize, usize) {
    let op = code[offset];
    let index = if op == PUSH4 {
        read_u32(code, offset + 1) as usize
    } else {
        read_u8(code, offset + 1) as usize
    };
    (index, inst_len(op))
}

/// Walks every proc-site's expected five-instruction shape
/// (`push "proc"`, `push name`, `push args`, `push body`, `invoke_stk1 4`),
/// then scans the full code stream counting every push of a literal that
/// turned out to be a body literal.
pub fn analyze(code: &ByteCode, sites: &mut [ProcSite]) -> ReferenceAnalysis {
    let mut analysis = ReferenceAnalysis::default();

    for site in sites.iter_mut() {
        match walk_proc_site(&code.code, site.proc_offset as usize) {
            Some((name_index, args_index, body_index, body_offset)) => {
                site.name_index = name_index as i64;
                site.args_index = args_index as i64;
                site.body_orig_index = body_index as i64;
                site.body_new_index = body_index as i64;
                site.body_offset = body_offset as u32;
                analysis.refs.entry(body_index).or_default().num_proc_references += 1;
            }
            None => {
                site.body_new_index = -1;
            }
        }
    }

    let mut offset = 0usize;
    while offset < code.code.len() {
        let op = code.code[offset];
        if is_push(op) {
            let (index, len) = read_push_operand(&code.code, offset);
            if let Some(entry) = analysis.refs.get_mut(&index) {
                entry.num_references += 1;
            }
            offset += len;
        } else {
            offset += inst_len(op);
        }
    }

    analysis
}

/// Returns `(name_index, args_index, body_index, body_offset)` if the five
/// instructions starting at `offset` are exactly the proc-site shape;
/// `None` on any deviation (§4.F step 1).
fn walk_proc_site(code: &[u8], offset: usize) -> Option<(usize, usize, usize, usize)> {
    let mut pos = offset;
    let mut pushes = [0usize; 4];
    let mut push_offsets = [0usize; 4];
    for slot in 0..4 {
        if pos >= code.len() || !is_push(code[pos]) {
            return None;
        }
        push_offsets[slot] = pos;
        let (index, len) = read_push_operand(code, pos);
        pushes[slot] = index;
        pos += len;
    }
    if pos >= code.len() || code[pos] != INVOKE_STK1 {
        return None;
    }
    if pos + 1 >= code.len() || code[pos + 1] != 4 {
        return None;
    }
    Some((pushes[1], pushes[2], pushes[3], push_offsets[3]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::{CompileFrontend, ScriptFrontend};
    use crate::procsite::ProcSiteLocator;

    #[test]
    fn proc_site_references_are_extracted() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let code = frontend
            .compile_script("proc p {a b} {return 1}", &mut hook)
            .unwrap();
        let mut sites = hook.sites;
        let analysis = analyze(&code, &mut sites);
        assert_eq!(sites[0].body_new_index, sites[0].body_orig_index);
        assert!(sites[0].is_compilable());
        let body_idx = sites[0].body_orig_index as usize;
        assert_eq!(analysis.get(body_idx).num_proc_references, 1);
    }

    #[test]
    fn shared_body_literal_is_referenced_twice() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let code = frontend
            .compile_script("proc p {} {return 1}\nproc q {} {return 1}", &mut hook)
            .unwrap();
        let mut sites = hook.sites;
        let analysis = analyze(&code, &mut sites);
        assert_eq!(sites.len(), 2);
        assert_eq!(sites[0].body_orig_index, sites[1].body_orig_index);
        let body_idx = sites[0].body_orig_index as usize;
        assert_eq!(analysis.get(body_idx).num_proc_references, 2);
    }
}
