//! Component G: the body unsharer.

use std::collections::HashMap;

use crate::analyzer::ReferenceAnalysis;
use crate::bytecode::ByteCode;
use crate::procsite::ProcSite;

/// Appends a copy of `code.literals[orig_index]` to the literal table and
/// returns its new index — "producing a private copy of a literal object
/// so that in-place rewriting does not disturb other references."
fn unshare_literal(code: &mut ByteCode, orig_index: usize) -> usize {
    let copy = code.literals[orig_index].clone();
    code.literals.push(copy);
    code.literals.len() - 1
}

/// For every proc-site whose body literal is referenced more than once,
/// decides whether it needs a private copy, and if so gives it one. Sites
/// whose body literal is referenced exactly once keep `body_new_index ==
/// body_orig_index` (already the case coming out of `analyzer::analyze`).
pub fn unshare_bodies(code: &mut ByteCode, sites: &mut [ProcSite], analysis: &mut ReferenceAnalysis) {
    let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
    for (i, site) in sites.iter().enumerate() {
        if site.is_compilable() {
            groups.entry(site.body_orig_index as usize).or_default().push(i);
        }
    }

    for (body_orig_index, site_indices) in groups {
        let lit_ref = analysis.get(body_orig_index);
        if lit_ref.num_references < 2 {
            continue;
        }

        let all_proc_references = lit_ref.num_references == lit_ref.num_proc_references;
        if all_proc_references {
            // First occurrence keeps the original slot; every later
            // occurrence gets a private copy.
            for &site_idx in site_indices.iter().skip(1) {
                let new_index = unshare_literal(code, body_orig_index);
                sites[site_idx].body_new_index = new_index as i64;
                analysis.refs.entry(body_orig_index).or_default().num_unshares += 1;
            }
        } else {
            // A non-proc reference exists; even the first occurrence must
            // move to its own copy so in-place rewriting of the body
            // literal can't be observed through that other reference.
            for &site_idx in &site_indices {
                let new_index = unshare_literal(code, body_orig_index);
                sites[site_idx].body_new_index = new_index as i64;
                analysis.refs.entry(body_orig_index).or_default().num_unshares += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::analyze;
    use crate::frontend::{CompileFrontend, ScriptFrontend};
    use crate::procsite::ProcSiteLocator;

    #[test]
    fn unreferenced_twice_body_keeps_original_index() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let mut code = frontend
            .compile_script("proc p {a b} {return 1}", &mut hook)
            .unwrap();
        let mut sites = hook.sites;
        let mut analysis = analyze(&code, &mut sites);
        let before = code.literals.len();
        unshare_bodies(&mut code, &mut sites, &mut analysis);
        assert_eq!(sites[0].body_new_index, sites[0].body_orig_index);
        assert_eq!(code.literals.len(), before);
    }

    #[test]
    fn shared_body_unshares_every_occurrence_after_the_first() {
        let mut frontend = ScriptFrontend::new();
        let mut hook = ProcSiteLocator::default();
        let mut code = frontend
            .compile_script("proc p {} {return 1}\nproc q {} {return 1}", &mut hook)
            .unwrap();
        let mut sites = hook.sites;
        let mut analysis = analyze(&code, &mut sites);
        unshare_bodies(&mut code, &mut sites, &mut analysis);

        assert_eq!(sites[0].body_new_index, sites[0].body_orig_index);
        assert_ne!(sites[1].body_new_index, sites[1].body_orig_index);
        assert_eq!(sites[1].body_new_index, (code.literals.len() - 1) as i64);
    }
}
