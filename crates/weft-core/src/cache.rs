//! Cache analyzer (C8): finalizes the history size and owning domain of
//! every cache node the IR rewriter (C7) introduced.
//!
//! By the time this pass runs, cycle-breaking itself is already done — C7's
//! `set_expr` splice is what actually cuts a back edge. This pass only reads
//! the resulting `CacheRead` occurrences to size each cache's ring buffer
//! (the deepest tap any reader uses, rounded up to a power of two) and to
//! stamp the domain of the strand(s) that read it, so a backend knows which
//! side owns the buffer. Run after [`crate::annotate::annotate`] so bundle
//! domains are already final.

use ahash::AHashMap;

use crate::ir::{CacheId, Domain, ExprId, IRExpr, IRProgram};

pub fn analyze(program: &mut IRProgram) {
    let mut deepest_tap: AHashMap<CacheId, i64> = AHashMap::new();
    let mut domains: AHashMap<CacheId, Domain> = AHashMap::new();

    for bundle in &program.bundles {
        let domain = bundle.domain.unwrap_or(Domain::Neutral);
        for &strand in &bundle.strands {
            collect(program, strand, domain, &mut deepest_tap, &mut domains);
        }
    }

    for (idx, cache) in program.caches.iter_mut().enumerate() {
        let id = CacheId(idx as u32);
        let tap = deepest_tap.get(&id).copied().unwrap_or(-1);
        cache.tap = tap;
        cache.history_size = history_for_tap(tap);
        cache.domain = domains.get(&id).copied().unwrap_or(Domain::Neutral);
    }
}

fn history_for_tap(tap: i64) -> u32 {
    let magnitude = tap.unsigned_abs().max(2);
    u32::try_from(magnitude).unwrap_or(u32::MAX).next_power_of_two()
}

fn collect(program: &IRProgram, expr: ExprId, domain: Domain, deepest_tap: &mut AHashMap<CacheId, i64>, domains: &mut AHashMap<CacheId, Domain>) {
    match program.expr(expr) {
        IRExpr::CacheRead { cache, tap } => {
            deepest_tap.entry(*cache).and_modify(|d| *d = (*d).min(*tap)).or_insert(*tap);
            domains.entry(*cache).and_modify(|d| *d = merge_domain(*d, domain)).or_insert(domain);
        }
        IRExpr::Binary { left, right, .. } => {
            collect(program, *left, domain, deepest_tap, domains);
            collect(program, *right, domain, deepest_tap, domains);
        }
        IRExpr::Unary { operand, .. } => collect(program, *operand, domain, deepest_tap, domains),
        IRExpr::Call { args, .. } => {
            for &arg in args {
                collect(program, arg, domain, deepest_tap, domains);
            }
        }
        IRExpr::Number { .. } | IRExpr::StrandRef { .. } | IRExpr::MeRef { .. } | IRExpr::Param { .. } | IRExpr::Resource { .. } | IRExpr::Text { .. } => {}
    }
}

fn merge_domain(a: Domain, b: Domain) -> Domain {
    if a == b { a } else { Domain::Neutral }
}
