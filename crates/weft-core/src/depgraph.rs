//! Dependency graph (C4): direct bundle→bundle reads, and the topological
//! order later passes walk the program in.
//!
//! `cacheRead` is deliberately not an edge here — by the time this pass
//! runs any self- or mutually-referential temporal access has already been
//! rewritten into an explicit [`crate::ir::IRExpr::CacheRead`] by the IR
//! rewriter (C7) and the cache analyzer (C8), which is exactly what breaks
//! the cycle a direct `StrandRef` back-edge would otherwise create. Run
//! before that rewrite happens (e.g. to validate raw lowerer output), a
//! self-referential bundle is reported as [`SemaErrorKind::CircularDependency`]
//! rather than silently accepted.

use ahash::{AHashMap, AHashSet};

use crate::{
    error::{SemaError, SemaErrorKind},
    ir::{BundleId, ExprId, IRExpr, IRProgram},
};

/// Recomputes `bundle.depends_on` for every bundle from its current strand
/// expressions, then returns a topological order over the bundle set.
/// Returns [`SemaErrorKind::CircularDependency`] if no such order exists.
pub fn analyze(program: &mut IRProgram) -> Result<Vec<BundleId>, SemaError> {
    let deps = direct_dependencies(program);
    for (id, deps) in &deps {
        program.bundle_mut(*id).depends_on = deps.iter().copied().collect();
    }
    let order = topological_order(program, &deps)?;
    program.order = order.clone();
    Ok(order)
}

fn direct_dependencies(program: &IRProgram) -> AHashMap<BundleId, AHashSet<BundleId>> {
    let mut deps = AHashMap::new();
    for (i, bundle) in program.bundles.iter().enumerate() {
        let id = BundleId(i as u32);
        let mut set = AHashSet::new();
        for &strand in &bundle.strands {
            collect_refs(program, strand, &mut set);
        }
        set.remove(&id);
        deps.insert(id, set);
    }
    deps
}

fn collect_refs(program: &IRProgram, expr: ExprId, out: &mut AHashSet<BundleId>) {
    match program.expr(expr) {
        IRExpr::StrandRef { bundle, .. } => {
            out.insert(*bundle);
        }
        IRExpr::Binary { left, right, .. } => {
            collect_refs(program, *left, out);
            collect_refs(program, *right, out);
        }
        IRExpr::Unary { operand, .. } => collect_refs(program, *operand, out),
        IRExpr::Call { args, .. } => {
            for &arg in args {
                collect_refs(program, arg, out);
            }
        }
        IRExpr::Number { .. } | IRExpr::MeRef { .. } | IRExpr::Param { .. } | IRExpr::CacheRead { .. } | IRExpr::Resource { .. } | IRExpr::Text { .. } => {}
    }
}

/// Depth-first topological sort with back-edge detection. Bundle IDs are
/// visited in ascending order so output is stable across runs of the same
/// program rather than depending on hash-map iteration order.
fn topological_order(program: &IRProgram, deps: &AHashMap<BundleId, AHashSet<BundleId>>) -> Result<Vec<BundleId>, SemaError> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let n = program.bundles.len();
    let mut marks = vec![Mark::Unvisited; n];
    let mut order = Vec::with_capacity(n);

    fn visit(
        id: BundleId,
        program: &IRProgram,
        deps: &AHashMap<BundleId, AHashSet<BundleId>>,
        marks: &mut [Mark],
        order: &mut Vec<BundleId>,
    ) -> Result<(), SemaError> {
        match marks[id.0 as usize] {
            Mark::Done => return Ok(()),
            Mark::InProgress => {
                return Err(SemaError::new(
                    SemaErrorKind::CircularDependency,
                    None,
                    format!("'{}' participates in a dependency cycle with no cache boundary", program.bundle(id).name),
                ));
            }
            Mark::Unvisited => {}
        }
        marks[id.0 as usize] = Mark::InProgress;
        if let Some(dependencies) = deps.get(&id) {
            let mut sorted: Vec<BundleId> = dependencies.iter().copied().collect();
            sorted.sort_unstable_by_key(|b| b.0);
            for dep in sorted {
                visit(dep, program, deps, marks, order)?;
            }
        }
        marks[id.0 as usize] = Mark::Done;
        order.push(id);
        Ok(())
    }

    for i in 0..n {
        visit(BundleId(i as u32), program, deps, &mut marks, &mut order)?;
    }
    Ok(order)
}

/// Bundles that read directly from `id` (the inverse of `depends_on`).
#[must_use]
pub fn dependents(program: &IRProgram, id: BundleId) -> Vec<BundleId> {
    program
        .bundles
        .iter()
        .enumerate()
        .filter(|(_, b)| b.depends_on.contains(&id))
        .map(|(i, _)| BundleId(i as u32))
        .collect()
}
