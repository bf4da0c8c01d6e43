//! IR rewriter (C7): turns self- and mutually-referential bundle reads into
//! explicit [`crate::ir::IRExpr::CacheRead`] nodes so the program that
//! reaches the dependency graph (C4) is always acyclic.
//!
//! Spindle calls are already inlined at lowering time (their parameter
//! substitution is exactly what a spindle-local temporal remap needs), so
//! the one rewrite this pass performs is the general one: a depth-first walk
//! over the raw (pre-cache) bundle graph that, on hitting a back edge —
//! bundle `B` reading a strand of a bundle still on the DFS stack — replaces
//! that `StrandRef` with a `CacheRead` reading one sample/frame of history.
//! Idempotent: once a back edge is cut, the node is a `CacheRead`, not a
//! `StrandRef`, so a second pass finds nothing left to rewrite.

use crate::ir::{BundleId, ExprId, IRExpr, IRProgram};

pub fn rewrite(program: &mut IRProgram) {
    let n = program.bundles.len();
    let mut marks = vec![Mark::Unvisited; n];
    for i in 0..n {
        visit(BundleId(i as u32), program, &mut marks);
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

fn visit(id: BundleId, program: &mut IRProgram, marks: &mut [Mark]) {
    if marks[id.0 as usize] != Mark::Unvisited {
        return;
    }
    marks[id.0 as usize] = Mark::InProgress;
    let strands = program.bundle(id).strands.clone();
    for strand in strands {
        rewrite_expr(id, strand, program, marks);
    }
    marks[id.0 as usize] = Mark::Done;
}

fn rewrite_expr(owner: BundleId, id: ExprId, program: &mut IRProgram, marks: &mut [Mark]) {
    match program.expr(id).clone() {
        IRExpr::StrandRef { bundle, strand } => {
            if bundle == owner {
                cut_to_cache(id, bundle, strand, program);
                return;
            }
            match marks[bundle.0 as usize] {
                Mark::InProgress => cut_to_cache(id, bundle, strand, program),
                Mark::Unvisited => visit(bundle, program, marks),
                Mark::Done => {}
            }
        }
        IRExpr::Binary { left, right, .. } => {
            rewrite_expr(owner, left, program, marks);
            rewrite_expr(owner, right, program, marks);
        }
        IRExpr::Unary { operand, .. } => rewrite_expr(owner, operand, program, marks),
        IRExpr::Call { args, .. } => {
            for arg in args {
                rewrite_expr(owner, arg, program, marks);
            }
        }
        IRExpr::Number { .. }
        | IRExpr::MeRef { .. }
        | IRExpr::Param { .. }
        | IRExpr::CacheRead { .. }
        | IRExpr::Resource { .. }
        | IRExpr::Text { .. } => {}
    }
}

/// Cuts an implicit (non-remapped) back edge one frame deep: a bare
/// self-reference with no explicit temporal remap always means "my own
/// value from the previous frame," i.e. `tap = -1`. An explicit
/// `bundle.s(me.t ~ me.t - k)` remap instead produces its `CacheRead`
/// directly during lowering (see `lower.rs::lower_remap`), with whatever tap
/// the source program requested, sharing the same cache via
/// `IRProgram::get_or_create_cache`.
fn cut_to_cache(id: ExprId, source_bundle: BundleId, source_strand: u32, program: &mut IRProgram) {
    let cache = program.get_or_create_cache(source_bundle, source_strand, true);
    program.set_expr(id, IRExpr::CacheRead { cache, tap: -1 });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{depgraph, lexer::lex, lower::lower, parser::parse};

    fn rewritten(src: &str) -> IRProgram {
        let ast = parse(&lex(src).unwrap()).unwrap();
        let mut program = lower(&ast, 64).unwrap();
        rewrite(&mut program);
        program
    }

    #[test]
    fn self_reference_becomes_cache_read() {
        let program = rewritten("a.v = a.v + 1.0");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        assert!(matches!(program.expr(strand), IRExpr::Binary { .. }));
        let IRExpr::Binary { left, .. } = program.expr(strand) else { unreachable!() };
        assert!(matches!(program.expr(*left), IRExpr::CacheRead { .. }));
        assert_eq!(program.caches.len(), 1);
    }

    #[test]
    fn mutual_cycle_is_cut_once() {
        let program = rewritten("a.v = b.v + 1.0\nb.v = a.v * 2.0");
        // Exactly one of the two edges should survive as a CacheRead,
        // leaving the dependency graph acyclic.
        let mut program = program;
        depgraph::analyze(&mut program).expect("cycle must be cut");
    }

    #[test]
    fn acyclic_program_is_unchanged() {
        let program = rewritten("a.v = 1.0\nb.v = a.v + 1.0");
        assert!(program.caches.is_empty());
    }
}
