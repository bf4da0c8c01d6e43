//! Annotation pass (C5): assigns each bundle a [`Domain`] and [`Purity`],
//! propagated along the dependency edges [`crate::depgraph`] computed.
//!
//! The two properties flow in opposite directions. Purity flows the same
//! direction expressions do (dependency → dependent): a bundle that reads a
//! stateful or external-input dependency inherits that taint, since its own
//! output can't be any purer than what it's built from. Domain flows the
//! *other* way (dependent → dependency, sink-first): a bundle used only by a
//! visual or audio sink inherits that sink's domain even when it never
//! itself calls a domain-forcing builtin, because it's the consumer, not the
//! producer, that pins which backend a shared computation runs on. Run after
//! [`crate::depgraph::analyze`] so `program.order` and every bundle's
//! `depends_on` are already final.

use crate::{
    depgraph,
    error::SemaError,
    ir::{Domain, ExprId, IRExpr, IRProgram, Purity, SinkKind},
};

/// Builtins that only ever run against real audio hardware/files; calling
/// one forces the containing bundle's domain regardless of what its
/// consumers need. General math builtins like `sin`/`cos` are domain-neutral
/// — they're used constantly on both sides (an oscillating color channel is
/// as common as an oscillator) and must not pull a visual bundle toward
/// audio just because it happens to call `sin`.
const AUDIO_BUILTINS: &[&str] = &["audio", "microphone", "sample"];
const VISUAL_BUILTINS: &[&str] = &["image", "camera", "texture", "mouse"];

/// Fills in `domain` and `purity` for every bundle in `program`.
pub fn annotate(program: &mut IRProgram) -> Result<(), SemaError> {
    let order = program.order.clone();

    // Pass 1 (forward, producer → consumer): each bundle's own sink/builtin
    // domain hint, plus purity propagated from its dependencies. Requires
    // dependencies to already be classified, hence forward order.
    let mut own_domain = vec![None; program.bundles.len()];
    for &id in &order {
        let bundle = program.bundle(id);
        let mut domain = sink_domain(bundle.sink);
        let mut purity = Purity::Pure;
        let strands = bundle.strands.clone();
        for &strand in &strands {
            let (expr_domain, expr_purity) = classify_expr(program, strand);
            domain = merge_domain(domain, expr_domain);
            purity = merge_purity(purity, expr_purity);
        }
        for &dep in &bundle.depends_on {
            if let Some(dep_purity) = program.bundle(dep).purity {
                purity = merge_purity(purity, dep_purity);
            }
        }
        own_domain[id.0 as usize] = domain;
        program.bundle_mut(id).purity = Some(purity);
    }

    // Pass 2 (reverse, consumer → producer): domain propagates from sinks
    // back through every bundle they transitively read. Requires dependents
    // to already be classified, hence reverse order.
    for &id in order.iter().rev() {
        let mut domain = own_domain[id.0 as usize];
        for dependent in depgraph::dependents(program, id) {
            if let Some(dep_domain) = program.bundle(dependent).domain {
                domain = merge_domain(domain, Some(dep_domain));
            }
        }
        program.bundle_mut(id).domain = Some(domain.unwrap_or(Domain::Neutral));
    }

    Ok(())
}

fn sink_domain(sink: Option<SinkKind>) -> Option<Domain> {
    match sink {
        Some(SinkKind::Display) => Some(Domain::Visual),
        Some(SinkKind::Play) => Some(Domain::Audio),
        None => None,
    }
}

fn classify_expr(program: &IRProgram, id: ExprId) -> (Option<Domain>, Purity) {
    match program.expr(id) {
        IRExpr::CacheRead { .. } => (None, Purity::Stateful),
        IRExpr::MeRef { coord } if matches!(coord, crate::ir::Coord::I | crate::ir::Coord::T) => (None, Purity::ExternalInput),
        IRExpr::Call { name, args } => {
            let name = crate::ir::as_str(name);
            let mut domain = if AUDIO_BUILTINS.contains(&name) {
                Some(Domain::Audio)
            } else if VISUAL_BUILTINS.contains(&name) {
                Some(Domain::Visual)
            } else {
                None
            };
            let mut purity = if name == "noise" { Purity::ExternalInput } else { Purity::Pure };
            for &arg in args {
                let (arg_domain, arg_purity) = classify_expr(program, arg);
                domain = merge_domain(domain, arg_domain);
                purity = merge_purity(purity, arg_purity);
            }
            (domain, purity)
        }
        IRExpr::Resource { .. } => (None, Purity::ExternalInput),
        IRExpr::Binary { left, right, .. } => {
            let (ld, lp) = classify_expr(program, *left);
            let (rd, rp) = classify_expr(program, *right);
            (merge_domain(ld, rd), merge_purity(lp, rp))
        }
        IRExpr::Unary { operand, .. } => classify_expr(program, *operand),
        IRExpr::Number { .. } | IRExpr::MeRef { .. } | IRExpr::StrandRef { .. } | IRExpr::Param { .. } | IRExpr::Text { .. } => {
            (None, Purity::Pure)
        }
    }
}

fn merge_domain(a: Option<Domain>, b: Option<Domain>) -> Option<Domain> {
    match (a, b) {
        (Some(x), Some(y)) if x != y => Some(Domain::Neutral),
        (Some(x), _) => Some(x),
        (None, y) => y,
    }
}

fn merge_purity(a: Purity, b: Purity) -> Purity {
    use Purity::{ExternalInput, Pure, Stateful};
    match (a, b) {
        (ExternalInput, _) | (_, ExternalInput) => ExternalInput,
        (Stateful, _) | (_, Stateful) => Stateful,
        (Pure, Pure) => Pure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{depgraph, lexer::lex, lower::lower, parser::parse};

    fn annotated(src: &str) -> IRProgram {
        let ast = parse(&lex(src).unwrap()).unwrap();
        let mut program = lower(&ast, 64).unwrap();
        depgraph::analyze(&mut program).unwrap();
        annotate(&mut program).unwrap();
        program
    }

    #[test]
    fn display_sink_is_visual() {
        let program = annotated("display[r,g,b] = [me.x, me.y, 0.0]");
        let id = program.bundle_id("display").unwrap();
        assert_eq!(program.bundle(id).domain, Some(Domain::Visual));
    }

    #[test]
    fn play_sink_is_audio() {
        let program = annotated("play.v = sin(me.t)");
        let id = program.bundle_id("play").unwrap();
        assert_eq!(program.bundle(id).domain, Some(Domain::Audio));
    }

    #[test]
    fn noise_builtin_is_external_input() {
        let program = annotated("a.v = noise(me.x, me.y)");
        let id = program.bundle_id("a").unwrap();
        assert_eq!(program.bundle(id).purity, Some(Purity::ExternalInput));
    }

    #[test]
    fn domain_propagates_to_dependents() {
        let program = annotated("a.v = sin(me.t)\nplay.v = a.v");
        let a = program.bundle_id("a").unwrap();
        assert_eq!(program.bundle(a).domain, Some(Domain::Audio));
    }
}
