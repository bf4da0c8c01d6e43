//! End-to-end CPU-interpreter scenarios against compiled plans.

use std::collections::HashMap;

use weft_core::{compile, interpret};

fn coords(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
    pairs.iter().map(|(k, v)| ((*k).to_owned(), *v)).collect()
}

fn strand0(plan: &weft_core::Plan, bundle: &str) -> weft_core::ir::ExprId {
    let id = plan.program.bundle_id(bundle).unwrap();
    plan.program.bundle(id).strands[0]
}

#[test]
fn math_builtins_evaluate_through_a_compiled_plan() {
    let plan = compile("a.v = clamp(me.x, 0.0, 1.0) + mix(0.0, 10.0, 0.5)", "main.weft").unwrap();
    let strand = strand0(&plan, "a");
    assert_eq!(interpret(&plan.program, strand, &coords(&[("x", 2.0)])), 1.0 + 5.0);
}

#[test]
fn select_short_circuits_through_a_compiled_plan() {
    let plan = compile("a.v = select(me.x, 1.0 / 0.0, 7.0)", "main.weft").unwrap();
    let strand = strand0(&plan, "a");
    assert_eq!(interpret(&plan.program, strand, &coords(&[("x", 1.0)])), 7.0);
}

#[test]
fn noise_is_pure_and_deterministic_across_two_separate_compiles() {
    let source = "a.v = noise(me.x, me.y, me.t)";
    let plan_a = compile(source, "main.weft").unwrap();
    let plan_b = compile(source, "main.weft").unwrap();
    let c = coords(&[("x", 3.0), ("y", 4.0), ("t", 5.0)]);

    let va = interpret(&plan_a.program, strand0(&plan_a, "a"), &c);
    let vb = interpret(&plan_b.program, strand0(&plan_b, "a"), &c);
    assert_eq!(va, vb);
    assert!((0.0..1.0).contains(&va));
}

#[test]
fn osc_oscillates_between_zero_and_one() {
    let plan = compile("a.v = osc(me.x)", "main.weft").unwrap();
    let strand = strand0(&plan, "a");
    let at_zero = interpret(&plan.program, strand, &coords(&[("x", 0.0)]));
    assert!((at_zero - 0.5).abs() < 1e-9);
    let quarter = interpret(&plan.program, strand, &coords(&[("x", 0.25)]));
    assert!((quarter - 1.0).abs() < 1e-9);
}

#[test]
fn a_feedback_strand_reads_zero_from_its_cache_on_the_first_frame() {
    let plan = compile("sig.v = sig.v + me.x", "main.weft").unwrap();
    let strand = strand0(&plan, "sig");
    assert_eq!(interpret(&plan.program, strand, &coords(&[("x", 4.0)])), 4.0);
}
