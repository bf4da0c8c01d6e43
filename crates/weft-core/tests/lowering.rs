//! End-to-end lowering scenarios: bundle shape, width inference, chain
//! threading, and the boundary cases around both.

use std::collections::HashMap;

use weft_core::{CompileError, compile, error::SemaErrorKind, interpret, ir::Domain};

#[test]
fn scenario_1_display_sink_lowers_to_one_visual_swatch() {
    // display[r,g,b] = [me.x, me.y, fract(me.t)]
    let plan = compile("display[r,g,b] = [me.x, me.y, fract(me.t)]", "main.weft").unwrap();

    let id = plan.program.bundle_id("display").unwrap();
    let bundle = plan.program.bundle(id);
    assert_eq!(bundle.strands.len(), 3);
    assert_eq!(bundle.domain, Some(Domain::Visual));

    assert_eq!(plan.swatches.len(), 1);
    assert_eq!(plan.swatches[0].domain, Domain::Visual);
    assert!(plan.cache_descriptors.is_empty());

    let mut coords = HashMap::new();
    coords.insert("x".to_owned(), 0.25);
    coords.insert("y".to_owned(), 0.75);
    coords.insert("t".to_owned(), 2.5);
    assert_eq!(interpret(&plan.program, bundle.strands[0], &coords), 0.25);
    assert_eq!(interpret(&plan.program, bundle.strands[1], &coords), 0.75);
    assert_eq!(interpret(&plan.program, bundle.strands[2], &coords), 0.5);
}

#[test]
fn scenario_5_chain_threads_every_strand_of_its_base() {
    // a[x,y,z] = [1,2,3]
    // b[x,y,z] = a -> {.0 + .1, .1 * .2, .2 - .0}
    let source = "a[x,y,z] = [1.0,2.0,3.0]\nb[x,y,z] = a -> {.0 + .1, .1 * .2, .2 - .0}";
    let plan = compile(source, "main.weft").unwrap();

    let b = plan.program.bundle_id("b").unwrap();
    let strands = plan.program.bundle(b).strands.clone();
    assert_eq!(strands.len(), 3);

    let coords = HashMap::new();
    assert_eq!(interpret(&plan.program, strands[0], &coords), 3.0); // a.x + a.y
    assert_eq!(interpret(&plan.program, strands[1], &coords), 6.0); // a.y * a.z
    assert_eq!(interpret(&plan.program, strands[2], &coords), 2.0); // a.z - a.x
}

#[test]
fn redeclared_bundle_merges_strands_across_declarations() {
    // The shorthand `x.a = ...` / `x.b = ...` pair contributes strands to
    // one logical bundle rather than two distinct ones.
    let plan = compile("x.a = 1.0\nx.b = 2.0", "main.weft").unwrap();
    let id = plan.program.bundle_id("x").unwrap();
    let bundle = plan.program.bundle(id);
    assert_eq!(bundle.strands.len(), 2);

    let coords = HashMap::new();
    assert_eq!(interpret(&plan.program, bundle.strands[0], &coords), 1.0);
    assert_eq!(interpret(&plan.program, bundle.strands[1], &coords), 2.0);
}

#[test]
fn negative_index_addresses_from_the_end_and_is_stable() {
    let plan = compile("a[x,y,z] = [1.0,2.0,3.0]\nb.v = a.-1", "main.weft").unwrap();
    let id = plan.program.bundle_id("b").unwrap();
    let strand = plan.program.bundle(id).strands[0];
    assert_eq!(interpret(&plan.program, strand, &HashMap::new()), 3.0);
}

#[test]
fn chain_width_mismatch_against_the_declared_output_is_an_error() {
    // The declaration wants 3 outputs but the chain's final stage only
    // produces 2.
    let source = "a[x,y,z] = [1.0,2.0,3.0]\nb[x,y,z] = a -> {.0, .1}";
    let err = compile(source, "main.weft").unwrap_err();
    match err {
        CompileError::Sema(e) => assert_eq!(e.kind, SemaErrorKind::WidthMismatch),
        other => panic!("expected a semantic error, got {other:?}"),
    }
}
