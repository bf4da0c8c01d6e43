//! End-to-end cache-insertion scenarios (self-reference -> cache read, one
//! cache descriptor per cut edge, history sized to the deepest tap).

use std::collections::HashMap;

use weft_core::{compile, interpret, ir::Domain};

#[test]
fn scenario_4_self_referencing_bundle_gets_one_cache_with_history_at_least_two() {
    // A feedback filter: sig.v depends on its own previous value.
    let plan = compile("sig.v = sig.v * 0.9 + me.x * 0.1", "main.weft").unwrap();

    assert_eq!(plan.cache_descriptors.len(), 1);
    let cache = &plan.cache_descriptors[0];
    assert!(cache.history_size >= 2);
    assert_eq!(cache.history_size, cache.history_size.next_power_of_two());
    assert_eq!(cache.tap, -1);
    assert!(cache.has_self_reference);

    let id = plan.program.bundle_id("sig").unwrap();
    assert_eq!(cache.bundle, id);
    assert_eq!(cache.strand_index, 0);

    // The cache read itself contributes 0.0 in this evaluator, so the
    // strand resolves to just the me.x term.
    let strand = plan.program.bundle(id).strands[0];
    let mut coords = HashMap::new();
    coords.insert("x".to_owned(), 2.0);
    assert_eq!(interpret(&plan.program, strand, &coords), 0.2);
}

#[test]
fn cache_domain_matches_the_reading_bundle_visual_or_audio() {
    let visual = compile("display[r,g,b] = [display.r, 0.0, 0.0]", "main.weft").unwrap();
    assert_eq!(visual.cache_descriptors.len(), 1);
    assert_eq!(visual.cache_descriptors[0].domain, Domain::Visual);

    let audio = compile("play.v = play.v * 0.5 + sin(me.t)", "main.weft").unwrap();
    assert_eq!(audio.cache_descriptors.len(), 1);
    assert_eq!(audio.cache_descriptors[0].domain, Domain::Audio);
}

#[test]
fn mutual_two_bundle_cycle_is_cut_exactly_once() {
    let plan = compile("a.v = b.v + 1.0\nb.v = a.v * 0.5", "main.weft").unwrap();
    assert_eq!(plan.cache_descriptors.len(), 1);
    // A topological order must exist once the cycle is cut.
    assert_eq!(plan.program.order.len(), 2);
}

#[test]
fn explicit_remap_tap_reaches_the_cache_descriptor() {
    // `sig.v(me.t ~ me.t - 4)` must size the cache to the requested depth,
    // not the implicit one-frame-back default.
    let plan = compile("sig.v = sig.v(me.t ~ me.t - 4) * 0.5 + me.x * 0.1", "main.weft").unwrap();

    assert_eq!(plan.cache_descriptors.len(), 1);
    let cache = &plan.cache_descriptors[0];
    assert_eq!(cache.tap, -4);
    assert!(cache.history_size >= 4);
    assert!(!cache.has_self_reference, "an explicit remap tap with no unresolved cycle isn't a self-reference cut");
}

#[test]
fn zero_offset_remap_behaves_like_a_direct_read() {
    let plan = compile("a.v = 1.0\nb.v = a.v(me.t ~ me.t)", "main.weft").unwrap();
    assert!(plan.cache_descriptors.is_empty(), "tap 0 is just the live value, no cache needed");
}
