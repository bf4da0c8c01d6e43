//! End-to-end partitioning scenarios: one swatch per domain present, cross-
//! domain buffers only where a dependency actually crosses a swatch.

use weft_core::{compile, ir::Domain};

#[test]
fn scenario_2_pure_audio_program_is_one_swatch_in_dependency_order() {
    let source = "freq.v = 440.0\nphase.v = me.i / me.sampleRate * freq.v * 6.28318\nplay[0] = sin(phase.v) * 0.3";
    let plan = compile(source, "main.weft").unwrap();

    assert_eq!(plan.program.bundles.len(), 3);
    let play = plan.program.bundle_id("play").unwrap();
    assert_eq!(plan.program.bundle(play).strands.len(), 1);
    assert_eq!(plan.program.bundle(play).domain, Some(Domain::Audio));

    let freq = plan.program.bundle_id("freq").unwrap();
    let phase = plan.program.bundle_id("phase").unwrap();
    let pos = |id| plan.program.order.iter().position(|b| *b == id).unwrap();
    assert!(pos(freq) < pos(phase));
    assert!(pos(phase) < pos(play));

    assert_eq!(plan.swatches.len(), 1);
    assert_eq!(plan.swatches[0].domain, Domain::Audio);
    assert!(plan.cache_descriptors.is_empty());
}

#[test]
fn scenario_3_mixed_program_puts_the_shared_signal_in_its_own_neutral_swatch() {
    // `amp` calls only domain-neutral math (`abs`/`sin`), so its domain comes
    // entirely from its consumers: read by both an audio and a visual sink,
    // it merges to `Neutral` and lands in a third swatch, crossing into both.
    let source = "amp.v = abs(sin(me.t * 3.0))\n\
                  play[0] = sin(2.0*3.14159*440.0*me.i/me.sampleRate) * amp.v\n\
                  display[r,g,b] = [amp.v, me.y, me.x]";
    let plan = compile(source, "main.weft").unwrap();

    assert_eq!(plan.swatches.len(), 3);
    let domains: Vec<Domain> = plan.swatches.iter().map(|s| s.domain).collect();
    assert!(domains.contains(&Domain::Visual));
    assert!(domains.contains(&Domain::Audio));
    assert!(domains.contains(&Domain::Neutral));

    let amp = plan.program.bundle_id("amp").unwrap();
    assert_eq!(plan.program.bundle(amp).domain, Some(Domain::Neutral));
    let consuming_swatches = plan.swatches.iter().filter(|s| s.input_buffers.iter().any(|b| b.bundle == amp)).count();
    assert_eq!(consuming_swatches, 2, "both play and display must read amp across a swatch boundary");
}

#[test]
fn same_domain_dependency_produces_no_cross_domain_buffer() {
    let plan = compile("a.v = 1.0\nb.v = a.v + 1.0", "main.weft").unwrap();
    assert_eq!(plan.swatches.len(), 1);
    assert!(plan.swatches[0].input_buffers.is_empty());
    assert!(plan.swatches[0].output_buffers.is_empty());
}
