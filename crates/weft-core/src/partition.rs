//! Partitioner (C6): groups bundles into domain-homogeneous [`Swatch`]es and
//! records the cross-domain buffers a backend must materialize between them.
//!
//! One swatch per [`Domain`] value present in the program (at most three:
//! visual, audio, neutral), each holding its bundles in the topological
//! order [`crate::depgraph`] already computed. A dependency edge that
//! crosses a swatch boundary becomes an output buffer on the producer and an
//! input buffer on the consumer — visual and audio backends run on
//! different clocks, so neither can call into the other directly.

use crate::ir::{BundleId, CrossDomainBuffer, Domain, IRProgram, Swatch};

pub fn partition(program: &mut IRProgram) {
    let domains = [Domain::Visual, Domain::Audio, Domain::Neutral];
    let order = program.order.clone();

    let mut swatches: Vec<Swatch> = domains
        .iter()
        .map(|&domain| Swatch {
            id: 0,
            domain,
            backend: domain.backend_name().to_owned(),
            bundles: Vec::new(),
            input_buffers: Vec::new(),
            output_buffers: Vec::new(),
            is_sink: false,
        })
        .collect();

    let swatch_of = |program: &IRProgram, id: BundleId| -> usize {
        let domain = program.bundle(id).domain.unwrap_or(Domain::Neutral);
        domains.iter().position(|d| *d == domain).expect("all three domains present")
    };

    for &id in &order {
        let idx = swatch_of(program, id);
        swatches[idx].bundles.push(id);
        program.bundle_mut(id).swatch = Some(idx as u32);
    }

    for &id in &order {
        let consumer_swatch = program.bundle(id).swatch.unwrap();
        let deps = program.bundle(id).depends_on.clone();
        for dep in deps {
            let producer_swatch = program.bundle(dep).swatch.unwrap();
            if producer_swatch == consumer_swatch {
                continue;
            }
            let width = program.bundle(dep).strands.len();
            for strand in 0..width as u32 {
                swatches[consumer_swatch as usize].input_buffers.push(CrossDomainBuffer {
                    bundle: dep,
                    strand,
                    other_swatch: producer_swatch,
                });
                swatches[producer_swatch as usize].output_buffers.push(CrossDomainBuffer {
                    bundle: dep,
                    strand,
                    other_swatch: consumer_swatch,
                });
            }
        }
    }

    for swatch in &mut swatches {
        swatch.input_buffers.sort_by_key(|b| (b.bundle.0, b.strand));
        swatch.input_buffers.dedup_by_key(|b| (b.bundle.0, b.strand));
        swatch.output_buffers.sort_by_key(|b| (b.bundle.0, b.strand));
        swatch.output_buffers.dedup_by_key(|b| (b.bundle.0, b.strand));
    }

    program.swatches = swatches.into_iter().filter(|s| !s.bundles.is_empty()).collect();
    // Reassign swatch indices after dropping empty domains so they stay
    // dense `[0, program.swatches.len())`.
    for (new_idx, swatch) in program.swatches.clone().into_iter().enumerate() {
        for &id in &swatch.bundles {
            program.bundle_mut(id).swatch = Some(new_idx as u32);
        }
    }
    for (new_idx, swatch) in program.swatches.iter_mut().enumerate() {
        swatch.id = new_idx as u32;
        swatch.is_sink = swatch.bundles.iter().any(|&id| program.bundles[id.0 as usize].sink.is_some());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{annotate, depgraph, lexer::lex, lower::lower, parser::parse};

    fn partitioned(src: &str) -> IRProgram {
        let ast = parse(&lex(src).unwrap()).unwrap();
        let mut program = lower(&ast, 64).unwrap();
        depgraph::analyze(&mut program).unwrap();
        annotate::annotate(&mut program).unwrap();
        partition(&mut program);
        program
    }

    #[test]
    fn cross_domain_read_creates_buffers() {
        // `amp` is read by both a visual and an audio sink, so domain
        // annotation (which merges to `Neutral` on a genuine conflict)
        // leaves it in its own swatch, crossing into both consumers'.
        let program = partitioned("amp.v = 1.0\nplay[0] = amp.v\ndisplay[r,g,b] = [amp.v, amp.v, amp.v]");
        assert!(program.swatches.len() >= 2);
        let total_inputs: usize = program.swatches.iter().map(|s| s.input_buffers.len()).sum();
        assert!(total_inputs > 0);
    }

    #[test]
    fn same_domain_dependency_has_no_buffer() {
        let program = partitioned("a.v = 1.0\nb.v = a.v + 1.0");
        for swatch in &program.swatches {
            assert!(swatch.input_buffers.is_empty());
        }
    }
}
