use criterion::{Criterion, black_box, criterion_group, criterion_main};
use weft_core::compile;

const DISPLAY_GRADIENT: &str = "display[r,g,b] = [me.x, me.y, fract(me.t)]";

const AUDIO_OSCILLATOR: &str = "\
freq.v = 440.0
phase.v = me.i / me.sampleRate * freq.v * 6.28318
play[0] = sin(phase.v) * 0.3
";

const FEEDBACK_FILTER: &str = "\
sig.v = sig.v * 0.9 + me.x * 0.1
display[r,g,b] = [sig.v, sig.v, sig.v]
";

/// Compiles each representative program once to catch a hard error before
/// the benchmark loop starts timing a panic.
fn run(bench: &mut criterion::Bencher, source: &str) {
    compile(source, "bench.weft").unwrap();
    bench.iter(|| black_box(compile(black_box(source), "bench.weft").unwrap()));
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("compile_display_gradient", |b| run(b, DISPLAY_GRADIENT));
    c.bench_function("compile_audio_oscillator", |b| run(b, AUDIO_OSCILLATOR));
    c.bench_function("compile_feedback_filter", |b| run(b, FEEDBACK_FILTER));
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
