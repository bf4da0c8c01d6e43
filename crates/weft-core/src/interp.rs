//! IR interpreter (C9): a pure CPU evaluator used for previews and tests,
//! never by a production visual/audio backend.
//!
//! Evaluates one [`IRExpr`] against a coordinate map (`"x"`, `"t"`,
//! `"sampleRate"`, ...). A strand access re-enters this same evaluator on
//! the target bundle's strand expression; a per-`(bundle, strand)` visiting
//! set guards against residual recursion (any cycle the IR rewriter missed,
//! or one deliberately left alone because it already routes through a
//! `CacheRead`) and returns `0.0` on re-entry rather than overflowing the
//! stack. `CacheRead` itself always returns `0.0`: this evaluator keeps no
//! ring-buffer history, only the current frame.

use std::collections::HashMap;

use ahash::AHashSet;

use crate::ir::{BinOp, BundleId, Coord, ExprId, IRExpr, IRProgram, UnOp, as_str};

/// Evaluates `expr` against `coords`, a map from coordinate name (`"x"`,
/// `"y"`, `"t"`, `"i"`, `"rate"`, `"sampleRate"`, `"duration"`, ...) to value.
#[must_use]
pub fn interpret(program: &IRProgram, expr: ExprId, coords: &HashMap<String, f64>) -> f64 {
    let mut visiting = AHashSet::new();
    eval(program, expr, coords, &mut visiting)
}

fn eval(program: &IRProgram, id: ExprId, coords: &HashMap<String, f64>, visiting: &mut AHashSet<(BundleId, u32)>) -> f64 {
    match program.expr(id) {
        IRExpr::Number { value } => *value,
        IRExpr::StrandRef { bundle, strand } => {
            let key = (*bundle, *strand);
            if !visiting.insert(key) {
                return 0.0;
            }
            let target = program.bundle(*bundle).strands[*strand as usize];
            let value = eval(program, target, coords, visiting);
            visiting.remove(&key);
            value
        }
        IRExpr::MeRef { coord } => coords.get(coord_name(*coord)).copied().unwrap_or(0.0),
        IRExpr::Param { .. } => 0.0,
        IRExpr::Binary { op, left, right } => {
            let l = eval(program, *left, coords, visiting);
            let r = eval(program, *right, coords, visiting);
            eval_binop(*op, l, r)
        }
        IRExpr::Unary { op, operand } => {
            let v = eval(program, *operand, coords, visiting);
            match op {
                UnOp::Neg => -v,
                UnOp::Not => f64::from(v == 0.0),
            }
        }
        IRExpr::Call { name, args } => eval_call(as_str(name), args, program, coords, visiting),
        IRExpr::CacheRead { .. } | IRExpr::Resource { .. } | IRExpr::Text { .. } => 0.0,
    }
}

fn coord_name(coord: Coord) -> &'static str {
    match coord {
        Coord::X => "x",
        Coord::Y => "y",
        Coord::U => "u",
        Coord::V => "v",
        Coord::W => "w",
        Coord::H => "h",
        Coord::T => "t",
        Coord::I => "i",
        Coord::Rate => "rate",
        Coord::Duration => "duration",
    }
}

fn eval_binop(op: BinOp, l: f64, r: f64) -> f64 {
    match op {
        BinOp::Add => l + r,
        BinOp::Sub => l - r,
        BinOp::Mul => l * r,
        BinOp::Div => {
            if r == 0.0 {
                0.0
            } else {
                l / r
            }
        }
        BinOp::Mod => {
            if r == 0.0 {
                0.0
            } else {
                l.rem_euclid(r)
            }
        }
        BinOp::Pow => l.powf(r),
        BinOp::Eq => f64::from(l == r),
        BinOp::Ne => f64::from(l != r),
        BinOp::Lt => f64::from(l < r),
        BinOp::Gt => f64::from(l > r),
        BinOp::Le => f64::from(l <= r),
        BinOp::Ge => f64::from(l >= r),
        BinOp::And => f64::from(l != 0.0 && r != 0.0),
        BinOp::Or => f64::from(l != 0.0 || r != 0.0),
    }
}

/// Evaluates a builtin call. `select(idx, a, b, ...)` is the one form that
/// must not evaluate every argument: only the branch `idx` resolves to is
/// evaluated, so a guard expression like `select(x > 0, 1.0 / x, 0.0)` is
/// safe. Resource/hardware-input builtins (`texture`, `camera`, `load`,
/// `sample`, `microphone`, `mouse`, `text`, `image`, `audio`) have no real
/// backing data in this evaluator and resolve to `0.0`, matching the
/// synthetic-or-zero contract those collaborators are specified to satisfy
/// outside this crate.
fn eval_call(name: &str, args: &[ExprId], program: &IRProgram, coords: &HashMap<String, f64>, visiting: &mut AHashSet<(BundleId, u32)>) -> f64 {
    let arg = |i: usize| args.get(i).map_or(0.0, |id| eval(program, *id, coords, visiting));
    match name {
        "sin" => arg(0).sin(),
        "cos" => arg(0).cos(),
        "tan" => arg(0).tan(),
        "asin" => arg(0).asin(),
        "acos" => arg(0).acos(),
        "atan" => arg(0).atan(),
        "atan2" => arg(0).atan2(arg(1)),
        "abs" => arg(0).abs(),
        "floor" => arg(0).floor(),
        "ceil" => arg(0).ceil(),
        "round" => arg(0).round(),
        "sqrt" => arg(0).sqrt(),
        "exp" => arg(0).exp(),
        "log" => arg(0).ln(),
        "log2" => arg(0).log2(),
        "sign" => arg(0).signum() * f64::from(arg(0) != 0.0),
        "fract" => arg(0).fract(),
        "pow" => arg(0).powf(arg(1)),
        "mod" => {
            let r = arg(1);
            if r == 0.0 { 0.0 } else { arg(0).rem_euclid(r) }
        }
        "min" => arg(0).min(arg(1)),
        "max" => arg(0).max(arg(1)),
        "step" => f64::from(arg(1) >= arg(0)),
        "clamp" => arg(0).clamp(arg(1).min(arg(2)), arg(1).max(arg(2))),
        "mix" | "lerp" => {
            let (a, b, t) = (arg(0), arg(1), arg(2));
            a + (b - a) * t
        }
        "smoothstep" => {
            let (edge0, edge1, x) = (arg(0), arg(1), arg(2));
            let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
            t * t * (3.0 - 2.0 * t)
        }
        "osc" => (arg(0) * std::f64::consts::TAU).sin() * 0.5 + 0.5,
        "length" => args.iter().map(|&id| eval(program, id, coords, visiting).powi(2)).sum::<f64>().sqrt(),
        "noise" => hash_noise(args.iter().map(|&id| eval(program, id, coords, visiting))),
        "select" => eval_select(args, program, coords, visiting),
        _ => 0.0,
    }
}

fn eval_select(args: &[ExprId], program: &IRProgram, coords: &HashMap<String, f64>, visiting: &mut AHashSet<(BundleId, u32)>) -> f64 {
    let Some((&idx_id, branches)) = args.split_first() else {
        return 0.0;
    };
    if branches.is_empty() {
        return 0.0;
    }
    let idx = eval(program, idx_id, coords, visiting).round() as i64;
    let idx = idx.clamp(0, branches.len() as i64 - 1) as usize;
    eval(program, branches[idx], coords, visiting)
}

/// A small deterministic hash, not a PRNG: the same inputs always map to the
/// same output, with no external entropy source and no `rand`/`rand_chacha`
/// dependency (those crates model a stateful generator, which `noise` is
/// not — it is a pure function of its arguments, like a shader's hash-based
/// noise). Based on the finalizing mix from SplitMix64.
fn hash_noise(values: impl Iterator<Item = f64>) -> f64 {
    let mut h: u64 = 0x9E37_79B9_7F4A_7C15;
    for v in values {
        h ^= v.to_bits();
        h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
        h ^= h >> 31;
    }
    h ^= h >> 33;
    h = h.wrapping_mul(0xFF51_AFD7_ED55_8CCD);
    h ^= h >> 33;
    (h >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::lex, lower::lower, parser::parse, rewrite};

    fn program_for(src: &str) -> IRProgram {
        let ast = parse(&lex(src).unwrap()).unwrap();
        let mut program = lower(&ast, 64).unwrap();
        rewrite::rewrite(&mut program);
        program
    }

    #[test]
    fn number_literal_evaluates_to_itself() {
        let program = program_for("a.v = 42.0");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        assert_eq!(interpret(&program, strand, &HashMap::new()), 42.0);
    }

    #[test]
    fn me_coordinate_reads_from_the_coordinate_map() {
        let program = program_for("a.v = me.x + me.y");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        let mut coords = HashMap::new();
        coords.insert("x".to_owned(), 2.0);
        coords.insert("y".to_owned(), 3.0);
        assert_eq!(interpret(&program, strand, &coords), 5.0);
    }

    #[test]
    fn division_by_zero_returns_zero() {
        let program = program_for("a.v = 1.0 / 0.0");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        assert_eq!(interpret(&program, strand, &HashMap::new()), 0.0);
    }

    #[test]
    fn select_only_evaluates_the_chosen_branch() {
        let program = program_for("a.v = select(1.0, 1.0 / 0.0, 9.0)");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        assert_eq!(interpret(&program, strand, &HashMap::new()), 9.0);
    }

    #[test]
    fn self_reference_resolves_through_cache_read_to_zero() {
        let program = program_for("a.v = a.v + 1.0");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        assert_eq!(interpret(&program, strand, &HashMap::new()), 1.0);
    }

    #[test]
    fn noise_is_deterministic_for_the_same_inputs() {
        let program = program_for("a.v = noise(me.x, me.y)");
        let id = program.bundle_id("a").unwrap();
        let strand = program.bundle(id).strands[0];
        let mut coords = HashMap::new();
        coords.insert("x".to_owned(), 1.0);
        coords.insert("y".to_owned(), 2.0);
        let a = interpret(&program, strand, &coords);
        let b = interpret(&program, strand, &coords);
        assert_eq!(a, b);
    }
}
