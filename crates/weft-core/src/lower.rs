//! Lowerer (C3): [`Ast`] → [`IRProgram`].
//!
//! Two passes. Registration builds the symbol tables (bundle widths, strand
//! names, spindle arities) that lowering itself needs to resolve forward
//! references — a bundle may read a strand of a bundle declared later in the
//! file. Lowering then walks every declaration's expression tree once,
//! interning strand accesses, resource literals, and `me` lookups into the
//! arena.

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::{
    ast::{Accessor, Ast, BinOp as AstBinOp, BundleDecl, BundleRef, Expr, ExprNode, Output, SpindleDef, UnOp as AstUnOp},
    error::{SemaError, SemaErrorKind},
    ir::{self, BinOp, Coord, ExprId, IRBundle, IRExpr, IRProgram, SinkKind, UnOp},
    span::Span,
};

const RESOURCE_BUILTINS: &[&str] = &["image", "audio"];
const MATH_BUILTINS: &[&str] = &[
    "sin", "cos", "tan", "asin", "acos", "atan", "sqrt", "abs", "floor", "ceil", "round", "fract", "sign", "exp",
    "log", "log2", "min", "max", "clamp", "mix", "lerp", "smoothstep", "step", "osc", "pow", "select", "noise",
    "length", "atan2",
];

/// Resource-backed builtins whose output is always more than one strand
/// (§4.3.4), keyed to the number of output channels they produce. Each
/// channel lowers to its own `Call` node carrying the shared resource/arg
/// expressions plus a literal channel index, so a downstream backend or the
/// interpreter picks the right component without re-deriving it.
fn multi_width_builtin(name: &str) -> Option<usize> {
    Some(match name {
        "texture" | "camera" | "load" | "mouse" => 3,
        "microphone" | "sample" => 2,
        _ => return None,
    })
}

/// Lowers a full AST into an [`IRProgram`]. `max_nesting_depth` bounds
/// recursive expression depth (spindle-call and chain nesting), guarding
/// against pathological or accidentally-cyclic input before any later pass
/// has a chance to loop.
pub fn lower(ast: &Ast, max_nesting_depth: u32) -> Result<IRProgram, SemaError> {
    let spindles = register_spindles(ast)?;
    let mut program = IRProgram::default();
    let bundle_order = register_bundles(ast, &mut program)?;

    let mut lowerer = Lowerer {
        program: &mut program,
        spindles: &spindles,
        max_depth: max_nesting_depth,
    };

    for name in &bundle_order {
        lowerer.lower_bundle(ast, name)?;
    }

    for bundle in &lowerer.program.bundles {
        if bundle.strands.iter().any(|id| id.0 == u32::MAX) {
            return Err(SemaError::new(
                SemaErrorKind::WidthMismatch,
                None,
                format!("bundle '{}' has a gap in its strand indices", bundle.name),
            ));
        }
    }

    program.order = program.bundles.iter().enumerate().map(|(i, _)| ir::BundleId(i as u32)).collect();
    Ok(program)
}

struct SpindleInfo<'a> {
    def: &'a SpindleDef,
    arity: usize,
    returns: usize,
}

fn register_spindles(ast: &Ast) -> Result<HashMap<String, SpindleInfo<'_>>, SemaError> {
    let mut table = HashMap::new();
    for def in &ast.spindles {
        if table.contains_key(&def.name) {
            return Err(SemaError::new(
                SemaErrorKind::DuplicateSpindle,
                Some(def.span.start),
                format!("spindle '{}' is defined more than once", def.name),
            ));
        }
        let mut indices: Vec<u32> = def.returns.iter().map(|r| r.index).collect();
        indices.sort_unstable();
        indices.dedup();
        if indices.iter().enumerate().any(|(i, idx)| i as u32 != *idx) {
            return Err(SemaError::new(
                SemaErrorKind::MissingReturnIndex,
                Some(def.span.start),
                format!("spindle '{}' return indices must be contiguous starting at 0", def.name),
            ));
        }
        table.insert(def.name.clone(), SpindleInfo {
            def,
            arity: def.params.len(),
            returns: indices.len(),
        });
    }
    Ok(table)
}

/// Groups every top-level `BundleDecl` by bundle name (declarations of the
/// same name contribute strands to one logical bundle — the shorthand
/// `x.a = ...` / `x.b = ...` pair is how a multi-strand bundle is usually
/// built up), computes each bundle's width and named-strand order up front,
/// and pre-allocates its strand slots as sentinels.
///
/// Widths are derived purely from each bundle's declared `Output`s, never
/// from lowering another bundle's expression — this is what lets a bundle
/// reference any other bundle, including itself, regardless of declaration
/// order or temporal self-reference; cycles are a later pass's problem
/// (C4 dependency graph, C8 cache analysis), not the lowerer's.
fn register_bundles(ast: &Ast, program: &mut IRProgram) -> Result<Vec<String>, SemaError> {
    let mut order = Vec::new();
    for decl in &ast.bundles {
        if !program.bundle_index.contains_key(&decl.name) {
            let id = ir::BundleId(program.bundles.len() as u32);
            program.bundle_index.insert(decl.name.clone(), id);
            program.bundles.push(IRBundle {
                name: decl.name.clone(),
                strands: Vec::new(),
                sink: sink_kind(&decl.name),
                domain: None,
                purity: None,
                depends_on: Vec::new(),
                swatch: None,
            });
            order.push(decl.name.clone());
        }
    }
    for name in &order {
        let id = program.bundle_id(name).expect("just inserted");
        let width = bundle_width(ast, name);
        program.bundle_mut(id).strands = vec![ExprId(u32::MAX); width];
    }
    Ok(order)
}

fn bundle_width(ast: &Ast, name: &str) -> usize {
    let mut named_order: Vec<String> = Vec::new();
    let mut max_positional = 0usize;
    for decl in ast.bundles.iter().filter(|d| d.name == name) {
        match decl.outputs.first() {
            Some(Output::Positional(_)) => {
                for out in &decl.outputs {
                    if let Output::Positional(n) = out {
                        max_positional = max_positional.max(*n as usize + 1);
                    }
                }
            }
            _ => {
                for out in &decl.outputs {
                    if let Output::Named(n) = out {
                        if !named_order.contains(n) {
                            named_order.push(n.clone());
                        }
                    }
                }
            }
        }
    }
    max_positional.max(named_order.len()).max(1)
}

fn sink_kind(bundle_name: &str) -> Option<SinkKind> {
    match bundle_name {
        "display" => Some(SinkKind::Display),
        "play" => Some(SinkKind::Play),
        _ => None,
    }
}

struct Lowerer<'p, 'a> {
    program: &'p mut IRProgram,
    spindles: &'a HashMap<String, SpindleInfo<'a>>,
    max_depth: u32,
}

impl Lowerer<'_, '_> {
    /// Lowers every declaration contributing to `name`, writing resolved
    /// strand slots into that bundle in place.
    fn lower_bundle(&mut self, ast: &Ast, name: &str) -> Result<(), SemaError> {
        let bundle_id = self.program.bundle_id(name).expect("registered above");
        let decls: Vec<&BundleDecl> = ast.bundles.iter().filter(|d| d.name == name).collect();
        let named_order = strand_names_for(ast, name);

        for decl in &decls {
            let values = self.lower_multi(ast, &decl.expr, decl.outputs.len(), 0)?;
            if values.len() != decl.outputs.len() {
                return Err(SemaError::new(
                    SemaErrorKind::WidthMismatch,
                    Some(decl.span.start),
                    format!(
                        "bundle '{name}' declares {} output(s) but its expression yields {}",
                        decl.outputs.len(),
                        values.len()
                    ),
                ));
            }
            for (out, value) in decl.outputs.iter().zip(values) {
                let idx = match out {
                    Output::Positional(n) => *n as usize,
                    Output::Named(n) => named_order.iter().position(|x| x == n).expect("registered above"),
                };
                self.program.bundle_mut(bundle_id).strands[idx] = value;
            }
        }

        if self.program.bundle(bundle_id).strands.iter().any(|id| id.0 == u32::MAX) {
            return Err(SemaError::new(
                SemaErrorKind::WidthMismatch,
                Some(decls[0].span.start),
                format!("bundle '{name}' has a gap in its strand indices"),
            ));
        }
        Ok(())
    }

    /// Lowers `expr` into exactly `width` values (a scalar expression only
    /// satisfies `width == 1`; a wider output requires a bundle literal or a
    /// chain whose final stage pattern has matching width).
    fn lower_multi(&mut self, ast: &Ast, expr: &ExprNode, width: usize, depth: u32) -> Result<Vec<ExprId>, SemaError> {
        self.check_depth(depth, expr.span)?;
        if width <= 1 {
            return Ok(vec![self.lower_expr(ast, expr, depth + 1)?]);
        }
        match &*expr.expr {
            Expr::BundleLiteral(items) => items.iter().map(|item| self.lower_expr(ast, item, depth + 1)).collect(),
            Expr::Chain { base, stages } => self.lower_chain(ast, base, stages, depth),
            Expr::Call { callee, args } if multi_width_builtin(callee).is_some() => {
                self.lower_resource_call(ast, callee, args, expr.span, depth)
            }
            _ => Err(SemaError::new(
                SemaErrorKind::WidthMismatch,
                Some(expr.span.start),
                "a multi-output bundle's expression must be a bundle literal, a chain, or a multi-channel resource builtin",
            )),
        }
    }

    /// Lowers a resource builtin that yields more than one strand (§4.3.4).
    /// `texture`/`load`/`camera`/`mouse` yield 3 channels, `microphone`/
    /// `sample` yield 2; each channel is its own `Call` node sharing the same
    /// resource id and coordinate/offset arguments plus a literal channel
    /// index as the final argument.
    fn lower_resource_call(&mut self, ast: &Ast, callee: &str, args: &[ExprNode], span: Span, depth: u32) -> Result<Vec<ExprId>, SemaError> {
        let width = multi_width_builtin(callee).expect("checked by caller");
        let mut shared: SmallVec<[ExprId; 4]> = smallvec::SmallVec::new();
        match callee {
            "texture" | "load" | "sample" => {
                let (path_arg, rest) = args.split_first().ok_or_else(|| {
                    SemaError::new(SemaErrorKind::InvalidExpression, Some(span.start), format!("'{callee}' requires a path argument"))
                })?;
                let Expr::Str(path) = &*path_arg.expr else {
                    return Err(SemaError::new(
                        SemaErrorKind::InvalidExpression,
                        Some(span.start),
                        format!("'{callee}' requires a string literal path"),
                    ));
                };
                let resource = self.program.intern_resource(path);
                shared.push(self.program.push_expr(IRExpr::Resource { resource }));
                if callee == "load" && rest.is_empty() {
                    shared.push(self.program.push_expr(IRExpr::MeRef { coord: Coord::X }));
                    shared.push(self.program.push_expr(IRExpr::MeRef { coord: Coord::Y }));
                } else if callee == "sample" && rest.is_empty() {
                    shared.push(self.program.push_expr(IRExpr::Number { value: 0.0 }));
                } else {
                    for arg in rest {
                        shared.push(self.lower_expr(ast, arg, depth + 1)?);
                    }
                }
            }
            "camera" | "microphone" | "mouse" => {
                for arg in args {
                    shared.push(self.lower_expr(ast, arg, depth + 1)?);
                }
                if callee == "microphone" && shared.is_empty() {
                    shared.push(self.program.push_expr(IRExpr::Number { value: 0.0 }));
                }
            }
            _ => unreachable!("multi_width_builtin covers every reachable callee"),
        }
        (0..width)
            .map(|channel| {
                let mut call_args = shared.clone();
                call_args.push(self.program.push_expr(IRExpr::Number { value: channel as f64 }));
                Ok(self.program.push_expr(IRExpr::Call {
                    name: ir::compact(callee),
                    args: call_args,
                }))
            })
            .collect()
    }

    fn check_depth(&self, depth: u32, span: Span) -> Result<(), SemaError> {
        if depth > self.max_depth {
            return Err(SemaError::new(
                SemaErrorKind::InvalidExpression,
                Some(span.start),
                "expression nesting exceeds the configured maximum depth",
            ));
        }
        Ok(())
    }

    fn lower_expr(&mut self, ast: &Ast, node: &ExprNode, depth: u32) -> Result<ExprId, SemaError> {
        self.check_depth(depth, node.span)?;
        let expr = match &*node.expr {
            Expr::Number(n) => IRExpr::Number { value: *n },
            Expr::Str(_) => {
                return Err(SemaError::new(
                    SemaErrorKind::InvalidExpression,
                    Some(node.span.start),
                    "a string literal is only valid as a resource builtin argument",
                ));
            }
            Expr::Ident(name) => return self.lower_ident(ast, name, node.span, depth),
            Expr::BundleLiteral(_) => {
                return Err(SemaError::new(
                    SemaErrorKind::WidthMismatch,
                    Some(node.span.start),
                    "a bundle literal cannot be used where a single value is expected",
                ));
            }
            Expr::Access { base, accessor } => return self.lower_access(ast, base.as_ref(), accessor, node.span, depth),
            Expr::Binary { op, left, right } => {
                let left = self.lower_expr(ast, left, depth + 1)?;
                let right = self.lower_expr(ast, right, depth + 1)?;
                IRExpr::Binary {
                    op: lower_binop(*op),
                    left,
                    right,
                }
            }
            Expr::Unary { op, operand } => {
                let operand = self.lower_expr(ast, operand, depth + 1)?;
                IRExpr::Unary {
                    op: match op {
                        AstUnOp::Neg => UnOp::Neg,
                        AstUnOp::Not => UnOp::Not,
                    },
                    operand,
                }
            }
            Expr::Call { callee, args } => return self.lower_call(ast, callee, args, node.span, depth),
            Expr::CallExtract { .. } => {
                return Err(SemaError::new(
                    SemaErrorKind::InvalidExpression,
                    Some(node.span.start),
                    "a spindle call's return slot must be selected before use as a scalar",
                ));
            }
            Expr::Remap { base, substitutions } => return self.lower_remap(ast, base, substitutions, depth),
            Expr::Chain { base, stages } => {
                let values = self.lower_chain(ast, base, stages, depth)?;
                if values.len() != 1 {
                    return Err(SemaError::new(
                        SemaErrorKind::WidthMismatch,
                        Some(node.span.start),
                        "a chain used as a scalar must end in a single-element pattern",
                    ));
                }
                return Ok(values[0]);
            }
            Expr::Range { .. } => {
                return Err(SemaError::new(
                    SemaErrorKind::RangeOutsidePattern,
                    Some(node.span.start),
                    "a range literal is only legal inside a chain pattern's output expression",
                ));
            }
        };
        Ok(self.program.push_expr(expr))
    }

    fn lower_ident(&mut self, _ast: &Ast, name: &str, span: Span, _depth: u32) -> Result<ExprId, SemaError> {
        let bundle_id = self.program.bundle_id(name).ok_or_else(|| {
            SemaError::new(
                SemaErrorKind::UnknownIdentifier,
                Some(span.start),
                format!("'{name}' is not a known bundle, spindle, or builtin"),
            )
        })?;
        self.strand_ref(bundle_id, 0, span)
    }

    fn strand_ref(&mut self, bundle: ir::BundleId, strand: u32, _span: Span) -> Result<ExprId, SemaError> {
        Ok(self.program.push_expr(IRExpr::StrandRef { bundle, strand }))
    }

    fn lower_access(
        &mut self,
        ast: &Ast,
        base: Option<&BundleRef>,
        accessor: &Accessor,
        span: Span,
        depth: u32,
    ) -> Result<ExprId, SemaError> {
        let Some(base) = base else {
            return Err(SemaError::new(
                SemaErrorKind::BareStrandOutsidePattern,
                Some(span.start),
                "a bare strand access ('.accessor') is only legal inside a chain pattern",
            ));
        };
        match base {
            BundleRef::Named(name) if name == "me" => {
                let Accessor::Named(coord) = accessor else {
                    return Err(SemaError::new(
                        SemaErrorKind::UnknownStrand,
                        Some(span.start),
                        "'me' only supports named coordinate access",
                    ));
                };
                let coord = resolve_coord(coord).ok_or_else(|| {
                    SemaError::new(SemaErrorKind::UnknownStrand, Some(span.start), format!("'me' has no coordinate '{coord}'"))
                })?;
                return Ok(self.program.push_expr(IRExpr::MeRef { coord }));
            }
            BundleRef::Named(name) => {
                let bundle_id = self.program.bundle_id(name).ok_or_else(|| {
                    SemaError::new(SemaErrorKind::UnknownBundle, Some(span.start), format!("unknown bundle '{name}'"))
                })?;
                let strand = self.resolve_strand_index(ast, name, bundle_id, accessor, span)?;
                self.strand_ref(bundle_id, strand, span)
            }
            BundleRef::Literal(items) => {
                let idx = match accessor {
                    Accessor::Index(i) => normalize_index(*i, items.len(), span)?,
                    _ => {
                        return Err(SemaError::new(
                            SemaErrorKind::InvalidExpression,
                            Some(span.start),
                            "an inline bundle literal only supports integer strand access",
                        ));
                    }
                };
                self.lower_expr(ast, &items[idx], depth + 1)
            }
        }
    }

    fn resolve_strand_index(
        &mut self,
        ast: &Ast,
        name: &str,
        bundle_id: ir::BundleId,
        accessor: &Accessor,
        span: Span,
    ) -> Result<u32, SemaError> {
        let width = self.program.bundle(bundle_id).strands.len();
        match accessor {
            Accessor::Index(i) => Ok(normalize_index(*i, width, span)? as u32),
            Accessor::Named(strand_name) => {
                let decl_names = strand_names_for(ast, name);
                decl_names
                    .iter()
                    .position(|n| n == strand_name)
                    .map(|i| i as u32)
                    .ok_or_else(|| {
                        SemaError::new(
                            SemaErrorKind::UnknownStrand,
                            Some(span.start),
                            format!("bundle '{name}' has no strand '{strand_name}'"),
                        )
                    })
            }
            Accessor::Computed(expr) => {
                let value = const_eval(expr).ok_or_else(|| {
                    SemaError::new(
                        SemaErrorKind::InvalidExpression,
                        Some(span.start),
                        "a computed strand accessor must be a constant expression",
                    )
                })?;
                Ok(normalize_index(value as i64, width, span)? as u32)
            }
        }
    }

    fn lower_call(&mut self, ast: &Ast, callee: &str, args: &[ExprNode], span: Span, depth: u32) -> Result<ExprId, SemaError> {
        if RESOURCE_BUILTINS.contains(&callee) {
            let [arg] = args else {
                return Err(SemaError::new(
                    SemaErrorKind::InvalidExpression,
                    Some(span.start),
                    format!("'{callee}' takes exactly one string argument"),
                ));
            };
            let Expr::Str(path) = &*arg.expr else {
                return Err(SemaError::new(
                    SemaErrorKind::InvalidExpression,
                    Some(span.start),
                    format!("'{callee}' requires a string literal path"),
                ));
            };
            let resource = self.program.intern_resource(path);
            return Ok(self.program.push_expr(IRExpr::Resource { resource }));
        }
        if callee == "text" {
            let [path_arg, x, y] = args else {
                return Err(SemaError::new(
                    SemaErrorKind::InvalidExpression,
                    Some(span.start),
                    "'text' takes a string path and two coordinate arguments",
                ));
            };
            let Expr::Str(path) = &*path_arg.expr else {
                return Err(SemaError::new(SemaErrorKind::InvalidExpression, Some(span.start), "'text' requires a string literal path"));
            };
            let text = self.program.intern_text(path);
            let mut lowered = smallvec::SmallVec::new();
            lowered.push(self.program.push_expr(IRExpr::Text { text }));
            lowered.push(self.lower_expr(ast, x, depth + 1)?);
            lowered.push(self.lower_expr(ast, y, depth + 1)?);
            return Ok(self.program.push_expr(IRExpr::Call {
                name: ir::compact("text"),
                args: lowered,
            }));
        }
        if multi_width_builtin(callee).is_some() {
            return Err(SemaError::new(
                SemaErrorKind::WidthMismatch,
                Some(span.start),
                format!("'{callee}' produces more than one strand and cannot be used where a single value is expected"),
            ));
        }
        if MATH_BUILTINS.contains(&callee) {
            let mut lowered = smallvec::SmallVec::new();
            for arg in args {
                lowered.push(self.lower_expr(ast, arg, depth + 1)?);
            }
            return Ok(self.program.push_expr(IRExpr::Call {
                name: ir::compact(callee),
                args: lowered,
            }));
        }
        if let Some(info) = self.spindles.get(callee) {
            if args.len() != info.arity {
                return Err(SemaError::new(
                    SemaErrorKind::WidthMismatch,
                    Some(span.start),
                    format!("spindle '{callee}' expects {} argument(s), found {}", info.arity, args.len()),
                ));
            }
            if info.returns != 1 {
                return Err(SemaError::new(
                    SemaErrorKind::InvalidExpression,
                    Some(span.start),
                    format!("spindle '{callee}' returns {} values; select one with '.N'", info.returns),
                ));
            }
            let values = self.lower_spindle_call(ast, callee, args, span, depth)?;
            return Ok(values[0]);
        }
        Err(SemaError::new(
            SemaErrorKind::UnknownSpindle,
            Some(span.start),
            format!("'{callee}' is not a known spindle or builtin"),
        ))
    }

    /// Inlines a spindle call at lowering time: evaluates each argument once
    /// (as its own strand access target, so a shared argument expression
    /// isn't duplicated) and substitutes parameter references while lowering
    /// the spindle body.
    fn lower_spindle_call(
        &mut self,
        ast: &Ast,
        name: &str,
        args: &[ExprNode],
        span: Span,
        depth: u32,
    ) -> Result<Vec<ExprId>, SemaError> {
        self.check_depth(depth, span)?;
        let arg_values: Vec<ExprId> = args.iter().map(|a| self.lower_expr(ast, a, depth + 1)).collect::<Result<_, _>>()?;
        // `self.spindles` is itself `&'a HashMap<..>`, so the `SpindleDef`
        // reference it yields lives as long as `ast`, not as long as this
        // mutable borrow of `self` — no clone needed to sidestep the borrow.
        let def = self.spindles.get(name).expect("checked by caller").def;
        let mut locals: HashMap<String, ExprId> = HashMap::new();
        for (param, value) in def.params.iter().zip(&arg_values) {
            locals.insert(param.clone(), *value);
        }
        for local in &def.locals {
            let value = self.lower_expr_with_locals(ast, &local.expr, &locals, depth + 1)?;
            locals.insert(local.name.clone(), value);
        }
        let mut returns = vec![ExprId(u32::MAX); def.returns.len()];
        for ret in &def.returns {
            returns[ret.index as usize] = self.lower_expr_with_locals(ast, &ret.expr, &locals, depth + 1)?;
        }
        Ok(returns)
    }

    /// Like [`Self::lower_expr`] but resolves bare identifiers against a
    /// spindle's parameter/local scope before falling back to top-level
    /// bundles.
    fn lower_expr_with_locals(
        &mut self,
        ast: &Ast,
        node: &ExprNode,
        locals: &HashMap<String, ExprId>,
        depth: u32,
    ) -> Result<ExprId, SemaError> {
        if let Expr::Ident(name) = &*node.expr {
            if let Some(value) = locals.get(name) {
                return Ok(*value);
            }
        }
        // Nested non-identifier expressions inside a spindle body (binary
        // ops over parameters, etc.) still need locals substituted; walk
        // manually for the common shapes rather than threading `locals`
        // through every branch of `lower_expr`.
        match &*node.expr {
            Expr::Binary { op, left, right } => {
                let left = self.lower_expr_with_locals(ast, left, locals, depth + 1)?;
                let right = self.lower_expr_with_locals(ast, right, locals, depth + 1)?;
                Ok(self.program.push_expr(IRExpr::Binary {
                    op: lower_binop(*op),
                    left,
                    right,
                }))
            }
            Expr::Unary { op, operand } => {
                let operand = self.lower_expr_with_locals(ast, operand, locals, depth + 1)?;
                Ok(self.program.push_expr(IRExpr::Unary {
                    op: match op {
                        AstUnOp::Neg => UnOp::Neg,
                        AstUnOp::Not => UnOp::Not,
                    },
                    operand,
                }))
            }
            Expr::Call { callee, args } if MATH_BUILTINS.contains(&callee.as_str()) => {
                let mut lowered = smallvec::SmallVec::new();
                for arg in args {
                    lowered.push(self.lower_expr_with_locals(ast, arg, locals, depth + 1)?);
                }
                Ok(self.program.push_expr(IRExpr::Call {
                    name: ir::compact(callee),
                    args: lowered,
                }))
            }
            _ => self.lower_expr(ast, node, depth),
        }
    }

    /// A remap evaluates `base` with each named domain temporarily bound to
    /// the paired expression (§3.1 `remap(base, substitutions)`). The only
    /// substitution with a runtime effect in this evaluator is a temporal
    /// one: `me.<coord> ~ me.<coord> - k` rebinds `base`'s own coordinate to
    /// `k` steps in the past, which becomes a direct cache read at tap `-k`
    /// rather than a live strand reference. A domain naming a known bundle's
    /// strand is a structural relationship; it is validated here (the
    /// accessor must resolve) but `base` itself is otherwise unaffected,
    /// since no substitution besides the temporal one changes what this
    /// evaluator computes.
    fn lower_remap(
        &mut self,
        ast: &Ast,
        base: &ExprNode,
        substitutions: &[(ExprNode, ExprNode)],
        depth: u32,
    ) -> Result<ExprId, SemaError> {
        self.check_depth(depth, base.span)?;
        let mut tap: Option<i64> = None;
        for (dom, value) in substitutions {
            match &*dom.expr {
                Expr::Access {
                    base: Some(BundleRef::Named(n)),
                    accessor: Accessor::Named(coord),
                } if n == "me" => {
                    let coord = resolve_coord(coord).ok_or_else(|| {
                        SemaError::new(SemaErrorKind::UnknownStrand, Some(dom.span.start), format!("'me' has no coordinate '{coord}'"))
                    })?;
                    let offset = temporal_offset(coord, value).ok_or_else(|| {
                        SemaError::new(
                            SemaErrorKind::InvalidRemapArg,
                            Some(dom.span.start),
                            "a 'me' coordinate remap must shift that same coordinate by a numeric constant",
                        )
                    })?;
                    tap = Some(tap.map_or(offset, |existing: i64| existing.min(offset)));
                }
                Expr::Access {
                    base: Some(BundleRef::Named(n)),
                    accessor,
                } if self.program.bundle_id(n).is_some() => {
                    let bundle_id = self.program.bundle_id(n).expect("checked above");
                    self.resolve_strand_index(ast, n, bundle_id, accessor, dom.span)?;
                }
                _ => {
                    return Err(SemaError::new(
                        SemaErrorKind::InvalidRemapArg,
                        Some(dom.span.start),
                        "a remap's domain must be a 'me' coordinate or a known bundle's strand access",
                    ));
                }
            }
        }

        let base_id = self.lower_expr(ast, base, depth + 1)?;
        let Some(tap) = tap else {
            return Ok(base_id);
        };
        if tap == 0 {
            // `me.t ~ me.t` is an identity remap: no history is read, so
            // there's nothing to cache.
            return Ok(base_id);
        }
        let IRExpr::StrandRef { bundle, strand } = *self.program.expr(base_id) else {
            return Err(SemaError::new(
                SemaErrorKind::InvalidRemapArg,
                Some(base.span.start),
                "a temporal remap's base must be a direct strand access",
            ));
        };
        let cache = self.program.get_or_create_cache(bundle, strand, false);
        Ok(self.program.push_expr(IRExpr::CacheRead { cache, tap }))
    }

    fn lower_chain(&mut self, ast: &Ast, base: &ExprNode, stages: &[Vec<ExprNode>], depth: u32) -> Result<Vec<ExprId>, SemaError> {
        self.check_depth(depth, base.span)?;
        let base_values = self.lower_chain_base(ast, base, depth)?;
        let mut current = base_values;
        for stage in stages {
            let mut next = Vec::new();
            for pattern in stage {
                next.extend(self.lower_pattern(ast, pattern, &current, depth + 1)?);
            }
            current = next;
        }
        Ok(current)
    }

    /// The chain's base may itself be a bundle reference producing more than
    /// one strand (e.g. `particles -> {...}` fans out over every strand of
    /// `particles`), so it is lowered to a vector rather than a scalar.
    fn lower_chain_base(&mut self, ast: &Ast, base: &ExprNode, depth: u32) -> Result<Vec<ExprId>, SemaError> {
        if let Expr::Ident(name) = &*base.expr {
            if let Some(id) = self.program.bundle_id(name) {
                let width = self.program.bundle(id).strands.len();
                return (0..width as u32).map(|i| self.strand_ref(id, i, base.span)).collect();
            }
        }
        if let Expr::BundleLiteral(items) = &*base.expr {
            return items.iter().map(|item| self.lower_expr(ast, item, depth + 1)).collect();
        }
        Ok(vec![self.lower_expr(ast, base, depth + 1)?])
    }

    /// Lowers one pattern expression of a chain stage against the current
    /// strand vector, expanding any `a..b` range into one output per index
    /// and every bare `.accessor` into an indexed read of `current`.
    fn lower_pattern(&mut self, ast: &Ast, pattern: &ExprNode, current: &[ExprId], depth: u32) -> Result<Vec<ExprId>, SemaError> {
        if let Expr::Range { start, end } = &*pattern.expr {
            let lo = start.as_ref().map(|e| const_eval(e).map(|v| v as i64)).transpose().ok_or_else(|| {
                SemaError::new(SemaErrorKind::RangeOutOfBounds, Some(pattern.span.start), "range start must be a constant")
            })?;
            let hi = end.as_ref().map(|e| const_eval(e).map(|v| v as i64)).transpose().ok_or_else(|| {
                SemaError::new(SemaErrorKind::RangeOutOfBounds, Some(pattern.span.start), "range end must be a constant")
            })?;
            let lo = lo.unwrap_or(0);
            let hi = hi.unwrap_or(current.len() as i64 - 1);
            if lo < 0 || hi as usize >= current.len() || lo > hi {
                return Err(SemaError::new(
                    SemaErrorKind::RangeOutOfBounds,
                    Some(pattern.span.start),
                    format!("range {lo}..{hi} is out of bounds for a {}-strand value", current.len()),
                ));
            }
            return Ok((lo..=hi).map(|i| current[i as usize]).collect());
        }
        Ok(vec![self.lower_pattern_scalar(ast, pattern, current, depth)?])
    }

    fn lower_pattern_scalar(&mut self, ast: &Ast, pattern: &ExprNode, current: &[ExprId], depth: u32) -> Result<ExprId, SemaError> {
        match &*pattern.expr {
            Expr::Access { base: None, accessor } => {
                let idx = match accessor {
                    Accessor::Index(i) => normalize_index(*i, current.len(), pattern.span)?,
                    Accessor::Computed(expr) => {
                        let value = const_eval(expr).ok_or_else(|| {
                            SemaError::new(SemaErrorKind::InvalidExpression, Some(pattern.span.start), "computed pattern index must be constant")
                        })?;
                        normalize_index(value as i64, current.len(), pattern.span)?
                    }
                    Accessor::Named(n) => {
                        return Err(SemaError::new(
                            SemaErrorKind::UnknownStrand,
                            Some(pattern.span.start),
                            format!("a bare chain-pattern access cannot use the named accessor '{n}'"),
                        ));
                    }
                };
                Ok(current[idx])
            }
            Expr::Binary { op, left, right } => {
                let left = self.lower_pattern_scalar(ast, left, current, depth + 1)?;
                let right = self.lower_pattern_scalar(ast, right, current, depth + 1)?;
                Ok(self.program.push_expr(IRExpr::Binary {
                    op: lower_binop(*op),
                    left,
                    right,
                }))
            }
            Expr::Unary { op, operand } => {
                let operand = self.lower_pattern_scalar(ast, operand, current, depth + 1)?;
                Ok(self.program.push_expr(IRExpr::Unary {
                    op: match op {
                        AstUnOp::Neg => UnOp::Neg,
                        AstUnOp::Not => UnOp::Not,
                    },
                    operand,
                }))
            }
            Expr::Call { callee, args } if MATH_BUILTINS.contains(&callee.as_str()) => {
                let mut lowered = smallvec::SmallVec::new();
                for arg in args {
                    lowered.push(self.lower_pattern_scalar(ast, arg, current, depth + 1)?);
                }
                Ok(self.program.push_expr(IRExpr::Call {
                    name: ir::compact(callee),
                    args: lowered,
                }))
            }
            _ => self.lower_expr(ast, pattern, depth),
        }
    }
}

fn lower_binop(op: AstBinOp) -> BinOp {
    match op {
        AstBinOp::Add => BinOp::Add,
        AstBinOp::Sub => BinOp::Sub,
        AstBinOp::Mul => BinOp::Mul,
        AstBinOp::Div => BinOp::Div,
        AstBinOp::Mod => BinOp::Mod,
        AstBinOp::Pow => BinOp::Pow,
        AstBinOp::Eq => BinOp::Eq,
        AstBinOp::Ne => BinOp::Ne,
        AstBinOp::Lt => BinOp::Lt,
        AstBinOp::Gt => BinOp::Gt,
        AstBinOp::Le => BinOp::Le,
        AstBinOp::Ge => BinOp::Ge,
        AstBinOp::And => BinOp::And,
        AstBinOp::Or => BinOp::Or,
    }
}

fn resolve_coord(name: &str) -> Option<Coord> {
    Some(match name {
        "x" => Coord::X,
        "y" => Coord::Y,
        "u" => Coord::U,
        "v" => Coord::V,
        "w" => Coord::W,
        "h" => Coord::H,
        "t" => Coord::T,
        "i" => Coord::I,
        "rate" | "sampleRate" => Coord::Rate,
        "duration" => Coord::Duration,
        _ => return None,
    })
}

/// Recognizes `me.<coord>` (a zero-offset remap, `tap = 0`) or
/// `me.<coord> - k` for a constant `k` and the same coordinate `dom_coord`,
/// returning the cache tap (`-k`) it denotes. Any other shape isn't a
/// temporal remap.
fn temporal_offset(dom_coord: Coord, value: &ExprNode) -> Option<i64> {
    fn as_me_coord(node: &ExprNode) -> Option<Coord> {
        match &*node.expr {
            Expr::Access {
                base: Some(BundleRef::Named(n)),
                accessor: Accessor::Named(c),
            } if n == "me" => resolve_coord(c),
            _ => None,
        }
    }
    if as_me_coord(value) == Some(dom_coord) {
        return Some(0);
    }
    if let Expr::Binary { op: AstBinOp::Sub, left, right } = &*value.expr {
        if as_me_coord(left) == Some(dom_coord) {
            return const_eval(right).map(|k| -(k.round() as i64));
        }
    }
    None
}

fn normalize_index(i: i64, len: usize, span: Span) -> Result<usize, SemaError> {
    let resolved = if i < 0 { len as i64 + i } else { i };
    if resolved < 0 || resolved as usize >= len {
        return Err(SemaError::new(
            SemaErrorKind::RangeOutOfBounds,
            Some(span.start),
            format!("index {i} is out of bounds for width {len}"),
        ));
    }
    Ok(resolved as usize)
}

fn strand_names_for(ast: &Ast, bundle_name: &str) -> Vec<String> {
    let mut names = Vec::new();
    for decl in &ast.bundles {
        if decl.name != bundle_name {
            continue;
        }
        for out in &decl.outputs {
            if let Output::Named(n) = out {
                if !names.contains(n) {
                    names.push(n.clone());
                }
            }
        }
    }
    names
}

/// Evaluates a purely numeric-literal expression at lowering time (constant
/// folding limited to what range bounds and computed accessors need — a
/// literal, possibly negated).
fn const_eval(expr: &ExprNode) -> Option<f64> {
    match &*expr.expr {
        Expr::Number(n) => Some(*n),
        Expr::Unary { op: AstUnOp::Neg, operand } => const_eval(operand).map(|v| -v),
        Expr::Binary { op, left, right } => {
            let l = const_eval(left)?;
            let r = const_eval(right)?;
            Some(match op {
                AstBinOp::Add => l + r,
                AstBinOp::Sub => l - r,
                AstBinOp::Mul => l * r,
                AstBinOp::Div => l / r,
                AstBinOp::Mod => l % r,
                AstBinOp::Pow => l.powf(r),
                _ => return None,
            })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer::lex, parser::parse};

    fn lower_src(src: &str) -> IRProgram {
        let ast = parse(&lex(src).unwrap()).unwrap();
        lower(&ast, 64).unwrap()
    }

    #[test]
    fn scalar_bundle_lowers_to_one_strand() {
        let program = lower_src("freq.v = 440.0");
        let id = program.bundle_id("freq").unwrap();
        assert_eq!(program.bundle(id).strands.len(), 1);
    }

    #[test]
    fn bundle_literal_output_matches_width() {
        let program = lower_src("c[r,g,b] = [1.0, 0.5, me.x]");
        let id = program.bundle_id("c").unwrap();
        assert_eq!(program.bundle(id).strands.len(), 3);
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let ast = parse(&lex("c[r,g,b] = [1.0, 0.5]").unwrap()).unwrap();
        let err = lower(&ast, 64).unwrap_err();
        assert_eq!(err.kind, SemaErrorKind::WidthMismatch);
    }

    #[test]
    fn unknown_bundle_reports_unknown_identifier() {
        let ast = parse(&lex("a.v = missing.v").unwrap()).unwrap();
        let err = lower(&ast, 64).unwrap_err();
        assert_eq!(err.kind, SemaErrorKind::UnknownBundle);
    }

    #[test]
    fn spindle_call_inlines() {
        let program = lower_src("spindle lp(x,a) { return.0 = x * a } out.v = lp(freq.v, 0.5)\nfreq.v = 1.0");
        let id = program.bundle_id("out").unwrap();
        assert_eq!(program.bundle(id).strands.len(), 1);
        assert!(matches!(program.expr(program.bundle(id).strands[0]), IRExpr::Binary { .. }));
    }

    #[test]
    fn bare_access_outside_chain_is_rejected() {
        let ast = parse(&lex("a.v = .0").unwrap()).unwrap();
        let err = lower(&ast, 64).unwrap_err();
        assert_eq!(err.kind, SemaErrorKind::BareStrandOutsidePattern);
    }
}
