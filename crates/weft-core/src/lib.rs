//! Compiler and orchestration pipeline for the WEFT reactive audio/visual
//! dataflow language: source text in, an executable [`Plan`] out.
//!
//! The pipeline is ten ordered passes (C0-C9) joined by one mutable
//! [`ir::IRProgram`]: preprocessing, lexing, parsing, lowering, dependency
//! analysis, domain/purity annotation, IR rewriting (cache insertion),
//! partitioning into [`ir::Swatch`]es, cache finalization, and a CPU
//! interpreter used by tooling. [`compile`] drives all of it; the
//! sub-modules are public so a caller that only wants, say, a parsed [`ast::Ast`]
//! for tooling can call a single stage directly.

pub mod annotate;
pub mod ast;
pub mod cache;
pub mod depgraph;
pub mod error;
pub mod interp;
pub mod ir;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod partition;
pub mod preprocess;
pub mod rewrite;
pub mod span;

use std::path::PathBuf;

use tracing::instrument;

pub use crate::{
    ast::Ast,
    error::CompileError,
    ir::{CacheDescriptor, IRProgram, Swatch},
    span::LineMap,
};

/// Configuration threaded through [`compile_with_options`]. `Default`
/// matches [`compile`]'s behavior: no include directories, the parser's
/// built-in recursion-depth default.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub include_dirs: Vec<PathBuf>,
    pub max_nesting_depth: u32,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            max_nesting_depth: parser::MAX_NESTING_DEPTH,
        }
    }
}

/// The immutable result of a successful compile: the final IR, its swatches,
/// and its cache descriptors, ready for an external backend to execute.
#[derive(Debug, Clone)]
pub struct Plan {
    pub program: IRProgram,
    pub swatches: Vec<Swatch>,
    pub cache_descriptors: Vec<CacheDescriptor>,
    /// Maps lexer/parser line numbers back through `#include` flattening to
    /// their originating file, so a reported error location still points at
    /// the source the user actually wrote.
    pub source_map: LineMap,
}

/// Compiles `source` (read from `path`, used for error messages and
/// `#include` resolution) into a [`Plan`] with default options.
pub fn compile(source: &str, path: &str) -> Result<Plan, CompileError> {
    compile_with_options(source, path, &CompileOptions::default())
}

/// The options-taking form of [`compile`]. Runs every pass in order; the
/// first error any pass returns is surfaced immediately, with no partial
/// plan ever escaping.
#[instrument(skip(source, options), fields(path))]
pub fn compile_with_options(source: &str, path: &str, options: &CompileOptions) -> Result<Plan, CompileError> {
    let preprocessed = preprocess::preprocess(source, path, &options.include_dirs)?;
    let source_map = preprocessed.line_map.clone();
    let tokens = lex_traced(&preprocessed.text)?;
    let ast = parse_traced(&tokens, options.max_nesting_depth)?;
    let mut program = lower_traced(&ast, options.max_nesting_depth)?;
    rewrite::rewrite(&mut program);
    depgraph::analyze(&mut program)?;
    annotate::annotate(&mut program)?;
    partition::partition(&mut program);
    cache::analyze(&mut program);

    tracing::info!(bundles = program.bundles.len(), caches = program.caches.len(), swatches = program.swatches.len(), "compile finished");

    Ok(Plan {
        swatches: program.swatches.clone(),
        cache_descriptors: program.caches.clone(),
        program,
        source_map,
    })
}

#[instrument(skip(source))]
fn lex_traced(source: &str) -> Result<Vec<lexer::Token>, CompileError> {
    lexer::lex(source).map_err(|e| {
        tracing::error!(error = %e, "lex failed");
        CompileError::from(e)
    })
}

#[instrument(skip(tokens))]
fn parse_traced(tokens: &[lexer::Token], max_nesting_depth: u32) -> Result<Ast, CompileError> {
    parser::parse_with_depth(tokens, max_nesting_depth).map_err(|e| {
        tracing::error!(error = %e, "parse failed");
        CompileError::from(e)
    })
}

#[instrument(skip(ast))]
fn lower_traced(ast: &Ast, max_nesting_depth: u32) -> Result<IRProgram, CompileError> {
    lower::lower(ast, max_nesting_depth).map_err(|e| {
        tracing::error!(error = %e, "lower failed");
        CompileError::from(e)
    })
}

/// Parses `source` into an [`Ast`] without lowering it, for tooling that
/// only needs syntax (formatters, editor outlining).
pub fn parse(source: &str) -> Result<Ast, CompileError> {
    let tokens = lexer::lex(source)?;
    Ok(parser::parse(&tokens)?)
}

/// Evaluates `expr` against `coords` using the CPU interpreter (C9). Exposed
/// for previews and tests; never used by a production backend.
#[must_use]
pub fn interpret(program: &IRProgram, expr: ir::ExprId, coords: &std::collections::HashMap<String, f64>) -> f64 {
    interp::interpret(program, expr, coords)
}
