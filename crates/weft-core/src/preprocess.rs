//! Preprocessor (C0): flattens `#include "path"` directives into one source
//! string plus a [`LineMap`] back to the files the user actually wrote.
//!
//! Purely textual — it never tokenizes. An include directive must be the
//! first non-whitespace content on its line; the directive line itself
//! contributes no output line, it is replaced in place by the included
//! file's (recursively flattened) lines.

use std::path::{Path, PathBuf};

use crate::{
    error::CompileError,
    span::{LineMap, LineOrigin},
};

/// The flattened source the lexer actually sees, plus its provenance map.
pub struct Preprocessed {
    pub text: String,
    pub line_map: LineMap,
}

/// Reads `path` and resolves every `#include` it (transitively) contains,
/// searching `include_dirs` in order for a relative include target, falling
/// back to the including file's own directory.
pub fn preprocess(source: &str, path: &str, include_dirs: &[PathBuf]) -> Result<Preprocessed, CompileError> {
    let mut origins = Vec::new();
    let mut visiting = Vec::new();
    let text = flatten(source, Path::new(path), include_dirs, &mut visiting, &mut origins)?;
    Ok(Preprocessed {
        text,
        line_map: LineMap::new(origins),
    })
}

fn flatten(
    source: &str,
    path: &Path,
    include_dirs: &[PathBuf],
    visiting: &mut Vec<PathBuf>,
    origins: &mut Vec<LineOrigin>,
) -> Result<String, CompileError> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if visiting.contains(&canonical) {
        let chain = visiting.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> ");
        return Err(CompileError::Sema(crate::error::SemaError::internal(
            "preprocess",
            format!("include cycle: {chain} -> {}", path.display()),
        )));
    }
    visiting.push(canonical);

    let mut out = String::new();
    for (lineno, line) in source.lines().enumerate() {
        let lineno = lineno as u32 + 1;
        if let Some(target) = include_target(line) {
            let resolved = resolve_include(path, target, include_dirs)?;
            let included_source = std::fs::read_to_string(&resolved).map_err(|e| {
                CompileError::Sema(crate::error::SemaError::internal("preprocess", format!("reading '{}': {e}", resolved.display())))
            })?;
            let flattened = flatten(&included_source, &resolved, include_dirs, visiting, origins)?;
            out.push_str(&flattened);
        } else {
            out.push_str(line);
            out.push('\n');
            origins.push(LineOrigin {
                file: path.display().to_string(),
                line: lineno,
            });
        }
    }

    visiting.pop();
    Ok(out)
}

fn include_target(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let rest = trimmed.strip_prefix("#include")?;
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('"')?;
    rest.split('"').next()
}

fn resolve_include(including: &Path, target: &str, include_dirs: &[PathBuf]) -> Result<PathBuf, CompileError> {
    let local = including.parent().unwrap_or_else(|| Path::new(".")).join(target);
    if local.exists() {
        return Ok(local);
    }
    for dir in include_dirs {
        let candidate = dir.join(target);
        if candidate.exists() {
            return Ok(candidate);
        }
    }
    Err(CompileError::Sema(crate::error::SemaError::internal(
        "preprocess",
        format!("include target '{target}' not found relative to '{}' or any include directory", including.display()),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_includes_passes_source_through_with_an_identity_line_map() {
        let result = preprocess("a.v = 1.0\nb.v = 2.0\n", "main.weft", &[]).unwrap();
        assert_eq!(result.text, "a.v = 1.0\nb.v = 2.0\n");
        assert_eq!(result.line_map.resolve(crate::span::Location::new(2, 1), "main.weft").1.line, 2);
    }

    #[test]
    fn include_target_recognizes_the_directive() {
        assert_eq!(include_target("#include \"colors.weft\""), Some("colors.weft"));
        assert_eq!(include_target("  #include \"colors.weft\""), Some("colors.weft"));
        assert_eq!(include_target("a.v = 1.0"), None);
    }
}
