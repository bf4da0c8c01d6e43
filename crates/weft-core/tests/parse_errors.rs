//! End-to-end parse/lex/lower error scenarios against the public API.

use weft_core::{CompileError, CompileOptions, compile, compile_with_options, error::SemaErrorKind, parse};

#[test]
fn unterminated_string_is_a_lex_error() {
    let err = compile("a.v = \"unterminated\n", "main.weft").unwrap_err();
    assert!(matches!(err, CompileError::Lex(_)));
}

#[test]
fn missing_equals_is_a_parse_error() {
    let err = compile("a.v 1.0", "main.weft").unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn unknown_bundle_reference_is_reported_with_location() {
    // Scenario 6: referencing an undeclared bundle.
    let err = compile("a.v = b.v", "main.weft").unwrap_err();
    match err {
        CompileError::Sema(e) => {
            assert_eq!(e.kind, SemaErrorKind::UnknownBundle);
            assert!(e.location.is_some());
        }
        other => panic!("expected a semantic error, got {other:?}"),
    }
}

#[test]
fn bare_range_outside_a_chain_pattern_is_rejected() {
    let err = compile("a.v = 1.0..2.0", "main.weft").unwrap_err();
    match err {
        CompileError::Sema(e) => assert_eq!(e.kind, SemaErrorKind::RangeOutsidePattern),
        other => panic!("expected a semantic error, got {other:?}"),
    }
}

#[test]
fn bare_strand_access_outside_a_chain_is_rejected() {
    let err = compile("a.v = .0", "main.weft").unwrap_err();
    match err {
        CompileError::Sema(e) => assert_eq!(e.kind, SemaErrorKind::BareStrandOutsidePattern),
        other => panic!("expected a semantic error, got {other:?}"),
    }
}

#[test]
fn deeply_nested_parens_are_rejected_instead_of_overflowing_the_stack() {
    let mut source = String::new();
    for _ in 0..300 {
        source.push('(');
    }
    source.push_str("1.0");
    for _ in 0..300 {
        source.push(')');
    }
    let source = format!("a.v = {source}");

    let options = CompileOptions {
        max_nesting_depth: 64,
        ..CompileOptions::default()
    };
    let err = compile_with_options(&source, "main.weft", &options).unwrap_err();
    assert!(matches!(err, CompileError::Parse(_)));
}

#[test]
fn parse_alone_succeeds_without_lowering() {
    // `parse` is a standalone tooling entry point: a source that lowers
    // fine should also just parse fine, with no bundle resolution involved.
    let ast = parse("a.v = b.v").unwrap();
    assert_eq!(ast.bundles.len(), 1);
}
