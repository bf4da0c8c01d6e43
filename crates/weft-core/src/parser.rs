//! Parser (C2): token stream → [`Ast`].
//!
//! Recursive-descent with a precedence climb. Binding from loosest to
//! tightest: chain (`->`) > logical (`&&`/`||`) > comparison > range (`..`)
//! > add > mul > expo (right-assoc) > unary > postfix > primary. The spec
//! leaves the relative precedence of `&&`/`||` and `..` unstated; both
//! choices above are recorded as decisions in `DESIGN.md` rather than
//! guessed silently.

use crate::{
    ast::{Accessor, Ast, BinOp, BundleDecl, BundleRef, Expr, ExprNode, Output, ReturnStmt, SpindleDef, UnOp},
    error::ParseError,
    lexer::{Token, TokenKind},
    span::{Location, Span},
};

/// Default recursion-depth guard for the parser's recursive-descent entry
/// points (primary expression, chain stage, bundle-literal element).
/// Unoptimized debug builds have larger stack frames per call, so the debug
/// default is lower than release's; both are overridable via
/// `CompileOptions::max_nesting_depth`.
pub const MAX_NESTING_DEPTH: u32 = if cfg!(debug_assertions) { 128 } else { 512 };

/// Parses a full token stream (as produced by [`crate::lexer::lex`]) into an
/// [`Ast`], guarding recursive-descent entry points at [`MAX_NESTING_DEPTH`].
pub fn parse(tokens: &[Token]) -> Result<Ast, ParseError> {
    parse_with_depth(tokens, MAX_NESTING_DEPTH)
}

/// Like [`parse`] but with an explicit recursion-depth limit, used by the
/// facade to honor `CompileOptions::max_nesting_depth`.
pub fn parse_with_depth(tokens: &[Token], max_depth: u32) -> Result<Ast, ParseError> {
    Parser {
        tokens,
        pos: 0,
        depth: 0,
        max_depth,
    }
    .parse_program()
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    depth: u32,
    max_depth: u32,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> &TokenKind {
        &self.tokens[self.pos].kind
    }

    fn peek_at(&self, offset: usize) -> &TokenKind {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx].kind
    }

    fn here(&self) -> Location {
        self.tokens[self.pos].span.start
    }

    fn prev_end(&self) -> Location {
        self.tokens[self.pos.saturating_sub(1)].span.end
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.bump())
        } else {
            Err(ParseError::new(
                self.here(),
                format!("expected {what}, found {:?}", self.peek()),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(ParseError::new(self.here(), format!("expected identifier, found {other:?}"))),
        }
    }

    fn expect_nonneg_int(&mut self) -> Result<u32, ParseError> {
        match self.peek().clone() {
            TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                self.bump();
                Ok(n as u32)
            }
            other => Err(ParseError::new(
                self.here(),
                format!("expected a non-negative integer, found {other:?}"),
            )),
        }
    }

    /// Guards one level of recursive-descent nesting. Called on entry to
    /// `parse_primary` and each chain-stage pattern, the two places
    /// pathologically deep input (`((((((...`, `a -> {...} -> {...} -> ...`)
    /// grows the call stack without bound.
    fn enter_depth(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ParseError::new(self.here(), "expression nesting exceeds the configured maximum depth"));
        }
        Ok(())
    }

    fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    fn can_start_expr(&self) -> bool {
        matches!(
            self.peek(),
            TokenKind::Number(_)
                | TokenKind::String(_)
                | TokenKind::Ident(_)
                | TokenKind::LParen
                | TokenKind::LBracket
                | TokenKind::Dot
                | TokenKind::DotDot
                | TokenKind::Minus
                | TokenKind::Bang
        )
    }

    // ---- top level ----

    fn parse_program(&mut self) -> Result<Ast, ParseError> {
        let mut ast = Ast::default();
        loop {
            match self.peek() {
                TokenKind::Eof => return Ok(ast),
                TokenKind::KwSpindle => ast.spindles.push(self.parse_spindle_def()?),
                TokenKind::Ident(_) => ast.bundles.push(self.parse_bundle_decl()?),
                other => {
                    return Err(ParseError::new(
                        self.here(),
                        format!("expected a bundle declaration or spindle definition, found {other:?}"),
                    ));
                }
            }
        }
    }

    fn parse_bundle_decl(&mut self) -> Result<BundleDecl, ParseError> {
        let start = self.here();
        let name = self.expect_ident()?;
        let outputs = if self.check(&TokenKind::Dot) {
            self.bump();
            vec![Output::Named(self.expect_ident()?)]
        } else if self.check(&TokenKind::LBracket) {
            self.bump();
            let mut outputs = Vec::new();
            while !self.check(&TokenKind::RBracket) {
                outputs.push(match self.peek().clone() {
                    TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                        self.bump();
                        Output::Positional(n as u32)
                    }
                    TokenKind::Ident(ident) => {
                        self.bump();
                        Output::Named(ident)
                    }
                    other => {
                        return Err(ParseError::new(
                            self.here(),
                            format!("expected an output name or index, found {other:?}"),
                        ));
                    }
                });
                if self.check(&TokenKind::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket, "']'")?;
            outputs
        } else {
            return Err(ParseError::new(
                self.here(),
                format!("expected '.' or '[' after bundle name, found {:?}", self.peek()),
            ));
        };
        self.expect(&TokenKind::Eq, "'='")?;
        let expr = self.parse_expr()?;
        let span = Span::new(start, self.prev_end());
        Ok(BundleDecl {
            name,
            outputs,
            expr,
            span,
        })
    }

    fn parse_spindle_def(&mut self) -> Result<SpindleDef, ParseError> {
        let start = self.here();
        self.expect(&TokenKind::KwSpindle, "'spindle'")?;
        let name = self.expect_ident()?;
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.expect_ident()?);
            if self.check(&TokenKind::Comma) {
                self.bump();
            } else {
                break;
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.expect(&TokenKind::LBrace, "'{'")?;
        let mut locals = Vec::new();
        let mut returns = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::KwReturn) {
                let ret_start = self.here();
                self.bump();
                self.expect(&TokenKind::Dot, "'.'")?;
                let index = self.expect_nonneg_int()?;
                self.expect(&TokenKind::Eq, "'='")?;
                let expr = self.parse_expr()?;
                returns.push(ReturnStmt {
                    index,
                    expr,
                    span: Span::new(ret_start, self.prev_end()),
                });
            } else {
                locals.push(self.parse_bundle_decl()?);
            }
        }
        self.expect(&TokenKind::RBrace, "'}'")?;
        Ok(SpindleDef {
            name,
            params,
            locals,
            returns,
            span: Span::new(start, self.prev_end()),
        })
    }

    // ---- expressions, loosest to tightest ----

    fn parse_expr(&mut self) -> Result<ExprNode, ParseError> {
        self.parse_chain()
    }

    fn parse_chain(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let base = self.parse_logical()?;
        let mut stages = Vec::new();
        while self.check(&TokenKind::Arrow) {
            self.enter_depth()?;
            self.bump();
            self.expect(&TokenKind::LBrace, "'{'")?;
            let mut stage = Vec::new();
            while !self.check(&TokenKind::RBrace) {
                stage.push(self.parse_expr()?);
                if self.check(&TokenKind::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "'}'")?;
            stages.push(stage);
            self.exit_depth();
        }
        if stages.is_empty() {
            Ok(base)
        } else {
            let span = Span::new(start, self.prev_end());
            Ok(ExprNode::new(Expr::Chain { base, stages }, span))
        }
    }

    fn parse_logical(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                TokenKind::AndAnd => BinOp::And,
                TokenKind::OrOr => BinOp::Or,
                _ => break,
            };
            self.bump();
            let right = self.parse_comparison()?;
            let span = Span::new(start, self.prev_end());
            left = ExprNode::new(Expr::Binary { op, left, right }, span);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let mut left = self.parse_range()?;
        loop {
            let op = match self.peek() {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::NotEq => BinOp::Ne,
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::LtEq => BinOp::Le,
                TokenKind::GtEq => BinOp::Ge,
                _ => break,
            };
            self.bump();
            let right = self.parse_range()?;
            let span = Span::new(start, self.prev_end());
            left = ExprNode::new(Expr::Binary { op, left, right }, span);
        }
        Ok(left)
    }

    /// `a..b`, either endpoint optional. Only legal (per §4.3.2) inside a
    /// chain pattern output expression; that restriction is enforced by the
    /// lowerer (`rangeOutsidePattern`), not here, since a range is a
    /// grammatically ordinary expression node (§3.1).
    fn parse_range(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        if self.check(&TokenKind::DotDot) {
            self.bump();
            let end = if self.can_start_expr() { Some(self.parse_add()?) } else { None };
            let span = Span::new(start, self.prev_end());
            return Ok(ExprNode::new(Expr::Range { start: None, end }, span));
        }
        let first = self.parse_add()?;
        if self.check(&TokenKind::DotDot) {
            self.bump();
            let end = if self.can_start_expr() { Some(self.parse_add()?) } else { None };
            let span = Span::new(start, self.prev_end());
            return Ok(ExprNode::new(
                Expr::Range {
                    start: Some(first),
                    end,
                },
                span,
            ));
        }
        Ok(first)
    }

    fn parse_add(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let mut left = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            self.bump();
            let right = self.parse_mul()?;
            let span = Span::new(start, self.prev_end());
            left = ExprNode::new(Expr::Binary { op, left, right }, span);
        }
        Ok(left)
    }

    fn parse_mul(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let mut left = self.parse_expo()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            self.bump();
            let right = self.parse_expo()?;
            let span = Span::new(start, self.prev_end());
            left = ExprNode::new(Expr::Binary { op, left, right }, span);
        }
        Ok(left)
    }

    /// Right-associative: `2 ^ 3 ^ 2 == 2 ^ (3 ^ 2)`.
    fn parse_expo(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let base = self.parse_unary()?;
        if self.check(&TokenKind::Caret) {
            self.bump();
            let exponent = self.parse_expo()?;
            let span = Span::new(start, self.prev_end());
            Ok(ExprNode::new(
                Expr::Binary {
                    op: BinOp::Pow,
                    left: base,
                    right: exponent,
                },
                span,
            ))
        } else {
            Ok(base)
        }
    }

    fn parse_unary(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        let op = match self.peek() {
            TokenKind::Minus => Some(UnOp::Neg),
            TokenKind::Bang => Some(UnOp::Not),
            _ => None,
        };
        if let Some(op) = op {
            self.bump();
            let operand = self.parse_unary()?;
            let span = Span::new(start, self.prev_end());
            Ok(ExprNode::new(Expr::Unary { op, operand }, span))
        } else {
            self.parse_postfix()
        }
    }

    fn parse_postfix(&mut self) -> Result<ExprNode, ParseError> {
        let mut expr = self.parse_primary()?;
        loop {
            if !self.check(&TokenKind::Dot) {
                break;
            }
            let start = expr.span.start;
            if matches!(*expr.expr, Expr::Call { .. }) {
                self.bump();
                let index = self.expect_nonneg_int()?;
                let span = Span::new(start, self.prev_end());
                expr = ExprNode::new(Expr::CallExtract { call: expr, index }, span);
                continue;
            }
            let Some(base_ref) = Self::as_bundle_ref(&expr) else {
                return Err(ParseError::new(
                    self.here(),
                    "only identifiers, bundle literals, and spindle calls can be followed by '.'",
                ));
            };
            self.bump(); // consume '.'
            expr = self.parse_access_or_remap(base_ref, start)?;
        }
        Ok(expr)
    }

    fn as_bundle_ref(expr: &ExprNode) -> Option<BundleRef> {
        match &*expr.expr {
            Expr::Ident(name) => Some(BundleRef::Named(name.clone())),
            Expr::BundleLiteral(items) => Some(BundleRef::Literal(items.clone())),
            _ => None,
        }
    }

    fn parse_accessor(&mut self) -> Result<Accessor, ParseError> {
        match self.peek().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Accessor::Named(name))
            }
            TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                self.bump();
                Ok(Accessor::Index(n as i64))
            }
            TokenKind::Minus => {
                self.bump();
                match self.peek().clone() {
                    TokenKind::Number(n) if n >= 0.0 && n.fract() == 0.0 => {
                        self.bump();
                        Ok(Accessor::Index(-(n as i64)))
                    }
                    other => Err(ParseError::new(self.here(), format!("expected an integer after '-', found {other:?}"))),
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Accessor::Computed(inner))
            }
            other => Err(ParseError::new(self.here(), format!("expected a strand accessor, found {other:?}"))),
        }
    }

    /// Parses what follows a `.` after a known bundle reference: a plain
    /// access, or — when a named accessor is immediately followed by `(` —
    /// a remap (§4.2).
    fn parse_access_or_remap(&mut self, base: BundleRef, start: Location) -> Result<ExprNode, ParseError> {
        let accessor = self.parse_accessor()?;
        let is_named = matches!(accessor, Accessor::Named(_));
        let access_span = Span::new(start, self.prev_end());
        let access = ExprNode::new(
            Expr::Access {
                base: Some(base),
                accessor,
            },
            access_span,
        );
        if is_named && self.check(&TokenKind::LParen) {
            self.bump();
            let mut substitutions = Vec::new();
            while !self.check(&TokenKind::RParen) {
                let dom = self.parse_expr()?;
                self.expect(&TokenKind::Tilde, "'~'")?;
                let value = self.parse_expr()?;
                substitutions.push((dom, value));
                if self.check(&TokenKind::Comma) {
                    self.bump();
                } else {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "')'")?;
            let span = Span::new(start, self.prev_end());
            Ok(ExprNode::new(
                Expr::Remap {
                    base: access,
                    substitutions,
                },
                span,
            ))
        } else {
            Ok(access)
        }
    }

    fn parse_primary(&mut self) -> Result<ExprNode, ParseError> {
        self.enter_depth()?;
        let result = self.parse_primary_inner();
        self.exit_depth();
        result
    }

    fn parse_primary_inner(&mut self) -> Result<ExprNode, ParseError> {
        let start = self.here();
        match self.peek().clone() {
            TokenKind::Number(n) => {
                self.bump();
                Ok(ExprNode::new(Expr::Number(n), Span::new(start, self.prev_end())))
            }
            TokenKind::String(s) => {
                self.bump();
                Ok(ExprNode::new(Expr::Str(s), Span::new(start, self.prev_end())))
            }
            TokenKind::Ident(name) => {
                self.bump();
                if self.check(&TokenKind::LParen) {
                    self.bump();
                    let mut args = Vec::new();
                    while !self.check(&TokenKind::RParen) {
                        args.push(self.parse_expr()?);
                        if self.check(&TokenKind::Comma) {
                            self.bump();
                        } else {
                            break;
                        }
                    }
                    self.expect(&TokenKind::RParen, "')'")?;
                    Ok(ExprNode::new(
                        Expr::Call { callee: name, args },
                        Span::new(start, self.prev_end()),
                    ))
                } else {
                    Ok(ExprNode::new(Expr::Ident(name), Span::new(start, self.prev_end())))
                }
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::LBracket => {
                self.bump();
                let mut items = Vec::new();
                while !self.check(&TokenKind::RBracket) {
                    items.push(self.parse_expr()?);
                    if self.check(&TokenKind::Comma) {
                        self.bump();
                    } else {
                        break;
                    }
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(ExprNode::new(Expr::BundleLiteral(items), Span::new(start, self.prev_end())))
            }
            TokenKind::Dot => {
                self.bump();
                let accessor = self.parse_accessor()?;
                Ok(ExprNode::new(
                    Expr::Access { base: None, accessor },
                    Span::new(start, self.prev_end()),
                ))
            }
            other => Err(ParseError::new(start, format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_src(src: &str) -> Ast {
        parse(&lex(src).unwrap()).unwrap()
    }

    #[test]
    fn bundle_literal_output() {
        let ast = parse_src("display[r,g,b] = [me.x, me.y, fract(me.t)]");
        assert_eq!(ast.bundles.len(), 1);
        assert_eq!(ast.bundles[0].outputs, vec![
            Output::Named("r".into()),
            Output::Named("g".into()),
            Output::Named("b".into())
        ]);
    }

    #[test]
    fn positional_output() {
        let ast = parse_src("play[0] = sin(phase.v) * 0.3");
        assert_eq!(ast.bundles[0].outputs, vec![Output::Positional(0)]);
    }

    #[test]
    fn shorthand_output() {
        let ast = parse_src("freq.v = 440.0");
        assert_eq!(ast.bundles[0].outputs, vec![Output::Named("v".into())]);
    }

    #[test]
    fn chain_parses_stages() {
        let ast = parse_src("b[x,y,z] = a -> {.0 + .1, .1 * .2, .2 - .0}");
        assert!(matches!(*ast.bundles[0].expr.expr, Expr::Chain { .. }));
    }

    #[test]
    fn remap_parses() {
        let ast = parse_src("sig.v = lp.v(me.t ~ me.t - 1)");
        assert!(matches!(*ast.bundles[0].expr.expr, Expr::Remap { .. }));
    }

    #[test]
    fn spindle_with_returns() {
        let ast = parse_src("spindle lp(x, a) { return.0 = x * a }");
        assert_eq!(ast.spindles.len(), 1);
        assert_eq!(ast.spindles[0].params, vec!["x".to_owned(), "a".to_owned()]);
        assert_eq!(ast.spindles[0].returns.len(), 1);
    }

    #[test]
    fn exponent_is_right_associative() {
        let ast = parse_src("a.v = 2 ^ 3 ^ 2");
        let Expr::Binary { op: BinOp::Pow, right, .. } = &*ast.bundles[0].expr.expr else {
            panic!("expected outer pow");
        };
        assert!(matches!(*right.expr, Expr::Binary { op: BinOp::Pow, .. }));
    }

    #[test]
    fn deep_nesting_is_rejected_before_stack_overflow() {
        let mut src = String::from("a.v = ");
        for _ in 0..300 {
            src.push('(');
        }
        src.push_str("1.0");
        for _ in 0..300 {
            src.push(')');
        }
        let tokens = lex(&src).unwrap();
        let err = parse_with_depth(&tokens, 64).unwrap_err();
        assert!(err.message.contains("nesting"));
    }

    #[test]
    fn range_with_omitted_endpoints() {
        let ast = parse_src("a.v = b -> {..}");
        let Expr::Chain { stages, .. } = &*ast.bundles[0].expr.expr else {
            panic!("expected chain");
        };
        assert!(matches!(*stages[0][0].expr, Expr::Range { start: None, end: None }));
    }
}
