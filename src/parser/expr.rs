//! Expression parsing: operator-precedence chain, postfix chains with the
//! paren-less invocation ambiguity rules, lambdas with parameter rollback,
//! object construction (including the `new [T]{n}` rewrite) and the
//! if/case/switch expression forms.

use crate::lexer::{Keyword, Span, TokenKind};

use super::ast::*;
use super::{node_id, ParseResult, Parser};

/// Tokens that may begin a paren-less argument. Unary `+`/`-` are excluded
/// so that `a.b + 10` never reads as `a.b(+10)`; block and clause keywords
/// are excluded so argument lists stop before `do`, `then`, `else`, `end`.
fn can_start_argument(kind: &TokenKind) -> bool {
    use TokenKind::*;
    match kind {
        Ident(_) | Int(_) | Uint(_) | Float(_) | Char(_) | Str(_) | Bool(_) | Symbol(_)
        | LParen | LBracket | Arrow | Tilde | Bang => true,
        Keyword(kw) => matches!(
            kw,
            self::Keyword::New
                | self::Keyword::Begin
                | self::Keyword::Let
                | self::Keyword::If
                | self::Keyword::Unless
                | self::Keyword::Case
        ),
        _ => false,
    }
}

fn binary_op_at(level: usize, kind: &TokenKind) -> Option<&'static str> {
    use TokenKind::*;
    Some(match (level, kind) {
        (0, OrOr) => "||",
        (1, AndAnd) => "&&",
        (2, Pipe) => "|",
        (3, Caret) => "^",
        (4, Amp) => "&",
        (5, EqEq) => "==",
        (5, Ne) => "!=",
        (6, Lt) => "<",
        (6, Le) => "<=",
        (6, Gt) => ">",
        (6, Ge) => ">=",
        (7, Shl) => "<<",
        (7, Shr) => ">>",
        (8, Plus) => "+",
        (8, Minus) => "-",
        (9, Star) => "*",
        (9, Slash) => "/",
        (9, Percent) => "%",
        _ => return None,
    })
}

const LOWEST_LEVEL: usize = 0;
const ADDITIVE_LEVEL: usize = 8;
const HIGHEST_LEVEL: usize = 9;

impl Parser<'_> {
    /// Full expression: if/case/switch forms or the operator chain, followed
    /// by an optional `: T` annotation.
    pub(crate) fn parse_expression(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        let expr = match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::If | Keyword::Unless)) => self.parse_if_expr()?,
            Some(TokenKind::Keyword(Keyword::Case)) => self.parse_case_or_switch_expr()?,
            _ => self.parse_range_expr()?,
        };

        if let Some(annotation) = self.try_parse_type_annotation()? {
            return Ok(Expression::Typed(TypedExpr {
                id: node_id(),
                location: self.loc(start),
                child: Box::new(expr),
                annotation,
            }));
        }
        Ok(expr)
    }

    pub(crate) fn parse_expr_list(&mut self) -> ParseResult<Vec<Expression>> {
        let mut exprs = vec![self.parse_expression()?];
        while self.comma() {
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    /// `a .. b` / `a ... b` lower to a construction of the builtin `range`
    /// class with the bounds and the inclusiveness flag as arguments.
    fn parse_range_expr(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        let lhs = self.parse_binary(LOWEST_LEVEL)?;

        let save = self.state.get_index();
        self.opt_eol();
        let inclusive = match self.peek_kind() {
            Some(TokenKind::DotDotDot) => true,
            Some(TokenKind::DotDot) => false,
            _ => {
                self.state.set_index(save);
                return Ok(lhs);
            }
        };
        self.state.next();
        self.opt_eol();
        let rhs = self.parse_binary(LOWEST_LEVEL)?;
        self.range_found = true;

        let location = self.loc(start);
        let flag = Expression::Literal(PrimaryLiteral {
            id: node_id(),
            location: location.clone(),
            value: LiteralValue::Bool(inclusive),
        });
        Ok(Expression::ObjectConstruct(ObjectConstruct {
            id: node_id(),
            location: location.clone(),
            obj_type: TypeName::Primary(PrimaryType {
                id: node_id(),
                location,
                name: "range".to_string(),
                template_params: vec![],
            }),
            args: vec![lhs, rhs, flag],
            do_block: None,
        }))
    }

    fn parse_binary(&mut self, level: usize) -> ParseResult<Expression> {
        if level > HIGHEST_LEVEL {
            return self.parse_cast_expr();
        }

        let start = self.mark();
        let mut lhs = self.parse_binary(level + 1)?;
        loop {
            let save = self.state.get_index();
            // A newline before `+`/`-` would be read as a unary operator on
            // the next line, so the additive tier forbids it.
            if level != ADDITIVE_LEVEL {
                self.opt_eol();
            }
            let Some(op) = self.peek_kind().and_then(|k| binary_op_at(level, k)) else {
                self.state.set_index(save);
                break;
            };
            self.state.next();
            self.opt_eol();
            let rhs = self.parse_binary(level + 1)?;
            lhs = Expression::Binary(BinaryExpr {
                id: node_id(),
                location: self.loc(start),
                op: op.to_string(),
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            });
        }
        Ok(lhs)
    }

    fn parse_cast_expr(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        let mut child = self.parse_unary()?;
        loop {
            let save = self.state.get_index();
            self.opt_eol();
            if !self.eat_keyword(Keyword::As) {
                self.state.set_index(save);
                break;
            }
            self.opt_eol();
            let target = self.parse_qualified_type()?;
            child = Expression::Cast(CastExpr {
                id: node_id(),
                location: self.loc(start),
                child: Box::new(child),
                target,
            });
        }
        Ok(child)
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        let op = match self.peek_kind() {
            Some(TokenKind::Plus) => "+",
            Some(TokenKind::Minus) => "-",
            Some(TokenKind::Tilde) => "~",
            Some(TokenKind::Bang) => "!",
            _ => return self.parse_postfix(),
        };
        self.state.next();
        let operand = self.parse_unary()?;
        Ok(Expression::Unary(UnaryExpr {
            id: node_id(),
            location: self.loc(start),
            op: op.to_string(),
            operand: Box::new(operand),
        }))
    }

    // ---- postfix chain -------------------------------------------------

    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        let mut value = self.parse_primary()?;

        loop {
            // dot-forms permit a line break before the dot
            let save = self.state.get_index();
            self.opt_eol();
            if self.eat(&TokenKind::Dot) {
                self.opt_eol();
                // `f.(args)` invokes the value itself (lambda invocation)
                if self.peek_is(&TokenKind::LParen) {
                    let args = self.parse_call_args_in_parens()?;
                    let do_block = self.try_parse_do_block()?;
                    value = Expression::Invocation(Invocation {
                        id: node_id(),
                        location: self.loc(start),
                        callee: Box::new(value),
                        args,
                        do_block,
                    });
                    continue;
                }
                let (name, name_span) = self.expect_identifier("name of called function")?;
                value = self.parse_dot_postfix(start, value, name, name_span)?;
                continue;
            }
            self.state.set_index(save);

            // `f x, y do ... end` — arguments without parentheses are only
            // accepted with a trailing block, and only after a space. Tried
            // before index/call so `f [1] do ... end` reads `[1]` as an
            // argument rather than an index.
            if self.paren_less_follows() {
                let save = self.state.get_index();
                match self.attempt_paren_less_with_block(start, &value) {
                    Ok(Some(invocation)) => {
                        value = invocation;
                        continue;
                    }
                    _ => self.state.set_index(save),
                }
            }

            if self.peek_is(&TokenKind::LBracket) {
                self.state.next();
                self.opt_eol();
                let index = self.parse_expression()?;
                self.opt_eol();
                self.expect(&TokenKind::RBracket, "']' closing index access")?;
                value = Expression::IndexAccess(IndexAccess {
                    id: node_id(),
                    location: self.loc(start),
                    child: Box::new(value),
                    index: Box::new(index),
                });
                continue;
            }

            if self.peek_is(&TokenKind::LParen) {
                let args = self.parse_call_args_in_parens()?;
                let do_block = self.try_parse_do_block()?;
                value = Expression::Invocation(Invocation {
                    id: node_id(),
                    location: self.loc(start),
                    callee: Box::new(value),
                    args,
                    do_block,
                });
                continue;
            }

            break;
        }
        Ok(value)
    }

    fn paren_less_follows(&self) -> bool {
        let Some(prev) = self.state.previous() else {
            return false;
        };
        let Some(next) = self.state.peek() else {
            return false;
        };
        prev.span.space_before(&next.span) && can_start_argument(&next.kind)
    }

    fn attempt_paren_less_with_block(
        &mut self,
        start: Span,
        callee: &Expression,
    ) -> ParseResult<Option<Expression>> {
        let mut args = vec![];
        loop {
            if self.peek_keyword(Keyword::Do) || self.peek_is(&TokenKind::LBrace) {
                break;
            }
            args.push(self.parse_expression()?);
            if !self.comma() {
                break;
            }
        }
        if args.is_empty() {
            return Ok(None);
        }
        let Some(block) = self.try_parse_do_block()? else {
            return Ok(None);
        };
        Ok(Some(Expression::Invocation(Invocation {
            id: node_id(),
            location: self.loc(start),
            callee: Box::new(callee.clone()),
            args,
            do_block: Some(block),
        })))
    }

    fn parse_dot_postfix(
        &mut self,
        start: Span,
        receiver: Expression,
        name: String,
        name_span: Span,
    ) -> ParseResult<Expression> {
        // `recv.name(args) [block]` — sugar for `name(recv, args...)`
        if self.peek_is(&TokenKind::LParen) {
            let args = self.parse_call_args_in_parens()?;
            let do_block = self.try_parse_do_block()?;
            let mut all_args = vec![receiver];
            all_args.extend(args);
            return Ok(Expression::Invocation(Invocation {
                id: node_id(),
                location: self.loc(start),
                callee: Box::new(self.var_ref(name, name_span)),
                args: all_args,
                do_block,
            }));
        }

        // `recv.name args [block]` — only when a space follows the name and
        // the next token may begin an argument (never `as`, never unary +/-)
        let args_follow = match self.state.peek() {
            Some(next) => {
                name_span.space_before(&next.span)
                    && !next.is_keyword(Keyword::As)
                    && can_start_argument(&next.kind)
            }
            None => false,
        };
        if args_follow {
            let save = self.state.get_index();
            match self.attempt_member_args(start, &receiver, &name, name_span) {
                Ok(invocation) => return Ok(invocation),
                Err(_) => self.state.set_index(save),
            }
        }

        // `recv.name do ... end` / `recv.name { ... }`
        if self.peek_keyword(Keyword::Do) || self.peek_is(&TokenKind::LBrace) {
            let save = self.state.get_index();
            if let Ok(Some(block)) = self.try_parse_do_block() {
                return Ok(Expression::Invocation(Invocation {
                    id: node_id(),
                    location: self.loc(start),
                    callee: Box::new(self.var_ref(name, name_span)),
                    args: vec![receiver],
                    do_block: Some(block),
                }));
            }
            self.state.set_index(save);
        }

        // plain `recv.name`
        Ok(Expression::UfcsInvocation(UfcsInvocation {
            id: node_id(),
            location: self.loc(start),
            child: Box::new(receiver),
            member_name: name,
        }))
    }

    fn attempt_member_args(
        &mut self,
        start: Span,
        receiver: &Expression,
        name: &str,
        name_span: Span,
    ) -> ParseResult<Expression> {
        let mut args = vec![receiver.clone()];
        loop {
            if self.peek_keyword(Keyword::Do) || self.peek_is(&TokenKind::LBrace) {
                break;
            }
            args.push(self.parse_expression()?);
            if !self.comma() {
                break;
            }
        }
        if args.len() == 1 {
            return Err(self.error("argument list"));
        }
        let do_block = self.try_parse_do_block()?;
        Ok(Expression::Invocation(Invocation {
            id: node_id(),
            location: self.loc(start),
            callee: Box::new(self.var_ref(name.to_string(), name_span)),
            args,
            do_block,
        }))
    }

    fn var_ref(&self, name: String, span: Span) -> Expression {
        Expression::VarRef(VarRef {
            id: node_id(),
            location: Location {
                line: span.line,
                col: span.col,
                length: span.len,
                path: self.path.clone(),
            },
            name,
        })
    }

    pub(crate) fn parse_call_args_in_parens(&mut self) -> ParseResult<Vec<Expression>> {
        self.expect(&TokenKind::LParen, "'(' opening argument list")?;
        self.opt_eol();
        let mut args = vec![];
        if !self.peek_is(&TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if !self.comma() {
                    break;
                }
                if self.peek_is(&TokenKind::RParen) {
                    break;
                }
            }
        }
        self.trailing_comma();
        self.expect(&TokenKind::RParen, "')' closing argument list")?;
        Ok(args)
    }

    // ---- trailing blocks -----------------------------------------------

    /// `do |params| stmts end` or `{ |params| stmts; tail_expr }`, attached
    /// to an invocation as its final (lambda) argument.
    pub(crate) fn try_parse_do_block(&mut self) -> ParseResult<Option<Box<FunctionDef>>> {
        let start = self.mark();

        if self.eat_keyword(Keyword::Do) {
            let params = self.parse_block_params()?;
            self.opt_eol();
            let body = self.parse_statement_block(&[Keyword::End])?;
            self.expect_keyword(Keyword::End, "'end' closing do-end block")?;
            return Ok(Some(Box::new(self.lambda_def(start, params, body, None))));
        }

        if self.peek_is(&TokenKind::LBrace) {
            let save = self.state.get_index();
            match self.attempt_brace_block(start) {
                Ok(def) => return Ok(Some(Box::new(def))),
                Err(_) => {
                    self.state.set_index(save);
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }

    fn attempt_brace_block(&mut self, start: Span) -> ParseResult<FunctionDef> {
        self.expect(&TokenKind::LBrace, "'{' opening block")?;
        let params = self.parse_block_params()?;
        self.opt_eol();

        let mut statements = vec![];
        let tail = loop {
            self.opt_sep();
            let stmt = self.parse_compound_stmt()?;
            self.opt_sep();
            if self.peek_is(&TokenKind::RBrace) {
                break stmt;
            }
            statements.push(stmt);
        };
        self.expect(&TokenKind::RBrace, "'}' closing block")?;

        let Statement::Expression(value) = tail else {
            return Err(self.error("trailing expression in block"));
        };
        let ret = ReturnStmt {
            id: node_id(),
            location: value.location().clone(),
            values: vec![value],
        };
        statements.push(Statement::Return(ret));

        let body = StatementBlock {
            id: node_id(),
            location: self.loc(start),
            statements,
        };
        Ok(self.lambda_def(start, params, body, None))
    }

    fn parse_block_params(&mut self) -> ParseResult<Vec<Parameter>> {
        if !self.eat(&TokenKind::Pipe) {
            return Ok(vec![]);
        }
        let mut params = vec![self.parse_parameter()?];
        while self.comma() {
            params.push(self.parse_parameter()?);
        }
        self.expect(&TokenKind::Pipe, "'|' closing block parameters")?;
        Ok(params)
    }

    /// An anonymous function definition; the forward analyzer assigns its
    /// synthetic name.
    pub(crate) fn lambda_def(
        &self,
        start: Span,
        params: Vec<Parameter>,
        body: StatementBlock,
        return_type: Option<TypeName>,
    ) -> FunctionDef {
        FunctionDef {
            id: node_id(),
            location: self.loc(start),
            kind: FuncKind::Func,
            name: String::new(),
            params,
            return_type,
            body,
            ensure_block: None,
            accessibility: true,
            special: SpecialFunc::None,
        }
    }

    // ---- primaries -----------------------------------------------------

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::New)) => self.parse_object_construct(),
            Some(TokenKind::Arrow) => self.parse_lambda(),
            Some(TokenKind::Keyword(Keyword::Begin)) => {
                self.state.next();
                self.opt_eol();
                let block = self.parse_block_expr_until(&[Keyword::End], start)?;
                self.expect_keyword(Keyword::End, "'end' closing begin-end expression")?;
                Ok(Expression::Block(block))
            }
            Some(TokenKind::Keyword(Keyword::Let)) => self.parse_let_expr(),
            Some(TokenKind::Int(v)) => {
                let value = LiteralValue::Int(*v as i64);
                self.state.next();
                Ok(self.literal(start, value))
            }
            Some(TokenKind::Uint(v)) => {
                let value = LiteralValue::Uint(*v);
                self.state.next();
                Ok(self.literal(start, value))
            }
            Some(TokenKind::Float(v)) => {
                let value = LiteralValue::Float(*v);
                self.state.next();
                Ok(self.literal(start, value))
            }
            Some(TokenKind::Char(c)) => {
                let value = LiteralValue::Char(*c);
                self.state.next();
                Ok(self.literal(start, value))
            }
            Some(TokenKind::Bool(b)) => {
                let value = LiteralValue::Bool(*b);
                self.state.next();
                Ok(self.literal(start, value))
            }
            Some(TokenKind::Str(_)) => {
                let token = self.state.next().unwrap();
                let TokenKind::Str(value) = token.kind else {
                    unreachable!()
                };
                self.string_found = true;
                Ok(Expression::StringLiteral(StringLiteral {
                    id: node_id(),
                    location: self.loc(start),
                    value,
                }))
            }
            Some(TokenKind::Symbol(_)) => {
                let token = self.state.next().unwrap();
                let TokenKind::Symbol(name) = token.kind else {
                    unreachable!()
                };
                Ok(Expression::SymbolLiteral(SymbolLiteral {
                    id: node_id(),
                    location: self.loc(start),
                    name,
                }))
            }
            Some(TokenKind::LBracket) => self.parse_array_literal(),
            Some(TokenKind::LBrace) => self.parse_dict_literal(),
            Some(TokenKind::LParen) => self.parse_tuple_or_paren(),
            Some(TokenKind::Ident(_)) => {
                let (name, span) = self.expect_identifier("variable reference")?;
                Ok(self.var_ref(name, span))
            }
            _ => Err(self.error("primary expression")),
        }
    }

    fn literal(&self, start: Span, value: LiteralValue) -> Expression {
        Expression::Literal(PrimaryLiteral {
            id: node_id(),
            location: self.loc(start),
            value,
        })
    }

    fn parse_array_literal(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect(&TokenKind::LBracket, "'[' opening array literal")?;
        self.opt_eol();
        let mut elements = vec![];
        if !self.peek_is(&TokenKind::RBracket) {
            loop {
                elements.push(self.parse_expression()?);
                if !self.comma() {
                    break;
                }
                if self.peek_is(&TokenKind::RBracket) {
                    break;
                }
            }
        }
        self.trailing_comma();
        self.expect(&TokenKind::RBracket, "']' closing array literal")?;
        self.array_found = true;
        Ok(Expression::ArrayLiteral(ArrayLiteral {
            id: node_id(),
            location: self.loc(start),
            elements,
        }))
    }

    fn parse_dict_literal(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect(&TokenKind::LBrace, "'{' opening dictionary literal")?;
        self.opt_eol();
        let mut entries = vec![];
        if !self.peek_is(&TokenKind::RBrace) {
            loop {
                let key = self.parse_expression()?;
                self.expect(&TokenKind::FatArrow, "'=>' in dictionary literal")?;
                let value = self.parse_expression()?;
                entries.push((key, value));
                if !self.comma() {
                    break;
                }
                if self.peek_is(&TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.trailing_comma();
        self.expect(&TokenKind::RBrace, "'}' closing dictionary literal")?;
        Ok(Expression::DictLiteral(DictLiteral {
            id: node_id(),
            location: self.loc(start),
            entries,
        }))
    }

    /// `(e)` is the parenthesized expression, `(e, ...)` with at least one
    /// comma is the tuple literal.
    fn parse_tuple_or_paren(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect(&TokenKind::LParen, "'(' opening expression")?;
        self.opt_eol();

        if self.eat(&TokenKind::RParen) {
            return Ok(Expression::TupleLiteral(TupleLiteral {
                id: node_id(),
                location: self.loc(start),
                elements: vec![],
            }));
        }

        let first = self.parse_expression()?;
        if self.comma() {
            let mut elements = vec![first];
            if !self.peek_is(&TokenKind::RParen) {
                loop {
                    elements.push(self.parse_expression()?);
                    if !self.comma() {
                        break;
                    }
                    if self.peek_is(&TokenKind::RParen) {
                        break;
                    }
                }
            }
            self.opt_eol();
            self.expect(&TokenKind::RParen, "')' closing tuple literal")?;
            return Ok(Expression::TupleLiteral(TupleLiteral {
                id: node_id(),
                location: self.loc(start),
                elements,
            }));
        }

        self.opt_eol();
        self.expect(&TokenKind::RParen, "')' closing expression")?;
        Ok(first)
    }

    // ---- object construction -------------------------------------------

    fn parse_object_construct(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect_keyword(Keyword::New, "'new'")?;

        // `new [T]{n}` forwards the constructor arguments to the inner
        // builtin static array: new array{ new static_array(T){ n } }
        if self.peek_is(&TokenKind::LBracket) {
            self.state.next();
            self.opt_eol();
            let element = self.parse_qualified_type()?;
            self.opt_eol();
            self.expect(&TokenKind::RBracket, "']' closing array type")?;
            self.array_found = true;

            let args = self.parse_ctor_args()?;
            let do_block = self.try_parse_do_block()?;

            let inner_type = TypeName::Array(ArrayType {
                id: node_id(),
                location: element.location().clone(),
                element: Some(Box::new(element)),
            });
            let inner = Expression::ObjectConstruct(ObjectConstruct {
                id: node_id(),
                location: self.loc(start),
                obj_type: inner_type,
                args,
                do_block: None,
            });
            return Ok(Expression::ObjectConstruct(ObjectConstruct {
                id: node_id(),
                location: self.loc(start),
                obj_type: TypeName::Primary(PrimaryType {
                    id: node_id(),
                    location: self.loc(start),
                    name: "array".to_string(),
                    template_params: vec![],
                }),
                args: vec![inner],
                do_block,
            }));
        }

        let obj_type = self.parse_qualified_type()?;
        let args = self.parse_ctor_args()?;
        let do_block = self.try_parse_do_block()?;
        Ok(Expression::ObjectConstruct(ObjectConstruct {
            id: node_id(),
            location: self.loc(start),
            obj_type,
            args,
            do_block,
        }))
    }

    fn parse_ctor_args(&mut self) -> ParseResult<Vec<Expression>> {
        if !self.peek_is(&TokenKind::LBrace) {
            return Ok(vec![]);
        }
        self.state.next();
        self.opt_eol();
        let mut args = vec![];
        if !self.peek_is(&TokenKind::RBrace) {
            loop {
                args.push(self.parse_expression()?);
                if !self.comma() {
                    break;
                }
                if self.peek_is(&TokenKind::RBrace) {
                    break;
                }
            }
        }
        self.opt_eol();
        self.expect(&TokenKind::RBrace, "'}' closing constructor arguments")?;
        Ok(args)
    }

    // ---- lambdas -------------------------------------------------------

    fn parse_lambda(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect(&TokenKind::Arrow, "'->' opening lambda")?;
        self.opt_eol();

        let mut params = vec![];
        let mut return_type = None;
        let mut explicit_head = false;

        if self.peek_is(&TokenKind::LParen) {
            self.state.next();
            self.opt_eol();
            if !self.peek_is(&TokenKind::RParen) {
                params.push(self.parse_parameter()?);
                while self.comma() {
                    if self.peek_is(&TokenKind::RParen) {
                        break;
                    }
                    params.push(self.parse_parameter()?);
                }
            }
            self.trailing_comma();
            self.expect(&TokenKind::RParen, "')' closing lambda parameters")?;
            return_type = self.try_parse_type_annotation()?;
            self.opt_eol();
            explicit_head = true;
        } else {
            // The parameter list is kept on the side and rolled back when
            // no `in` (or `do`) follows: the tokens were the body instead.
            let save = self.state.get_index();
            let attempt = (|| -> ParseResult<Vec<Parameter>> {
                let mut tentative = vec![self.parse_parameter()?];
                while self.comma() {
                    tentative.push(self.parse_parameter()?);
                }
                self.trailing_comma();
                Ok(tentative)
            })();
            match attempt {
                Ok(tentative)
                    if self.peek_keyword(Keyword::In) || self.peek_keyword(Keyword::Do) =>
                {
                    params = tentative;
                }
                _ => self.state.set_index(save),
            }
        }

        if self.eat_keyword(Keyword::Do) {
            self.opt_eol();
            let body = self.parse_statement_block(&[Keyword::End])?;
            self.expect_keyword(Keyword::End, "'end' closing lambda")?;
            let def = self.lambda_def(start, params, body, return_type);
            return Ok(Expression::Lambda(LambdaExpr {
                id: node_id(),
                location: def.location.clone(),
                def: Box::new(def),
            }));
        }

        if explicit_head || !params.is_empty() {
            self.expect_keyword(Keyword::In, "'in' introducing lambda body")?;
        }
        self.opt_eol();

        let value = self.parse_expression()?;
        // the return statement stays without a location; the forward
        // analyzer inherits it from the expression
        let ret = Statement::Return(ReturnStmt {
            id: node_id(),
            location: Location::default(),
            values: vec![value],
        });
        let body = StatementBlock {
            id: node_id(),
            location: self.loc(start),
            statements: vec![ret],
        };
        let def = self.lambda_def(start, params, body, return_type);
        Ok(Expression::Lambda(LambdaExpr {
            id: node_id(),
            location: def.location.clone(),
            def: Box::new(def),
        }))
    }

    fn parse_let_expr(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect_keyword(Keyword::Let, "'let'")?;
        self.opt_eol();

        let mut statements = vec![Statement::Initialize(self.parse_initialize_strict()?)];
        while self.state.peek().is_some_and(|t| t.is_separator()) {
            self.opt_sep();
            if self.peek_keyword(Keyword::In) {
                break;
            }
            statements.push(Statement::Initialize(self.parse_initialize_strict()?));
        }
        self.expect_keyword(Keyword::In, "'in' closing let bindings")?;
        self.opt_eol();
        let value = self.parse_expression()?;

        Ok(Expression::Block(BlockExpr {
            id: node_id(),
            location: self.loc(start),
            statements,
            value: Box::new(value),
        }))
    }

    // ---- if / case / switch expressions --------------------------------

    /// `then` or a separator introduces a clause body.
    pub(crate) fn then_or_sep(&mut self) -> ParseResult<()> {
        if self.eat_keyword(Keyword::Then) {
            self.opt_sep();
            Ok(())
        } else {
            self.sep()
        }
    }

    /// Statements followed by a tail expression, stopping (without
    /// consuming) at one of `terminators`.
    pub(crate) fn parse_block_expr_until(
        &mut self,
        terminators: &[Keyword],
        start: Span,
    ) -> ParseResult<BlockExpr> {
        let mut statements = vec![];
        loop {
            self.opt_sep();
            if terminators.iter().any(|kw| self.peek_keyword(*kw)) {
                break;
            }
            statements.push(self.parse_compound_stmt()?);
            if self.state.peek().is_some_and(|t| t.is_separator()) {
                continue;
            }
            break;
        }
        self.opt_sep();

        let Some(Statement::Expression(value)) = statements.pop() else {
            return Err(self.error("trailing expression of block"));
        };
        Ok(BlockExpr {
            id: node_id(),
            location: self.loc(start),
            statements,
            value: Box::new(value),
        })
    }

    fn parse_if_expr(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        let kind = if self.eat_keyword(Keyword::If) {
            IfKind::If
        } else {
            self.expect_keyword(Keyword::Unless, "'if' or 'unless'")?;
            IfKind::Unless
        };

        let mut clauses = vec![];
        let condition = self.parse_expression()?;
        self.then_or_sep()?;
        let body = self.parse_block_expr_until(&[Keyword::Elseif, Keyword::Else], start)?;
        clauses.push(IfClause { condition, body });

        while self.eat_keyword(Keyword::Elseif) {
            let condition = self.parse_expression()?;
            self.then_or_sep()?;
            let body = self.parse_block_expr_until(&[Keyword::Elseif, Keyword::Else], start)?;
            clauses.push(IfClause { condition, body });
        }

        self.expect_keyword(Keyword::Else, "'else' clause of if expression")?;
        self.opt_sep();
        let else_block = self.parse_block_expr_until(&[Keyword::End], start)?;
        self.expect_keyword(Keyword::End, "'end' closing if expression")?;

        Ok(Expression::If(IfExpr {
            id: node_id(),
            location: self.loc(start),
            kind,
            clauses,
            else_block: Box::new(else_block),
        }))
    }

    fn parse_case_or_switch_expr(&mut self) -> ParseResult<Expression> {
        let start = self.mark();
        self.expect_keyword(Keyword::Case, "'case'")?;

        if self.state.peek().is_some_and(|t| t.is_separator()) {
            // kindless if: `case; when cond then ...; else ...; end`
            self.opt_sep();
            let mut clauses = vec![];
            while self.eat_keyword(Keyword::When) {
                let condition = self.parse_expression()?;
                self.then_or_sep()?;
                let body = self.parse_block_expr_until(&[Keyword::When, Keyword::Else], start)?;
                clauses.push(IfClause { condition, body });
            }
            if clauses.is_empty() {
                return Err(self.error("'when' clause of case expression"));
            }
            self.expect_keyword(Keyword::Else, "'else' clause of case expression")?;
            self.opt_sep();
            let else_block = self.parse_block_expr_until(&[Keyword::End], start)?;
            self.expect_keyword(Keyword::End, "'end' closing case expression")?;
            return Ok(Expression::If(IfExpr {
                id: node_id(),
                location: self.loc(start),
                kind: IfKind::Case,
                clauses,
                else_block: Box::new(else_block),
            }));
        }

        let scrutinee = self.parse_expression()?;
        self.sep()?;
        let mut clauses = vec![];
        while self.eat_keyword(Keyword::When) {
            let values = self.parse_expr_list()?;
            self.then_or_sep()?;
            let body = self.parse_block_expr_until(&[Keyword::When, Keyword::Else], start)?;
            clauses.push(SwitchExprClause { values, body });
        }
        if clauses.is_empty() {
            return Err(self.error("'when' clause of case expression"));
        }
        self.expect_keyword(Keyword::Else, "'else' clause of case expression")?;
        self.opt_sep();
        let else_block = self.parse_block_expr_until(&[Keyword::End], start)?;
        self.expect_keyword(Keyword::End, "'end' closing case expression")?;

        Ok(Expression::Switch(SwitchExpr {
            id: node_id(),
            location: self.loc(start),
            scrutinee: Box::new(scrutinee),
            clauses,
            else_block: Box::new(else_block),
        }))
    }
}
