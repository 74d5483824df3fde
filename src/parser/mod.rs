//! Parsing for Dachs source code.
//!
//! The grammar is recursive descent with explicit back-tracking over the
//! token stream ([`ParseState`] index save/restore) where the original
//! PEG grammar is ambiguous: lambda parameter lists without parentheses,
//! `for` vs. while loops sharing the `for` keyword, and initialize vs.
//! assignment statements. Postfix invocations without parentheses are
//! resolved through byte-level token adjacency (see [`crate::lexer::Span`]).
//!
//! Parsing either produces a complete [`CompilationUnit`] or fails with a
//! single [`ParseError`] carrying the location, the expected rule and a
//! caret-annotated source excerpt. No partial tree is ever delivered.

pub mod ast;
mod expr;
mod parse_state;
mod stmt;
mod types;

use std::{error::Error, fmt::Display};

use colored::Colorize;

use crate::lexer::{Keyword, Lexer, Span, Token, TokenKind};

use self::ast::{CompilationUnit, Import, Location, NodeId};
pub use self::parse_state::ParseState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub expected: String,
    pub line: usize,
    pub col: usize,
    pub excerpt: String,
    pub path: Option<String>,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let place = match &self.path {
            Some(path) => format!("line:{}, col:{} of {}", self.line, self.col, path),
            None => format!("line:{}, col:{}", self.line, self.col),
        };
        writeln!(f, "{} in {place}", "Error".red())?;
        writeln!(f, "{}{}", "Expected ".bold(), self.expected)?;
        writeln!(f)?;
        writeln!(f, "{}", self.excerpt)?;
        let padding = " ".repeat(self.col.saturating_sub(1));
        write!(f, "{padding}{}", "^ here".green())
    }
}

impl Error for ParseError {}

pub type ParseResult<T> = Result<T, ParseError>;

pub(crate) struct Parser<'a> {
    pub(crate) state: ParseState,
    pub(crate) source: &'a str,
    pub(crate) path: Option<String>,
    pub(crate) string_found: bool,
    pub(crate) array_found: bool,
    pub(crate) range_found: bool,
}

/// Parse a whole compilation unit. `path` may be absent in
/// syntax-check-only mode; locations then carry no path.
pub fn parse(code: &str, path: Option<&str>) -> ParseResult<CompilationUnit> {
    let tokens = Lexer::new(code).lex().map_err(|e| ParseError {
        expected: format!("a valid token ({e})"),
        line: 1,
        col: 1,
        excerpt: code.lines().next().unwrap_or("").to_string(),
        path: path.map(str::to_string),
    })?;

    let mut parser = Parser {
        state: ParseState::new(tokens),
        source: code,
        path: path.map(str::to_string),
        string_found: false,
        array_found: false,
        range_found: false,
    };

    let mut unit = parser.parse_compilation_unit()?;
    parser.install_implicit_imports(&mut unit);
    Ok(unit)
}

/// Parse for syntax checking only; the tree is dropped.
pub fn check_syntax(code: &str) -> ParseResult<()> {
    parse(code, None).map(|_| ())
}

impl<'a> Parser<'a> {
    // ---- token helpers -------------------------------------------------

    pub(crate) fn peek_kind(&self) -> Option<&TokenKind> {
        self.state.peek().map(|t| &t.kind)
    }

    pub(crate) fn peek_is(&self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    pub(crate) fn peek_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    pub(crate) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek_is(kind) {
            self.state.next();
            true
        } else {
            false
        }
    }

    pub(crate) fn eat_keyword(&mut self, kw: Keyword) -> bool {
        if self.peek_keyword(kw) {
            self.state.next();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect(&mut self, kind: &TokenKind, rule: &str) -> ParseResult<Token> {
        if self.peek_is(kind) {
            Ok(self.state.next().unwrap())
        } else {
            Err(self.error(rule))
        }
    }

    pub(crate) fn expect_keyword(&mut self, kw: Keyword, rule: &str) -> ParseResult<Token> {
        if self.peek_keyword(kw) {
            Ok(self.state.next().unwrap())
        } else {
            Err(self.error(rule))
        }
    }

    pub(crate) fn expect_identifier(&mut self, rule: &str) -> ParseResult<(String, Span)> {
        match self.peek_kind() {
            Some(TokenKind::Ident(_)) => {
                let token = self.state.next().unwrap();
                let TokenKind::Ident(name) = token.kind else {
                    unreachable!()
                };
                Ok((name, token.span))
            }
            _ => Err(self.error(rule)),
        }
    }

    /// Consume any run of end-of-line tokens.
    pub(crate) fn opt_eol(&mut self) {
        while self.peek_is(&TokenKind::Eol) {
            self.state.next();
        }
    }

    /// One or more separators (`;` or end of line).
    pub(crate) fn sep(&mut self) -> ParseResult<()> {
        if !self.state.peek().is_some_and(Token::is_separator) {
            return Err(self.error("separator"));
        }
        self.opt_sep();
        Ok(())
    }

    /// Any run of separators, possibly empty.
    pub(crate) fn opt_sep(&mut self) {
        while self.state.peek().is_some_and(Token::is_separator) {
            self.state.next();
        }
    }

    /// List separator comma: `, eol?` or `eol? ,`.
    pub(crate) fn comma(&mut self) -> bool {
        if self.eat(&TokenKind::Comma) {
            self.opt_eol();
            return true;
        }
        let save = self.state.get_index();
        self.opt_eol();
        if self.eat(&TokenKind::Comma) {
            true
        } else {
            self.state.set_index(save);
            false
        }
    }

    /// Optional trailing comma and line break at the end of a list.
    pub(crate) fn trailing_comma(&mut self) {
        self.eat(&TokenKind::Comma);
        self.opt_eol();
    }

    // ---- locations and errors ------------------------------------------

    /// Span of the next token, used as the start marker of a rule.
    pub(crate) fn mark(&self) -> Span {
        self.state
            .peek()
            .map(|t| t.span)
            .or_else(|| self.state.last_token().map(|t| t.span))
            .unwrap_or_default()
    }

    /// Location covering everything from `start` to the last consumed token.
    pub(crate) fn loc(&self, start: Span) -> Location {
        let end = self
            .state
            .previous()
            .map(|t| t.span.end_offset())
            .unwrap_or(start.end_offset());
        Location {
            line: start.line,
            col: start.col,
            length: end.saturating_sub(start.offset),
            path: self.path.clone(),
        }
    }

    pub(crate) fn error(&self, expected: &str) -> ParseError {
        let span = self
            .state
            .peek()
            .map(|t| t.span)
            .or_else(|| self.state.last_token().map(|t| t.span))
            .unwrap_or_default();
        let excerpt = self
            .source
            .lines()
            .nth(span.line.saturating_sub(1))
            .unwrap_or("")
            .to_string();
        ParseError {
            expected: expected.to_string(),
            line: span.line.max(1),
            col: span.col.max(1),
            excerpt,
            path: self.path.clone(),
        }
    }

    // ---- implicit imports ----------------------------------------------

    /// Prepend synthetic import nodes for builtin modules whose literal
    /// forms occurred anywhere in the unit.
    fn install_implicit_imports(&self, unit: &mut CompilationUnit) {
        let mut implicit = vec![];
        if self.string_found {
            implicit.push("string");
        }
        if self.array_found {
            implicit.push("array");
        }
        if self.range_found {
            implicit.push("range");
        }

        for (index, module) in implicit.into_iter().enumerate() {
            unit.imports.insert(
                index,
                Import {
                    id: ast::generate_id(),
                    location: Location::default(),
                    module: module.to_string(),
                },
            );
        }
    }
}

pub(crate) fn node_id() -> NodeId {
    ast::generate_id()
}

#[cfg(test)]
mod tests {
    use super::ast::*;
    use super::*;

    fn parse_ok(code: &str) -> CompilationUnit {
        parse(code, Some("test.dcs")).expect("parse failed")
    }

    fn parse_expr(code: &str) -> Expression {
        let unit = parse_ok(&format!("func main; ret {code}; end"));
        let Statement::Return(ret) = &unit.functions[0].body.statements[0] else {
            panic!("expected return statement");
        };
        ret.values[0].clone()
    }

    #[test]
    fn test_parse_minimal_main() {
        let unit = parse_ok("func main; ret 0; end");
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].name, "main");
        assert!(unit.functions[0].params.is_empty());
        assert_eq!(unit.functions[0].body.statements.len(), 1);
    }

    #[test]
    fn test_parse_function_with_params() {
        let unit = parse_ok("func add(a, b)\n    ret a + b\nend");
        let func = &unit.functions[0];
        assert_eq!(func.name, "add");
        assert_eq!(func.params.len(), 2);
        assert!(func.params[0].annotation.is_none());
    }

    #[test]
    fn test_parse_annotated_parameter() {
        let unit = parse_ok("func f(x: int); ret x; end");
        let param = &unit.functions[0].params[0];
        assert!(matches!(
            param.annotation,
            Some(TypeName::Primary(ref p)) if p.name == "int"
        ));
    }

    #[test]
    fn test_tuple_literal_needs_comma() {
        let paren = parse_expr("(42)");
        assert!(matches!(paren, Expression::Literal(_)));

        let tuple = parse_expr("(1, 2, 3)");
        let Expression::TupleLiteral(t) = tuple else {
            panic!("expected tuple literal");
        };
        assert_eq!(t.elements.len(), 3);
    }

    #[test]
    fn test_range_lowered_to_object_construct() {
        let range = parse_expr("0..3");
        let Expression::ObjectConstruct(construct) = range else {
            panic!("expected range object construction");
        };
        let TypeName::Primary(p) = &construct.obj_type else {
            panic!("expected primary type");
        };
        assert_eq!(p.name, "range");
        assert_eq!(construct.args.len(), 3);
        assert!(matches!(
            construct.args[2],
            Expression::Literal(PrimaryLiteral {
                value: LiteralValue::Bool(false),
                ..
            })
        ));
    }

    #[test]
    fn test_inclusive_range() {
        let Expression::ObjectConstruct(construct) = parse_expr("0...3") else {
            panic!("expected range object construction");
        };
        assert!(matches!(
            construct.args[2],
            Expression::Literal(PrimaryLiteral {
                value: LiteralValue::Bool(true),
                ..
            })
        ));
    }

    #[test]
    fn test_implicit_import_string() {
        let unit = parse_ok("x := \"hi\"");
        assert_eq!(unit.imports.len(), 1);
        assert_eq!(unit.imports[0].module, "string");
    }

    #[test]
    fn test_implicit_import_array_and_range() {
        let unit = parse_ok("a := [1, 2, 3]\nr := 1..10");
        let modules: Vec<_> = unit.imports.iter().map(|i| i.module.as_str()).collect();
        assert_eq!(modules, vec!["array", "range"]);
    }

    #[test]
    fn test_no_implicit_imports() {
        let unit = parse_ok("x := 42");
        assert!(unit.imports.is_empty());
    }

    #[test]
    fn test_lambda_oneline() {
        let Expression::Lambda(lambda) = parse_expr("-> x in x + 1") else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.def.params.len(), 1);
        assert_eq!(lambda.def.params[0].name, "x");
        assert_eq!(lambda.def.body.statements.len(), 1);
        assert!(matches!(
            lambda.def.body.statements[0],
            Statement::Return(_)
        ));
    }

    #[test]
    fn test_lambda_without_params() {
        let Expression::Lambda(lambda) = parse_expr("-> 42") else {
            panic!("expected lambda");
        };
        assert!(lambda.def.params.is_empty());
    }

    #[test]
    fn test_lambda_parenthesized_params() {
        let Expression::Lambda(lambda) = parse_expr("-> (a, b) in a * b") else {
            panic!("expected lambda");
        };
        assert_eq!(lambda.def.params.len(), 2);
    }

    #[test]
    fn test_new_array_rewrite() {
        let Expression::ObjectConstruct(outer) = parse_expr("new [int]{4u}") else {
            panic!("expected object construction");
        };
        let TypeName::Primary(p) = &outer.obj_type else {
            panic!("expected primary type");
        };
        assert_eq!(p.name, "array");
        assert!(p.template_params.is_empty());

        assert_eq!(outer.args.len(), 1);
        let Expression::ObjectConstruct(inner) = &outer.args[0] else {
            panic!("expected inner static_array construction");
        };
        assert!(matches!(inner.obj_type, TypeName::Array(_)));
        assert_eq!(inner.args.len(), 1);
    }

    #[test]
    fn test_ufcs_invocation() {
        let Expression::UfcsInvocation(ufcs) = parse_expr("xs.size") else {
            panic!("expected UFCS invocation");
        };
        assert_eq!(ufcs.member_name, "size");
    }

    #[test]
    fn test_method_call_desugars_to_invocation() {
        let Expression::Invocation(call) = parse_expr("xs.push(1)") else {
            panic!("expected invocation");
        };
        let Expression::VarRef(callee) = call.callee.as_ref() else {
            panic!("expected var ref callee");
        };
        assert_eq!(callee.name, "push");
        // receiver is forwarded as the first argument
        assert_eq!(call.args.len(), 2);
    }

    #[test]
    fn test_postfix_without_parens_requires_space() {
        // `a.b c` reads `c` as an argument...
        let Expression::Invocation(call) = parse_expr("a.b c") else {
            panic!("expected invocation");
        };
        assert_eq!(call.args.len(), 2);

        // ...but `(a.b + 10)` must not become `a.b(+10)`.
        let Expression::Binary(bin) = parse_expr("(a.b + 10)") else {
            panic!("expected binary expression");
        };
        assert_eq!(bin.op, "+");
    }

    #[test]
    fn test_trailing_do_block() {
        let unit = parse_ok("func main\n    each(xs) do |x|\n        p(x)\n    end\nend");
        let Statement::Expression(Expression::Invocation(call)) =
            &unit.functions[0].body.statements[0]
        else {
            panic!("expected invocation statement");
        };
        assert!(call.do_block.is_some());
        assert_eq!(call.do_block.as_ref().unwrap().params.len(), 1);
    }

    #[test]
    fn test_brace_block() {
        let unit = parse_ok("func main\n    each(xs) { |x| x + 1 }\nend");
        let Statement::Expression(Expression::Invocation(call)) =
            &unit.functions[0].body.statements[0]
        else {
            panic!("expected invocation statement");
        };
        assert!(call.do_block.is_some());
    }

    #[test]
    fn test_postfix_if_statement() {
        let unit = parse_ok("func main; ret 0 if true; end");
        assert!(matches!(
            unit.functions[0].body.statements[0],
            Statement::PostfixIf(_)
        ));
    }

    #[test]
    fn test_if_statement_with_elseif() {
        let unit = parse_ok(
            "func main\n    if a\n        p(1)\n    elseif b\n        p(2)\n    else\n        p(3)\n    end\nend",
        );
        let Statement::If(if_stmt) = &unit.functions[0].body.statements[0] else {
            panic!("expected if statement");
        };
        assert_eq!(if_stmt.clauses.len(), 2);
        assert!(if_stmt.else_block.is_some());
    }

    #[test]
    fn test_if_expression() {
        let Expression::If(if_expr) = parse_expr("if a then 1 else 2 end") else {
            panic!("expected if expression");
        };
        assert_eq!(if_expr.clauses.len(), 1);
    }

    #[test]
    fn test_unless_statement() {
        let unit = parse_ok("func main\n    unless a\n        p(1)\n    end\nend");
        let Statement::If(if_stmt) = &unit.functions[0].body.statements[0] else {
            panic!("expected if statement");
        };
        assert_eq!(if_stmt.kind, IfKind::Unless);
    }

    #[test]
    fn test_for_in_statement() {
        let unit = parse_ok("func main\n    for i in 0..3\n        p(i)\n    end\nend");
        let Statement::For(for_stmt) = &unit.functions[0].body.statements[0] else {
            panic!("expected for statement");
        };
        assert_eq!(for_stmt.iter_vars.len(), 1);
        assert_eq!(for_stmt.iter_vars[0].name, "i");
    }

    #[test]
    fn test_while_statement() {
        let unit = parse_ok("func main\n    for x < 10\n        p(x)\n    end\nend");
        assert!(matches!(
            unit.functions[0].body.statements[0],
            Statement::While(_)
        ));
    }

    #[test]
    fn test_class_definition() {
        let unit = parse_ok(
            "class point\n    x : int, y : int\n\n    init(x, y)\n        @x = x\n        @y = y\n    end\n\n    func norm\n        ret @x * @x + @y * @y\n    end\nend",
        );
        let class = &unit.classes[0];
        assert_eq!(class.name, "point");
        assert_eq!(class.instance_vars.len(), 2);
        assert_eq!(class.member_funcs.len(), 2);
        assert_eq!(class.member_funcs[0].name, "dachs.init");
        assert_eq!(class.member_funcs[0].special, SpecialFunc::Ctor);
    }

    #[test]
    fn test_top_level_cast_function() {
        let unit = parse_ok("cast (x: int): float\n    ret 1.0\nend");
        assert_eq!(unit.cast_funcs.len(), 1);
        assert_eq!(unit.cast_funcs[0].special, SpecialFunc::Converter);
    }

    #[test]
    fn test_import_statement() {
        let unit = parse_ok("import std.io\n\nfunc main; ret 0; end");
        assert_eq!(unit.imports[0].module, "std.io");
    }

    #[test]
    fn test_parse_error_reports_expected() {
        let err = parse("func main; ret 0", Some("t.dcs")).unwrap_err();
        assert!(!err.expected.is_empty());
        assert!(err.line >= 1);
        assert!(err.col >= 1);
    }

    #[test]
    fn test_locations_are_set() {
        let unit = parse_ok("func main; ret 0; end");
        let func = &unit.functions[0];
        assert!(func.location.line >= 1);
        assert!(func.location.col >= 1);
        assert_eq!(func.location.path.as_deref(), Some("test.dcs"));

        let Statement::Return(ret) = &unit.functions[0].body.statements[0] else {
            panic!("expected return");
        };
        assert!(ret.location.line >= 1);
        assert!(!ret.values[0].location().empty());
    }

    #[test]
    fn test_dict_literal() {
        let Expression::DictLiteral(dict) = parse_expr("{1 => \"one\", 2 => \"two\"}") else {
            panic!("expected dict literal");
        };
        assert_eq!(dict.entries.len(), 2);
    }

    #[test]
    fn test_symbol_literal() {
        let Expression::SymbolLiteral(sym) = parse_expr(":ok") else {
            panic!("expected symbol literal");
        };
        assert_eq!(sym.name, "ok");
    }

    #[test]
    fn test_cast_expression() {
        let Expression::Cast(cast) = parse_expr("1 as float") else {
            panic!("expected cast expression");
        };
        assert!(matches!(
            cast.target,
            TypeName::Primary(ref p) if p.name == "float"
        ));
    }

    #[test]
    fn test_operator_precedence() {
        let Expression::Binary(root) = parse_expr("1 + 2 * 3") else {
            panic!("expected binary expression");
        };
        assert_eq!(root.op, "+");
        let Expression::Binary(rhs) = root.rhs.as_ref() else {
            panic!("expected nested binary expression");
        };
        assert_eq!(rhs.op, "*");
    }

    #[test]
    fn test_begin_end_expression() {
        let Expression::Block(block) = parse_expr("begin\n    x := 1\n    x + 1\nend") else {
            panic!("expected block expression");
        };
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn test_let_in_expression() {
        let Expression::Block(block) = parse_expr("let\n    x := 1\nin x + 1") else {
            panic!("expected block expression");
        };
        assert_eq!(block.statements.len(), 1);
    }

    #[test]
    fn test_switch_expression() {
        let Expression::Switch(switch) =
            parse_expr("case n\nwhen 0 then 1\nwhen 1, 2 then 2\nelse 3\nend")
        else {
            panic!("expected switch expression");
        };
        assert_eq!(switch.clauses.len(), 2);
        assert_eq!(switch.clauses[1].values.len(), 2);
    }

    #[test]
    fn test_index_access() {
        let Expression::IndexAccess(_) = parse_expr("xs[0]") else {
            panic!("expected index access");
        };
    }

    #[test]
    fn test_typed_expression() {
        let Expression::Typed(typed) = parse_expr("42 : uint") else {
            panic!("expected typed expression");
        };
        assert!(matches!(
            typed.annotation,
            TypeName::Primary(ref p) if p.name == "uint"
        ));
    }

    #[test]
    fn test_initialize_multiple_decls() {
        let unit = parse_ok("func main\n    a, b := 1, 2\nend");
        let Statement::Initialize(init) = &unit.functions[0].body.statements[0] else {
            panic!("expected initialize statement");
        };
        assert_eq!(init.decls.len(), 2);
        assert_eq!(init.values.len(), 2);
    }

    #[test]
    fn test_var_decl_mutability() {
        let unit = parse_ok("func main\n    var x := 1\n    x = 2\nend");
        let Statement::Initialize(init) = &unit.functions[0].body.statements[0] else {
            panic!("expected initialize statement");
        };
        assert!(init.decls[0].is_var);
        assert!(matches!(
            unit.functions[0].body.statements[1],
            Statement::Assignment(_)
        ));
    }

    #[test]
    fn test_proc_definition() {
        let unit = parse_ok("proc greet\n    p(\"hi\")\nend");
        assert_eq!(unit.functions[0].kind, FuncKind::Proc);
    }
}
