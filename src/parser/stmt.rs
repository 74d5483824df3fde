//! Statement and definition parsing: compound statements with the
//! initialize/assignment back-tracking, `for` vs. while disambiguation,
//! function/class/converter definitions and the compilation unit.

use crate::lexer::{Keyword, TokenKind};

use super::ast::*;
use super::{node_id, ParseResult, Parser};

impl Parser<'_> {
    // ---- statement blocks ----------------------------------------------

    /// Statements up to (but not consuming) one of the terminator keywords.
    pub(crate) fn parse_statement_block(
        &mut self,
        terminators: &[Keyword],
    ) -> ParseResult<StatementBlock> {
        let start = self.mark();
        let mut statements = vec![];
        loop {
            self.opt_sep();
            if terminators.iter().any(|kw| self.peek_keyword(*kw)) || self.state.at_end() {
                break;
            }
            statements.push(self.parse_compound_stmt()?);
            if self.state.peek().is_some_and(|t| t.is_separator()) {
                continue;
            }
            break;
        }
        self.opt_sep();
        Ok(StatementBlock {
            id: node_id(),
            location: self.loc(start),
            statements,
        })
    }

    pub(crate) fn parse_compound_stmt(&mut self) -> ParseResult<Statement> {
        match self.peek_kind() {
            Some(TokenKind::Keyword(Keyword::If | Keyword::Unless)) => self.parse_if_like_stmt(),
            Some(TokenKind::Keyword(Keyword::Case)) => self.parse_case_or_switch_stmt(),
            Some(TokenKind::Keyword(Keyword::For)) => self.parse_for_or_while_stmt(),
            Some(TokenKind::Keyword(Keyword::Begin)) => self.parse_begin_stmt(),
            Some(TokenKind::Keyword(Keyword::Ret)) => {
                let stmt = self.parse_return_stmt()?;
                self.maybe_postfix_if(stmt)
            }
            _ => self.parse_initialize_or_assignment_or_expr(),
        }
    }

    /// A statement-position `if`/`unless` could still be an if *expression*
    /// used as a statement (`x := if .. then .. else .. end` handles that in
    /// expression context; a bare one is parsed as a statement here).
    fn parse_if_like_stmt(&mut self) -> ParseResult<Statement> {
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
        let body =
            self.parse_statement_block(&[Keyword::Elseif, Keyword::Else, Keyword::End])?;
        clauses.push(IfStmtClause { condition, body });

        while self.eat_keyword(Keyword::Elseif) {
            let condition = self.parse_expression()?;
            self.then_or_sep()?;
            let body =
                self.parse_statement_block(&[Keyword::Elseif, Keyword::Else, Keyword::End])?;
            clauses.push(IfStmtClause { condition, body });
        }

        let else_block = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_statement_block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End, "'end' closing if statement")?;

        Ok(Statement::If(IfStmt {
            id: node_id(),
            location: self.loc(start),
            kind,
            clauses,
            else_block,
        }))
    }

    fn parse_case_or_switch_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.mark();
        self.expect_keyword(Keyword::Case, "'case'")?;

        if self.state.peek().is_some_and(|t| t.is_separator()) {
            // kindless if statement
            self.opt_sep();
            let mut clauses = vec![];
            while self.eat_keyword(Keyword::When) {
                let condition = self.parse_expression()?;
                self.then_or_sep()?;
                let body =
                    self.parse_statement_block(&[Keyword::When, Keyword::Else, Keyword::End])?;
                clauses.push(IfStmtClause { condition, body });
            }
            if clauses.is_empty() {
                return Err(self.error("'when' clause of case statement"));
            }
            let else_block = if self.eat_keyword(Keyword::Else) {
                Some(self.parse_statement_block(&[Keyword::End])?)
            } else {
                None
            };
            self.expect_keyword(Keyword::End, "'end' closing case statement")?;
            return Ok(Statement::If(IfStmt {
                id: node_id(),
                location: self.loc(start),
                kind: IfKind::Case,
                clauses,
                else_block,
            }));
        }

        let scrutinee = self.parse_expression()?;
        self.sep()?;
        let mut clauses = vec![];
        while self.eat_keyword(Keyword::When) {
            let values = self.parse_expr_list()?;
            self.then_or_sep()?;
            let body =
                self.parse_statement_block(&[Keyword::When, Keyword::Else, Keyword::End])?;
            clauses.push(SwitchStmtClause { values, body });
        }
        if clauses.is_empty() {
            return Err(self.error("'when' clause of case statement"));
        }
        let else_block = if self.eat_keyword(Keyword::Else) {
            Some(self.parse_statement_block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End, "'end' closing case statement")?;

        Ok(Statement::Switch(SwitchStmt {
            id: node_id(),
            location: self.loc(start),
            scrutinee,
            clauses,
            else_block,
        }))
    }

    /// `for vars in range ... end` and the while form `for cond ... end`
    /// share the keyword; iterator variables are attempted first and rolled
    /// back when no `in` follows.
    fn parse_for_or_while_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.mark();
        self.expect_keyword(Keyword::For, "'for'")?;

        let save = self.state.get_index();
        let attempt = (|| -> ParseResult<Vec<Parameter>> {
            let mut vars = vec![self.parse_parameter()?];
            while self.comma() {
                vars.push(self.parse_parameter()?);
            }
            Ok(vars)
        })();

        if let Ok(iter_vars) = attempt {
            if self.eat_keyword(Keyword::In) {
                let range = self.parse_expression()?;
                self.sep()?;
                let body = self.parse_statement_block(&[Keyword::End])?;
                self.expect_keyword(Keyword::End, "'end' closing for statement")?;
                return Ok(Statement::For(ForStmt {
                    id: node_id(),
                    location: self.loc(start),
                    iter_vars,
                    range,
                    body,
                }));
            }
        }
        self.state.set_index(save);

        let condition = self.parse_expression()?;
        if !self.eat_keyword(Keyword::Do) {
            self.sep()?;
        }
        let body = self.parse_statement_block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End, "'end' closing while statement")?;
        Ok(Statement::While(WhileStmt {
            id: node_id(),
            location: self.loc(start),
            condition,
            body,
        }))
    }

    fn parse_begin_stmt(&mut self) -> ParseResult<Statement> {
        self.expect_keyword(Keyword::Begin, "'begin'")?;
        self.opt_eol();
        let body = self.parse_statement_block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End, "'end' closing begin statement")?;
        Ok(Statement::Block(body))
    }

    fn parse_return_stmt(&mut self) -> ParseResult<Statement> {
        let start = self.mark();
        self.expect_keyword(Keyword::Ret, "'ret'")?;

        // `ret if c` is a bare return under a postfix condition, while
        // `ret if c then .. else .. end` returns an if expression; a
        // trailing `then` decides, so the postfix reading is rolled back.
        if self.peek_keyword(Keyword::If) || self.peek_keyword(Keyword::Unless) {
            let bare = Statement::Return(ReturnStmt {
                id: node_id(),
                location: self.loc(start),
                values: vec![],
            });
            if let Some(stmt) = self.attempt_postfix_if(&bare)? {
                return Ok(stmt);
            }
        }

        let mut values = vec![];
        if self
            .state
            .peek()
            .is_some_and(|t| !t.is_separator() && !t.is_keyword(Keyword::End))
        {
            values = self.parse_expr_list()?;
        }
        Ok(Statement::Return(ReturnStmt {
            id: node_id(),
            location: self.loc(start),
            values,
        }))
    }

    /// Wrap `ret`/assignment/expression statements into a postfix-if when an
    /// `if`/`unless` condition trails them.
    fn maybe_postfix_if(&mut self, body: Statement) -> ParseResult<Statement> {
        match self.attempt_postfix_if(&body)? {
            Some(stmt) => Ok(stmt),
            None => Ok(body),
        }
    }

    /// Returns `None` (with the state restored) when no postfix condition
    /// follows, or when the apparent condition is really an if expression
    /// (a `then` follows it).
    fn attempt_postfix_if(&mut self, body: &Statement) -> ParseResult<Option<Statement>> {
        let kind = if self.peek_keyword(Keyword::If) {
            IfKind::If
        } else if self.peek_keyword(Keyword::Unless) {
            IfKind::Unless
        } else {
            return Ok(None);
        };
        let save = self.state.get_index();
        self.state.next();
        let condition = match self.parse_expression() {
            Ok(cond) => cond,
            Err(_) => {
                self.state.set_index(save);
                return Ok(None);
            }
        };
        if self.peek_keyword(Keyword::Then) {
            self.state.set_index(save);
            return Ok(None);
        }
        let location = body.location().clone();
        Ok(Some(Statement::PostfixIf(PostfixIfStmt {
            id: node_id(),
            location,
            body: Box::new(body.clone()),
            kind,
            condition,
        })))
    }

    // ---- initialize / assignment / expression --------------------------

    /// `decls := values` with rollback into assignment or a plain
    /// expression statement.
    fn parse_initialize_or_assignment_or_expr(&mut self) -> ParseResult<Statement> {
        let save = self.state.get_index();
        if let Ok(init) = self.try_parse_initialize() {
            return Ok(Statement::Initialize(init));
        }
        self.state.set_index(save);

        let start = self.mark();
        let lhs = self.parse_expr_list()?;
        if let Some(TokenKind::Assign(_)) = self.peek_kind() {
            let token = self.state.next().unwrap();
            let TokenKind::Assign(op) = token.kind else {
                unreachable!()
            };
            self.opt_eol();
            let rhs = self.parse_expr_list()?;
            let stmt = Statement::Assignment(AssignmentStmt {
                id: node_id(),
                location: self.loc(start),
                lhs,
                op,
                rhs,
            });
            return self.maybe_postfix_if(stmt);
        }

        let mut lhs = lhs;
        if lhs.len() != 1 {
            return Err(self.error("assignment operator"));
        }
        let stmt = Statement::Expression(lhs.pop().unwrap());
        self.maybe_postfix_if(stmt)
    }

    fn try_parse_initialize(&mut self) -> ParseResult<InitializeStmt> {
        let start = self.mark();
        let mut decls = vec![self.parse_variable_decl()?];
        while self.comma() {
            decls.push(self.parse_variable_decl()?);
        }
        self.trailing_comma();

        if self.eat(&TokenKind::ColonEq) {
            self.opt_eol();
            let values = self.parse_expr_list()?;
            return Ok(InitializeStmt {
                id: node_id(),
                location: self.loc(start),
                decls,
                values,
            });
        }

        // `var x : T` declarations are complete without initializers
        if decls.iter().all(|d| d.is_var && d.annotation.is_some()) {
            return Ok(InitializeStmt {
                id: node_id(),
                location: self.loc(start),
                decls,
                values: vec![],
            });
        }
        Err(self.error("':=' of initialize statement"))
    }

    /// Strict form used by `let ... in`: always requires `:=` or a
    /// `var x : T` declaration.
    pub(crate) fn parse_initialize_strict(&mut self) -> ParseResult<InitializeStmt> {
        self.try_parse_initialize()
    }

    pub(crate) fn parse_variable_decl(&mut self) -> ParseResult<VariableDecl> {
        let start = self.mark();
        let is_var = self.eat_keyword(Keyword::Var);
        let (name, _) = self.expect_identifier("variable name")?;
        let annotation = self.try_parse_type_annotation()?;
        Ok(VariableDecl {
            id: node_id(),
            location: self.loc(start),
            is_var,
            name,
            annotation,
        })
    }

    pub(crate) fn parse_parameter(&mut self) -> ParseResult<Parameter> {
        let start = self.mark();
        let is_var = self.eat_keyword(Keyword::Var);
        let (name, _) = self.expect_identifier("parameter")?;
        let annotation = self.try_parse_type_annotation()?;
        Ok(Parameter {
            id: node_id(),
            location: self.loc(start),
            is_var,
            name,
            annotation,
        })
    }

    // ---- function definitions ------------------------------------------

    fn parse_func_def_name(&mut self) -> ParseResult<String> {
        use TokenKind::*;

        fn operator_name(kind: &TokenKind) -> Option<&'static str> {
            Some(match kind {
                Plus => "+",
                Minus => "-",
                Star => "*",
                Slash => "/",
                Percent => "%",
                Shl => "<<",
                Shr => ">>",
                Le => "<=",
                Ge => ">=",
                Lt => "<",
                Gt => ">",
                EqEq => "==",
                Ne => "!=",
                AndAnd => "&&",
                OrOr => "||",
                Amp => "&",
                Caret => "^",
                Pipe => "|",
                Tilde => "~",
                Bang => "!",
                _ => return None,
            })
        }

        match self.peek_kind() {
            Some(Ident(_)) => {
                let (name, _) = self.expect_identifier("name of function definition")?;
                Ok(name)
            }
            // index operator definitions `[]` and `[]=`
            Some(LBracket) => {
                self.state.next();
                self.expect(&RBracket, "']' of index operator name")?;
                if matches!(self.peek_kind(), Some(Assign(op)) if op == "=") {
                    self.state.next();
                    return Ok("[]=".to_string());
                }
                Ok("[]".to_string())
            }
            Some(kind) => match operator_name(kind) {
                Some(name) => {
                    self.state.next();
                    Ok(name.to_string())
                }
                None => Err(self.error("name of function definition")),
            },
            None => Err(self.error("name of function definition")),
        }
    }

    fn parse_function_param_decls(&mut self) -> ParseResult<Vec<Parameter>> {
        if !self.peek_is(&TokenKind::LParen) {
            return Ok(vec![]);
        }
        self.state.next();
        self.opt_eol();
        let mut params = vec![];
        if !self.peek_is(&TokenKind::RParen) {
            loop {
                params.push(self.parse_parameter()?);
                if !self.comma() {
                    break;
                }
                if self.peek_is(&TokenKind::RParen) {
                    break;
                }
            }
        }
        self.trailing_comma();
        self.expect(&TokenKind::RParen, "')' closing parameter declarations")?;
        Ok(params)
    }

    pub(crate) fn parse_function_definition(&mut self) -> ParseResult<FunctionDef> {
        let start = self.mark();
        let kind = if self.eat_keyword(Keyword::Func) {
            FuncKind::Func
        } else {
            self.expect_keyword(Keyword::Proc, "'func' or 'proc'")?;
            FuncKind::Proc
        };

        let name = self.parse_func_def_name()?;
        let params = self.parse_function_param_decls()?;
        let return_type = self.try_parse_type_annotation()?;
        self.sep()?;
        let body = self.parse_statement_block(&[Keyword::Ensure, Keyword::End])?;
        let ensure_block = if self.eat_keyword(Keyword::Ensure) {
            self.opt_sep();
            Some(self.parse_statement_block(&[Keyword::End])?)
        } else {
            None
        };
        self.expect_keyword(Keyword::End, "'end' closing function definition")?;

        Ok(FunctionDef {
            id: node_id(),
            location: self.loc(start),
            kind,
            name,
            params,
            return_type,
            body,
            ensure_block,
            accessibility: true,
            special: SpecialFunc::None,
        })
    }

    fn parse_constructor(&mut self) -> ParseResult<FunctionDef> {
        let start = self.mark();
        self.expect_keyword(Keyword::Init, "'init'")?;
        let params = self.parse_function_param_decls()?;
        self.sep()?;
        let body = self.parse_statement_block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End, "'end' closing constructor")?;
        Ok(FunctionDef {
            id: node_id(),
            location: self.loc(start),
            kind: FuncKind::Func,
            name: "dachs.init".to_string(),
            params,
            return_type: None,
            body,
            ensure_block: None,
            accessibility: true,
            special: SpecialFunc::Ctor,
        })
    }

    fn parse_copier(&mut self) -> ParseResult<FunctionDef> {
        let start = self.mark();
        self.expect_keyword(Keyword::Copy, "'copy'")?;
        self.sep()?;
        let body = self.parse_statement_block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End, "'end' closing copy special function")?;
        Ok(FunctionDef {
            id: node_id(),
            location: self.loc(start),
            kind: FuncKind::Func,
            name: "dachs.copy".to_string(),
            params: vec![],
            return_type: None,
            body,
            ensure_block: None,
            accessibility: true,
            special: SpecialFunc::Copier,
        })
    }

    pub(crate) fn parse_converter(&mut self) -> ParseResult<FunctionDef> {
        let start = self.mark();
        self.expect_keyword(Keyword::Cast, "'cast'")?;
        let params = self.parse_function_param_decls()?;
        let Some(return_type) = self.try_parse_type_annotation()? else {
            return Err(self.error("return type of conversion special function"));
        };
        self.sep()?;
        let body = self.parse_statement_block(&[Keyword::End])?;
        self.expect_keyword(Keyword::End, "'end' closing conversion special function")?;
        Ok(FunctionDef {
            id: node_id(),
            location: self.loc(start),
            kind: FuncKind::Func,
            name: "dachs.conv".to_string(),
            params,
            return_type: Some(return_type),
            body,
            ensure_block: None,
            accessibility: true,
            special: SpecialFunc::Converter,
        })
    }

    // ---- class definitions ---------------------------------------------

    /// `+` (public) / `-` (private) access specifier; public by default.
    fn parse_access_specifier(&mut self) -> bool {
        if self.eat(&TokenKind::Plus) {
            true
        } else {
            !self.eat(&TokenKind::Minus)
        }
    }

    fn parse_class_definition(&mut self) -> ParseResult<ClassDef> {
        let start = self.mark();
        self.expect_keyword(Keyword::Class, "'class'")?;
        let (name, _) = self.expect_identifier("name of class")?;

        let mut instance_vars = vec![];
        let mut member_funcs = vec![];

        loop {
            self.opt_sep();
            if self.peek_keyword(Keyword::End) {
                break;
            }
            match self.peek_kind() {
                Some(TokenKind::Keyword(Keyword::Init)) => {
                    member_funcs.push(self.parse_constructor()?)
                }
                Some(TokenKind::Keyword(Keyword::Copy)) => member_funcs.push(self.parse_copier()?),
                Some(TokenKind::Keyword(Keyword::Cast)) => {
                    member_funcs.push(self.parse_converter()?)
                }
                Some(TokenKind::Keyword(Keyword::Func | Keyword::Proc)) => {
                    let mut func = self.parse_function_definition()?;
                    func.accessibility = true;
                    member_funcs.push(func);
                }
                Some(TokenKind::Plus | TokenKind::Minus) => {
                    let accessibility = self.parse_access_specifier();
                    if self.peek_keyword(Keyword::Func) || self.peek_keyword(Keyword::Proc) {
                        let mut func = self.parse_function_definition()?;
                        func.accessibility = accessibility;
                        member_funcs.push(func);
                    } else {
                        self.parse_instance_var_decls(&mut instance_vars)?;
                    }
                }
                Some(TokenKind::Ident(_)) => {
                    self.parse_instance_var_decls(&mut instance_vars)?;
                }
                _ => return Err(self.error("class member")),
            }
        }
        self.expect_keyword(Keyword::End, "'end' closing class definition")?;

        Ok(ClassDef {
            id: node_id(),
            location: self.loc(start),
            name,
            instance_vars,
            member_funcs,
        })
    }

    fn parse_instance_var_decls(&mut self, out: &mut Vec<VariableDecl>) -> ParseResult<()> {
        loop {
            let start = self.mark();
            let (raw_name, _) = self.expect_identifier("declaration of instance variable")?;
            let name = raw_name.trim_start_matches('@').to_string();
            let annotation = self.try_parse_type_annotation()?;
            out.push(VariableDecl {
                id: node_id(),
                location: self.loc(start),
                // instance variables are always mutable within the class
                is_var: true,
                name,
                annotation,
            });
            if !self.comma() {
                break;
            }
        }
        Ok(())
    }

    // ---- compilation unit ----------------------------------------------

    fn parse_import(&mut self) -> ParseResult<Import> {
        let start = self.mark();
        self.expect_keyword(Keyword::Import, "'import'")?;
        let (mut module, _) = self.expect_identifier("imported module name")?;
        while self.eat(&TokenKind::Dot) {
            let (part, _) = self.expect_identifier("imported module name")?;
            module.push('.');
            module.push_str(&part);
        }
        Ok(Import {
            id: node_id(),
            location: self.loc(start),
            module,
        })
    }

    pub(crate) fn parse_compilation_unit(&mut self) -> ParseResult<CompilationUnit> {
        let start = self.mark();
        let mut unit = CompilationUnit {
            id: node_id(),
            location: Location::default(),
            functions: vec![],
            constants: vec![],
            classes: vec![],
            imports: vec![],
            cast_funcs: vec![],
        };

        self.opt_sep();
        while !self.state.at_end() {
            match self.peek_kind() {
                Some(TokenKind::Keyword(Keyword::Cast)) => {
                    unit.cast_funcs.push(self.parse_converter()?)
                }
                Some(TokenKind::Keyword(Keyword::Func | Keyword::Proc)) => {
                    unit.functions.push(self.parse_function_definition()?)
                }
                Some(TokenKind::Keyword(Keyword::Class)) => {
                    unit.classes.push(self.parse_class_definition()?)
                }
                Some(TokenKind::Keyword(Keyword::Import)) => {
                    unit.imports.push(self.parse_import()?)
                }
                _ => {
                    let save = self.state.get_index();
                    let init = self.try_parse_initialize().map_err(|_| {
                        self.state.set_index(save);
                        self.error(
                            "function definition, class definition, import or constant definition",
                        )
                    })?;
                    unit.constants.push(init);
                }
            }

            if self.state.at_end() {
                break;
            }
            self.sep()?;
        }

        unit.location = self.loc(start);
        Ok(unit)
    }
}
