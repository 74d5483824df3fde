//! Forward analysis: a top-down walk over the AST that builds the scope
//! tree and binds every definition site (functions, parameters, classes,
//! instance variables, lambdas) to a fresh symbol, so that forward
//! references within a unit resolve in the second pass.
//!
//! The walk mutates the AST in two places only: lambdas receive their
//! synthetic `lambda.<line>.<col>.<length>` name, and return statements
//! without a location inherit their first expression's.

use crate::parser::ast::*;

use super::error::{DiagnosticSink, SemanticCheckError};
use super::scope::{ClassId, FuncId, FuncScope, LocalId, ScopeRef, ScopeTree, VarSymbol};
use super::types::Type;
use super::type_from_type_name;

pub struct ForwardAnalyzer {
    tree: ScopeTree,
    sink: DiagnosticSink,
}

/// Build the scope tree, then run the overload-aware function duplication
/// check. Each phase fails with its accumulated error count.
pub fn analyze_forward(unit: &mut CompilationUnit) -> Result<ScopeTree, SemanticCheckError> {
    let mut analyzer = ForwardAnalyzer {
        tree: ScopeTree::new(unit.id),
        sink: DiagnosticSink::new(),
    };

    analyzer.visit_unit(unit);
    let ForwardAnalyzer { tree, sink } = analyzer;
    sink.into_result("forward symbol resolution")?;

    let mut sink = DiagnosticSink::new();
    check_function_duplication(&tree, &mut sink);
    sink.into_result("function duplication check")?;

    Ok(tree)
}

/// Every pair of functions in each scope is compared by overload equality;
/// every clash reports both definition locations.
fn check_function_duplication(tree: &ScopeTree, sink: &mut DiagnosticSink) {
    let check_group = |group: &[FuncId], sink: &mut DiagnosticSink| {
        for (index, left) in group.iter().enumerate() {
            for right in &group[index + 1..] {
                if tree.overload_eq(*left, *right) {
                    let lhs = tree.func(*left);
                    let rhs = tree.func(*right);
                    sink.error(
                        &rhs.location,
                        format!(
                            "'{}' is redefined. Note: Previous definition is at line:{}, col:{}",
                            rhs.name, lhs.location.line, lhs.location.col
                        ),
                    );
                    sink.error(
                        &lhs.location,
                        format!(
                            "'{}' is redefined. Note: Other definition is at line:{}, col:{}",
                            lhs.name, rhs.location.line, rhs.location.col
                        ),
                    );
                }
            }
        }
    };

    check_group(&tree.global.functions, sink);
    for class in &tree.classes {
        check_group(&class.member_funcs, sink);
    }
}

fn lambda_name(location: &Location) -> String {
    format!(
        "lambda.{}.{}.{}",
        location.line, location.col, location.length
    )
}

impl ForwardAnalyzer {
    fn visit_unit(&mut self, unit: &mut CompilationUnit) {
        // Classes are registered before anything else so that type
        // annotations can refer to them regardless of definition order.
        for class in &unit.classes {
            let id = self.tree.alloc_class(super::scope::ClassScope {
                enclosing: ScopeRef::Global,
                name: class.name.clone(),
                ast_node: class.id,
                location: class.location.clone(),
                member_funcs: vec![],
                instance_vars: vec![],
            });
            self.tree.global.classes.push(id);
            self.tree.class_scopes.insert(class.id, id);
        }

        for class in &mut unit.classes {
            let id = self.tree.class_scopes[&class.id];
            self.visit_class(class, id);
        }

        for func in &mut unit.functions {
            self.visit_function(func, ScopeRef::Global, None);
        }

        for cast in &mut unit.cast_funcs {
            if let Some(id) = self.visit_function(cast, ScopeRef::Global, None) {
                self.tree.global.cast_funcs.push(id);
            }
        }

        for constant in &mut unit.constants {
            for value in &mut constant.values {
                self.visit_expr(value, ScopeRef::Global);
            }
        }
    }

    fn visit_class(&mut self, class: &mut ClassDef, id: ClassId) {
        for decl in &class.instance_vars {
            let typ = match &decl.annotation {
                Some(annotation) => {
                    match type_from_type_name(&self.tree, annotation) {
                        Ok(t) => Some(t),
                        Err(message) => {
                            self.sink.error(&decl.location, message);
                            None
                        }
                    }
                }
                // unannotated instance variables make the class a template
                None => Some(Type::Template(decl.id)),
            };
            let symbol = VarSymbol {
                name: decl.name.clone(),
                ast_node: decl.id,
                immutable: !decl.is_var,
                is_global: false,
                typ,
                location: decl.location.clone(),
            };
            if let Some(sym) = self.tree.define_instance_var(id, symbol, &mut self.sink) {
                self.tree.decl_symbols.insert(decl.id, sym);
            }
        }

        for func in &mut class.member_funcs {
            self.visit_function(func, ScopeRef::Class(id), Some(id));
        }
    }

    fn visit_function(
        &mut self,
        def: &mut FunctionDef,
        enclosing: ScopeRef,
        member_of: Option<ClassId>,
    ) -> Option<FuncId> {
        if def.name.is_empty() {
            def.name = lambda_name(&def.location);
        }

        if def.kind == FuncKind::Proc && def.return_type.is_some() {
            self.sink.error(
                &def.location,
                format!("Procedure '{}' can't have return type", def.name),
            );
            return None;
        }

        let ret_type = match &def.return_type {
            Some(annotation) => match type_from_type_name(&self.tree, annotation) {
                Ok(t) => Some(t),
                Err(message) => {
                    self.sink.error(&def.location, message);
                    None
                }
            },
            None => None,
        };

        let func_id = self.tree.alloc_func(FuncScope {
            enclosing,
            name: def.name.clone(),
            ast_node: def.id,
            location: def.location.clone(),
            body: None,
            params: vec![],
            ret_type,
            is_member_func: member_of.is_some(),
            is_const: false,
            kind: def.kind,
            special: def.special,
        });
        self.tree.func_scopes.insert(def.id, func_id);

        match enclosing {
            ScopeRef::Global => {
                // converters live in the cast registry only; ordinary
                // functions also get a same-named global constant
                if def.special != SpecialFunc::Converter {
                    self.tree.global.functions.push(func_id);
                    let symbol = VarSymbol {
                        name: def.name.clone(),
                        ast_node: def.id,
                        immutable: true,
                        is_global: true,
                        typ: Some(Type::GenericFunc(func_id)),
                        location: def.location.clone(),
                    };
                    self.tree.force_define_global_constant(symbol);
                }
            }
            ScopeRef::Local(local) => {
                self.tree.locals[local.0].unnamed_funcs.push(func_id);
            }
            ScopeRef::Class(class) => {
                self.tree.classes[class.0].member_funcs.push(func_id);
            }
            ScopeRef::Func(_) => unreachable!("function defined directly inside a function scope"),
        }

        if let Some(class) = member_of {
            let receiver = VarSymbol {
                name: "self".to_string(),
                ast_node: def.id,
                immutable: true,
                is_global: false,
                typ: Some(Type::Class(class, vec![])),
                location: def.location.clone(),
            };
            self.tree.define_param(func_id, receiver, &mut self.sink);
        }

        for param in &def.params {
            self.define_parameter(func_id, param);
        }

        let body_scope = self.tree.alloc_local(ScopeRef::Func(func_id));
        self.tree.func_mut(func_id).body = Some(body_scope);
        self.tree.block_scopes.insert(def.body.id, body_scope);
        self.visit_statements(&mut def.body.statements, body_scope);

        if let Some(ensure) = &mut def.ensure_block {
            let ensure_scope = self.tree.alloc_local(ScopeRef::Local(body_scope));
            self.tree.block_scopes.insert(ensure.id, ensure_scope);
            self.visit_statements(&mut ensure.statements, ensure_scope);
        }

        Some(func_id)
    }

    fn define_parameter(&mut self, func: FuncId, param: &Parameter) {
        if param.name.starts_with('@') {
            self.sink.error(
                &param.location,
                "'@' can't be used for parameter's name. It's for instance variables.",
            );
            return;
        }

        // `_` parameters are renamed by node identity so that several of
        // them never collide; a symbol is still defined because overload
        // resolution needs the parameter's type.
        let name = if param.name == "_" {
            param.id.0.to_string()
        } else {
            param.name.clone()
        };

        let typ = match &param.annotation {
            Some(annotation) => match type_from_type_name(&self.tree, annotation) {
                Ok(t) => Some(t),
                Err(message) => {
                    self.sink.error(
                        &param.location,
                        format!("Invalid type for parameter '{}': {message}", param.name),
                    );
                    None
                }
            },
            None => Some(Type::Template(param.id)),
        };

        let symbol = VarSymbol {
            name,
            ast_node: param.id,
            immutable: !param.is_var,
            is_global: false,
            typ,
            location: param.location.clone(),
        };
        if let Some(sym) = self.tree.define_param(func, symbol, &mut self.sink) {
            self.tree.decl_symbols.insert(param.id, sym);
        }
    }

    fn visit_block(&mut self, block: &mut StatementBlock, enclosing: ScopeRef) -> LocalId {
        let scope = self.tree.alloc_local(enclosing);
        self.tree.block_scopes.insert(block.id, scope);
        self.visit_statements(&mut block.statements, scope);
        scope
    }

    fn visit_statements(&mut self, statements: &mut [Statement], scope: LocalId) {
        for statement in statements {
            self.visit_statement(statement, scope);
        }
    }

    fn visit_statement(&mut self, statement: &mut Statement, scope: LocalId) {
        let scope_ref = ScopeRef::Local(scope);
        match statement {
            Statement::Expression(expr) => self.visit_expr(expr, scope_ref),
            Statement::Assignment(assign) => {
                for expr in assign.lhs.iter_mut().chain(assign.rhs.iter_mut()) {
                    self.visit_expr(expr, scope_ref);
                }
            }
            Statement::VariableDecl(_) => {}
            Statement::Initialize(init) => {
                for value in &mut init.values {
                    self.visit_expr(value, scope_ref);
                }
            }
            Statement::If(if_stmt) => {
                for clause in &mut if_stmt.clauses {
                    self.visit_expr(&mut clause.condition, scope_ref);
                    self.visit_block(&mut clause.body, scope_ref);
                }
                if let Some(else_block) = &mut if_stmt.else_block {
                    self.visit_block(else_block, scope_ref);
                }
            }
            Statement::Switch(switch) => {
                self.visit_expr(&mut switch.scrutinee, scope_ref);
                for clause in &mut switch.clauses {
                    for value in &mut clause.values {
                        self.visit_expr(value, scope_ref);
                    }
                    self.visit_block(&mut clause.body, scope_ref);
                }
                if let Some(else_block) = &mut switch.else_block {
                    self.visit_block(else_block, scope_ref);
                }
            }
            Statement::Return(ret) => {
                // a return synthesized from a lambda body has no location
                // of its own yet
                if ret.location.empty() && !ret.values.is_empty() {
                    ret.location = ret.values[0].location().clone();
                }
                for value in &mut ret.values {
                    self.visit_expr(value, scope_ref);
                }
            }
            Statement::For(for_stmt) => {
                self.visit_expr(&mut for_stmt.range, scope_ref);
                let body_scope = self.visit_block(&mut for_stmt.body, scope_ref);
                // iterator variables live in the body's scope; their types
                // come from the range in the second pass
                for var in &for_stmt.iter_vars {
                    let name = if var.name == "_" {
                        var.id.0.to_string()
                    } else {
                        var.name.clone()
                    };
                    let typ = var.annotation.as_ref().and_then(|annotation| {
                        match type_from_type_name(&self.tree, annotation) {
                            Ok(t) => Some(t),
                            Err(message) => {
                                self.sink.error(&var.location, message);
                                None
                            }
                        }
                    });
                    let symbol = VarSymbol {
                        name,
                        ast_node: var.id,
                        immutable: !var.is_var,
                        is_global: false,
                        typ,
                        location: var.location.clone(),
                    };
                    if let Some(sym) =
                        self.tree
                            .define_local_var(body_scope, symbol, &mut self.sink)
                    {
                        self.tree.decl_symbols.insert(var.id, sym);
                    }
                }
            }
            Statement::While(while_stmt) => {
                self.visit_expr(&mut while_stmt.condition, scope_ref);
                self.visit_block(&mut while_stmt.body, scope_ref);
            }
            Statement::PostfixIf(postfix) => {
                self.visit_statement(&mut postfix.body, scope);
                self.visit_expr(&mut postfix.condition, scope_ref);
            }
            Statement::Block(block) => {
                self.visit_block(block, scope_ref);
            }
        }
    }

    fn visit_expr(&mut self, expr: &mut Expression, scope: ScopeRef) {
        match expr {
            Expression::Lambda(lambda) => {
                self.visit_function(&mut lambda.def, scope, None);
            }
            Expression::Invocation(call) => {
                self.visit_expr(&mut call.callee, scope);
                for arg in &mut call.args {
                    self.visit_expr(arg, scope);
                }
                if let Some(block) = &mut call.do_block {
                    self.visit_function(block, scope, None);
                }
            }
            Expression::ObjectConstruct(construct) => {
                for arg in &mut construct.args {
                    self.visit_expr(arg, scope);
                }
                if let Some(block) = &mut construct.do_block {
                    self.visit_function(block, scope, None);
                }
            }
            Expression::ArrayLiteral(array) => {
                for element in &mut array.elements {
                    self.visit_expr(element, scope);
                }
            }
            Expression::TupleLiteral(tuple) => {
                for element in &mut tuple.elements {
                    self.visit_expr(element, scope);
                }
            }
            Expression::DictLiteral(dict) => {
                for (key, value) in &mut dict.entries {
                    self.visit_expr(key, scope);
                    self.visit_expr(value, scope);
                }
            }
            Expression::IndexAccess(index) => {
                self.visit_expr(&mut index.child, scope);
                self.visit_expr(&mut index.index, scope);
            }
            Expression::UfcsInvocation(ufcs) => self.visit_expr(&mut ufcs.child, scope),
            Expression::Cast(cast) => self.visit_expr(&mut cast.child, scope),
            Expression::Unary(unary) => self.visit_expr(&mut unary.operand, scope),
            Expression::Binary(binary) => {
                self.visit_expr(&mut binary.lhs, scope);
                self.visit_expr(&mut binary.rhs, scope);
            }
            Expression::Block(block) => {
                let local = self.tree.alloc_local(scope);
                self.tree.block_scopes.insert(block.id, local);
                self.visit_statements(&mut block.statements, local);
                self.visit_expr(&mut block.value, ScopeRef::Local(local));
            }
            Expression::If(if_expr) => {
                for clause in &mut if_expr.clauses {
                    self.visit_expr(&mut clause.condition, scope);
                    self.visit_block_expr(&mut clause.body, scope);
                }
                self.visit_block_expr(&mut if_expr.else_block, scope);
            }
            Expression::Switch(switch) => {
                self.visit_expr(&mut switch.scrutinee, scope);
                for clause in &mut switch.clauses {
                    for value in &mut clause.values {
                        self.visit_expr(value, scope);
                    }
                    self.visit_block_expr(&mut clause.body, scope);
                }
                self.visit_block_expr(&mut switch.else_block, scope);
            }
            Expression::Typed(typed) => self.visit_expr(&mut typed.child, scope),
            Expression::Literal(_)
            | Expression::StringLiteral(_)
            | Expression::SymbolLiteral(_)
            | Expression::VarRef(_) => {}
        }
    }

    fn visit_block_expr(&mut self, block: &mut BlockExpr, enclosing: ScopeRef) {
        let scope = self.tree.alloc_local(enclosing);
        self.tree.block_scopes.insert(block.id, scope);
        self.visit_statements(&mut block.statements, scope);
        self.visit_expr(&mut block.value, ScopeRef::Local(scope));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn forward(code: &str) -> (CompilationUnit, Result<ScopeTree, SemanticCheckError>) {
        let mut unit = parser::parse(code, Some("test.dcs")).expect("parse failed");
        let result = analyze_forward(&mut unit);
        (unit, result)
    }

    #[test]
    fn test_main_registered_as_global() {
        let (_, result) = forward("func main; ret 0; end");
        let tree = result.expect("forward analysis failed");
        assert_eq!(tree.global.functions.len(), 1);
        let main = tree.func(tree.global.functions[0]);
        assert!(main.is_main_func());
        // a same-named constant is defined alongside
        assert!(tree
            .resolve_var(ScopeRef::Global, "main")
            .is_some());
    }

    #[test]
    fn test_unannotated_params_become_templates() {
        let (_, result) = forward("func add(a, b); ret a + b; end\nfunc main; ret 0; end");
        let tree = result.unwrap();
        let add = tree.func(tree.global.functions[0]);
        assert_eq!(add.params.len(), 2);
        for param in &add.params {
            assert!(matches!(
                tree.symbol(*param).typ,
                Some(Type::Template(_))
            ));
        }
    }

    #[test]
    fn test_duplicate_function_fails_with_phase() {
        let (_, result) =
            forward("func f(x: int); ret 0; end\nfunc f(x: int); ret 1; end\nfunc main; ret 0; end");
        // both definitions are reported, each with its own location
        let err = result.unwrap_err();
        assert_eq!(err.count, 2);
        assert_eq!(err.phase, "function duplication check");
    }

    #[test]
    fn test_overloads_with_different_types_allowed() {
        let (_, result) =
            forward("func f(x: int); ret 0; end\nfunc f(x: float); ret 1; end\nfunc main; ret 0; end");
        assert!(result.is_ok());
    }

    #[test]
    fn test_template_and_concrete_are_overloads() {
        let (_, result) =
            forward("func f(x); ret x; end\nfunc f(x: int); ret x; end\nfunc main; ret 0; end");
        assert!(result.is_ok());
    }

    #[test]
    fn test_lambda_gets_synthetic_name() {
        let (unit, result) = forward("func main\n    f := -> x in x + 1\n    ret 0\nend");
        let tree = result.unwrap();

        let Statement::Initialize(init) = &unit.functions[0].body.statements[0] else {
            panic!("expected initialize");
        };
        let Expression::Lambda(lambda) = &init.values[0] else {
            panic!("expected lambda");
        };
        assert!(lambda.def.name.starts_with("lambda."));

        let func_id = tree.func_scopes[&lambda.def.id];
        assert!(tree.func(func_id).is_anonymous());
    }

    #[test]
    fn test_proc_with_return_type_is_error() {
        let (_, result) = forward("proc p: int; end\nfunc main; ret 0; end");
        assert!(result.is_err());
    }

    #[test]
    fn test_at_parameter_rejected() {
        let (_, result) = forward("func f(@x); ret 0; end\nfunc main; ret 0; end");
        assert!(result.is_err());
    }

    #[test]
    fn test_underscore_params_tolerated_twice() {
        let (_, result) = forward("func f(_, _); ret 0; end\nfunc main; ret 0; end");
        assert!(result.is_ok());
    }

    #[test]
    fn test_class_instance_vars_ordered() {
        let (_, result) = forward(
            "class point\n    x : int, y : int\nend\n\nfunc main; ret 0; end",
        );
        let tree = result.unwrap();
        let class_id = tree.global.classes[0];
        assert_eq!(tree.instance_var_offset(class_id, "x"), Some(0));
        assert_eq!(tree.instance_var_offset(class_id, "y"), Some(1));
    }

    #[test]
    fn test_return_location_inherited_from_expression() {
        let (unit, result) = forward("func main\n    f := -> x in x + 1\n    ret 0\nend");
        result.unwrap();
        let Statement::Initialize(init) = &unit.functions[0].body.statements[0] else {
            panic!("expected initialize");
        };
        let Expression::Lambda(lambda) = &init.values[0] else {
            panic!("expected lambda");
        };
        let Statement::Return(ret) = &lambda.def.body.statements[0] else {
            panic!("expected return");
        };
        assert!(!ret.location.empty());
    }
}
