//! The semantic analyzer: second walk over the AST that resolves names,
//! infers and checks types, resolves overloads (instantiating templates on
//! first use), records lambda captures and annotates every expression with
//! its concrete type.
//!
//! Analysis results are kept per concrete function in [`FuncAnalysis`] side
//! tables — two instantiations of one template annotate the same AST nodes
//! with different types, so the tables cannot live on the tree.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::parser::ast::*;

use super::error::{DiagnosticSink, SemanticCheckError};
use super::member::{check_builtin_member, BuiltinMember};
use super::scope::{ClassId, FuncId, LocalId, ScopeRef, ScopeTree, SymbolId, VarSymbol};
use super::type_from_type_name;
use super::types::{Type, BOOL, CHAR, FLOAT, INT, STRING, SYMBOL, UINT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Callee {
    /// Statically resolved function (monomorphized when templated).
    Direct(FuncId),
    /// Call through a generic-function value; `target` is the concrete
    /// instantiation, the closure environment comes from the value.
    Closure { target: FuncId },
    /// Call through a plain function-pointer value.
    Indirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberAccess {
    /// Instance variable access by offset.
    InstanceVar(ClassId, usize),
    /// Member function or UFCS free function invocation with the receiver
    /// as first argument.
    Call(FuncId),
    Builtin(BuiltinMember),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CastResolution {
    /// Conversion between builtin scalars.
    BuiltinConv,
    /// User-defined converter function.
    Converter(FuncId),
}

/// Type and resolution annotations for one concrete function body (or for
/// the global constant initializers).
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FuncAnalysis {
    pub expr_types: HashMap<NodeId, Type>,
    pub resolved_vars: HashMap<NodeId, SymbolId>,
    pub resolved_calls: HashMap<NodeId, Callee>,
    pub member_accesses: HashMap<NodeId, MemberAccess>,
    pub casts: HashMap<NodeId, CastResolution>,
    pub ctors: HashMap<NodeId, FuncId>,
    /// Assignment right-hand sides of class type with a user-defined
    /// copier: value node → `dachs.copy` to invoke.
    pub copies: HashMap<NodeId, FuncId>,
    /// Declaration site → the symbol this analysis bound for it.
    pub decl_symbols: HashMap<NodeId, SymbolId>,
    pub ret_type: Option<Type>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SemanticContext {
    pub scopes: ScopeTree,
    /// Concrete (non-template or instantiated) functions by scope id.
    pub functions: HashMap<FuncId, FuncAnalysis>,
    /// Annotations of the global constant initializers.
    pub global_analysis: FuncAnalysis,
    /// Lambda captures in stable insertion order, keyed by the *origin*
    /// (pre-instantiation) function scope.
    pub lambda_captures: HashMap<FuncId, Vec<SymbolId>>,
    /// Instantiation cache keyed by origin and substituted parameter types.
    pub instantiations: HashMap<(FuncId, Vec<Type>), FuncId>,
    /// Instantiated function → its origin template.
    pub instantiation_origin: HashMap<FuncId, FuncId>,
    pub main_func: Option<FuncId>,
}

impl SemanticContext {
    pub fn origin_of(&self, func: FuncId) -> FuncId {
        self.instantiation_origin.get(&func).copied().unwrap_or(func)
    }

    pub fn captures_of(&self, func: FuncId) -> &[SymbolId] {
        self.lambda_captures
            .get(&self.origin_of(func))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn analysis(&self, func: FuncId) -> Option<&FuncAnalysis> {
        self.functions.get(&func)
    }
}

struct AnalysisFrame {
    func: Option<FuncId>,
    analysis: FuncAnalysis,
    /// Local binding frames (innermost last): name → symbol.
    frames: Vec<(Option<LocalId>, HashMap<String, SymbolId>)>,
    ret_types: Vec<Option<Type>>,
    /// Whether arena local-variable lists should be populated (only for
    /// the first analysis of a body).
    primary: bool,
}

pub struct Analyzer<'ast> {
    ctx: SemanticContext,
    sink: DiagnosticSink,
    func_defs: HashMap<NodeId, &'ast FunctionDef>,
    stack: Vec<AnalysisFrame>,
    in_progress: HashSet<FuncId>,
    warned_shadowing: HashSet<NodeId>,
}

/// Run semantic analysis over a unit whose scope tree was already built by
/// the forward pass.
pub fn analyze(
    unit: &CompilationUnit,
    scopes: ScopeTree,
) -> Result<SemanticContext, SemanticCheckError> {
    let mut analyzer = Analyzer {
        ctx: SemanticContext {
            scopes,
            ..Default::default()
        },
        sink: DiagnosticSink::new(),
        func_defs: HashMap::new(),
        stack: vec![],
        in_progress: HashSet::new(),
        warned_shadowing: HashSet::new(),
    };
    analyzer.index_functions(unit);

    analyzer.ctx.main_func = analyzer
        .ctx
        .scopes
        .global
        .functions
        .iter()
        .copied()
        .find(|f| analyzer.ctx.scopes.func(*f).is_main_func());
    if let Some(main) = analyzer.ctx.main_func {
        analyzer.prepare_main_signature(main);
    }

    analyzer.stack.push(AnalysisFrame {
        func: None,
        analysis: FuncAnalysis::default(),
        frames: vec![(None, HashMap::new())],
        ret_types: vec![],
        primary: true,
    });
    for constant in &unit.constants {
        analyzer.check_global_constant(constant);
    }

    // analyze every concrete function up front; templates wait for their
    // first use
    let initial: Vec<FuncId> = analyzer
        .ctx
        .scopes
        .global
        .functions
        .iter()
        .chain(analyzer.ctx.scopes.global.cast_funcs.iter())
        .chain(
            analyzer
                .ctx
                .scopes
                .classes
                .iter()
                .flat_map(|c| c.member_funcs.iter()),
        )
        .copied()
        .collect();
    for func in initial {
        if !analyzer.func_is_template(func) {
            analyzer.analyze_function_body(func);
        }
    }

    let global_frame = analyzer.stack.pop().expect("global analysis frame");
    analyzer.ctx.global_analysis = global_frame.analysis;

    let Analyzer { ctx, sink, .. } = analyzer;
    sink.into_result("symbol resolution")?;
    Ok(ctx)
}

impl<'ast> Analyzer<'ast> {
    // ---- indexing ------------------------------------------------------

    fn index_functions(&mut self, unit: &'ast CompilationUnit) {
        for func in unit
            .functions
            .iter()
            .chain(unit.cast_funcs.iter())
            .chain(unit.classes.iter().flat_map(|c| c.member_funcs.iter()))
        {
            self.index_function(func);
        }
        for constant in &unit.constants {
            for value in &constant.values {
                self.index_expr(value);
            }
        }
    }

    fn index_function(&mut self, def: &'ast FunctionDef) {
        self.func_defs.insert(def.id, def);
        self.index_block(&def.body);
        if let Some(ensure) = &def.ensure_block {
            self.index_block(ensure);
        }
    }

    fn index_block(&mut self, block: &'ast StatementBlock) {
        for statement in &block.statements {
            self.index_statement(statement);
        }
    }

    fn index_statement(&mut self, statement: &'ast Statement) {
        match statement {
            Statement::Expression(e) => self.index_expr(e),
            Statement::Assignment(a) => {
                a.lhs.iter().chain(a.rhs.iter()).for_each(|e| self.index_expr(e))
            }
            Statement::VariableDecl(_) => {}
            Statement::Initialize(init) => init.values.iter().for_each(|e| self.index_expr(e)),
            Statement::If(s) => {
                for clause in &s.clauses {
                    self.index_expr(&clause.condition);
                    self.index_block(&clause.body);
                }
                if let Some(b) = &s.else_block {
                    self.index_block(b);
                }
            }
            Statement::Switch(s) => {
                self.index_expr(&s.scrutinee);
                for clause in &s.clauses {
                    clause.values.iter().for_each(|e| self.index_expr(e));
                    self.index_block(&clause.body);
                }
                if let Some(b) = &s.else_block {
                    self.index_block(b);
                }
            }
            Statement::Return(r) => r.values.iter().for_each(|e| self.index_expr(e)),
            Statement::For(f) => {
                self.index_expr(&f.range);
                self.index_block(&f.body);
            }
            Statement::While(w) => {
                self.index_expr(&w.condition);
                self.index_block(&w.body);
            }
            Statement::PostfixIf(p) => {
                self.index_statement(&p.body);
                self.index_expr(&p.condition);
            }
            Statement::Block(b) => self.index_block(b),
        }
    }

    fn index_expr(&mut self, expr: &'ast Expression) {
        match expr {
            Expression::Lambda(lambda) => self.index_function(&lambda.def),
            Expression::Invocation(call) => {
                self.index_expr(&call.callee);
                call.args.iter().for_each(|a| self.index_expr(a));
                if let Some(block) = &call.do_block {
                    self.index_function(block);
                }
            }
            Expression::ObjectConstruct(c) => {
                c.args.iter().for_each(|a| self.index_expr(a));
                if let Some(block) = &c.do_block {
                    self.index_function(block);
                }
            }
            Expression::ArrayLiteral(a) => a.elements.iter().for_each(|e| self.index_expr(e)),
            Expression::TupleLiteral(t) => t.elements.iter().for_each(|e| self.index_expr(e)),
            Expression::DictLiteral(d) => d.entries.iter().for_each(|(k, v)| {
                self.index_expr(k);
                self.index_expr(v);
            }),
            Expression::IndexAccess(i) => {
                self.index_expr(&i.child);
                self.index_expr(&i.index);
            }
            Expression::UfcsInvocation(u) => self.index_expr(&u.child),
            Expression::Cast(c) => self.index_expr(&c.child),
            Expression::Unary(u) => self.index_expr(&u.operand),
            Expression::Binary(b) => {
                self.index_expr(&b.lhs);
                self.index_expr(&b.rhs);
            }
            Expression::Block(b) => {
                self.index_block_expr(b);
            }
            Expression::If(i) => {
                for clause in &i.clauses {
                    self.index_expr(&clause.condition);
                    self.index_block_expr(&clause.body);
                }
                self.index_block_expr(&i.else_block);
            }
            Expression::Switch(s) => {
                self.index_expr(&s.scrutinee);
                for clause in &s.clauses {
                    clause.values.iter().for_each(|v| self.index_expr(v));
                    self.index_block_expr(&clause.body);
                }
                self.index_block_expr(&s.else_block);
            }
            Expression::Typed(t) => self.index_expr(&t.child),
            Expression::Literal(_)
            | Expression::StringLiteral(_)
            | Expression::SymbolLiteral(_)
            | Expression::VarRef(_) => {}
        }
    }

    fn index_block_expr(&mut self, block: &'ast BlockExpr) {
        for statement in &block.statements {
            self.index_statement(statement);
        }
        self.index_expr(&block.value);
    }

    // ---- frame helpers -------------------------------------------------

    fn cur(&mut self) -> &mut AnalysisFrame {
        self.stack.last_mut().expect("analysis frame")
    }

    fn cur_func(&self) -> Option<FuncId> {
        self.stack.last().and_then(|f| f.func)
    }

    fn typed(&mut self, node: NodeId, t: Type) -> Option<Type> {
        self.cur().analysis.expr_types.insert(node, t.clone());
        Some(t)
    }

    fn current_scope_ref(&self) -> ScopeRef {
        match self.cur_func() {
            Some(func) => ScopeRef::Func(func),
            None => ScopeRef::Global,
        }
    }

    fn func_is_template(&self, func: FuncId) -> bool {
        self.ctx.scopes.func(func).params.iter().any(|p| {
            self.ctx.scopes.symbol(*p).typ.as_ref().is_none_or(Type::is_template)
        })
    }

    /// `main` with a single unannotated parameter receives the argv array.
    fn prepare_main_signature(&mut self, main: FuncId) {
        let params = self.ctx.scopes.func(main).params.clone();
        if let [param] = params[..] {
            let symbol = self.ctx.scopes.symbol_mut(param);
            if symbol.typ.as_ref().is_none_or(Type::is_template) {
                symbol.typ = Some(Type::Array(Box::new(STRING), None));
            }
        }
    }

    // ---- local bindings ------------------------------------------------

    fn push_frame(&mut self, arena: Option<LocalId>) {
        self.cur().frames.push((arena, HashMap::new()));
    }

    fn pop_frame(&mut self) {
        self.cur().frames.pop();
    }

    /// Define a local binding in the innermost frame, reporting duplicates
    /// and shadowing. Reuses the forward-pass symbol when this is the
    /// primary analysis of the body.
    fn define_local(
        &mut self,
        node: NodeId,
        name: &str,
        immutable: bool,
        typ: Option<Type>,
        location: &Location,
    ) -> Option<SymbolId> {
        if name.starts_with("__builtin_") {
            self.sink.error(
                location,
                "'__builtin_' prefix is only permitted for built-in names",
            );
            return None;
        }

        let frame = self.stack.last().expect("analysis frame");
        if let Some((_, bindings)) = frame.frames.last() {
            if let Some(existing) = bindings.get(name) {
                let previous = self.ctx.scopes.symbol(*existing).location.clone();
                self.sink.error(
                    location,
                    format!(
                        "'{name}' is redefined. Note: Previous definition is at line:{}, col:{}",
                        previous.line, previous.col
                    ),
                );
                return None;
            }
        }
        // shadowing an outer local is a warning (once per declaration site)
        let shadows = frame
            .frames
            .iter()
            .rev()
            .skip(1)
            .find_map(|(_, bindings)| bindings.get(name));
        if let Some(shadowed) = shadows.copied() {
            if self.warned_shadowing.insert(node) {
                let previous = self.ctx.scopes.symbol(shadowed).location.clone();
                self.sink.warning(
                    location,
                    format!(
                        "'{name}' shadows the declaration at line:{}, col:{}",
                        previous.line, previous.col
                    ),
                );
            }
        }

        let primary = self.stack.last().unwrap().primary;
        let symbol = if primary {
            match self.ctx.scopes.decl_symbols.get(&node).copied() {
                Some(existing) => {
                    self.ctx.scopes.symbol_mut(existing).typ = typ;
                    existing
                }
                None => {
                    let id = self.ctx.scopes.alloc_symbol(VarSymbol {
                        name: name.to_string(),
                        ast_node: node,
                        immutable,
                        is_global: false,
                        typ,
                        location: location.clone(),
                    });
                    self.ctx.scopes.decl_symbols.insert(node, id);
                    id
                }
            }
        } else {
            self.ctx.scopes.alloc_symbol(VarSymbol {
                name: name.to_string(),
                ast_node: node,
                immutable,
                is_global: false,
                typ,
                location: location.clone(),
            })
        };

        let frame = self.stack.last_mut().expect("analysis frame");
        if let Some((arena, bindings)) = frame.frames.last_mut() {
            bindings.insert(name.to_string(), symbol);
            if let (true, Some(arena)) = (primary, *arena) {
                self.ctx.scopes.locals[arena.0].local_vars.push(symbol);
            }
        }
        self.stack
            .last_mut()
            .expect("analysis frame")
            .analysis
            .decl_symbols
            .insert(node, symbol);
        Some(symbol)
    }

    /// Resolve a name from the current analysis outward, registering lambda
    /// captures for every anonymous function boundary the walk crosses.
    fn resolve_name(&mut self, name: &str) -> Option<SymbolId> {
        // innermost: binding frames of the current body
        let frame = self.stack.last().expect("analysis frame");
        for (_, bindings) in frame.frames.iter().rev() {
            if let Some(symbol) = bindings.get(name) {
                return Some(*symbol);
            }
        }

        let mut crossed_lambdas: Vec<FuncId> = vec![];
        let mut scope = match frame.func {
            Some(func) => {
                let func_scope = self.ctx.scopes.func(func);
                if let Some(param) = func_scope
                    .params
                    .iter()
                    .find(|p| self.ctx.scopes.symbol(**p).name == name)
                {
                    return Some(*param);
                }
                if func_scope.is_anonymous() {
                    crossed_lambdas.push(self.ctx.origin_of(func));
                }
                func_scope.enclosing
            }
            None => ScopeRef::Global,
        };

        loop {
            let found = match scope {
                ScopeRef::Global => self
                    .ctx
                    .scopes
                    .global
                    .const_symbols
                    .iter()
                    .rev()
                    .find(|s| self.ctx.scopes.symbol(**s).name == name)
                    .copied(),
                ScopeRef::Local(id) => self.ctx.scopes.locals[id.0]
                    .local_vars
                    .iter()
                    .rev()
                    .find(|s| self.ctx.scopes.symbol(**s).name == name)
                    .copied(),
                ScopeRef::Func(id) => {
                    let func_scope = self.ctx.scopes.func(id);
                    let param = func_scope
                        .params
                        .iter()
                        .find(|p| self.ctx.scopes.symbol(**p).name == name)
                        .copied();
                    if param.is_none() && func_scope.is_anonymous() {
                        crossed_lambdas.push(self.ctx.origin_of(id));
                    }
                    param
                }
                ScopeRef::Class(_) => None,
            };

            if let Some(symbol) = found {
                if !self.ctx.scopes.symbol(symbol).is_global {
                    for lambda in &crossed_lambdas {
                        let captures = self.ctx.lambda_captures.entry(*lambda).or_default();
                        if !captures.contains(&symbol) {
                            captures.push(symbol);
                        }
                    }
                }
                return Some(symbol);
            }
            scope = self.ctx.scopes.enclosing(scope)?;
        }
    }

    // ---- global constants ----------------------------------------------

    fn check_global_constant(&mut self, init: &InitializeStmt) {
        let types: Vec<Option<Type>> = init.values.iter().map(|v| self.visit_expr(v)).collect();
        let paired = self.pair_decls_with_types(&init.decls, &types, &init.location);

        for (decl, typ) in init.decls.iter().zip(paired) {
            let typ = self.check_decl_annotation(decl, typ);
            let symbol = VarSymbol {
                name: decl.name.clone(),
                ast_node: decl.id,
                immutable: true,
                is_global: true,
                typ,
                location: decl.location.clone(),
            };
            if let Some(id) = self
                .ctx
                .scopes
                .define_global_constant(symbol, &mut self.sink)
            {
                self.ctx.scopes.decl_symbols.insert(decl.id, id);
                self.cur().analysis.decl_symbols.insert(decl.id, id);
            }
        }
    }

    /// Match N declarations against the inferred right-hand side types,
    /// unpacking a single tuple over multiple declarations.
    fn pair_decls_with_types(
        &mut self,
        decls: &[VariableDecl],
        types: &[Option<Type>],
        location: &Location,
    ) -> Vec<Option<Type>> {
        if types.len() == decls.len() {
            return types.to_vec();
        }
        if types.len() == 1 {
            if let Some(Type::Tuple(elements)) = &types[0] {
                if elements.len() == decls.len() {
                    return elements.iter().cloned().map(Some).collect();
                }
            }
        }
        if !types.is_empty() {
            self.sink.error(
                location,
                format!(
                    "{} declaration(s) can not be initialized from {} value(s)",
                    decls.len(),
                    types.len()
                ),
            );
        }
        vec![None; decls.len()]
    }

    fn check_decl_annotation(&mut self, decl: &VariableDecl, typ: Option<Type>) -> Option<Type> {
        let Some(annotation) = &decl.annotation else {
            return typ;
        };
        let annotated = match self.resolve_type_name(annotation) {
            Ok(t) => t,
            Err(message) => {
                self.sink.error(&decl.location, message);
                return typ;
            }
        };
        if let Some(inferred) = &typ {
            if *inferred != annotated {
                self.sink.error(
                    &decl.location,
                    format!("Expected type '{annotated}' but got '{inferred}'"),
                );
            }
        }
        Some(annotated)
    }

    /// Like [`type_from_type_name`] but also resolves `typeof(expr)`.
    fn resolve_type_name(&mut self, name: &TypeName) -> Result<Type, String> {
        if let TypeName::Typeof(typeof_type) = name {
            return self
                .visit_expr(&typeof_type.expr)
                .ok_or_else(|| "invalid expression in typeof(..)".to_string());
        }
        type_from_type_name(&self.ctx.scopes, name)
    }

    // ---- function bodies -----------------------------------------------

    fn analyze_function_body(&mut self, func: FuncId) -> Option<Type> {
        if let Some(analysis) = self.ctx.functions.get(&func) {
            return analysis.ret_type.clone();
        }
        if self.in_progress.contains(&func) {
            // recursion: fall back to the declared return type
            return self.ctx.scopes.func(func).ret_type.clone();
        }
        self.in_progress.insert(func);

        let ast_node = self.ctx.scopes.func(func).ast_node;
        let def = self.func_defs[&ast_node];
        let primary = !self.ctx.instantiation_origin.contains_key(&func);

        let mut analysis = FuncAnalysis::default();
        for param in &self.ctx.scopes.func(func).params {
            let symbol = self.ctx.scopes.symbol(*param);
            analysis.decl_symbols.insert(symbol.ast_node, *param);
        }

        self.stack.push(AnalysisFrame {
            func: Some(func),
            analysis,
            frames: vec![],
            ret_types: vec![],
            primary,
        });

        self.visit_stmt_block(&def.body);
        if let Some(ensure) = &def.ensure_block {
            self.visit_stmt_block(ensure);
        }

        let frame = self.stack.pop().expect("function analysis frame");
        let mut analysis = frame.analysis;
        let inferred = self.unify_return_types(&frame.ret_types, &def.location);

        let declared = self.ctx.scopes.func(func).ret_type.clone();
        let ret_type = match (declared, inferred) {
            (Some(declared), Some(inferred)) => {
                if declared != inferred {
                    self.sink.error(
                        &def.location,
                        format!(
                            "Function '{}' returns '{inferred}' but is declared to return '{declared}'",
                            def.name
                        ),
                    );
                }
                Some(declared)
            }
            (Some(declared), None) => Some(declared),
            (None, inferred) => inferred,
        };

        self.ctx.scopes.func_mut(func).ret_type = ret_type.clone();
        analysis.ret_type = ret_type.clone();
        self.ctx.functions.insert(func, analysis);
        self.in_progress.remove(&func);
        ret_type
    }

    fn unify_return_types(
        &mut self,
        collected: &[Option<Type>],
        location: &Location,
    ) -> Option<Type> {
        let mut result: Option<Type> = None;
        let mut saw_value = false;
        let mut saw_empty = false;
        for entry in collected {
            match entry {
                Some(t) => {
                    saw_value = true;
                    match &result {
                        Some(existing) if existing != t => {
                            self.sink.error(
                                location,
                                format!(
                                    "mismatching types in return statements: '{existing}' and '{t}'"
                                ),
                            );
                        }
                        Some(_) => {}
                        None => result = Some(t.clone()),
                    }
                }
                None => saw_empty = true,
            }
        }
        if saw_value && saw_empty {
            self.sink.error(
                location,
                "some return statements return a value and some do not",
            );
        }
        result
    }

    // ---- statements ----------------------------------------------------

    fn visit_stmt_block(&mut self, block: &StatementBlock) {
        let arena = self.ctx.scopes.block_scopes.get(&block.id).copied();
        self.push_frame(arena);
        for statement in &block.statements {
            self.visit_statement(statement);
        }
        self.pop_frame();
    }

    fn visit_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Expression(expr) => {
                self.visit_expr(expr);
            }
            Statement::Assignment(assign) => self.visit_assignment(assign),
            Statement::VariableDecl(_) => {}
            Statement::Initialize(init) => self.visit_initialize(init),
            Statement::If(if_stmt) => {
                for clause in &if_stmt.clauses {
                    self.check_condition(&clause.condition);
                    self.visit_stmt_block(&clause.body);
                }
                if let Some(else_block) = &if_stmt.else_block {
                    self.visit_stmt_block(else_block);
                }
            }
            Statement::Switch(switch) => {
                let scrutinee = self.visit_expr(&switch.scrutinee);
                for clause in &switch.clauses {
                    for value in &clause.values {
                        let value_type = self.visit_expr(value);
                        if let (Some(s), Some(v)) = (&scrutinee, &value_type) {
                            if s != v {
                                self.sink.error(
                                    value.location(),
                                    format!("Expected type '{s}' but got '{v}'"),
                                );
                            }
                        }
                    }
                    self.visit_stmt_block(&clause.body);
                }
                if let Some(else_block) = &switch.else_block {
                    self.visit_stmt_block(else_block);
                }
            }
            Statement::Return(ret) => {
                let typ = match ret.values.len() {
                    0 => None,
                    1 => self.visit_expr(&ret.values[0]),
                    _ => {
                        let types: Option<Vec<Type>> =
                            ret.values.iter().map(|v| self.visit_expr(v)).collect();
                        types.map(Type::Tuple)
                    }
                };
                let entry = match (&typ, ret.values.is_empty()) {
                    (None, false) => return, // error already reported
                    (None, true) => None,
                    (Some(t), _) => Some(t.clone()),
                };
                self.cur().ret_types.push(entry);
            }
            Statement::For(for_stmt) => self.visit_for(for_stmt),
            Statement::While(while_stmt) => {
                self.check_condition(&while_stmt.condition);
                self.visit_stmt_block(&while_stmt.body);
            }
            Statement::PostfixIf(postfix) => {
                self.visit_statement(&postfix.body);
                self.check_condition(&postfix.condition);
            }
            Statement::Block(block) => self.visit_stmt_block(block),
        }
    }

    fn check_condition(&mut self, condition: &Expression) {
        if let Some(t) = self.visit_expr(condition) {
            if t != BOOL {
                self.sink.error(
                    condition.location(),
                    format!("Expected type 'bool' but got '{t}'"),
                );
            }
        }
    }

    fn visit_initialize(&mut self, init: &InitializeStmt) {
        let types: Vec<Option<Type>> = init.values.iter().map(|v| self.visit_expr(v)).collect();
        let paired = if init.values.is_empty() {
            vec![None; init.decls.len()]
        } else {
            self.pair_decls_with_types(&init.decls, &types, &init.location)
        };

        for (decl, typ) in init.decls.iter().zip(paired) {
            let typ = self.check_decl_annotation(decl, typ);
            if typ.is_none() && init.values.is_empty() && decl.annotation.is_none() {
                self.sink.error(
                    &decl.location,
                    format!("Declaration of '{}' requires a type annotation", decl.name),
                );
            }
            self.define_local(decl.id, &decl.name, !decl.is_var, typ, &decl.location);
        }
    }

    fn visit_for(&mut self, for_stmt: &ForStmt) {
        let range_type = self.visit_expr(&for_stmt.range);

        let element = match &range_type {
            Some(Type::Range { begin, end, .. }) => {
                if begin != end {
                    self.sink.error(
                        for_stmt.range.location(),
                        format!("range bounds have mismatching types '{begin}' and '{end}'"),
                    );
                }
                Some((**begin).clone())
            }
            Some(Type::Array(element, _)) => Some((**element).clone()),
            Some(other) => {
                self.sink.error(
                    for_stmt.range.location(),
                    format!("can not iterate over a value of type '{other}'"),
                );
                None
            }
            None => None,
        };

        let arena = self.ctx.scopes.block_scopes.get(&for_stmt.body.id).copied();
        self.push_frame(arena);
        match &for_stmt.iter_vars[..] {
            [var] => {
                self.define_local(var.id, &var.name, !var.is_var, element, &var.location);
            }
            vars => {
                // multiple iteration variables destructure tuple elements
                match &element {
                    Some(Type::Tuple(elements)) if elements.len() == vars.len() => {
                        for (var, t) in vars.iter().zip(elements) {
                            self.define_local(
                                var.id,
                                &var.name,
                                !var.is_var,
                                Some(t.clone()),
                                &var.location,
                            );
                        }
                    }
                    Some(other) => {
                        self.sink.error(
                            &for_stmt.location,
                            format!("can not destructure '{other}' into {} variables", vars.len()),
                        );
                    }
                    None => {}
                }
            }
        }
        for statement in &for_stmt.body.statements {
            self.visit_statement(statement);
        }
        self.pop_frame();
    }

    fn visit_assignment(&mut self, assign: &AssignmentStmt) {
        if assign.lhs.len() != assign.rhs.len() {
            self.sink.error(
                &assign.location,
                format!(
                    "{} assignment target(s) can not be assigned from {} value(s)",
                    assign.lhs.len(),
                    assign.rhs.len()
                ),
            );
            return;
        }

        for (lhs, rhs) in assign.lhs.iter().zip(&assign.rhs) {
            let rhs_type = self.visit_expr(rhs);
            let lhs_type = self.visit_assignment_target(lhs);
            if let (Some(l), Some(r)) = (&lhs_type, &rhs_type) {
                if l != r {
                    self.sink.error(
                        rhs.location(),
                        format!("Expected type '{l}' but got '{r}'"),
                    );
                }
            }
            // class values with a user-defined copier are copied on
            // assignment
            if let Some(t @ Type::Class(class, _)) = &rhs_type {
                let copiers: Vec<FuncId> = self
                    .ctx
                    .scopes
                    .class(*class)
                    .member_funcs
                    .iter()
                    .copied()
                    .filter(|f| self.ctx.scopes.func(*f).is_copier())
                    .collect();
                if !copiers.is_empty() {
                    if let Some((target, _)) = self.resolve_overload(
                        "dachs.copy",
                        &copiers,
                        std::slice::from_ref(t),
                        rhs.location(),
                    ) {
                        self.cur().analysis.copies.insert(rhs.id(), target);
                    }
                }
            }
        }
    }

    fn visit_assignment_target(&mut self, lhs: &Expression) -> Option<Type> {
        match lhs {
            Expression::VarRef(var) => {
                let typ = self.visit_expr(lhs)?;
                if !var.name.starts_with('@') {
                    let symbol_id = self
                        .stack
                        .last()
                        .unwrap()
                        .analysis
                        .resolved_vars
                        .get(&var.id)
                        .copied();
                    if let Some(symbol_id) = symbol_id {
                        let symbol = self.ctx.scopes.symbol(symbol_id);
                        if symbol.immutable {
                            self.sink.error(
                                &var.location,
                                format!("Can not assign to immutable variable '{}'", var.name),
                            );
                        }
                    }
                }
                Some(typ)
            }
            Expression::IndexAccess(_) => self.visit_expr(lhs),
            Expression::UfcsInvocation(ufcs) => {
                let typ = self.visit_expr(lhs)?;
                let access = self
                    .stack
                    .last()
                    .unwrap()
                    .analysis
                    .member_accesses
                    .get(&ufcs.id);
                if !matches!(access, Some(MemberAccess::InstanceVar(..))) {
                    self.sink.error(
                        &ufcs.location,
                        format!("'{}' is not an assignable member", ufcs.member_name),
                    );
                }
                Some(typ)
            }
            other => {
                self.sink
                    .error(other.location(), "invalid assignment target");
                None
            }
        }
    }

    // ---- expressions ---------------------------------------------------

    fn visit_expr(&mut self, expr: &Expression) -> Option<Type> {
        match expr {
            Expression::Literal(lit) => {
                let t = match lit.value {
                    LiteralValue::Int(_) => INT,
                    LiteralValue::Uint(_) => UINT,
                    LiteralValue::Float(_) => FLOAT,
                    LiteralValue::Char(_) => CHAR,
                    LiteralValue::Bool(_) => BOOL,
                };
                self.typed(lit.id, t)
            }
            Expression::StringLiteral(lit) => self.typed(lit.id, STRING),
            Expression::SymbolLiteral(lit) => self.typed(lit.id, SYMBOL),
            Expression::ArrayLiteral(array) => self.visit_array_literal(array),
            Expression::TupleLiteral(tuple) => {
                let types: Option<Vec<Type>> =
                    tuple.elements.iter().map(|e| self.visit_expr(e)).collect();
                let t = Type::Tuple(types?);
                self.typed(tuple.id, t)
            }
            Expression::DictLiteral(dict) => self.visit_dict_literal(dict),
            Expression::Lambda(lambda) => {
                let func = self.ctx.scopes.func_scopes[&lambda.def.id];
                self.typed(lambda.id, Type::GenericFunc(func))
            }
            Expression::VarRef(var) => self.visit_var_ref(var),
            Expression::Invocation(call) => self.visit_invocation(call),
            Expression::ObjectConstruct(construct) => self.visit_object_construct(construct),
            Expression::IndexAccess(index) => self.visit_index_access(index),
            Expression::UfcsInvocation(ufcs) => self.visit_ufcs(ufcs),
            Expression::Cast(cast) => self.visit_cast(cast),
            Expression::Unary(unary) => self.visit_unary(unary),
            Expression::Binary(binary) => self.visit_binary(binary),
            Expression::Block(block) => self.visit_block_expr(block),
            Expression::If(if_expr) => self.visit_if_expr(if_expr),
            Expression::Switch(switch) => self.visit_switch_expr(switch),
            Expression::Typed(typed) => self.visit_typed_expr(typed),
        }
    }

    fn visit_array_literal(&mut self, array: &ArrayLiteral) -> Option<Type> {
        if array.elements.is_empty() {
            self.sink.error(
                &array.location,
                "can not deduce the element type of an empty array literal",
            );
            return None;
        }
        let mut element: Option<Type> = None;
        for e in &array.elements {
            let Some(t) = self.visit_expr(e) else {
                return None;
            };
            match &element {
                Some(existing) if *existing != t => {
                    self.sink.error(
                        e.location(),
                        format!("Expected type '{existing}' but got '{t}'"),
                    );
                    return None;
                }
                Some(_) => {}
                None => element = Some(t),
            }
        }
        let t = Type::Array(Box::new(element?), Some(array.elements.len() as u64));
        self.typed(array.id, t)
    }

    fn visit_dict_literal(&mut self, dict: &DictLiteral) -> Option<Type> {
        if dict.entries.is_empty() {
            self.sink.error(
                &dict.location,
                "can not deduce the element types of an empty dictionary literal",
            );
            return None;
        }
        let mut key_type: Option<Type> = None;
        let mut value_type: Option<Type> = None;
        for (key, value) in &dict.entries {
            let k = self.visit_expr(key)?;
            let v = self.visit_expr(value)?;
            match &key_type {
                Some(existing) if *existing != k => {
                    self.sink.error(
                        key.location(),
                        format!("Expected type '{existing}' but got '{k}'"),
                    );
                    return None;
                }
                Some(_) => {}
                None => key_type = Some(k),
            }
            match &value_type {
                Some(existing) if *existing != v => {
                    self.sink.error(
                        value.location(),
                        format!("Expected type '{existing}' but got '{v}'"),
                    );
                    return None;
                }
                Some(_) => {}
                None => value_type = Some(v),
            }
        }
        let t = Type::Dict(Box::new(key_type?), Box::new(value_type?));
        self.typed(dict.id, t)
    }

    fn visit_var_ref(&mut self, var: &VarRef) -> Option<Type> {
        // `@name` refers to an instance variable of the receiver
        if let Some(name) = var.name.strip_prefix('@') {
            return self.visit_receiver_member(var.id, &var.location, name);
        }

        let Some(symbol_id) = self.resolve_name(&var.name) else {
            self.sink.error(
                &var.location,
                format!("Symbol '{}' is not found", var.name),
            );
            return None;
        };
        self.cur().analysis.resolved_vars.insert(var.id, symbol_id);

        let symbol = self.ctx.scopes.symbol(symbol_id);
        match &symbol.typ {
            Some(t) => {
                let t = t.clone();
                self.typed(var.id, t)
            }
            None => {
                self.sink.error(
                    &var.location,
                    format!("type of '{}' is not determined yet", var.name),
                );
                None
            }
        }
    }

    fn visit_receiver_member(
        &mut self,
        node: NodeId,
        location: &Location,
        name: &str,
    ) -> Option<Type> {
        let scope = self.current_scope_ref();
        let Some(receiver) = self.ctx.scopes.resolve_receiver(scope) else {
            self.sink.error(
                location,
                format!("'@{name}' is only available inside member functions"),
            );
            return None;
        };
        let Some(Type::Class(class, _)) = self.ctx.scopes.symbol(receiver).typ.clone() else {
            self.sink
                .error(location, "receiver has no class type");
            return None;
        };
        let Some(offset) = self.ctx.scopes.instance_var_offset(class, name) else {
            self.sink.error(
                location,
                format!(
                    "class '{}' has no instance variable '@{name}'",
                    self.ctx.scopes.class(class).name
                ),
            );
            return None;
        };
        let symbol = self.ctx.scopes.class(class).instance_vars[offset];
        let typ = self.ctx.scopes.symbol(symbol).typ.clone()?;
        self.cur()
            .analysis
            .member_accesses
            .insert(node, MemberAccess::InstanceVar(class, offset));
        self.typed(node, typ)
    }

    fn visit_invocation(&mut self, call: &Invocation) -> Option<Type> {
        let mut arg_types = vec![];
        for arg in &call.args {
            arg_types.push(self.visit_expr(arg)?);
        }
        if let Some(block) = &call.do_block {
            let func = self.ctx.scopes.func_scopes[&block.id];
            arg_types.push(Type::GenericFunc(func));
        }

        // a plain name resolves through the function overload sets first.
        // A class-typed first argument (the receiver of a desugared method
        // call) contributes its member functions, and those take strict
        // priority: free functions are only considered when the class has
        // no member function of that name.
        if let Expression::VarRef(var) = call.callee.as_ref() {
            if !var.name.starts_with('@') {
                let mut candidates = vec![];
                if let Some(Type::Class(class, _)) = arg_types.first() {
                    candidates.extend(
                        self.ctx
                            .scopes
                            .class(*class)
                            .member_funcs
                            .iter()
                            .copied()
                            .filter(|f| self.ctx.scopes.func(*f).name == var.name),
                    );
                }
                if candidates.is_empty() {
                    let scope = self.current_scope_ref();
                    candidates = self.ctx.scopes.collect_funcs_by_name(scope, &var.name);
                }
                if !candidates.is_empty() {
                    let (target, ret) = self.resolve_overload(
                        &var.name,
                        &candidates,
                        &arg_types,
                        &call.location,
                    )?;
                    self.typed(var.id, Type::GenericFunc(target));
                    self.cur()
                        .analysis
                        .resolved_calls
                        .insert(call.id, Callee::Direct(target));
                    let t = ret.unwrap_or(Type::Tuple(vec![]));
                    return self.typed(call.id, t);
                }
            }
        }

        // otherwise call through the value
        let callee_type = self.visit_expr(&call.callee)?;
        match callee_type {
            Type::GenericFunc(origin) => {
                let name = self.ctx.scopes.func(origin).name.clone();
                let (target, ret) =
                    self.resolve_overload(&name, &[origin], &arg_types, &call.location)?;
                self.cur()
                    .analysis
                    .resolved_calls
                    .insert(call.id, Callee::Closure { target });
                let t = ret.unwrap_or(Type::Tuple(vec![]));
                self.typed(call.id, t)
            }
            Type::Func { params, ret } => {
                if params.len() != arg_types.len() || params.iter().zip(&arg_types).any(|(p, a)| p != a) {
                    self.sink.error(
                        &call.location,
                        format!(
                            "can not call a function of type 'func({})' with arguments ({})",
                            params
                                .iter()
                                .map(|p| p.to_string())
                                .collect::<Vec<_>>()
                                .join(", "),
                            arg_types
                                .iter()
                                .map(|a| a.to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ),
                    );
                    return None;
                }
                self.cur()
                    .analysis
                    .resolved_calls
                    .insert(call.id, Callee::Indirect);
                let t = ret.map(|r| *r).unwrap_or(Type::Tuple(vec![]));
                self.typed(call.id, t)
            }
            other => {
                self.sink.error(
                    &call.location,
                    format!("can not invoke a value of type '{other}'"),
                );
                None
            }
        }
    }

    fn visit_object_construct(&mut self, construct: &ObjectConstruct) -> Option<Type> {
        let mut arg_types = vec![];
        for arg in &construct.args {
            arg_types.push(self.visit_expr(arg)?);
        }

        match &construct.obj_type {
            // range construction synthesized from `a .. b`
            TypeName::Primary(primary) if primary.name == "range" => {
                let (begin, end) = match &arg_types[..] {
                    [begin, end] | [begin, end, _] => (begin.clone(), end.clone()),
                    _ => {
                        self.sink.error(
                            &construct.location,
                            "range construction requires its bounds",
                        );
                        return None;
                    }
                };
                if begin != end {
                    self.sink.error(
                        &construct.location,
                        format!("range bounds have mismatching types '{begin}' and '{end}'"),
                    );
                    return None;
                }
                let inclusive = matches!(
                    construct.args.get(2),
                    Some(Expression::Literal(PrimaryLiteral {
                        value: LiteralValue::Bool(true),
                        ..
                    }))
                );
                let t = Type::Range {
                    begin: Box::new(begin),
                    end: Box::new(end),
                    inclusive,
                };
                self.typed(construct.id, t)
            }
            // builtin static array: `new static_array(T){n}`
            TypeName::Array(array) => {
                let Some(element) = &array.element else {
                    self.sink.error(
                        &construct.location,
                        "static_array requires its element type",
                    );
                    return None;
                };
                let element = match self.resolve_type_name(element) {
                    Ok(t) => t,
                    Err(message) => {
                        self.sink.error(&construct.location, message);
                        return None;
                    }
                };
                let size = match construct.args.first() {
                    Some(Expression::Literal(PrimaryLiteral {
                        value: LiteralValue::Uint(n),
                        ..
                    })) => Some(*n),
                    Some(Expression::Literal(PrimaryLiteral {
                        value: LiteralValue::Int(n),
                        ..
                    })) => Some(*n as u64),
                    _ => None,
                };
                if let Some(first) = arg_types.first() {
                    if *first != INT && *first != UINT {
                        self.sink.error(
                            &construct.location,
                            format!("Expected type 'uint' but got '{first}'"),
                        );
                    }
                }
                let t = Type::Array(Box::new(element), size);
                self.typed(construct.id, t)
            }
            // `new array{ inner }` forwards to the inner static array when
            // no user class named `array` exists
            TypeName::Primary(primary)
                if primary.name == "array"
                    && self.ctx.scopes.resolve_class_by_name("array").is_none() =>
            {
                let Some(inner) = arg_types.first() else {
                    self.sink.error(
                        &construct.location,
                        "array construction requires its backing storage",
                    );
                    return None;
                };
                let t = inner.clone();
                self.typed(construct.id, t)
            }
            other => {
                let t = match self.resolve_type_name(other) {
                    Ok(t) => t,
                    Err(message) => {
                        self.sink.error(&construct.location, message);
                        return None;
                    }
                };
                let Type::Class(class, _) = &t else {
                    self.sink.error(
                        &construct.location,
                        format!("can not construct a value of type '{t}'"),
                    );
                    return None;
                };

                let ctors: Vec<FuncId> = self.ctx.scopes.class(*class).member_funcs
                    .iter()
                    .copied()
                    .filter(|f| self.ctx.scopes.func(*f).is_ctor())
                    .collect();
                if ctors.is_empty() {
                    if !construct.args.is_empty() {
                        self.sink.error(
                            &construct.location,
                            format!(
                                "class '{}' has no constructor taking arguments",
                                self.ctx.scopes.class(*class).name
                            ),
                        );
                        return None;
                    }
                } else {
                    let mut ctor_args = vec![t.clone()];
                    ctor_args.extend(arg_types);
                    let (target, _) = self.resolve_overload(
                        "dachs.init",
                        &ctors,
                        &ctor_args,
                        &construct.location,
                    )?;
                    self.cur().analysis.ctors.insert(construct.id, target);
                }
                self.typed(construct.id, t)
            }
        }
    }

    fn visit_index_access(&mut self, index: &IndexAccess) -> Option<Type> {
        let child = self.visit_expr(&index.child)?;
        let index_type = self.visit_expr(&index.index)?;

        let t = match &child {
            Type::Array(element, _) => {
                if index_type != INT && index_type != UINT {
                    self.sink.error(
                        index.index.location(),
                        format!("Expected type 'int' but got '{index_type}'"),
                    );
                }
                (**element).clone()
            }
            Type::Pointer(pointee) => (**pointee).clone(),
            Type::Dict(key, value) => {
                if index_type != **key {
                    self.sink.error(
                        index.index.location(),
                        format!("Expected type '{key}' but got '{index_type}'"),
                    );
                }
                (**value).clone()
            }
            Type::Builtin(b) if b.name() == "string" => CHAR,
            Type::Tuple(elements) => {
                let position = match index.index.as_ref() {
                    Expression::Literal(PrimaryLiteral {
                        value: LiteralValue::Int(n),
                        ..
                    }) => Some(*n as usize),
                    Expression::Literal(PrimaryLiteral {
                        value: LiteralValue::Uint(n),
                        ..
                    }) => Some(*n as usize),
                    _ => None,
                };
                match position.and_then(|p| elements.get(p)) {
                    Some(t) => t.clone(),
                    None => {
                        self.sink.error(
                            index.index.location(),
                            "tuple index must be a constant within bounds",
                        );
                        return None;
                    }
                }
            }
            other => {
                self.sink.error(
                    &index.location,
                    format!("can not index into a value of type '{other}'"),
                );
                return None;
            }
        };
        self.typed(index.id, t)
    }

    fn visit_ufcs(&mut self, ufcs: &UfcsInvocation) -> Option<Type> {
        let child = self.visit_expr(&ufcs.child)?;

        // 1. instance variable by offset
        if let Type::Class(class, _) = &child {
            if let Some(offset) = self
                .ctx
                .scopes
                .instance_var_offset(*class, &ufcs.member_name)
            {
                let symbol = self.ctx.scopes.class(*class).instance_vars[offset];
                let typ = self.ctx.scopes.symbol(symbol).typ.clone()?;
                self.cur()
                    .analysis
                    .member_accesses
                    .insert(ufcs.id, MemberAccess::InstanceVar(*class, offset));
                return self.typed(ufcs.id, typ);
            }
        }

        // 2. built-in members of tuples, arrays and ranges plus `__type`
        match check_builtin_member(&child, &ufcs.member_name) {
            Ok(Some((typ, builtin))) => {
                self.cur()
                    .analysis
                    .member_accesses
                    .insert(ufcs.id, MemberAccess::Builtin(builtin));
                return self.typed(ufcs.id, typ);
            }
            Ok(None) => {}
            Err(message) => {
                self.sink.error(&ufcs.location, message);
                return None;
            }
        }

        // 3. member function, then UFCS free function with the receiver as
        // first argument. Member functions win outright: the free-function
        // pool is only consulted when the receiver's class has no member
        // function of that name.
        let mut candidates: Vec<FuncId> = vec![];
        if let Type::Class(class, _) = &child {
            candidates.extend(
                self.ctx.scopes.class(*class).member_funcs
                    .iter()
                    .copied()
                    .filter(|f| self.ctx.scopes.func(*f).name == ufcs.member_name),
            );
        }
        if candidates.is_empty() {
            let scope = self.current_scope_ref();
            candidates = self
                .ctx
                .scopes
                .collect_funcs_by_name(scope, &ufcs.member_name);
        }

        if candidates.is_empty() {
            self.sink.error(
                &ufcs.location,
                format!("'{child}' has no member named '{}'", ufcs.member_name),
            );
            return None;
        }

        let (target, ret) = self.resolve_overload(
            &ufcs.member_name,
            &candidates,
            std::slice::from_ref(&child),
            &ufcs.location,
        )?;
        self.cur()
            .analysis
            .member_accesses
            .insert(ufcs.id, MemberAccess::Call(target));
        let t = ret.unwrap_or(Type::Tuple(vec![]));
        self.typed(ufcs.id, t)
    }

    fn visit_cast(&mut self, cast: &CastExpr) -> Option<Type> {
        let from = self.visit_expr(&cast.child)?;
        let to = match self.resolve_type_name(&cast.target) {
            Ok(t) => t,
            Err(message) => {
                self.sink.error(&cast.location, message);
                return None;
            }
        };

        if from == to {
            self.cur()
                .analysis
                .casts
                .insert(cast.id, CastResolution::BuiltinConv);
            return self.typed(cast.id, to);
        }

        let scalar = |t: &Type| {
            matches!(
                t,
                Type::Builtin(b) if matches!(b.name(), "int" | "uint" | "float" | "char" | "bool")
            )
        };
        if scalar(&from) && scalar(&to) {
            self.cur()
                .analysis
                .casts
                .insert(cast.id, CastResolution::BuiltinConv);
            return self.typed(cast.id, to);
        }

        // user converters: first match in registration order
        let converter = self.ctx.scopes.global.cast_funcs.iter().copied().find(|f| {
            let func = self.ctx.scopes.func(*f);
            let param_matches = func
                .params
                .first()
                .and_then(|p| self.ctx.scopes.symbol(*p).typ.clone())
                .is_some_and(|t| t == from);
            param_matches && func.ret_type.as_ref() == Some(&to)
        });
        match converter {
            Some(func) => {
                self.analyze_function_body(func);
                self.cur()
                    .analysis
                    .casts
                    .insert(cast.id, CastResolution::Converter(func));
                self.typed(cast.id, to)
            }
            None => {
                self.sink.error(
                    &cast.location,
                    format!("can not cast '{from}' to '{to}'"),
                );
                None
            }
        }
    }

    fn visit_unary(&mut self, unary: &UnaryExpr) -> Option<Type> {
        let operand = self.visit_expr(&unary.operand)?;
        let numeric = |t: &Type| *t == INT || *t == UINT || *t == FLOAT;

        let t = match unary.op.as_str() {
            "+" | "-" if numeric(&operand) => operand,
            "~" if operand == INT || operand == UINT => operand,
            "!" if operand == BOOL => operand,
            _ => {
                self.sink.error(
                    &unary.location,
                    format!(
                        "invalid operand of type '{operand}' for unary operator '{}'",
                        unary.op
                    ),
                );
                return None;
            }
        };
        self.typed(unary.id, t)
    }

    fn visit_binary(&mut self, binary: &BinaryExpr) -> Option<Type> {
        let lhs = self.visit_expr(&binary.lhs)?;
        let rhs = self.visit_expr(&binary.rhs)?;
        let numeric = |t: &Type| *t == INT || *t == UINT || *t == FLOAT;
        let integral = |t: &Type| *t == INT || *t == UINT;
        let ordered = |t: &Type| numeric(t) || *t == CHAR || *t == STRING;

        let builtin = match binary.op.as_str() {
            "+" | "-" | "*" | "/" | "%" if lhs == rhs && numeric(&lhs) => Some(lhs.clone()),
            "<<" | ">>" | "&" | "|" | "^" if lhs == rhs && integral(&lhs) => Some(lhs.clone()),
            "==" | "!=" if lhs == rhs => Some(BOOL),
            "<" | "<=" | ">" | ">=" if lhs == rhs && ordered(&lhs) => Some(BOOL),
            "&&" | "||" if lhs == BOOL && rhs == BOOL => Some(BOOL),
            _ => None,
        };
        if let Some(t) = builtin {
            return self.typed(binary.id, t);
        }

        // user-defined operator function, e.g. `func +(l, r)`
        let scope = self.current_scope_ref();
        let candidates = self.ctx.scopes.collect_funcs_by_name(scope, &binary.op);
        if !candidates.is_empty() {
            let args = [lhs.clone(), rhs.clone()];
            if let Some((target, ret)) =
                self.resolve_overload(&binary.op, &candidates, &args, &binary.location)
            {
                self.cur()
                    .analysis
                    .resolved_calls
                    .insert(binary.id, Callee::Direct(target));
                let t = ret.unwrap_or(Type::Tuple(vec![]));
                return self.typed(binary.id, t);
            }
            return None;
        }

        self.sink.error(
            &binary.location,
            format!(
                "invalid operands of types '{lhs}' and '{rhs}' for binary operator '{}'",
                binary.op
            ),
        );
        None
    }

    fn visit_block_expr(&mut self, block: &BlockExpr) -> Option<Type> {
        let arena = self.ctx.scopes.block_scopes.get(&block.id).copied();
        self.push_frame(arena);
        for statement in &block.statements {
            self.visit_statement(statement);
        }
        let t = self.visit_expr(&block.value);
        self.pop_frame();
        let t = t?;
        self.typed(block.id, t)
    }

    fn visit_if_expr(&mut self, if_expr: &IfExpr) -> Option<Type> {
        let mut branch_types = vec![];
        for clause in &if_expr.clauses {
            self.check_condition(&clause.condition);
            branch_types.push(self.visit_block_expr(&clause.body));
        }
        branch_types.push(self.visit_block_expr(&if_expr.else_block));

        let mut unified: Option<Type> = None;
        for t in branch_types.into_iter().flatten() {
            match &unified {
                Some(existing) if *existing != t => {
                    self.sink.error(
                        &if_expr.location,
                        format!("mismatching types in if expression: '{existing}' and '{t}'"),
                    );
                    return None;
                }
                Some(_) => {}
                None => unified = Some(t),
            }
        }
        let t = unified?;
        self.typed(if_expr.id, t)
    }

    fn visit_switch_expr(&mut self, switch: &SwitchExpr) -> Option<Type> {
        let scrutinee = self.visit_expr(&switch.scrutinee);
        let mut branch_types = vec![];
        for clause in &switch.clauses {
            for value in &clause.values {
                let value_type = self.visit_expr(value);
                if let (Some(s), Some(v)) = (&scrutinee, &value_type) {
                    if s != v {
                        self.sink.error(
                            value.location(),
                            format!("Expected type '{s}' but got '{v}'"),
                        );
                    }
                }
            }
            branch_types.push(self.visit_block_expr(&clause.body));
        }
        branch_types.push(self.visit_block_expr(&switch.else_block));

        let mut unified: Option<Type> = None;
        for t in branch_types.into_iter().flatten() {
            match &unified {
                Some(existing) if *existing != t => {
                    self.sink.error(
                        &switch.location,
                        format!("mismatching types in case expression: '{existing}' and '{t}'"),
                    );
                    return None;
                }
                Some(_) => {}
                None => unified = Some(t),
            }
        }
        let t = unified?;
        self.typed(switch.id, t)
    }

    fn visit_typed_expr(&mut self, typed: &TypedExpr) -> Option<Type> {
        let child = self.visit_expr(&typed.child)?;
        let annotated = match self.resolve_type_name(&typed.annotation) {
            Ok(t) => t,
            Err(message) => {
                self.sink.error(&typed.location, message);
                return None;
            }
        };

        if child == annotated {
            return self.typed(typed.id, annotated);
        }

        // integer literals coerce to the annotated numeric type
        if let Expression::Literal(PrimaryLiteral {
            id,
            value: LiteralValue::Int(_) | LiteralValue::Uint(_),
            ..
        }) = typed.child.as_ref()
        {
            if annotated == UINT || annotated == INT || annotated == FLOAT {
                self.cur()
                    .analysis
                    .expr_types
                    .insert(*id, annotated.clone());
                return self.typed(typed.id, annotated);
            }
        }

        self.sink.error(
            &typed.location,
            format!("Expected type '{annotated}' but got '{child}'"),
        );
        None
    }

    // ---- overload resolution and instantiation -------------------------

    /// Pick the most specific overload for the argument types, instantiate
    /// it when templated and make sure its body is analyzed. Reports
    /// unresolved and ambiguous calls.
    fn resolve_overload(
        &mut self,
        name: &str,
        candidates: &[FuncId],
        arg_types: &[Type],
        location: &Location,
    ) -> Option<(FuncId, Option<Type>)> {
        struct Viable {
            func: FuncId,
            param_types: Vec<Type>,
            resolved: Vec<Type>,
        }

        let mut seen = HashSet::new();
        let candidates: Vec<FuncId> = candidates
            .iter()
            .copied()
            .filter(|c| seen.insert(*c))
            .collect();

        let mut viable: Vec<Viable> = vec![];
        for candidate in &candidates {
            let params = self.ctx.scopes.func(*candidate).params.clone();
            if params.len() != arg_types.len() {
                continue;
            }
            let param_types: Vec<Type> = params
                .iter()
                .map(|p| {
                    self.ctx
                        .scopes
                        .symbol(*p)
                        .typ
                        .clone()
                        .unwrap_or(Type::Template(self.ctx.scopes.symbol(*p).ast_node))
                })
                .collect();

            let mut subst: HashMap<NodeId, Type> = HashMap::new();
            let matches = param_types
                .iter()
                .zip(arg_types)
                .all(|(param, arg)| unify(param, arg, &mut subst));
            if !matches {
                continue;
            }
            let resolved: Vec<Type> = param_types
                .iter()
                .map(|p| p.substitute(&|id| subst.get(&id).cloned()))
                .collect();
            viable.push(Viable {
                func: *candidate,
                param_types,
                resolved,
            });
        }

        if viable.is_empty() {
            let args = arg_types
                .iter()
                .map(|a| a.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            self.sink.error(
                location,
                format!("can not resolve function call '{name}({args})'"),
            );
            return None;
        }

        // specificity: concrete parameters beat template parameters
        // position-wise; incomparable winners are ambiguous
        let dominates = |a: &Viable, b: &Viable| {
            let mut strict = false;
            for (pa, pb) in a.param_types.iter().zip(&b.param_types) {
                let a_concrete = !pa.is_template();
                let b_concrete = !pb.is_template();
                if !a_concrete && b_concrete {
                    return false;
                }
                if a_concrete && !b_concrete {
                    strict = true;
                }
            }
            strict
        };
        let winners: Vec<usize> = (0..viable.len())
            .filter(|&i| (0..viable.len()).all(|j| i == j || !dominates(&viable[j], &viable[i])))
            .collect();

        if winners.len() > 1 {
            let listed = winners
                .iter()
                .map(|&i| {
                    let func = self.ctx.scopes.func(viable[i].func);
                    format!(
                        "'{}' at line:{}, col:{}",
                        func.name, func.location.line, func.location.col
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            self.sink.error(
                location,
                format!("function call '{name}' is ambiguous: candidates are {listed}"),
            );
            return None;
        }

        let winner = &viable[winners[0]];
        let target = if winner.param_types.iter().any(Type::is_template) {
            self.instantiate(winner.func, winner.resolved.clone())
        } else {
            winner.func
        };
        let ret = self.analyze_function_body(target);
        Some((target, ret))
    }

    /// Instantiate a template function for concrete parameter types,
    /// memoized by `(function, substitution)`.
    fn instantiate(&mut self, origin: FuncId, param_types: Vec<Type>) -> FuncId {
        let key = (origin, param_types.clone());
        if let Some(existing) = self.ctx.instantiations.get(&key) {
            return *existing;
        }

        let mut scope = self.ctx.scopes.func(origin).clone();
        let old_params = scope.params.clone();
        scope.params = old_params
            .iter()
            .zip(&param_types)
            .map(|(old, typ)| {
                let mut symbol = self.ctx.scopes.symbol(*old).clone();
                symbol.typ = Some(typ.clone());
                self.ctx.scopes.alloc_symbol(symbol)
            })
            .collect();
        let instantiated = self.ctx.scopes.alloc_func(scope);

        self.ctx.instantiations.insert(key, instantiated);
        self.ctx
            .instantiation_origin
            .insert(instantiated, origin);
        instantiated
    }
}

/// Unify a (possibly templated) parameter type against an argument type,
/// extending the substitution.
fn unify(param: &Type, arg: &Type, subst: &mut HashMap<NodeId, Type>) -> bool {
    match (param, arg) {
        (Type::Template(id), arg) => match subst.get(id) {
            Some(bound) => bound == arg,
            None => {
                subst.insert(*id, arg.clone());
                true
            }
        },
        (Type::Class(l, largs), Type::Class(r, rargs)) => {
            l == r
                && largs.len() == rargs.len()
                && largs.iter().zip(rargs).all(|(p, a)| unify(p, a, subst))
        }
        (Type::Tuple(l), Type::Tuple(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(p, a)| unify(p, a, subst))
        }
        (Type::Array(l, ls), Type::Array(r, rs)) => {
            (ls.is_none() || ls == rs) && unify(l, r, subst)
        }
        (Type::Pointer(l), Type::Pointer(r)) => unify(l, r, subst),
        (
            Type::Func {
                params: lp,
                ret: lr,
            },
            Type::Func {
                params: rp,
                ret: rr,
            },
        ) => {
            lp.len() == rp.len()
                && lp.iter().zip(rp).all(|(p, a)| unify(p, a, subst))
                && match (lr, rr) {
                    (Some(l), Some(r)) => unify(l, r, subst),
                    (None, None) => true,
                    _ => false,
                }
        }
        (Type::Dict(lk, lv), Type::Dict(rk, rv)) => {
            unify(lk, rk, subst) && unify(lv, rv, subst)
        }
        (
            Type::Range {
                begin: lb, end: le, ..
            },
            Type::Range {
                begin: rb, end: re, ..
            },
        ) => unify(lb, rb, subst) && unify(le, re, subst),
        (Type::Qualified(l), Type::Qualified(r)) => unify(l, r, subst),
        _ => param == arg,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use crate::semantics::forward::analyze_forward;
    use crate::semantics::types::{FLOAT, INT};

    fn run(code: &str) -> Result<(CompilationUnit, SemanticContext), SemanticCheckError> {
        let mut unit = parser::parse(code, Some("test.dcs")).expect("parse failed");
        let scopes = analyze_forward(&mut unit)?;
        let ctx = analyze(&unit, scopes)?;
        Ok((unit, ctx))
    }

    fn main_analysis(ctx: &SemanticContext) -> &FuncAnalysis {
        let main = ctx.main_func.expect("no main function");
        ctx.analysis(main).expect("main is not analyzed")
    }

    #[test]
    fn test_main_returns_int() {
        let (_, ctx) = run("func main; ret 0; end").unwrap();
        assert_eq!(main_analysis(&ctx).ret_type, Some(INT));
    }

    #[test]
    fn test_template_instantiated_once_per_substitution() {
        let (_, ctx) = run(
            "func add(a, b)\n    ret a + b\nend\n\nfunc main\n    x := add(1, 2)\n    y := add(3, 4)\n    z := add(1.0, 2.0)\n    ret 0\nend",
        )
        .unwrap();

        // int,int memoized into one instantiation; float,float is another
        let int_instances = ctx
            .instantiations
            .iter()
            .filter(|((_, types), _)| types == &vec![INT, INT])
            .count();
        assert_eq!(int_instances, 1);
        let float_instances = ctx
            .instantiations
            .iter()
            .filter(|((_, types), _)| types == &vec![FLOAT, FLOAT])
            .count();
        assert_eq!(float_instances, 1);

        let int_target = ctx.instantiations.iter().find(|((_, t), _)| t == &vec![INT, INT]);
        let (_, fid) = int_target.unwrap();
        assert_eq!(ctx.analysis(*fid).unwrap().ret_type, Some(INT));
    }

    #[test]
    fn test_unresolved_name_batches_error() {
        let err = run("func main; ret missing; end").unwrap_err();
        assert_eq!(err.phase, "symbol resolution");
        assert_eq!(err.count, 1);
    }

    #[test]
    fn test_errors_are_batched_not_fatal() {
        let err = run("func main\n    a := missing1\n    b := missing2\n    ret 0\nend").unwrap_err();
        assert_eq!(err.count, 2);
    }

    #[test]
    fn test_assignment_to_immutable_is_error() {
        let err = run("func main\n    x := 1\n    x = 2\n    ret 0\nend").unwrap_err();
        assert_eq!(err.count, 1);
    }

    #[test]
    fn test_assignment_to_var_is_ok() {
        assert!(run("func main\n    var x := 1\n    x = 2\n    ret 0\nend").is_ok());
    }

    #[test]
    fn test_parameter_mutability_follows_var() {
        assert!(run("func f(var x: int)\n    x = 1\n    ret x\nend\nfunc main; ret f(0); end").is_ok());
        assert!(run("func f(x: int)\n    x = 1\n    ret x\nend\nfunc main; ret f(0); end").is_err());
    }

    #[test]
    fn test_array_literal_unifies_elements() {
        let (_, ctx) = run("func main\n    xs := [1, 2, 3]\n    ret 0\nend").unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis
            .expr_types
            .values()
            .any(|t| *t == Type::Array(Box::new(INT), Some(3))));
    }

    #[test]
    fn test_array_literal_mismatch_is_error() {
        assert!(run("func main\n    xs := [1, 2.0]\n    ret 0\nend").is_err());
    }

    #[test]
    fn test_lambda_capture_recorded_in_order() {
        let (_, ctx) = run(
            "func main\n    a := 1\n    b := 2\n    f := -> x in x + b + a\n    ret f.(1)\nend",
        )
        .unwrap();

        let (lambda, captures) = ctx
            .lambda_captures
            .iter()
            .next()
            .expect("no captures recorded");
        assert!(ctx.scopes.func(*lambda).is_anonymous());
        // insertion order: b is referenced before a
        let names: Vec<&str> = captures
            .iter()
            .map(|c| ctx.scopes.symbol(*c).name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_lambda_without_captures() {
        let (_, ctx) = run("func main\n    f := -> x in x + 1\n    ret f.(41)\nend").unwrap();
        assert!(ctx.lambda_captures.is_empty());
        assert_eq!(main_analysis(&ctx).ret_type, Some(INT));
    }

    #[test]
    fn test_overload_picks_most_specific() {
        let (_, ctx) = run(
            "func f(x: int)\n    ret 1\nend\nfunc f(x)\n    ret 2\nend\nfunc main\n    ret f(0)\nend",
        )
        .unwrap();
        // the concrete overload wins over the template; no instantiation
        // of the template is created for the int call
        assert!(ctx.instantiations.is_empty());
    }

    #[test]
    fn test_incomparable_overloads_are_ambiguous() {
        let err = run(
            "func f(x: int, y)\n    ret 1\nend\nfunc f(x, y: int)\n    ret 2\nend\nfunc main\n    ret f(1, 2)\nend",
        )
        .unwrap_err();
        assert_eq!(err.count, 1);
    }

    #[test]
    fn test_ufcs_resolves_free_function() {
        let (_, ctx) = run(
            "func doubled(x: int)\n    ret x + x\nend\nfunc main\n    ret 21.doubled\nend",
        )
        .unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis
            .member_accesses
            .values()
            .any(|m| matches!(m, MemberAccess::Call(_))));
    }

    #[test]
    fn test_instance_var_resolves_before_functions() {
        let (_, ctx) = run(
            "class point\n    x : int, y : int\nend\n\nfunc x(p: point)\n    ret 0\nend\n\nfunc main\n    p := new point\n    ret p.x\nend",
        )
        .unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis
            .member_accesses
            .values()
            .any(|m| matches!(m, MemberAccess::InstanceVar(_, 0))));
    }

    #[test]
    fn test_member_function_wins_over_free_function() {
        // an equally-specific free function must not make the call
        // ambiguous: member resolution cascades strictly
        let (_, ctx) = run(
            "class box\n    v : int\n\n    func get\n        ret @v\n    end\nend\n\nfunc get(b: box)\n    ret 0\nend\n\nfunc main\n    b := new box\n    ret b.get\nend",
        )
        .unwrap();
        let analysis = main_analysis(&ctx);
        let target = analysis
            .member_accesses
            .values()
            .find_map(|m| match m {
                MemberAccess::Call(f) => Some(*f),
                _ => None,
            })
            .expect("no member call resolved");
        assert!(ctx.scopes.func(target).is_member_func);
    }

    #[test]
    fn test_tuple_builtin_members() {
        let (_, ctx) = run(
            "func main\n    t := (1, 2.0)\n    s := t.size\n    f := t.first\n    ret 0\nend",
        )
        .unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis
            .member_accesses
            .values()
            .any(|m| matches!(m, MemberAccess::Builtin(BuiltinMember::TupleSize(2)))));
        assert!(analysis
            .member_accesses
            .values()
            .any(|m| matches!(m, MemberAccess::Builtin(BuiltinMember::TupleAt(0)))));
    }

    #[test]
    fn test_type_pseudo_member() {
        let (_, ctx) = run("func main\n    t := 42.__type\n    ret 0\nend").unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis.member_accesses.values().any(|m| matches!(
            m,
            MemberAccess::Builtin(BuiltinMember::TypeString(s)) if s == "int"
        )));
    }

    #[test]
    fn test_converter_lookup_is_first_match() {
        let (_, ctx) = run(
            "class counter\n    n : int\nend\n\ncast (c: counter): int\n    ret 1\nend\n\ncast (c: counter): int\n    ret 2\nend\n\nfunc main\n    c := new counter\n    ret c as int\nend",
        )
        .unwrap();
        let analysis = main_analysis(&ctx);
        let converter = analysis
            .casts
            .values()
            .find_map(|c| match c {
                CastResolution::Converter(f) => Some(*f),
                CastResolution::BuiltinConv => None,
            })
            .expect("no converter resolved");
        // first registration in insertion order wins
        assert_eq!(converter, ctx.scopes.global.cast_funcs[0]);
    }

    #[test]
    fn test_cast_between_scalars_is_builtin() {
        let (_, ctx) = run("func main\n    x := 1 as float\n    ret 0\nend").unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis
            .casts
            .values()
            .any(|c| matches!(c, CastResolution::BuiltinConv)));
    }

    #[test]
    fn test_unknown_cast_is_error() {
        assert!(run("func main\n    t := (1, 2)\n    x := t as float\n    ret 0\nend").is_err());
    }

    #[test]
    fn test_range_typing() {
        let (_, ctx) = run("func main\n    r := 0..3\n    ret 0\nend").unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis.expr_types.values().any(|t| matches!(
            t,
            Type::Range { inclusive: false, .. }
        )));
    }

    #[test]
    fn test_for_iterates_range_element_type() {
        assert!(run("func p(x: int)\n    ret x\nend\nfunc main\n    for i in 0..3\n        p(i)\n    end\n    ret 0\nend").is_ok());
    }

    #[test]
    fn test_condition_must_be_bool() {
        assert!(run("func main\n    if 1\n        ret 0\n    end\n    ret 1\nend").is_err());
    }

    #[test]
    fn test_postfix_unless_checks_condition() {
        assert!(run("func main\n    ret 0 unless false\n    ret 1\nend").is_ok());
    }

    #[test]
    fn test_brace_block_becomes_trailing_lambda() {
        // the one-line block form returns its tail expression
        let (_, ctx) = run(
            "func twice(x: int, f)\n    ret f.(f.(x))\nend\n\nfunc main\n    ret twice(10) { |v| v + 1 }\nend",
        )
        .unwrap();
        assert_eq!(main_analysis(&ctx).ret_type, Some(INT));
    }

    #[test]
    fn test_if_expression_branches_unify() {
        assert!(run("func main\n    ret if true then 1 else 2 end\nend").is_ok());
        assert!(run("func main\n    ret if true then 1 else 2.0 end\nend").is_err());
    }

    #[test]
    fn test_typed_expression_coerces_literal() {
        let (_, ctx) = run("func main\n    x := 42 : uint\n    ret 0\nend").unwrap();
        let analysis = main_analysis(&ctx);
        assert!(analysis
            .expr_types
            .values()
            .any(|t| t.is_builtin("uint")));
    }

    #[test]
    fn test_global_constant_resolution() {
        assert!(run("limit := 100\n\nfunc main\n    ret limit\nend").is_ok());
    }
}
