//! The instruction emitter: walks the typed AST of every concrete function
//! and lowers it onto the [`crate::ir`] builder.
//!
//! Mutable (`var`) bindings live in allocas; immutable bindings are bound
//! to their SSA value directly. Lambdas become functions taking their
//! captured fields before their declared parameters, with the closure value
//! being a pointer to the heap-allocated capture struct. Global constants
//! are inlined at their use sites.

use std::collections::HashMap;

use crate::ir::{Builder, IrType, Module, Value};
use crate::parser::ast::*;
use crate::semantics::member::BuiltinMember;
use crate::semantics::scope::{FuncId, SymbolId};
use crate::semantics::types::{BuiltinType, Type};
use crate::semantics::{Callee, CastResolution, FuncAnalysis, MemberAccess, SemanticContext};

use super::type_emitter::TypeIrEmitter;
use super::{CodegenError, CodegenResult};

#[derive(Debug, Clone)]
enum Binding {
    /// Immutable binding to an SSA value.
    Value(Value),
    /// Mutable binding backed by an alloca slot.
    Slot(Value),
}

struct EmitState<'ctx> {
    analysis: &'ctx FuncAnalysis,
    env: HashMap<SymbolId, Binding>,
    func_id: Option<FuncId>,
}

pub struct IrEmitter<'ctx> {
    pub(crate) ctx: &'ctx SemanticContext,
    pub(crate) builder: Builder,
    pub(crate) types: TypeIrEmitter,
    func_defs: HashMap<NodeId, &'ctx FunctionDef>,
    fn_names: HashMap<FuncId, String>,
    global_inits: HashMap<SymbolId, (&'ctx Expression, Option<usize>)>,
    symbol_ids: HashMap<String, i64>,
    stack: Vec<EmitState<'ctx>>,
}

/// Lower a fully analyzed compilation unit to an IR module.
pub fn emit_module(
    unit: &CompilationUnit,
    ctx: &SemanticContext,
    module_name: &str,
) -> CodegenResult<Module> {
    let mut emitter = IrEmitter {
        ctx,
        builder: Builder::new(module_name),
        types: TypeIrEmitter::new(),
        func_defs: HashMap::new(),
        fn_names: HashMap::new(),
        global_inits: HashMap::new(),
        symbol_ids: HashMap::new(),
        stack: vec![],
    };
    emitter.index_unit(unit);

    let mut order: Vec<FuncId> = ctx.functions.keys().copied().collect();
    order.sort_by_key(|f| f.0);
    for func in order {
        emitter.emit_function(func)?;
    }

    Ok(emitter.builder.finish())
}

/// A bare emitter over an empty unit, for exercising the allocation
/// contract directly.
#[cfg(test)]
pub(crate) fn test_emitter(ctx: &SemanticContext) -> IrEmitter<'_> {
    IrEmitter {
        ctx,
        builder: Builder::new("test"),
        types: TypeIrEmitter::new(),
        func_defs: HashMap::new(),
        fn_names: HashMap::new(),
        global_inits: HashMap::new(),
        symbol_ids: HashMap::new(),
        stack: vec![],
    }
}

impl<'ctx> IrEmitter<'ctx> {
    // ---- indexing ------------------------------------------------------

    fn index_unit(&mut self, unit: &'ctx CompilationUnit) {
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
            // map each global symbol to its (inlined) initializer
            let unpack = constant.values.len() == 1 && constant.decls.len() > 1;
            for (position, decl) in constant.decls.iter().enumerate() {
                let Some(symbol) = self
                    .ctx
                    .global_analysis
                    .decl_symbols
                    .get(&decl.id)
                    .copied()
                else {
                    continue;
                };
                let (value, field) = if unpack {
                    (&constant.values[0], Some(position))
                } else if let Some(value) = constant.values.get(position) {
                    (value, None)
                } else {
                    continue;
                };
                self.global_inits.insert(symbol, (value, field));
            }
        }
    }

    fn index_function(&mut self, def: &'ctx FunctionDef) {
        self.func_defs.insert(def.id, def);
        self.index_block(&def.body);
        if let Some(ensure) = &def.ensure_block {
            self.index_block(ensure);
        }
    }

    fn index_block(&mut self, block: &'ctx StatementBlock) {
        for statement in &block.statements {
            self.index_statement(statement);
        }
    }

    fn index_statement(&mut self, statement: &'ctx Statement) {
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

    fn index_expr(&mut self, expr: &'ctx Expression) {
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
                b.statements.iter().for_each(|s| self.index_statement(s));
                self.index_expr(&b.value);
            }
            Expression::If(i) => {
                for clause in &i.clauses {
                    self.index_expr(&clause.condition);
                    clause.body.statements.iter().for_each(|s| self.index_statement(s));
                    self.index_expr(&clause.body.value);
                }
                i.else_block.statements.iter().for_each(|s| self.index_statement(s));
                self.index_expr(&i.else_block.value);
            }
            Expression::Switch(s) => {
                self.index_expr(&s.scrutinee);
                for clause in &s.clauses {
                    clause.values.iter().for_each(|v| self.index_expr(v));
                    clause.body.statements.iter().for_each(|st| self.index_statement(st));
                    self.index_expr(&clause.body.value);
                }
                s.else_block.statements.iter().for_each(|st| self.index_statement(st));
                self.index_expr(&s.else_block.value);
            }
            Expression::Typed(t) => self.index_expr(&t.child),
            Expression::Literal(_)
            | Expression::StringLiteral(_)
            | Expression::SymbolLiteral(_)
            | Expression::VarRef(_) => {}
        }
    }

    // ---- function-level helpers ----------------------------------------

    fn state(&self) -> &EmitState<'ctx> {
        self.stack.last().expect("emitter state")
    }

    fn analysis(&self) -> &'ctx FuncAnalysis {
        self.state().analysis
    }

    fn expr_type(&self, node: NodeId) -> CodegenResult<&'ctx Type> {
        self.analysis()
            .expr_types
            .get(&node)
            .ok_or_else(|| CodegenError::internal("expression without a resolved type"))
    }

    fn emit_type(&mut self, typ: &Type) -> CodegenResult<IrType> {
        self.types.emit(&mut self.builder, self.ctx, typ)
    }

    fn fn_name(&mut self, func: FuncId) -> String {
        if let Some(name) = self.fn_names.get(&func) {
            return name.clone();
        }
        let scope = self.ctx.scopes.func(func);
        let name = if scope.is_main_func() {
            "main".to_string()
        } else {
            format!("{}.{}", scope.name, func.0)
        };
        self.fn_names.insert(func, name.clone());
        name
    }

    /// IR parameter list (captured fields first for lambdas) and return
    /// type of a function scope.
    fn fn_signature(&mut self, func: FuncId) -> CodegenResult<(Vec<(String, IrType)>, IrType)> {
        let mut params = vec![];
        for (index, capture) in self.ctx.captures_of(func).to_vec().into_iter().enumerate() {
            let symbol = self.ctx.scopes.symbol(capture).clone();
            let typ = symbol
                .typ
                .ok_or_else(|| CodegenError::internal("capture without a type"))?;
            params.push((format!("cap{index}.{}", symbol.name), self.emit_type(&typ)?));
        }
        for param in self.ctx.scopes.func(func).params.clone() {
            let symbol = self.ctx.scopes.symbol(param).clone();
            let typ = symbol
                .typ
                .ok_or_else(|| CodegenError::internal("parameter without a type"))?;
            params.push((symbol.name, self.emit_type(&typ)?));
        }

        let ret = match self
            .ctx
            .functions
            .get(&func)
            .and_then(|a| a.ret_type.clone())
            .or_else(|| self.ctx.scopes.func(func).ret_type.clone())
        {
            Some(ret) => self.emit_type(&ret)?,
            None => IrType::Void,
        };
        Ok((params, ret))
    }

    fn function_value(&mut self, func: FuncId) -> CodegenResult<Value> {
        let (params, ret) = self.fn_signature(func)?;
        Ok(Value::Function {
            name: self.fn_name(func),
            ty: IrType::Func {
                params: params.into_iter().map(|(_, t)| t).collect(),
                ret: Box::new(ret),
            },
        })
    }

    fn emit_function(&mut self, func: FuncId) -> CodegenResult<()> {
        let scope = self.ctx.scopes.func(func);
        let def = *self
            .func_defs
            .get(&scope.ast_node)
            .ok_or_else(|| CodegenError::internal("function scope without a definition"))?;
        let analysis = self
            .ctx
            .functions
            .get(&func)
            .ok_or_else(|| CodegenError::internal("unanalyzed function reached emission"))?;

        let (params, ret) = self.fn_signature(func)?;
        let name = self.fn_name(func);
        let func_ref = self.builder.add_function(name, params, ret.clone());
        let entry = self.builder.append_block(func_ref, "entry");
        self.builder.position_at_end(func_ref, entry);

        let mut env = HashMap::new();
        let captures = self.ctx.captures_of(func).to_vec();
        for (index, capture) in captures.iter().enumerate() {
            let value = self.builder.param_value(func_ref, index);
            env.insert(*capture, Binding::Value(value));
        }
        self.stack.push(EmitState {
            analysis,
            env,
            func_id: Some(func),
        });

        // mutable parameters are spilled to a slot
        let param_symbols = self.ctx.scopes.func(func).params.clone();
        for (index, symbol_id) in param_symbols.iter().enumerate() {
            let value = self.builder.param_value(func_ref, captures.len() + index);
            let symbol = self.ctx.scopes.symbol(*symbol_id);
            let binding = if symbol.immutable {
                Binding::Value(value)
            } else {
                let slot = self.builder.build_alloca(value.ty());
                self.builder.build_store(value, slot.clone());
                Binding::Slot(slot)
            };
            self.stack.last_mut().unwrap().env.insert(*symbol_id, binding);
        }

        for statement in &def.body.statements {
            self.emit_statement(statement)?;
        }
        if let Some(ensure) = &def.ensure_block {
            for statement in &ensure.statements {
                self.emit_statement(statement)?;
            }
        }

        if !self.builder.has_terminator() {
            if ret == IrType::Void {
                self.builder.build_ret(None);
            } else {
                self.builder.build_ret(Some(Value::Undef(ret)));
            }
        }

        self.stack.pop();
        Ok(())
    }

    // ---- statements ----------------------------------------------------

    fn emit_statement(&mut self, statement: &Statement) -> CodegenResult<()> {
        match statement {
            Statement::Expression(expr) => {
                self.emit_expr(expr)?;
                Ok(())
            }
            Statement::Initialize(init) => self.emit_initialize(init),
            Statement::Assignment(assign) => self.emit_assignment(assign),
            Statement::Return(ret) => self.emit_return(ret),
            Statement::If(if_stmt) => self.emit_if_stmt(if_stmt),
            Statement::Switch(switch) => self.emit_switch_stmt(switch),
            Statement::For(for_stmt) => self.emit_for(for_stmt),
            Statement::While(while_stmt) => self.emit_while(while_stmt),
            Statement::PostfixIf(postfix) => self.emit_postfix_if(postfix),
            Statement::Block(block) => {
                for statement in &block.statements {
                    self.emit_statement(statement)?;
                }
                Ok(())
            }
            Statement::VariableDecl(_) => Ok(()),
        }
    }

    fn bind_decl(&mut self, decl_node: NodeId, is_var: bool, value: Value) -> CodegenResult<()> {
        let symbol = self
            .analysis()
            .decl_symbols
            .get(&decl_node)
            .copied()
            .ok_or_else(|| CodegenError::internal("declaration without a symbol"))?;
        let binding = if is_var {
            let slot = self.builder.build_alloca(value.ty());
            self.builder.build_store(value, slot.clone());
            Binding::Slot(slot)
        } else {
            Binding::Value(value)
        };
        self.stack.last_mut().unwrap().env.insert(symbol, binding);
        Ok(())
    }

    fn emit_initialize(&mut self, init: &InitializeStmt) -> CodegenResult<()> {
        if init.values.is_empty() {
            // `var x : T` without initializer: reserve the slot
            for decl in &init.decls {
                let symbol = self
                    .analysis()
                    .decl_symbols
                    .get(&decl.id)
                    .copied()
                    .ok_or_else(|| CodegenError::internal("declaration without a symbol"))?;
                let typ = self
                    .ctx
                    .scopes
                    .symbol(symbol)
                    .typ
                    .clone()
                    .ok_or_else(|| CodegenError::internal("declaration without a type"))?;
                let ty = self.emit_type(&typ)?;
                let slot = self.builder.build_alloca(ty);
                self.stack
                    .last_mut()
                    .unwrap()
                    .env
                    .insert(symbol, Binding::Slot(slot));
            }
            return Ok(());
        }

        if init.values.len() == 1 && init.decls.len() > 1 {
            // tuple unpacking: load each field of the tuple value
            let tuple = self.emit_expr(&init.values[0])?;
            for (index, decl) in init.decls.iter().enumerate() {
                let field_ptr = self.gep_struct_field(tuple.clone(), index)?;
                let value = self.builder.build_load(field_ptr);
                self.bind_decl(decl.id, decl.is_var, value)?;
            }
            return Ok(());
        }

        for (decl, value_expr) in init.decls.iter().zip(&init.values) {
            let value = self.emit_expr(value_expr)?;
            self.bind_decl(decl.id, decl.is_var, value)?;
        }
        Ok(())
    }

    fn emit_assignment(&mut self, assign: &AssignmentStmt) -> CodegenResult<()> {
        for (lhs, rhs) in assign.lhs.iter().zip(&assign.rhs) {
            let mut rhs_value = self.emit_expr(rhs)?;
            // user-defined copier runs on the assigned value
            if let Some(copier) = self.analysis().copies.get(&rhs.id()).copied() {
                let function = self.function_value(copier)?;
                let copied = self.builder.build_call(function, vec![rhs_value.clone()]);
                if copied.ty() != crate::ir::IrType::Void {
                    rhs_value = copied;
                }
            }
            let target = self.emit_lvalue(lhs)?;
            let value = if assign.op == "=" {
                rhs_value
            } else {
                // compound assignment: read, combine, write back
                let op = assign.op.trim_end_matches('=');
                let loaded = self.builder.build_load(target.clone());
                let semantic = self.expr_type(lhs.id())?.clone();
                self.build_arith(op, &semantic, loaded, rhs_value, lhs.location())?
            };
            self.builder.build_store(value, target);
        }
        Ok(())
    }

    fn emit_return(&mut self, ret: &ReturnStmt) -> CodegenResult<()> {
        match &ret.values[..] {
            [] => self.builder.build_ret(None),
            [value] => {
                let value = self.emit_expr(value)?;
                self.builder.build_ret(Some(value));
            }
            values => {
                let types = values
                    .iter()
                    .map(|v| self.expr_type(v.id()).cloned())
                    .collect::<CodegenResult<Vec<_>>>()?;
                let emitted = values
                    .iter()
                    .map(|v| self.emit_expr(v))
                    .collect::<CodegenResult<Vec<_>>>()?;
                let tuple = self.emit_tuple_value(&Type::Tuple(types), emitted)?;
                self.builder.build_ret(Some(tuple));
            }
        }
        Ok(())
    }

    fn emit_condition(&mut self, condition: &Expression, invert: bool) -> CodegenResult<Value> {
        let mut cond = self.emit_expr(condition)?;
        if invert {
            let truth = self.builder.const_bool(true);
            cond = self.builder.build_binop("xor", cond, truth);
        }
        Ok(cond)
    }

    fn emit_if_stmt(&mut self, if_stmt: &IfStmt) -> CodegenResult<()> {
        let func = self.builder.current_function();
        let merge = self.builder.append_block(func, "if.end");

        for clause in &if_stmt.clauses {
            let invert = if_stmt.kind == IfKind::Unless;
            let cond = self.emit_condition(&clause.condition, invert)?;
            let then_block = self.builder.append_block(func, "if.then");
            let next_block = self.builder.append_block(func, "if.else");
            self.builder.build_cond_br(cond, then_block, next_block);

            self.builder.position_at_end(func, then_block);
            for statement in &clause.body.statements {
                self.emit_statement(statement)?;
            }
            if !self.builder.has_terminator() {
                self.builder.build_br(merge);
            }
            self.builder.position_at_end(func, next_block);
        }

        if let Some(else_block) = &if_stmt.else_block {
            for statement in &else_block.statements {
                self.emit_statement(statement)?;
            }
        }
        if !self.builder.has_terminator() {
            self.builder.build_br(merge);
        }
        self.builder.position_at_end(func, merge);
        Ok(())
    }

    fn emit_switch_stmt(&mut self, switch: &SwitchStmt) -> CodegenResult<()> {
        let scrutinee = self.emit_expr(&switch.scrutinee)?;
        let func = self.builder.current_function();
        let merge = self.builder.append_block(func, "case.end");

        for clause in &switch.clauses {
            let cond = self.emit_when_condition(&scrutinee, &clause.values, &switch.scrutinee)?;
            let body_block = self.builder.append_block(func, "case.when");
            let next_block = self.builder.append_block(func, "case.next");
            self.builder.build_cond_br(cond, body_block, next_block);

            self.builder.position_at_end(func, body_block);
            for statement in &clause.body.statements {
                self.emit_statement(statement)?;
            }
            if !self.builder.has_terminator() {
                self.builder.build_br(merge);
            }
            self.builder.position_at_end(func, next_block);
        }

        if let Some(else_block) = &switch.else_block {
            for statement in &else_block.statements {
                self.emit_statement(statement)?;
            }
        }
        if !self.builder.has_terminator() {
            self.builder.build_br(merge);
        }
        self.builder.position_at_end(func, merge);
        Ok(())
    }

    /// `when a, b` lowers to an or-chain of equality comparisons.
    fn emit_when_condition(
        &mut self,
        scrutinee: &Value,
        values: &[Expression],
        scrutinee_expr: &Expression,
    ) -> CodegenResult<Value> {
        let semantic = self.expr_type(scrutinee_expr.id())?.clone();
        let mut cond: Option<Value> = None;
        for value in values {
            let value = self.emit_expr(value)?;
            let eq = self.build_arith("==", &semantic, scrutinee.clone(), value, scrutinee_expr.location())?;
            cond = Some(match cond {
                Some(previous) => self.builder.build_binop("or", previous, eq),
                None => eq,
            });
        }
        cond.ok_or_else(|| CodegenError::internal("when clause without values"))
    }

    fn emit_while(&mut self, while_stmt: &WhileStmt) -> CodegenResult<()> {
        let func = self.builder.current_function();
        let header = self.builder.append_block(func, "while.cond");
        let body = self.builder.append_block(func, "while.body");
        let exit = self.builder.append_block(func, "while.end");

        self.builder.build_br(header);
        self.builder.position_at_end(func, header);
        let cond = self.emit_condition(&while_stmt.condition, false)?;
        self.builder.build_cond_br(cond, body, exit);

        self.builder.position_at_end(func, body);
        for statement in &while_stmt.body.statements {
            self.emit_statement(statement)?;
        }
        if !self.builder.has_terminator() {
            self.builder.build_br(header);
        }
        self.builder.position_at_end(func, exit);
        Ok(())
    }

    fn emit_postfix_if(&mut self, postfix: &PostfixIfStmt) -> CodegenResult<()> {
        let invert = postfix.kind == IfKind::Unless;
        let cond = self.emit_condition(&postfix.condition, invert)?;
        let func = self.builder.current_function();
        let then_block = self.builder.append_block(func, "postfix.then");
        let merge = self.builder.append_block(func, "postfix.end");
        self.builder.build_cond_br(cond, then_block, merge);

        self.builder.position_at_end(func, then_block);
        self.emit_statement(&postfix.body)?;
        if !self.builder.has_terminator() {
            self.builder.build_br(merge);
        }
        self.builder.position_at_end(func, merge);
        Ok(())
    }

    /// `for x in begin..end`: header/body/exit blocks with an induction
    /// slot stepped by one; `...` compares inclusively.
    fn emit_for(&mut self, for_stmt: &ForStmt) -> CodegenResult<()> {
        let range_type = self.expr_type(for_stmt.range.id())?.clone();
        match range_type {
            Type::Range {
                begin: begin_type,
                inclusive,
                ..
            } => {
                let range = self.emit_expr(&for_stmt.range)?;
                let begin_ptr = self.gep_struct_field(range.clone(), 0)?;
                let begin = self.builder.build_load(begin_ptr);
                let end_ptr = self.gep_struct_field(range, 1)?;
                let end = self.builder.build_load(end_ptr);

                let unsigned = *begin_type == Type::Builtin(BuiltinType::Uint);
                let cmp: &'static str = match (inclusive, unsigned) {
                    (true, false) => "sle",
                    (false, false) => "slt",
                    (true, true) => "ule",
                    (false, true) => "ult",
                };

                let slot = self.builder.build_alloca(begin.ty());
                self.builder.build_store(begin, slot.clone());

                let [var] = &for_stmt.iter_vars[..] else {
                    return Err(CodegenError::not_implemented(
                        "destructuring iteration variables in for statements",
                    ));
                };
                let symbol = self
                    .analysis()
                    .decl_symbols
                    .get(&var.id)
                    .copied()
                    .ok_or_else(|| CodegenError::internal("iteration variable without symbol"))?;
                self.stack
                    .last_mut()
                    .unwrap()
                    .env
                    .insert(symbol, Binding::Slot(slot.clone()));

                let func = self.builder.current_function();
                let header = self.builder.append_block(func, "for.cond");
                let body = self.builder.append_block(func, "for.body");
                let exit = self.builder.append_block(func, "for.end");

                self.builder.build_br(header);
                self.builder.position_at_end(func, header);
                let current = self.builder.build_load(slot.clone());
                let cond = self.builder.build_icmp(cmp, current, end);
                self.builder.build_cond_br(cond, body, exit);

                self.builder.position_at_end(func, body);
                for statement in &for_stmt.body.statements {
                    self.emit_statement(statement)?;
                }
                if !self.builder.has_terminator() {
                    let current = self.builder.build_load(slot.clone());
                    let one = self.builder.const_int(IrType::I64, 1);
                    let next = self.builder.build_binop("add", current, one);
                    self.builder.build_store(next, slot);
                    self.builder.build_br(header);
                }
                self.builder.position_at_end(func, exit);
                Ok(())
            }
            Type::Array(_, Some(size)) => {
                let array = self.emit_expr(&for_stmt.range)?;

                let [var] = &for_stmt.iter_vars[..] else {
                    return Err(CodegenError::not_implemented(
                        "destructuring iteration variables in for statements",
                    ));
                };
                let symbol = self
                    .analysis()
                    .decl_symbols
                    .get(&var.id)
                    .copied()
                    .ok_or_else(|| CodegenError::internal("iteration variable without symbol"))?;

                let index_slot = self.builder.build_alloca(IrType::I64);
                let zero = self.builder.const_int(IrType::I64, 0);
                self.builder.build_store(zero, index_slot.clone());

                let func = self.builder.current_function();
                let header = self.builder.append_block(func, "for.cond");
                let body = self.builder.append_block(func, "for.body");
                let exit = self.builder.append_block(func, "for.end");

                self.builder.build_br(header);
                self.builder.position_at_end(func, header);
                let index = self.builder.build_load(index_slot.clone());
                let bound = self.builder.const_int(IrType::I64, size as i64);
                let cond = self.builder.build_icmp("ult", index.clone(), bound);
                self.builder.build_cond_br(cond, body, exit);

                self.builder.position_at_end(func, body);
                let index = self.builder.build_load(index_slot.clone());
                let elem_ptr = self.gep_array_elem(array.clone(), index)?;
                let element = self.builder.build_load(elem_ptr);
                self.stack
                    .last_mut()
                    .unwrap()
                    .env
                    .insert(symbol, Binding::Value(element));
                for statement in &for_stmt.body.statements {
                    self.emit_statement(statement)?;
                }
                if !self.builder.has_terminator() {
                    let index = self.builder.build_load(index_slot.clone());
                    let one = self.builder.const_int(IrType::I64, 1);
                    let next = self.builder.build_binop("add", index, one);
                    self.builder.build_store(next, index_slot);
                    self.builder.build_br(header);
                }
                self.builder.position_at_end(func, exit);
                Ok(())
            }
            other => Err(CodegenError::at(
                for_stmt.range.location(),
                format!("can not lower iteration over '{other}'"),
            )),
        }
    }

    // ---- lvalues -------------------------------------------------------

    /// Pointer to the storage of an assignment target.
    fn emit_lvalue(&mut self, expr: &Expression) -> CodegenResult<Value> {
        match expr {
            Expression::VarRef(var) => {
                if var.name.starts_with('@') {
                    let Some(MemberAccess::InstanceVar(_, offset)) =
                        self.analysis().member_accesses.get(&var.id).cloned()
                    else {
                        return Err(CodegenError::internal("unresolved instance variable"));
                    };
                    let receiver = self.self_value()?;
                    return self.gep_struct_field(receiver, offset);
                }
                let symbol = self
                    .analysis()
                    .resolved_vars
                    .get(&var.id)
                    .copied()
                    .ok_or_else(|| CodegenError::internal("unresolved variable reference"))?;
                match self.state().env.get(&symbol).cloned() {
                    Some(Binding::Slot(slot)) => Ok(slot),
                    _ => Err(CodegenError::at(
                        &var.location,
                        format!("'{}' has no assignable storage", var.name),
                    )),
                }
            }
            Expression::IndexAccess(index) => {
                let child = self.emit_expr(&index.child)?;
                let child_type = self.expr_type(index.child.id())?.clone();
                let index_value = self.emit_expr(&index.index)?;
                match child_type {
                    Type::Array(..) | Type::Pointer(_) => self.gep_array_elem(child, index_value),
                    Type::Tuple(_) => {
                        let position = index_value.const_value().ok_or_else(|| {
                            CodegenError::at(&index.location, "tuple index must be constant")
                        })?;
                        self.gep_struct_field(child, position as usize)
                    }
                    other => Err(CodegenError::at(
                        &index.location,
                        format!("can not assign through an index of '{other}'"),
                    )),
                }
            }
            Expression::UfcsInvocation(ufcs) => {
                let Some(MemberAccess::InstanceVar(_, offset)) =
                    self.analysis().member_accesses.get(&ufcs.id).cloned()
                else {
                    return Err(CodegenError::at(
                        &ufcs.location,
                        format!("'{}' is not an assignable member", ufcs.member_name),
                    ));
                };
                let receiver = self.emit_expr(&ufcs.child)?;
                self.gep_struct_field(receiver, offset)
            }
            other => Err(CodegenError::at(
                other.location(),
                "invalid assignment target",
            )),
        }
    }

    fn self_value(&mut self) -> CodegenResult<Value> {
        let func = self
            .state()
            .func_id
            .ok_or_else(|| CodegenError::internal("receiver access outside a function"))?;
        let receiver = self
            .ctx
            .scopes
            .func(func)
            .params
            .first()
            .copied()
            .ok_or_else(|| CodegenError::internal("member function without receiver"))?;
        self.emit_symbol_value(receiver)
    }

    // ---- addressing helpers --------------------------------------------

    fn gep_struct_field(&mut self, base: Value, index: usize) -> CodegenResult<Value> {
        let base_ty = base.ty();
        let pointee = base_ty
            .pointee()
            .ok_or_else(|| CodegenError::internal("field access through a non-pointer"))?;
        let fields = self
            .builder
            .module
            .fields_of(pointee)
            .ok_or_else(|| CodegenError::internal("field access on a non-struct"))?;
        let field = fields
            .get(index)
            .cloned()
            .ok_or_else(|| CodegenError::internal("struct field offset out of range"))?;
        Ok(self.builder.build_struct_gep(base, index as u64, field))
    }

    fn gep_array_elem(&mut self, base: Value, index: Value) -> CodegenResult<Value> {
        let base_ty = base.ty();
        match base_ty.pointee() {
            Some(IrType::Array(elem, _)) => {
                let zero = self.builder.const_int(IrType::I64, 0);
                let elem = (**elem).clone();
                Ok(self
                    .builder
                    .build_gep(base, vec![zero, index], elem.ptr_to()))
            }
            Some(elem) => {
                let elem = elem.clone();
                Ok(self.builder.build_gep(base, vec![index], elem.ptr_to()))
            }
            None => Err(CodegenError::internal("indexing through a non-pointer")),
        }
    }

    fn emit_symbol_value(&mut self, symbol: SymbolId) -> CodegenResult<Value> {
        if let Some(binding) = self.state().env.get(&symbol).cloned() {
            return Ok(match binding {
                Binding::Value(value) => value,
                Binding::Slot(slot) => self.builder.build_load(slot),
            });
        }

        let var = self.ctx.scopes.symbol(symbol).clone();
        if var.is_global {
            // a function used as a value becomes an empty closure
            if let Some(Type::GenericFunc(func)) = &var.typ {
                let closure_ty = self.emit_type(&Type::GenericFunc(*func))?;
                return Ok(self.builder.const_null(closure_ty));
            }
            // global constants are inlined at their use sites
            if let Some((init, field)) = self.global_inits.get(&symbol).copied() {
                self.stack.push(EmitState {
                    analysis: &self.ctx.global_analysis,
                    env: HashMap::new(),
                    func_id: None,
                });
                let value = self.emit_expr(init);
                self.stack.pop();
                let value = value?;
                return match field {
                    Some(index) => {
                        let ptr = self.gep_struct_field(value, index)?;
                        Ok(self.builder.build_load(ptr))
                    }
                    None => Ok(value),
                };
            }
        }
        Err(CodegenError::internal(format!(
            "no storage for symbol '{}'",
            var.name
        )))
    }

    // ---- expressions ---------------------------------------------------

    fn emit_expr(&mut self, expr: &Expression) -> CodegenResult<Value> {
        match expr {
            Expression::Literal(lit) => self.emit_literal(lit),
            Expression::StringLiteral(lit) => Ok(self.builder.add_global_string(&lit.value)),
            Expression::SymbolLiteral(lit) => {
                let next = self.symbol_ids.len() as i64;
                let id = *self.symbol_ids.entry(lit.name.clone()).or_insert(next);
                Ok(self.builder.const_int(IrType::I64, id))
            }
            Expression::ArrayLiteral(array) => self.emit_array_literal(array),
            Expression::TupleLiteral(tuple) => {
                let typ = self.expr_type(tuple.id)?.clone();
                let values = tuple
                    .elements
                    .iter()
                    .map(|e| self.emit_expr(e))
                    .collect::<CodegenResult<Vec<_>>>()?;
                self.emit_tuple_value(&typ, values)
            }
            Expression::DictLiteral(dict) => self.emit_dict_literal(dict),
            Expression::Lambda(lambda) => {
                let origin = self.ctx.scopes.func_scopes[&lambda.def.id];
                self.emit_lambda_closure(origin)
            }
            Expression::VarRef(var) => self.emit_var_ref(var),
            Expression::Invocation(call) => self.emit_invocation(call),
            Expression::ObjectConstruct(construct) => self.emit_object_construct(construct),
            Expression::IndexAccess(index) => self.emit_index_access(index),
            Expression::UfcsInvocation(ufcs) => self.emit_ufcs(ufcs),
            Expression::Cast(cast) => self.emit_cast(cast),
            Expression::Unary(unary) => self.emit_unary(unary),
            Expression::Binary(binary) => self.emit_binary(binary),
            Expression::Block(block) => {
                for statement in &block.statements {
                    self.emit_statement(statement)?;
                }
                self.emit_expr(&block.value)
            }
            Expression::If(if_expr) => self.emit_if_expr(if_expr),
            Expression::Switch(switch) => self.emit_switch_expr(switch),
            Expression::Typed(typed) => self.emit_expr(&typed.child),
        }
    }

    fn emit_literal(&mut self, lit: &PrimaryLiteral) -> CodegenResult<Value> {
        // annotated literals may have been coerced during analysis
        let semantic = self.expr_type(lit.id)?.clone();
        Ok(match (&lit.value, &semantic) {
            (LiteralValue::Int(v), t) if *t == Type::Builtin(BuiltinType::Float) => {
                Value::ConstFloat(*v as f64)
            }
            (LiteralValue::Int(v), _) => self.builder.const_int(IrType::I64, *v),
            (LiteralValue::Uint(v), t) if *t == Type::Builtin(BuiltinType::Float) => {
                Value::ConstFloat(*v as f64)
            }
            (LiteralValue::Uint(v), _) => self.builder.const_int(IrType::I64, *v as i64),
            (LiteralValue::Float(v), _) => Value::ConstFloat(*v),
            (LiteralValue::Char(c), _) => self.builder.const_int(IrType::I8, *c as i64),
            (LiteralValue::Bool(b), _) => self.builder.const_bool(*b),
        })
    }

    fn emit_array_literal(&mut self, array: &ArrayLiteral) -> CodegenResult<Value> {
        let Type::Array(element, Some(size)) = self.expr_type(array.id)?.clone() else {
            return Err(CodegenError::internal("array literal without a sized type"));
        };
        let storage = self.emit_malloc_fixed_array(&element, size)?;
        for (index, expr) in array.elements.iter().enumerate() {
            let value = self.emit_expr(expr)?;
            let position = self.builder.const_int(IrType::I64, index as i64);
            let slot = self.gep_array_elem(storage.clone(), position)?;
            self.builder.build_store(value, slot);
        }
        Ok(storage)
    }

    fn emit_tuple_value(&mut self, typ: &Type, values: Vec<Value>) -> CodegenResult<Value> {
        let storage = self.emit_malloc_one(typ)?;
        for (index, value) in values.into_iter().enumerate() {
            let slot = self.gep_struct_field(storage.clone(), index)?;
            self.builder.build_store(value, slot);
        }
        Ok(storage)
    }

    fn emit_dict_literal(&mut self, dict: &DictLiteral) -> CodegenResult<Value> {
        let Type::Dict(key_type, value_type) = self.expr_type(dict.id)?.clone() else {
            return Err(CodegenError::internal("dict literal without a dict type"));
        };
        let size = dict.entries.len() as u64;
        let keys = self.emit_malloc_fixed_array(&key_type, size)?;
        let values = self.emit_malloc_fixed_array(&value_type, size)?;
        for (index, (key, value)) in dict.entries.iter().enumerate() {
            let position = self.builder.const_int(IrType::I64, index as i64);
            let key_value = self.emit_expr(key)?;
            let key_slot = self.gep_array_elem(keys.clone(), position.clone())?;
            self.builder.build_store(key_value, key_slot);
            let value_value = self.emit_expr(value)?;
            let value_slot = self.gep_array_elem(values.clone(), position)?;
            self.builder.build_store(value_value, value_slot);
        }

        let dict_type = self.expr_type(dict.id)?.clone();
        let storage = self.emit_malloc_one(&dict_type)?;
        let key_field = self.gep_field_type(&storage, 0)?;
        let value_field = self.gep_field_type(&storage, 1)?;
        let keys = self.builder.build_bitcast(keys, key_field);
        let values = self.builder.build_bitcast(values, value_field);
        let count = self.builder.const_int(IrType::I64, size as i64);
        for (index, value) in [keys, values, count].into_iter().enumerate() {
            let slot = self.gep_struct_field(storage.clone(), index)?;
            self.builder.build_store(value, slot);
        }
        Ok(storage)
    }

    fn gep_field_type(&self, base: &Value, index: usize) -> CodegenResult<IrType> {
        let base_ty = base.ty();
        let pointee = base_ty
            .pointee()
            .ok_or_else(|| CodegenError::internal("field access through a non-pointer"))?;
        let fields = self
            .builder
            .module
            .fields_of(pointee)
            .ok_or_else(|| CodegenError::internal("field access on a non-struct"))?;
        fields
            .get(index)
            .cloned()
            .ok_or_else(|| CodegenError::internal("struct field offset out of range"))
    }

    /// Allocate and populate the capture struct of a lambda, in capture
    /// insertion order.
    fn emit_lambda_closure(&mut self, origin: FuncId) -> CodegenResult<Value> {
        let closure_type = Type::GenericFunc(origin);
        let storage = self.emit_malloc_one(&closure_type)?;
        for (index, capture) in self.ctx.captures_of(origin).to_vec().into_iter().enumerate() {
            let value = self.emit_symbol_value(capture)?;
            let slot = self.gep_struct_field(storage.clone(), index)?;
            self.builder.build_store(value, slot);
        }
        Ok(storage)
    }

    fn emit_var_ref(&mut self, var: &VarRef) -> CodegenResult<Value> {
        if var.name.starts_with('@') {
            let ptr = self.emit_lvalue(&Expression::VarRef(var.clone()))?;
            return Ok(self.builder.build_load(ptr));
        }
        let symbol = self
            .analysis()
            .resolved_vars
            .get(&var.id)
            .copied()
            .ok_or_else(|| CodegenError::internal("unresolved variable reference"))?;
        self.emit_symbol_value(symbol)
    }

    fn emit_invocation(&mut self, call: &Invocation) -> CodegenResult<Value> {
        let callee = self
            .analysis()
            .resolved_calls
            .get(&call.id)
            .cloned()
            .ok_or_else(|| CodegenError::internal("unresolved invocation"))?;

        match callee {
            Callee::Direct(target) => {
                let mut args = vec![];
                for arg in &call.args {
                    args.push(self.emit_expr(arg)?);
                }
                if let Some(block) = &call.do_block {
                    let origin = self.ctx.scopes.func_scopes[&block.id];
                    args.push(self.emit_lambda_closure(origin)?);
                }
                let function = self.function_value(target)?;
                Ok(self.builder.build_call(function, args))
            }
            Callee::Closure { target } => {
                let closure = self.emit_expr(&call.callee)?;
                let mut args = vec![];
                for (index, _) in self.ctx.captures_of(target).iter().enumerate() {
                    let slot = self.gep_struct_field(closure.clone(), index)?;
                    args.push(self.builder.build_load(slot));
                }
                for arg in &call.args {
                    args.push(self.emit_expr(arg)?);
                }
                if let Some(block) = &call.do_block {
                    let origin = self.ctx.scopes.func_scopes[&block.id];
                    args.push(self.emit_lambda_closure(origin)?);
                }
                let function = self.function_value(target)?;
                Ok(self.builder.build_call(function, args))
            }
            Callee::Indirect => {
                let function = self.emit_expr(&call.callee)?;
                let mut args = vec![];
                for arg in &call.args {
                    args.push(self.emit_expr(arg)?);
                }
                Ok(self.builder.build_call(function, args))
            }
        }
    }

    fn emit_object_construct(&mut self, construct: &ObjectConstruct) -> CodegenResult<Value> {
        let semantic = self.expr_type(construct.id)?.clone();
        match (&construct.obj_type, &semantic) {
            // range object: a struct of its bounds
            (_, Type::Range { .. }) => {
                let begin = self.emit_expr(&construct.args[0])?;
                let end = self.emit_expr(&construct.args[1])?;
                let storage = self.emit_malloc_one(&semantic)?;
                let begin_slot = self.gep_struct_field(storage.clone(), 0)?;
                self.builder.build_store(begin, begin_slot);
                let end_slot = self.gep_struct_field(storage.clone(), 1)?;
                self.builder.build_store(end, end_slot);
                Ok(storage)
            }
            // builtin static array construction
            (TypeName::Array(_), Type::Array(element, size)) => match size {
                Some(size) => Ok(self.emit_malloc_fixed_array(&element.clone(), *size)?),
                None => {
                    let count = self.emit_expr(&construct.args[0])?;
                    self.emit_malloc(&element.clone(), count)
                }
            },
            // the array wrapper forwards its backing static array
            (TypeName::Primary(primary), _) if primary.name == "array" => {
                self.emit_expr(&construct.args[0])
            }
            (_, Type::Class(..)) => {
                let storage = self.emit_malloc_one(&semantic)?;
                if let Some(ctor) = self.analysis().ctors.get(&construct.id).copied() {
                    let mut args = vec![storage.clone()];
                    for arg in &construct.args {
                        args.push(self.emit_expr(arg)?);
                    }
                    if let Some(block) = &construct.do_block {
                        let origin = self.ctx.scopes.func_scopes[&block.id];
                        args.push(self.emit_lambda_closure(origin)?);
                    }
                    let init = self.function_value(ctor)?;
                    self.builder.build_call(init, args);
                }
                Ok(storage)
            }
            (_, other) => Err(CodegenError::at(
                &construct.location,
                format!("can not lower construction of '{other}'"),
            )),
        }
    }

    fn emit_index_access(&mut self, index: &IndexAccess) -> CodegenResult<Value> {
        let child_type = self.expr_type(index.child.id())?.clone();
        match child_type {
            Type::Array(..) | Type::Pointer(_) | Type::Tuple(_) => {
                let ptr = self.emit_lvalue(&Expression::IndexAccess(index.clone()))?;
                Ok(self.builder.build_load(ptr))
            }
            Type::Builtin(BuiltinType::String) => {
                let base = self.emit_expr(&index.child)?;
                let position = self.emit_expr(&index.index)?;
                let ptr = self
                    .builder
                    .build_gep(base, vec![position], IrType::i8_ptr());
                Ok(self.builder.build_load(ptr))
            }
            Type::Dict(..) => Err(CodegenError::not_implemented(
                "dictionary lookup code generation",
            )),
            other => Err(CodegenError::at(
                &index.location,
                format!("can not lower indexing of '{other}'"),
            )),
        }
    }

    fn emit_ufcs(&mut self, ufcs: &UfcsInvocation) -> CodegenResult<Value> {
        let access = self
            .analysis()
            .member_accesses
            .get(&ufcs.id)
            .cloned()
            .ok_or_else(|| CodegenError::internal("unresolved member access"))?;

        match access {
            MemberAccess::InstanceVar(_, offset) => {
                let receiver = self.emit_expr(&ufcs.child)?;
                let slot = self.gep_struct_field(receiver, offset)?;
                Ok(self.builder.build_load(slot))
            }
            MemberAccess::Call(target) => {
                let receiver = self.emit_expr(&ufcs.child)?;
                let function = self.function_value(target)?;
                Ok(self.builder.build_call(function, vec![receiver]))
            }
            MemberAccess::Builtin(builtin) => match builtin {
                BuiltinMember::TupleSize(size) => {
                    Ok(self.builder.const_int(IrType::I64, size as i64))
                }
                BuiltinMember::TupleAt(position) => {
                    let receiver = self.emit_expr(&ufcs.child)?;
                    let slot = self.gep_struct_field(receiver, position)?;
                    Ok(self.builder.build_load(slot))
                }
                BuiltinMember::ArraySize(Some(size)) => {
                    Ok(self.builder.const_int(IrType::I64, size as i64))
                }
                BuiltinMember::ArraySize(None) => Err(CodegenError::not_implemented(
                    "size of an array whose length is only known at runtime",
                )),
                BuiltinMember::RangeBegin => {
                    let receiver = self.emit_expr(&ufcs.child)?;
                    let slot = self.gep_struct_field(receiver, 0)?;
                    Ok(self.builder.build_load(slot))
                }
                BuiltinMember::RangeEnd => {
                    let receiver = self.emit_expr(&ufcs.child)?;
                    let slot = self.gep_struct_field(receiver, 1)?;
                    Ok(self.builder.build_load(slot))
                }
                BuiltinMember::TypeString(text) => Ok(self.builder.add_global_string(&text)),
            },
        }
    }

    fn emit_cast(&mut self, cast: &CastExpr) -> CodegenResult<Value> {
        let resolution = self
            .analysis()
            .casts
            .get(&cast.id)
            .cloned()
            .ok_or_else(|| CodegenError::internal("unresolved cast"))?;
        let value = self.emit_expr(&cast.child)?;

        match resolution {
            CastResolution::Converter(converter) => {
                let function = self.function_value(converter)?;
                Ok(self.builder.build_call(function, vec![value]))
            }
            CastResolution::BuiltinConv => {
                let from = self.expr_type(cast.child.id())?.clone();
                let to = self.expr_type(cast.id)?.clone();
                self.emit_builtin_conv(value, &from, &to)
            }
        }
    }

    fn emit_builtin_conv(&mut self, value: Value, from: &Type, to: &Type) -> CodegenResult<Value> {
        use BuiltinType::*;
        let (Type::Builtin(from), Type::Builtin(to)) = (from, to) else {
            return Err(CodegenError::internal("non-scalar builtin conversion"));
        };
        if from == to || matches!((from, to), (Int, Uint) | (Uint, Int)) {
            return Ok(value);
        }
        Ok(match (from, to) {
            (Int, Float) => self.builder.build_conv("sitofp", value, IrType::Double),
            (Uint, Float) => self.builder.build_conv("uitofp", value, IrType::Double),
            (Float, Int) => self.builder.build_conv("fptosi", value, IrType::I64),
            (Float, Uint) => self.builder.build_conv("fptoui", value, IrType::I64),
            (Char, Int) => self.builder.build_conv("sext", value, IrType::I64),
            (Char, Uint) => self.builder.build_conv("zext", value, IrType::I64),
            (Int | Uint, Char) => self.builder.build_conv("trunc", value, IrType::I8),
            (Bool, Int | Uint) => self.builder.build_conv("zext", value, IrType::I64),
            (Int | Uint, Bool) => {
                let zero = self.builder.const_int(IrType::I64, 0);
                self.builder.build_icmp("ne", value, zero)
            }
            (Char, Float) => {
                let widened = self.builder.build_conv("sext", value, IrType::I64);
                self.builder.build_conv("sitofp", widened, IrType::Double)
            }
            (Float, Char) => {
                let narrowed = self.builder.build_conv("fptosi", value, IrType::I64);
                self.builder.build_conv("trunc", narrowed, IrType::I8)
            }
            (from, to) => {
                return Err(CodegenError::internal(format!(
                    "no builtin conversion from '{}' to '{}'",
                    from.name(),
                    to.name()
                )))
            }
        })
    }

    fn emit_unary(&mut self, unary: &UnaryExpr) -> CodegenResult<Value> {
        let operand = self.emit_expr(&unary.operand)?;
        let semantic = self.expr_type(unary.operand.id())?.clone();
        let float = semantic == Type::Builtin(BuiltinType::Float);

        Ok(match unary.op.as_str() {
            "+" => operand,
            "-" if float => {
                let zero = Value::ConstFloat(0.0);
                self.builder.build_binop("fsub", zero, operand)
            }
            "-" => {
                let zero = self.builder.const_int(IrType::I64, 0);
                self.builder.build_binop("sub", zero, operand)
            }
            "~" => {
                let minus_one = self.builder.const_int(IrType::I64, -1);
                self.builder.build_binop("xor", operand, minus_one)
            }
            "!" => {
                let truth = self.builder.const_bool(true);
                self.builder.build_binop("xor", operand, truth)
            }
            other => {
                return Err(CodegenError::internal(format!(
                    "unknown unary operator '{other}'"
                )))
            }
        })
    }

    fn emit_binary(&mut self, binary: &BinaryExpr) -> CodegenResult<Value> {
        // user-defined operator functions resolve like ordinary calls
        if let Some(Callee::Direct(target)) = self.analysis().resolved_calls.get(&binary.id) {
            let target = *target;
            let lhs = self.emit_expr(&binary.lhs)?;
            let rhs = self.emit_expr(&binary.rhs)?;
            let function = self.function_value(target)?;
            return Ok(self.builder.build_call(function, vec![lhs, rhs]));
        }

        let semantic = self.expr_type(binary.lhs.id())?.clone();
        let lhs = self.emit_expr(&binary.lhs)?;
        let rhs = self.emit_expr(&binary.rhs)?;
        self.build_arith(&binary.op, &semantic, lhs, rhs, &binary.location)
    }

    /// Builtin binary operator lowering for operands of one semantic type.
    fn build_arith(
        &mut self,
        op: &str,
        semantic: &Type,
        lhs: Value,
        rhs: Value,
        location: &Location,
    ) -> CodegenResult<Value> {
        use BuiltinType::*;
        let builtin = match semantic {
            Type::Builtin(b) => Some(*b),
            _ => None,
        };
        let float = builtin == Some(Float);
        let unsigned = builtin == Some(Uint) || builtin == Some(Char);

        let value = match op {
            "+" | "-" | "*" | "/" | "%" => {
                let name: &'static str = match (op, float, unsigned) {
                    ("+", true, _) => "fadd",
                    ("-", true, _) => "fsub",
                    ("*", true, _) => "fmul",
                    ("/", true, _) => "fdiv",
                    ("%", true, _) => "frem",
                    ("+", false, _) => "add",
                    ("-", false, _) => "sub",
                    ("*", false, _) => "mul",
                    ("/", false, false) => "sdiv",
                    ("/", false, true) => "udiv",
                    ("%", false, false) => "srem",
                    ("%", false, true) => "urem",
                    _ => unreachable!(),
                };
                self.builder.build_binop(name, lhs, rhs)
            }
            "<<" => self.builder.build_binop("shl", lhs, rhs),
            ">>" if unsigned => self.builder.build_binop("lshr", lhs, rhs),
            ">>" => self.builder.build_binop("ashr", lhs, rhs),
            "&" => self.builder.build_binop("and", lhs, rhs),
            "|" => self.builder.build_binop("or", lhs, rhs),
            "^" => self.builder.build_binop("xor", lhs, rhs),
            "&&" => self.builder.build_binop("and", lhs, rhs),
            "||" => self.builder.build_binop("or", lhs, rhs),
            "==" if float => self.builder.build_fcmp("oeq", lhs, rhs),
            "!=" if float => self.builder.build_fcmp("one", lhs, rhs),
            "==" => self.builder.build_icmp("eq", lhs, rhs),
            "!=" => self.builder.build_icmp("ne", lhs, rhs),
            "<" | "<=" | ">" | ">=" => {
                if float {
                    let name: &'static str = match op {
                        "<" => "olt",
                        "<=" => "ole",
                        ">" => "ogt",
                        _ => "oge",
                    };
                    self.builder.build_fcmp(name, lhs, rhs)
                } else {
                    let name: &'static str = match (op, unsigned) {
                        ("<", false) => "slt",
                        ("<=", false) => "sle",
                        (">", false) => "sgt",
                        (">=", false) => "sge",
                        ("<", true) => "ult",
                        ("<=", true) => "ule",
                        (">", true) => "ugt",
                        _ => "uge",
                    };
                    self.builder.build_icmp(name, lhs, rhs)
                }
            }
            other => {
                return Err(CodegenError::at(
                    location,
                    format!("can not lower binary operator '{other}'"),
                ))
            }
        };
        Ok(value)
    }

    fn emit_if_expr(&mut self, if_expr: &IfExpr) -> CodegenResult<Value> {
        let result_type = self.expr_type(if_expr.id)?.clone();
        let result_ir = self.emit_type(&result_type)?;

        let func = self.builder.current_function();
        let merge = self.builder.append_block(func, "if.merge");
        let mut incomings = vec![];

        for clause in &if_expr.clauses {
            let invert = if_expr.kind == IfKind::Unless;
            let cond = self.emit_condition(&clause.condition, invert)?;
            let then_block = self.builder.append_block(func, "if.then");
            let next_block = self.builder.append_block(func, "if.else");
            self.builder.build_cond_br(cond, then_block, next_block);

            self.builder.position_at_end(func, then_block);
            for statement in &clause.body.statements {
                self.emit_statement(statement)?;
            }
            let value = self.emit_expr(&clause.body.value)?;
            if !self.builder.has_terminator() {
                incomings.push((value, self.builder.current_block()));
                self.builder.build_br(merge);
            }
            self.builder.position_at_end(func, next_block);
        }

        for statement in &if_expr.else_block.statements {
            self.emit_statement(statement)?;
        }
        let value = self.emit_expr(&if_expr.else_block.value)?;
        if !self.builder.has_terminator() {
            incomings.push((value, self.builder.current_block()));
            self.builder.build_br(merge);
        }

        self.builder.position_at_end(func, merge);
        let phi = self.builder.build_phi(result_ir);
        for (value, block) in incomings {
            self.builder.add_incoming(&phi, value, block);
        }
        Ok(phi)
    }

    fn emit_switch_expr(&mut self, switch: &SwitchExpr) -> CodegenResult<Value> {
        let result_type = self.expr_type(switch.id)?.clone();
        let result_ir = self.emit_type(&result_type)?;
        let scrutinee = self.emit_expr(&switch.scrutinee)?;

        let func = self.builder.current_function();
        let merge = self.builder.append_block(func, "case.merge");
        let mut incomings = vec![];

        for clause in &switch.clauses {
            let cond = self.emit_when_condition(&scrutinee, &clause.values, &switch.scrutinee)?;
            let body_block = self.builder.append_block(func, "case.when");
            let next_block = self.builder.append_block(func, "case.next");
            self.builder.build_cond_br(cond, body_block, next_block);

            self.builder.position_at_end(func, body_block);
            for statement in &clause.body.statements {
                self.emit_statement(statement)?;
            }
            let value = self.emit_expr(&clause.body.value)?;
            if !self.builder.has_terminator() {
                incomings.push((value, self.builder.current_block()));
                self.builder.build_br(merge);
            }
            self.builder.position_at_end(func, next_block);
        }

        for statement in &switch.else_block.statements {
            self.emit_statement(statement)?;
        }
        let value = self.emit_expr(&switch.else_block.value)?;
        if !self.builder.has_terminator() {
            incomings.push((value, self.builder.current_block()));
            self.builder.build_br(merge);
        }

        self.builder.position_at_end(func, merge);
        let phi = self.builder.build_phi(result_ir);
        for (value, block) in incomings {
            self.builder.add_incoming(&phi, value, block);
        }
        Ok(phi)
    }
}
