//! The scope tree: a set of arenas for global, local, function and class
//! scopes plus the variable symbols they define. Scopes reference their AST
//! definition sites by node id and each other by arena index, breaking the
//! ownership cycles a pointer-based tree would have.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::parser::ast::{FuncKind, Location, NodeId, SpecialFunc};

use super::error::DiagnosticSink;
use super::types::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FuncId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScopeRef {
    Global,
    Local(LocalId),
    Func(FuncId),
    Class(ClassId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarSymbol {
    pub name: String,
    pub ast_node: NodeId,
    pub immutable: bool,
    pub is_global: bool,
    pub typ: Option<Type>,
    pub location: Location,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GlobalScope {
    pub functions: Vec<FuncId>,
    pub const_symbols: Vec<SymbolId>,
    pub classes: Vec<ClassId>,
    pub cast_funcs: Vec<FuncId>,
    /// Back-reference to the compilation unit node.
    pub ast_root: NodeId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocalScope {
    pub enclosing: ScopeRef,
    pub children: Vec<LocalId>,
    pub local_vars: Vec<SymbolId>,
    /// Lambda function scopes defined in this local scope.
    pub unnamed_funcs: Vec<FuncId>,
}

/// A function scope IS a symbol: it carries the symbol fields (name, AST
/// node) next to the scope fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncScope {
    pub enclosing: ScopeRef,
    pub name: String,
    pub ast_node: NodeId,
    pub location: Location,
    pub body: Option<LocalId>,
    pub params: Vec<SymbolId>,
    pub ret_type: Option<Type>,
    pub is_member_func: bool,
    pub is_const: bool,
    pub kind: FuncKind,
    pub special: SpecialFunc,
}

impl FuncScope {
    pub fn is_main_func(&self) -> bool {
        self.name == "main" && !self.is_member_func
    }

    pub fn is_anonymous(&self) -> bool {
        self.name.starts_with("lambda.")
    }

    pub fn is_ctor(&self) -> bool {
        self.name == "dachs.init"
    }

    pub fn is_copier(&self) -> bool {
        self.name == "dachs.copy"
    }

    pub fn is_converter(&self) -> bool {
        self.name == "dachs.conv"
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClassScope {
    pub enclosing: ScopeRef,
    pub name: String,
    pub ast_node: NodeId,
    pub location: Location,
    pub member_funcs: Vec<FuncId>,
    /// Ordered: instance variable offsets are their declaration order.
    pub instance_vars: Vec<SymbolId>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScopeTree {
    pub global: GlobalScope,
    pub locals: Vec<LocalScope>,
    pub funcs: Vec<FuncScope>,
    pub classes: Vec<ClassScope>,
    pub symbols: Vec<VarSymbol>,
    /// Statement-block (and block-expression) node → its local scope.
    pub block_scopes: HashMap<NodeId, LocalId>,
    /// Function definition node → its function scope.
    pub func_scopes: HashMap<NodeId, FuncId>,
    /// Class definition node → its class scope.
    pub class_scopes: HashMap<NodeId, ClassId>,
    /// Declaration site (parameter, variable declaration) → its symbol.
    pub decl_symbols: HashMap<NodeId, SymbolId>,
}

impl ScopeTree {
    pub fn new(ast_root: NodeId) -> Self {
        ScopeTree {
            global: GlobalScope {
                ast_root,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    // ---- allocation ----------------------------------------------------

    pub fn alloc_local(&mut self, enclosing: ScopeRef) -> LocalId {
        let id = LocalId(self.locals.len());
        self.locals.push(LocalScope {
            enclosing,
            children: vec![],
            local_vars: vec![],
            unnamed_funcs: vec![],
        });
        if let ScopeRef::Local(parent) = enclosing {
            self.locals[parent.0].children.push(id);
        }
        id
    }

    pub fn alloc_func(&mut self, scope: FuncScope) -> FuncId {
        let id = FuncId(self.funcs.len());
        self.funcs.push(scope);
        id
    }

    pub fn alloc_class(&mut self, scope: ClassScope) -> ClassId {
        let id = ClassId(self.classes.len());
        self.classes.push(scope);
        id
    }

    pub fn alloc_symbol(&mut self, symbol: VarSymbol) -> SymbolId {
        let id = SymbolId(self.symbols.len());
        self.symbols.push(symbol);
        id
    }

    // ---- accessors -----------------------------------------------------

    pub fn symbol(&self, id: SymbolId) -> &VarSymbol {
        &self.symbols[id.0]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut VarSymbol {
        &mut self.symbols[id.0]
    }

    pub fn func(&self, id: FuncId) -> &FuncScope {
        &self.funcs[id.0]
    }

    pub fn func_mut(&mut self, id: FuncId) -> &mut FuncScope {
        &mut self.funcs[id.0]
    }

    pub fn class(&self, id: ClassId) -> &ClassScope {
        &self.classes[id.0]
    }

    pub fn local(&self, id: LocalId) -> &LocalScope {
        &self.locals[id.0]
    }

    pub fn enclosing(&self, scope: ScopeRef) -> Option<ScopeRef> {
        match scope {
            ScopeRef::Global => None,
            ScopeRef::Local(id) => Some(self.locals[id.0].enclosing),
            ScopeRef::Func(id) => Some(self.funcs[id.0].enclosing),
            ScopeRef::Class(id) => Some(self.classes[id.0].enclosing),
        }
    }

    // ---- definition ----------------------------------------------------

    /// Shared symbol definition rules: the `__builtin_` prefix is reserved
    /// and duplicate names within one container are errors.
    fn define_symbol_in(
        &mut self,
        container: ScopeRef,
        symbol: VarSymbol,
        sink: &mut DiagnosticSink,
    ) -> Option<SymbolId> {
        if symbol.name.starts_with("__builtin_") {
            sink.error(
                &symbol.location,
                "'__builtin_' prefix is only permitted for built-in names",
            );
            return None;
        }

        let existing = match container {
            ScopeRef::Global => &self.global.const_symbols,
            ScopeRef::Local(id) => &self.locals[id.0].local_vars,
            ScopeRef::Func(id) => &self.funcs[id.0].params,
            ScopeRef::Class(id) => &self.classes[id.0].instance_vars,
        };
        if let Some(dup) = existing
            .iter()
            .find(|id| self.symbols[id.0].name == symbol.name)
        {
            let previous = self.symbols[dup.0].location.clone();
            sink.error(
                &symbol.location,
                format!(
                    "'{}' is redefined. Note: Previous definition is at line:{}, col:{}",
                    symbol.name, previous.line, previous.col
                ),
            );
            return None;
        }

        let id = self.alloc_symbol(symbol);
        match container {
            ScopeRef::Global => self.global.const_symbols.push(id),
            ScopeRef::Local(local) => self.locals[local.0].local_vars.push(id),
            ScopeRef::Func(func) => self.funcs[func.0].params.push(id),
            ScopeRef::Class(class) => self.classes[class.0].instance_vars.push(id),
        }
        Some(id)
    }

    pub fn define_local_var(
        &mut self,
        scope: LocalId,
        symbol: VarSymbol,
        sink: &mut DiagnosticSink,
    ) -> Option<SymbolId> {
        self.check_shadowing(ScopeRef::Local(scope), &symbol, sink);
        self.define_symbol_in(ScopeRef::Local(scope), symbol, sink)
    }

    pub fn define_param(
        &mut self,
        func: FuncId,
        symbol: VarSymbol,
        sink: &mut DiagnosticSink,
    ) -> Option<SymbolId> {
        self.check_shadowing(ScopeRef::Func(func), &symbol, sink);
        self.define_symbol_in(ScopeRef::Func(func), symbol, sink)
    }

    pub fn define_instance_var(
        &mut self,
        class: ClassId,
        symbol: VarSymbol,
        sink: &mut DiagnosticSink,
    ) -> Option<SymbolId> {
        self.define_symbol_in(ScopeRef::Class(class), symbol, sink)
    }

    pub fn define_global_constant(
        &mut self,
        symbol: VarSymbol,
        sink: &mut DiagnosticSink,
    ) -> Option<SymbolId> {
        self.define_symbol_in(ScopeRef::Global, symbol, sink)
    }

    /// Functions and their same-named constant are not duplication-checked
    /// here; overload-aware duplication is a separate pass.
    pub fn force_define_global_constant(&mut self, symbol: VarSymbol) -> SymbolId {
        let id = self.alloc_symbol(symbol);
        self.global.const_symbols.push(id);
        id
    }

    /// Warn when a new local shadows a name in an enclosing local or
    /// function scope. Shadowing globals is silent.
    fn check_shadowing(&self, scope: ScopeRef, symbol: &VarSymbol, sink: &mut DiagnosticSink) {
        let mut current = self.enclosing(scope);
        while let Some(s) = current {
            let shadowed = match s {
                ScopeRef::Local(id) => self.locals[id.0]
                    .local_vars
                    .iter()
                    .find(|v| self.symbols[v.0].name == symbol.name),
                ScopeRef::Func(id) => self.funcs[id.0]
                    .params
                    .iter()
                    .find(|v| self.symbols[v.0].name == symbol.name),
                ScopeRef::Global | ScopeRef::Class(_) => None,
            };
            if let Some(shadowed) = shadowed {
                let previous = &self.symbols[shadowed.0].location;
                sink.warning(
                    &symbol.location,
                    format!(
                        "'{}' shadows the declaration at line:{}, col:{}",
                        symbol.name, previous.line, previous.col
                    ),
                );
                return;
            }
            if matches!(s, ScopeRef::Global) {
                return;
            }
            current = self.enclosing(s);
        }
    }

    // ---- resolution ----------------------------------------------------

    /// Resolve a variable reference by walking scopes outward.
    pub fn resolve_var(&self, scope: ScopeRef, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            let found = match s {
                ScopeRef::Global => self
                    .global
                    .const_symbols
                    .iter()
                    .find(|v| self.symbols[v.0].name == name),
                ScopeRef::Local(id) => self.locals[id.0]
                    .local_vars
                    .iter()
                    .find(|v| self.symbols[v.0].name == name),
                ScopeRef::Func(id) => self.funcs[id.0]
                    .params
                    .iter()
                    .find(|v| self.symbols[v.0].name == name),
                ScopeRef::Class(_) => None,
            };
            if let Some(found) = found {
                return Some(*found);
            }
            current = self.enclosing(s);
        }
        None
    }

    /// The `self` receiver of the innermost member function, if any.
    pub fn resolve_receiver(&self, scope: ScopeRef) -> Option<SymbolId> {
        let func = self.enclosing_func(scope)?;
        let func = self.func(func);
        if !func.is_member_func {
            return None;
        }
        func.params
            .iter()
            .find(|p| self.symbols[p.0].name == "self")
            .copied()
    }

    /// The innermost enclosing function scope.
    pub fn enclosing_func(&self, scope: ScopeRef) -> Option<FuncId> {
        let mut current = Some(scope);
        while let Some(s) = current {
            if let ScopeRef::Func(id) = s {
                return Some(id);
            }
            current = self.enclosing(s);
        }
        None
    }

    pub fn resolve_class_by_name(&self, name: &str) -> Option<ClassId> {
        self.global
            .classes
            .iter()
            .copied()
            .find(|c| self.classes[c.0].name == name)
    }

    /// Collect candidate function scopes with the given name along the
    /// resolution chain: enclosing class members first, then globals.
    pub fn collect_funcs_by_name(&self, scope: ScopeRef, name: &str) -> Vec<FuncId> {
        let mut candidates = vec![];
        let mut current = Some(scope);
        while let Some(s) = current {
            if let ScopeRef::Class(id) = s {
                candidates.extend(
                    self.classes[id.0]
                        .member_funcs
                        .iter()
                        .copied()
                        .filter(|f| self.funcs[f.0].name == name),
                );
            }
            current = self.enclosing(s);
        }
        candidates.extend(
            self.global
                .functions
                .iter()
                .copied()
                .filter(|f| self.funcs[f.0].name == name),
        );
        candidates
    }

    /// Overload equality: same name, same arity, structurally equal
    /// parameter types after template substitution.
    pub fn overload_eq(&self, left: FuncId, right: FuncId) -> bool {
        let (l, r) = (self.func(left), self.func(right));
        if l.name != r.name || l.params.len() != r.params.len() {
            return false;
        }
        l.params.iter().zip(&r.params).all(|(lp, rp)| {
            match (&self.symbols[lp.0].typ, &self.symbols[rp.0].typ) {
                (Some(lt), Some(rt)) => lt.overload_eq(rt),
                // missing types only occur on invalid parameters; treat
                // them as equal so the error is reported once
                _ => true,
            }
        })
    }

    pub fn instance_var_offset(&self, class: ClassId, name: &str) -> Option<usize> {
        self.classes[class.0]
            .instance_vars
            .iter()
            .position(|v| self.symbols[v.0].name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::generate_id;

    fn symbol(name: &str, line: usize) -> VarSymbol {
        VarSymbol {
            name: name.to_string(),
            ast_node: generate_id(),
            immutable: true,
            is_global: false,
            typ: Some(super::super::types::INT),
            location: Location {
                line,
                col: 1,
                length: name.len(),
                path: None,
            },
        }
    }

    #[test]
    fn test_resolve_walks_outward() {
        let mut tree = ScopeTree::new(generate_id());
        let mut sink = DiagnosticSink::new();

        let outer = tree.alloc_local(ScopeRef::Global);
        let inner = tree.alloc_local(ScopeRef::Local(outer));
        tree.define_local_var(outer, symbol("x", 1), &mut sink);

        assert!(tree.resolve_var(ScopeRef::Local(inner), "x").is_some());
        assert!(tree.resolve_var(ScopeRef::Local(inner), "y").is_none());
        assert_eq!(sink.failed, 0);
    }

    #[test]
    fn test_duplicate_in_same_scope_is_error() {
        let mut tree = ScopeTree::new(generate_id());
        let mut sink = DiagnosticSink::new();

        let scope = tree.alloc_local(ScopeRef::Global);
        assert!(tree
            .define_local_var(scope, symbol("x", 1), &mut sink)
            .is_some());
        assert!(tree
            .define_local_var(scope, symbol("x", 2), &mut sink)
            .is_none());
        assert_eq!(sink.failed, 1);
    }

    #[test]
    fn test_builtin_prefix_rejected() {
        let mut tree = ScopeTree::new(generate_id());
        let mut sink = DiagnosticSink::new();

        let scope = tree.alloc_local(ScopeRef::Global);
        assert!(tree
            .define_local_var(scope, symbol("__builtin_x", 1), &mut sink)
            .is_none());
        assert_eq!(sink.failed, 1);
    }

    #[test]
    fn test_shadowing_local_warns_but_defines() {
        let mut tree = ScopeTree::new(generate_id());
        let mut sink = DiagnosticSink::new();

        let outer = tree.alloc_local(ScopeRef::Global);
        let inner = tree.alloc_local(ScopeRef::Local(outer));
        tree.define_local_var(outer, symbol("x", 1), &mut sink);
        let shadowing = tree.define_local_var(inner, symbol("x", 2), &mut sink);

        assert!(shadowing.is_some());
        assert_eq!(sink.failed, 0);
        assert_eq!(sink.messages.len(), 1);
    }

    #[test]
    fn test_shadowing_global_is_silent() {
        let mut tree = ScopeTree::new(generate_id());
        let mut sink = DiagnosticSink::new();

        let mut global_sym = symbol("g", 1);
        global_sym.is_global = true;
        tree.define_global_constant(global_sym, &mut sink);

        let scope = tree.alloc_local(ScopeRef::Global);
        tree.define_local_var(scope, symbol("g", 2), &mut sink);

        assert_eq!(sink.failed, 0);
        assert!(sink.messages.is_empty());
    }
}
