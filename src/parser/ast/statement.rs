use serde::{Deserialize, Serialize};

use super::{Expression, FuncKind, IfKind, Location, NodeId, TypeName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Expression(Expression),
    Assignment(AssignmentStmt),
    VariableDecl(VariableDecl),
    Initialize(InitializeStmt),
    If(IfStmt),
    Switch(SwitchStmt),
    Return(ReturnStmt),
    For(ForStmt),
    While(WhileStmt),
    PostfixIf(PostfixIfStmt),
    Block(StatementBlock),
}

impl Statement {
    pub fn location(&self) -> &Location {
        match self {
            Statement::Expression(e) => e.location(),
            Statement::Assignment(s) => &s.location,
            Statement::VariableDecl(s) => &s.location,
            Statement::Initialize(s) => &s.location,
            Statement::If(s) => &s.location,
            Statement::Switch(s) => &s.location,
            Statement::Return(s) => &s.location,
            Statement::For(s) => &s.location,
            Statement::While(s) => &s.location,
            Statement::PostfixIf(s) => &s.location,
            Statement::Block(s) => &s.location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentStmt {
    pub id: NodeId,
    pub location: Location,
    pub lhs: Vec<Expression>,
    pub op: String,
    pub rhs: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub id: NodeId,
    pub location: Location,
    pub is_var: bool,
    pub name: String,
    pub annotation: Option<TypeName>,
}

/// `decls := exprs` — multiple declarations initialized from multiple
/// right-hand sides (or a `var x : T` declaration without initializer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeStmt {
    pub id: NodeId,
    pub location: Location,
    pub decls: Vec<VariableDecl>,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementBlock {
    pub id: NodeId,
    pub location: Location,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmtClause {
    pub condition: Expression,
    pub body: StatementBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfStmt {
    pub id: NodeId,
    pub location: Location,
    pub kind: IfKind,
    pub clauses: Vec<IfStmtClause>,
    pub else_block: Option<StatementBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStmtClause {
    pub values: Vec<Expression>,
    pub body: StatementBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchStmt {
    pub id: NodeId,
    pub location: Location,
    pub scrutinee: Expression,
    pub clauses: Vec<SwitchStmtClause>,
    pub else_block: Option<StatementBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnStmt {
    pub id: NodeId,
    pub location: Location,
    pub values: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStmt {
    pub id: NodeId,
    pub location: Location,
    pub iter_vars: Vec<Parameter>,
    pub range: Expression,
    pub body: StatementBlock,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhileStmt {
    pub id: NodeId,
    pub location: Location,
    pub condition: Expression,
    pub body: StatementBlock,
}

/// `stmt if cond` / `stmt unless cond`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostfixIfStmt {
    pub id: NodeId,
    pub location: Location,
    pub body: Box<Statement>,
    pub kind: IfKind,
    pub condition: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub id: NodeId,
    pub location: Location,
    pub is_var: bool,
    pub name: String,
    pub annotation: Option<TypeName>,
}

/// Marker for the special member functions of a class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpecialFunc {
    None,
    Ctor,
    Copier,
    Converter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub id: NodeId,
    pub location: Location,
    pub kind: FuncKind,
    pub name: String,
    pub params: Vec<Parameter>,
    pub return_type: Option<TypeName>,
    pub body: StatementBlock,
    pub ensure_block: Option<StatementBlock>,
    pub accessibility: bool,
    pub special: SpecialFunc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub id: NodeId,
    pub location: Location,
    pub name: String,
    /// Ordered: instance variable offsets follow declaration order.
    pub instance_vars: Vec<VariableDecl>,
    pub member_funcs: Vec<FunctionDef>,
}
