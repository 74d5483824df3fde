use serde::{Deserialize, Serialize};

use super::{FunctionDef, Location, NodeId, Statement, TypeName};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expression {
    Literal(PrimaryLiteral),
    StringLiteral(StringLiteral),
    SymbolLiteral(SymbolLiteral),
    ArrayLiteral(ArrayLiteral),
    TupleLiteral(TupleLiteral),
    DictLiteral(DictLiteral),
    Lambda(LambdaExpr),
    VarRef(VarRef),
    Invocation(Invocation),
    ObjectConstruct(ObjectConstruct),
    IndexAccess(IndexAccess),
    UfcsInvocation(UfcsInvocation),
    Cast(CastExpr),
    Unary(UnaryExpr),
    Binary(BinaryExpr),
    Block(BlockExpr),
    If(IfExpr),
    Switch(SwitchExpr),
    Typed(TypedExpr),
}

impl Expression {
    pub fn id(&self) -> NodeId {
        match self {
            Expression::Literal(e) => e.id,
            Expression::StringLiteral(e) => e.id,
            Expression::SymbolLiteral(e) => e.id,
            Expression::ArrayLiteral(e) => e.id,
            Expression::TupleLiteral(e) => e.id,
            Expression::DictLiteral(e) => e.id,
            Expression::Lambda(e) => e.id,
            Expression::VarRef(e) => e.id,
            Expression::Invocation(e) => e.id,
            Expression::ObjectConstruct(e) => e.id,
            Expression::IndexAccess(e) => e.id,
            Expression::UfcsInvocation(e) => e.id,
            Expression::Cast(e) => e.id,
            Expression::Unary(e) => e.id,
            Expression::Binary(e) => e.id,
            Expression::Block(e) => e.id,
            Expression::If(e) => e.id,
            Expression::Switch(e) => e.id,
            Expression::Typed(e) => e.id,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            Expression::Literal(e) => &e.location,
            Expression::StringLiteral(e) => &e.location,
            Expression::SymbolLiteral(e) => &e.location,
            Expression::ArrayLiteral(e) => &e.location,
            Expression::TupleLiteral(e) => &e.location,
            Expression::DictLiteral(e) => &e.location,
            Expression::Lambda(e) => &e.location,
            Expression::VarRef(e) => &e.location,
            Expression::Invocation(e) => &e.location,
            Expression::ObjectConstruct(e) => &e.location,
            Expression::IndexAccess(e) => &e.location,
            Expression::UfcsInvocation(e) => &e.location,
            Expression::Cast(e) => &e.location,
            Expression::Unary(e) => &e.location,
            Expression::Binary(e) => &e.location,
            Expression::Block(e) => &e.location,
            Expression::If(e) => &e.location,
            Expression::Switch(e) => &e.location,
            Expression::Typed(e) => &e.location,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LiteralValue {
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(char),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryLiteral {
    pub id: NodeId,
    pub location: Location,
    pub value: LiteralValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StringLiteral {
    pub id: NodeId,
    pub location: Location,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolLiteral {
    pub id: NodeId,
    pub location: Location,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayLiteral {
    pub id: NodeId,
    pub location: Location,
    pub elements: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleLiteral {
    pub id: NodeId,
    pub location: Location,
    pub elements: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictLiteral {
    pub id: NodeId,
    pub location: Location,
    pub entries: Vec<(Expression, Expression)>,
}

/// A lambda expression wraps an anonymous function definition. The forward
/// analyzer assigns the synthetic `lambda.<line>.<col>.<length>` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LambdaExpr {
    pub id: NodeId,
    pub location: Location,
    pub def: Box<FunctionDef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarRef {
    pub id: NodeId,
    pub location: Location,
    pub name: String,
}

/// Function invocation: callee, positional arguments and an optional
/// trailing block. Method-call sugar `recv.f(args)` is parsed as
/// `f(recv, args...)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    pub id: NodeId,
    pub location: Location,
    pub callee: Box<Expression>,
    pub args: Vec<Expression>,
    pub do_block: Option<Box<FunctionDef>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectConstruct {
    pub id: NodeId,
    pub location: Location,
    pub obj_type: TypeName,
    pub args: Vec<Expression>,
    pub do_block: Option<Box<FunctionDef>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAccess {
    pub id: NodeId,
    pub location: Location,
    pub child: Box<Expression>,
    pub index: Box<Expression>,
}

/// `receiver.name` without parentheses; resolved later to an instance
/// variable, member function or free function taking the receiver first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UfcsInvocation {
    pub id: NodeId,
    pub location: Location,
    pub child: Box<Expression>,
    pub member_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CastExpr {
    pub id: NodeId,
    pub location: Location,
    pub child: Box<Expression>,
    pub target: TypeName,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnaryExpr {
    pub id: NodeId,
    pub location: Location,
    pub op: String,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpr {
    pub id: NodeId,
    pub location: Location,
    pub op: String,
    pub lhs: Box<Expression>,
    pub rhs: Box<Expression>,
}

/// Statements followed by a tail expression (`begin ... end`, `let ... in`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockExpr {
    pub id: NodeId,
    pub location: Location,
    pub statements: Vec<Statement>,
    pub value: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfClause {
    pub condition: Expression,
    pub body: BlockExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfExpr {
    pub id: NodeId,
    pub location: Location,
    pub kind: super::IfKind,
    pub clauses: Vec<IfClause>,
    pub else_block: Box<BlockExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchExprClause {
    pub values: Vec<Expression>,
    pub body: BlockExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchExpr {
    pub id: NodeId,
    pub location: Location,
    pub scrutinee: Box<Expression>,
    pub clauses: Vec<SwitchExprClause>,
    pub else_block: Box<BlockExpr>,
}

/// An expression annotated with a type: `expr : type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypedExpr {
    pub id: NodeId,
    pub location: Location,
    pub child: Box<Expression>,
    pub annotation: TypeName,
}
