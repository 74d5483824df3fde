use std::fmt;

use super::types::IrType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

/// SSA values. Every value carries its static type, so the emitter can
/// query types without chasing definitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Inst { id: InstId, ty: IrType },
    ConstInt { ty: IrType, value: i64 },
    ConstFloat(f64),
    /// Typed null pointer; `ty` is the pointer type itself.
    Null(IrType),
    /// Address of a module-scope global.
    Global { name: String, ty: IrType },
    /// Address of a function.
    Function { name: String, ty: IrType },
    /// Parameter of the current function.
    Param { name: String, index: usize, ty: IrType },
    Undef(IrType),
}

impl Value {
    pub fn ty(&self) -> IrType {
        match self {
            Value::Inst { ty, .. }
            | Value::ConstInt { ty, .. }
            | Value::Null(ty)
            | Value::Global { ty, .. }
            | Value::Function { ty, .. }
            | Value::Param { ty, .. }
            | Value::Undef(ty) => ty.clone(),
            Value::ConstFloat(_) => IrType::Double,
        }
    }

    pub fn const_value(&self) -> Option<i64> {
        match self {
            Value::ConstInt { value, .. } => Some(*value),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Inst { id, .. } => write!(f, "%t{}", id.0),
            Value::ConstInt { value, .. } => write!(f, "{value}"),
            Value::ConstFloat(value) => write!(f, "{value:e}"),
            Value::Null(_) => f.write_str("null"),
            Value::Global { name, .. } => write!(f, "@{name}"),
            Value::Function { name, .. } => write!(f, "@\"{name}\""),
            Value::Param { name, .. } => write!(f, "%{name}"),
            Value::Undef(_) => f.write_str("undef"),
        }
    }
}

/// Instructions; the destination register of instruction `i` prints as
/// `%t<i>`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inst {
    Alloca {
        ty: IrType,
    },
    Load {
        ptr: Value,
        ty: IrType,
    },
    Store {
        value: Value,
        ptr: Value,
    },
    BinOp {
        op: &'static str,
        ty: IrType,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        cond: &'static str,
        lhs: Value,
        rhs: Value,
    },
    FCmp {
        cond: &'static str,
        lhs: Value,
        rhs: Value,
    },
    Call {
        callee: Value,
        args: Vec<Value>,
        ret: IrType,
    },
    /// Allocation of `count` elements of `elem_ty`, typed `elem_ty*`.
    Malloc {
        elem_ty: IrType,
        count: Value,
    },
    Gep {
        base: Value,
        indices: Vec<Value>,
        /// Resulting pointer type.
        ty: IrType,
    },
    Bitcast {
        value: Value,
        to: IrType,
    },
    /// Scalar conversions: sitofp, fptosi, uitofp, zext, trunc, ...
    Conv {
        op: &'static str,
        value: Value,
        to: IrType,
    },
    Phi {
        ty: IrType,
        incomings: Vec<(Value, BlockId)>,
    },
    Ret(Option<Value>),
    Br(BlockId),
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

impl Inst {
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Inst::Ret(_) | Inst::Br(_) | Inst::CondBr { .. } | Inst::Unreachable
        )
    }

    /// Type of the value this instruction produces (`Void` for stores,
    /// branches and friends).
    pub fn result_type(&self) -> IrType {
        match self {
            Inst::Alloca { ty } => ty.clone().ptr_to(),
            Inst::Load { ty, .. } => ty.clone(),
            Inst::BinOp { ty, .. } => ty.clone(),
            Inst::ICmp { .. } | Inst::FCmp { .. } => IrType::I1,
            Inst::Call { ret, .. } => ret.clone(),
            Inst::Malloc { elem_ty, .. } => elem_ty.clone().ptr_to(),
            Inst::Gep { ty, .. } => ty.clone(),
            Inst::Bitcast { to, .. } | Inst::Conv { to, .. } => to.clone(),
            Inst::Phi { ty, .. } => ty.clone(),
            Inst::Store { .. }
            | Inst::Ret(_)
            | Inst::Br(_)
            | Inst::CondBr { .. }
            | Inst::Unreachable => IrType::Void,
        }
    }
}
