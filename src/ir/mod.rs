//! The low-level SSA IR the code generator targets.
//!
//! This module provides the operations the emitter asks of a backend:
//! a [`Module`] of named struct types, globals and functions, basic blocks
//! with explicit terminators, an instruction set with typed values, and a
//! [`Builder`] managing the insertion point. The textual form printed by
//! [`Module::to_string`] is LLVM-flavored and is what `--emit-llvm` shows.

mod builder;
mod types;
mod value;

pub use builder::Builder;
pub use types::IrType;
pub use value::{BlockId, Inst, InstId, Value};

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    /// Raw bytes, printed as a constant byte array (used for string
    /// literals, always NUL-terminated by the emitter).
    Bytes(Vec<u8>),
    Int(i64),
    Float(f64),
    Null,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GlobalDef {
    pub name: String,
    pub ty: IrType,
    pub init: GlobalInit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub label: String,
    pub insts: Vec<InstId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<(String, IrType)>,
    pub ret: IrType,
    pub blocks: Vec<Block>,
    pub insts: Vec<Inst>,
    pub is_declaration: bool,
}

impl Function {
    pub fn fn_type(&self) -> IrType {
        IrType::Func {
            params: self.params.iter().map(|(_, t)| t.clone()).collect(),
            ret: Box::new(self.ret.clone()),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub structs: Vec<(String, Vec<IrType>)>,
    pub globals: Vec<GlobalDef>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Module {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn struct_fields(&self, name: &str) -> Option<&[IrType]> {
        self.structs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, fields)| fields.as_slice())
    }

    /// Allocation size in bytes; fields are packed without padding.
    pub fn alloc_size_of(&self, ty: &IrType) -> u64 {
        match ty {
            IrType::Void => 0,
            IrType::I1 | IrType::I8 => 1,
            IrType::I64 | IrType::Double | IrType::Ptr(_) | IrType::Func { .. } => 8,
            IrType::Struct(fields) => fields.iter().map(|f| self.alloc_size_of(f)).sum(),
            IrType::Named(name) => self
                .struct_fields(name)
                .map(|fields| fields.iter().map(|f| self.alloc_size_of(f)).sum())
                .unwrap_or(0),
            IrType::Array(elem, size) => self.alloc_size_of(elem) * size,
        }
    }

    /// Field types of a struct type, resolving named structs.
    pub fn fields_of(&self, ty: &IrType) -> Option<Vec<IrType>> {
        match ty {
            IrType::Struct(fields) => Some(fields.clone()),
            IrType::Named(name) => self.struct_fields(name).map(|f| f.to_vec()),
            _ => None,
        }
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut out = String::new();
    for byte in bytes {
        match byte {
            b'"' | b'\\' => out.push_str(&format!("\\{byte:02X}")),
            0x20..=0x7e => out.push(*byte as char),
            _ => out.push_str(&format!("\\{byte:02X}")),
        }
    }
    out
}

fn typed_operand(value: &Value) -> String {
    format!("{} {}", value.ty(), value)
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; ModuleID = '{}'", self.name)?;

        for (name, fields) in &self.structs {
            let fields = fields
                .iter()
                .map(|t| t.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "%{name} = type {{ {fields} }}")?;
        }
        if !self.structs.is_empty() {
            writeln!(f)?;
        }

        for global in &self.globals {
            match &global.init {
                GlobalInit::Bytes(bytes) => writeln!(
                    f,
                    "@{} = private constant {} c\"{}\"",
                    global.name,
                    global.ty,
                    escape_bytes(bytes)
                )?,
                GlobalInit::Int(value) => {
                    writeln!(f, "@{} = global {} {}", global.name, global.ty, value)?
                }
                GlobalInit::Float(value) => {
                    writeln!(f, "@{} = global {} {:e}", global.name, global.ty, value)?
                }
                GlobalInit::Null => {
                    writeln!(f, "@{} = global {} null", global.name, global.ty)?
                }
            }
        }
        if !self.globals.is_empty() {
            writeln!(f)?;
        }

        for function in &self.functions {
            if function.is_declaration {
                let params = function
                    .params
                    .iter()
                    .map(|(_, t)| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                writeln!(f, "declare {} @\"{}\"({params})", function.ret, function.name)?;
            }
        }
        writeln!(f)?;

        for function in &self.functions {
            if function.is_declaration {
                continue;
            }
            let params = function
                .params
                .iter()
                .map(|(name, t)| format!("{t} %{name}"))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "define {} @\"{}\"({params}) {{", function.ret, function.name)?;
            for block in &function.blocks {
                writeln!(f, "{}:", block.label)?;
                for inst_id in &block.insts {
                    let inst = &function.insts[inst_id.0];
                    write_inst(f, function, *inst_id, inst)?;
                }
            }
            writeln!(f, "}}")?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn write_inst(
    f: &mut fmt::Formatter<'_>,
    function: &Function,
    id: InstId,
    inst: &Inst,
) -> fmt::Result {
    let label = |block: &BlockId| format!("%{}", function.blocks[block.0].label);
    let dest = format!("%t{}", id.0);

    match inst {
        Inst::Alloca { ty } => writeln!(f, "  {dest} = alloca {ty}"),
        Inst::Load { ptr, ty } => writeln!(f, "  {dest} = load {ty}, {}", typed_operand(ptr)),
        Inst::Store { value, ptr } => writeln!(
            f,
            "  store {}, {}",
            typed_operand(value),
            typed_operand(ptr)
        ),
        Inst::BinOp { op, ty, lhs, rhs } => {
            writeln!(f, "  {dest} = {op} {ty} {lhs}, {rhs}")
        }
        Inst::ICmp { cond, lhs, rhs } => writeln!(
            f,
            "  {dest} = icmp {cond} {} {lhs}, {rhs}",
            lhs.ty()
        ),
        Inst::FCmp { cond, lhs, rhs } => writeln!(
            f,
            "  {dest} = fcmp {cond} {} {lhs}, {rhs}",
            lhs.ty()
        ),
        Inst::Call { callee, args, ret } => {
            let args = args
                .iter()
                .map(typed_operand)
                .collect::<Vec<_>>()
                .join(", ");
            if *ret == IrType::Void {
                writeln!(f, "  call void {callee}({args})")
            } else {
                writeln!(f, "  {dest} = call {ret} {callee}({args})")
            }
        }
        Inst::Malloc { elem_ty, count } => {
            writeln!(f, "  {dest} = malloc {elem_ty}, {}", typed_operand(count))
        }
        Inst::Gep { base, indices, .. } => {
            let indices = indices
                .iter()
                .map(typed_operand)
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "  {dest} = getelementptr {}, {indices}", typed_operand(base))
        }
        Inst::Bitcast { value, to } => {
            writeln!(f, "  {dest} = bitcast {} to {to}", typed_operand(value))
        }
        Inst::Conv { op, value, to } => {
            writeln!(f, "  {dest} = {op} {} to {to}", typed_operand(value))
        }
        Inst::Phi { ty, incomings } => {
            let incomings = incomings
                .iter()
                .map(|(value, block)| format!("[ {value}, {} ]", label(block)))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(f, "  {dest} = phi {ty} {incomings}")
        }
        Inst::Ret(Some(value)) => writeln!(f, "  ret {}", typed_operand(value)),
        Inst::Ret(None) => writeln!(f, "  ret void"),
        Inst::Br(block) => writeln!(f, "  br label {}", label(block)),
        Inst::CondBr {
            cond,
            then_block,
            else_block,
        } => writeln!(
            f,
            "  br i1 {cond}, label {}, label {}",
            label(then_block),
            label(else_block)
        ),
        Inst::Unreachable => writeln!(f, "  unreachable"),
    }
}
