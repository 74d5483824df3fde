//! Instruction builder with an explicit insertion point.

use super::types::IrType;
use super::value::{BlockId, Inst, InstId, Value};
use super::{Block, Function, GlobalDef, GlobalInit, Module};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionRef(pub usize);

#[derive(Debug)]
pub struct Builder {
    pub module: Module,
    cur_func: Option<usize>,
    cur_block: Option<BlockId>,
    string_counter: usize,
}

impl Builder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Builder {
            module: Module::new(module_name),
            cur_func: None,
            cur_block: None,
            string_counter: 0,
        }
    }

    pub fn finish(self) -> Module {
        self.module
    }

    // ---- functions and blocks ------------------------------------------

    pub fn add_function(
        &mut self,
        name: impl Into<String>,
        params: Vec<(String, IrType)>,
        ret: IrType,
    ) -> FunctionRef {
        self.module.functions.push(Function {
            name: name.into(),
            params,
            ret,
            blocks: vec![],
            insts: vec![],
            is_declaration: false,
        });
        FunctionRef(self.module.functions.len() - 1)
    }

    /// Declare an external symbol (or return the existing declaration).
    pub fn declare_function(
        &mut self,
        name: &str,
        params: Vec<IrType>,
        ret: IrType,
    ) -> Value {
        if let Some(existing) = self.module.functions.iter().find(|f| f.name == name) {
            return Value::Function {
                name: name.to_string(),
                ty: existing.fn_type(),
            };
        }
        let function = Function {
            name: name.to_string(),
            params: params.into_iter().map(|t| (String::new(), t)).collect(),
            ret,
            blocks: vec![],
            insts: vec![],
            is_declaration: true,
        };
        let ty = function.fn_type();
        self.module.functions.push(function);
        Value::Function {
            name: name.to_string(),
            ty,
        }
    }

    pub fn function_value(&self, func: FunctionRef) -> Value {
        let function = &self.module.functions[func.0];
        Value::Function {
            name: function.name.clone(),
            ty: function.fn_type(),
        }
    }

    pub fn lookup_function(&self, name: &str) -> Option<Value> {
        self.module
            .functions
            .iter()
            .find(|f| f.name == name)
            .map(|f| Value::Function {
                name: f.name.clone(),
                ty: f.fn_type(),
            })
    }

    pub fn param_value(&self, func: FunctionRef, index: usize) -> Value {
        let (name, ty) = self.module.functions[func.0].params[index].clone();
        Value::Param { name, index, ty }
    }

    /// Append a basic block; the label hint is uniquified per function.
    pub fn append_block(&mut self, func: FunctionRef, hint: &str) -> BlockId {
        let function = &mut self.module.functions[func.0];
        let mut label = hint.to_string();
        let mut counter = 1;
        while function.blocks.iter().any(|b| b.label == label) {
            label = format!("{hint}{counter}");
            counter += 1;
        }
        function.blocks.push(Block {
            label,
            insts: vec![],
        });
        BlockId(function.blocks.len() - 1)
    }

    pub fn position_at_end(&mut self, func: FunctionRef, block: BlockId) {
        self.cur_func = Some(func.0);
        self.cur_block = Some(block);
    }

    pub fn current_function(&self) -> FunctionRef {
        FunctionRef(self.cur_func.expect("no insertion point"))
    }

    pub fn current_block(&self) -> BlockId {
        self.cur_block.expect("no insertion point")
    }

    /// Whether the current block already ends in a terminator.
    pub fn has_terminator(&self) -> bool {
        let function = &self.module.functions[self.cur_func.expect("no insertion point")];
        let block = &function.blocks[self.cur_block.expect("no insertion point").0];
        block
            .insts
            .last()
            .is_some_and(|id| function.insts[id.0].is_terminator())
    }

    // ---- named structs and globals -------------------------------------

    pub fn get_or_define_struct(&mut self, name: &str, fields: Vec<IrType>) -> IrType {
        if self.module.struct_fields(name).is_none() {
            self.module.structs.push((name.to_string(), fields));
        }
        IrType::Named(name.to_string())
    }

    /// Intern a NUL-terminated byte array for a string literal; returns the
    /// address of its first byte as `i8*`.
    pub fn add_global_string(&mut self, text: &str) -> Value {
        let mut bytes = text.as_bytes().to_vec();
        bytes.push(0);
        let name = format!("str.{}", self.string_counter);
        self.string_counter += 1;
        let ty = IrType::Array(Box::new(IrType::I8), bytes.len() as u64);
        self.module.globals.push(GlobalDef {
            name: name.clone(),
            ty: ty.clone(),
            init: GlobalInit::Bytes(bytes),
        });
        Value::Global {
            name,
            ty: IrType::i8_ptr(),
        }
    }

    pub fn add_global(&mut self, name: &str, ty: IrType, init: GlobalInit) -> Value {
        self.module.globals.push(GlobalDef {
            name: name.to_string(),
            ty: ty.clone(),
            init,
        });
        Value::Global {
            name: name.to_string(),
            ty: ty.ptr_to(),
        }
    }

    // ---- instructions --------------------------------------------------

    fn push(&mut self, inst: Inst) -> Value {
        let func = self.cur_func.expect("no insertion point");
        let block = self.cur_block.expect("no insertion point");
        let function = &mut self.module.functions[func];
        let id = InstId(function.insts.len());
        let ty = inst.result_type();
        function.insts.push(inst);
        function.blocks[block.0].insts.push(id);
        Value::Inst { id, ty }
    }

    pub fn build_alloca(&mut self, ty: IrType) -> Value {
        self.push(Inst::Alloca { ty })
    }

    pub fn build_load(&mut self, ptr: Value) -> Value {
        let ty = ptr
            .ty()
            .pointee()
            .cloned()
            .expect("load from a non-pointer value");
        self.push(Inst::Load { ptr, ty })
    }

    pub fn build_store(&mut self, value: Value, ptr: Value) {
        self.push(Inst::Store { value, ptr });
    }

    pub fn build_binop(&mut self, op: &'static str, lhs: Value, rhs: Value) -> Value {
        let ty = lhs.ty();
        self.push(Inst::BinOp { op, ty, lhs, rhs })
    }

    pub fn build_icmp(&mut self, cond: &'static str, lhs: Value, rhs: Value) -> Value {
        self.push(Inst::ICmp { cond, lhs, rhs })
    }

    pub fn build_fcmp(&mut self, cond: &'static str, lhs: Value, rhs: Value) -> Value {
        self.push(Inst::FCmp { cond, lhs, rhs })
    }

    pub fn build_call(&mut self, callee: Value, args: Vec<Value>) -> Value {
        let ret = match callee.ty() {
            IrType::Func { ret, .. } => *ret,
            IrType::Ptr(inner) => match *inner {
                IrType::Func { ret, .. } => *ret,
                _ => panic!("call through a non-function pointer"),
            },
            _ => panic!("call of a non-function value"),
        };
        self.push(Inst::Call { callee, args, ret })
    }

    pub fn build_malloc(&mut self, elem_ty: IrType, count: Value) -> Value {
        self.push(Inst::Malloc { elem_ty, count })
    }

    pub fn build_gep(&mut self, base: Value, indices: Vec<Value>, result: IrType) -> Value {
        self.push(Inst::Gep {
            base,
            indices,
            ty: result,
        })
    }

    /// `getelementptr base, 0, index` addressing one struct field.
    pub fn build_struct_gep(&mut self, base: Value, index: u64, field: IrType) -> Value {
        let indices = vec![self.const_int(IrType::I64, 0), self.const_int(IrType::I64, index as i64)];
        self.build_gep(base, indices, field.ptr_to())
    }

    pub fn build_bitcast(&mut self, value: Value, to: IrType) -> Value {
        if value.ty() == to {
            return value;
        }
        self.push(Inst::Bitcast { value, to })
    }

    pub fn build_conv(&mut self, op: &'static str, value: Value, to: IrType) -> Value {
        self.push(Inst::Conv { op, value, to })
    }

    pub fn build_phi(&mut self, ty: IrType) -> Value {
        self.push(Inst::Phi {
            ty,
            incomings: vec![],
        })
    }

    pub fn add_incoming(&mut self, phi: &Value, value: Value, block: BlockId) {
        let Value::Inst { id, .. } = phi else {
            panic!("add_incoming on a non-instruction value");
        };
        let func = self.cur_func.expect("no insertion point");
        let Inst::Phi { incomings, .. } = &mut self.module.functions[func].insts[id.0] else {
            panic!("add_incoming on a non-phi instruction");
        };
        incomings.push((value, block));
    }

    pub fn build_ret(&mut self, value: Option<Value>) {
        self.push(Inst::Ret(value));
    }

    pub fn build_br(&mut self, block: BlockId) {
        self.push(Inst::Br(block));
    }

    pub fn build_cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.push(Inst::CondBr {
            cond,
            then_block,
            else_block,
        });
    }

    pub fn build_unreachable(&mut self) {
        self.push(Inst::Unreachable);
    }

    // ---- constants -----------------------------------------------------

    pub fn const_int(&self, ty: IrType, value: i64) -> Value {
        Value::ConstInt { ty, value }
    }

    pub fn const_bool(&self, value: bool) -> Value {
        Value::ConstInt {
            ty: IrType::I1,
            value: value as i64,
        }
    }

    pub fn const_null(&self, pointer_ty: IrType) -> Value {
        debug_assert!(pointer_ty.is_pointer());
        Value::Null(pointer_ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_simple_function() {
        let mut builder = Builder::new("test");
        let func = builder.add_function("main", vec![], IrType::I64);
        let entry = builder.append_block(func, "entry");
        builder.position_at_end(func, entry);
        builder.build_ret(Some(builder.const_int(IrType::I64, 0)));

        let printed = builder.finish().to_string();
        assert!(printed.contains("define i64 @\"main\"()"));
        assert!(printed.contains("ret i64 0"));
    }

    #[test]
    fn test_block_labels_are_unique() {
        let mut builder = Builder::new("test");
        let func = builder.add_function("f", vec![], IrType::Void);
        let a = builder.append_block(func, "bb");
        let b = builder.append_block(func, "bb");
        assert_ne!(a, b);
        let function = &builder.module.functions[func.0];
        assert_ne!(function.blocks[a.0].label, function.blocks[b.0].label);
    }

    #[test]
    fn test_has_terminator() {
        let mut builder = Builder::new("test");
        let func = builder.add_function("f", vec![], IrType::Void);
        let entry = builder.append_block(func, "entry");
        builder.position_at_end(func, entry);
        assert!(!builder.has_terminator());
        builder.build_ret(None);
        assert!(builder.has_terminator());
    }

    #[test]
    fn test_phi_incoming_edges() {
        let mut builder = Builder::new("test");
        let func = builder.add_function("f", vec![], IrType::I64);
        let entry = builder.append_block(func, "entry");
        let merge = builder.append_block(func, "merge");
        builder.position_at_end(func, entry);
        builder.build_br(merge);
        builder.position_at_end(func, merge);
        let phi = builder.build_phi(IrType::I64);
        builder.add_incoming(&phi, builder.const_int(IrType::I64, 1), entry);
        builder.build_ret(Some(phi));

        let printed = builder.finish().to_string();
        assert!(printed.contains("phi i64 [ 1, %entry ]"));
    }

    #[test]
    fn test_global_string_is_nul_terminated() {
        let mut builder = Builder::new("test");
        let value = builder.add_global_string("hi");
        assert_eq!(value.ty(), IrType::i8_ptr());
        let global = &builder.module.globals[0];
        assert_eq!(global.ty, IrType::Array(Box::new(IrType::I8), 3));
    }
}
