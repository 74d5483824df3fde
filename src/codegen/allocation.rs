//! The allocation contract: `malloc` with an element type and count, and
//! `realloc` against the externally linked `realloc(i8*, i64)`.
//!
//! A compile-time zero count produces the typed null constant without any
//! call. A runtime count branches explicitly: the current block jumps to a
//! merge block (null) or to a nonzero block performing the allocation, and
//! a phi joins the two pointers — exactly one allocation site executes.

use crate::ir::{IrType, Value};
use crate::semantics::types::Type;

use super::emitter::IrEmitter;
use super::CodegenResult;

impl IrEmitter<'_> {
    /// `malloc(elem_type)` is `malloc(elem_type, 1)`.
    pub(crate) fn emit_malloc_one(&mut self, elem: &Type) -> CodegenResult<Value> {
        let one = self.builder.const_int(IrType::I64, 1);
        self.emit_malloc(elem, one)
    }

    pub(crate) fn emit_malloc(&mut self, elem: &Type, count: Value) -> CodegenResult<Value> {
        if let Some(n) = count.const_value() {
            return self.emit_malloc_const(elem, n as u64);
        }

        let elem_ty = self
            .types
            .emit_alloc_type(&mut self.builder, self.ctx, elem)?;
        let ptr_ty = elem_ty.clone().ptr_to();
        self.emit_null_on_zero_otherwise(count.clone(), ptr_ty, move |emitter| {
            Ok(emitter.builder.build_malloc(elem_ty, count))
        })
    }

    fn emit_malloc_const(&mut self, elem: &Type, count: u64) -> CodegenResult<Value> {
        let elem_ty = self
            .types
            .emit_alloc_type(&mut self.builder, self.ctx, elem)?;
        if count == 0 {
            return Ok(self.builder.const_null(elem_ty.ptr_to()));
        }
        let count = self.builder.const_int(IrType::I64, count as i64);
        Ok(self.builder.build_malloc(elem_ty, count))
    }

    /// Allocate a fixed-size array value: `malloc [N x elem], 1`.
    pub(crate) fn emit_malloc_fixed_array(
        &mut self,
        element: &Type,
        size: u64,
    ) -> CodegenResult<Value> {
        let array_ty = self
            .types
            .emit_alloc_fixed_array(&mut self.builder, self.ctx, element, size)?;
        let one = self.builder.const_int(IrType::I64, 1);
        Ok(self.builder.build_malloc(array_ty, one))
    }

    pub(crate) fn emit_realloc(&mut self, ptr: Value, count: Value) -> CodegenResult<Value> {
        if let Some(n) = count.const_value() {
            if n == 0 {
                return Ok(self.builder.const_null(ptr.ty()));
            }
            return self.emit_realloc_call(ptr, count);
        }

        let ptr_ty = ptr.ty();
        self.emit_null_on_zero_otherwise(count.clone(), ptr_ty, move |emitter| {
            emitter.emit_realloc_call(ptr, count)
        })
    }

    fn emit_realloc_call(&mut self, ptr: Value, count: Value) -> CodegenResult<Value> {
        let ptr_ty = ptr.ty();
        let elem_size = match ptr_ty.pointee() {
            Some(elem) => self.builder.module.alloc_size_of(elem),
            None => {
                return Err(super::CodegenError::internal(
                    "realloc of a non-pointer value",
                ))
            }
        };

        // byte size = count * sizeof(elem), folded when the count is known
        let byte_size = match count.const_value() {
            Some(n) => self
                .builder
                .const_int(IrType::I64, n * elem_size as i64),
            None => {
                let size = self.builder.const_int(IrType::I64, elem_size as i64);
                self.builder.build_binop("mul", count, size)
            }
        };

        let realloc = self.builder.declare_function(
            "realloc",
            vec![IrType::i8_ptr(), IrType::I64],
            IrType::i8_ptr(),
        );
        let casted = self.builder.build_bitcast(ptr, IrType::i8_ptr());
        let reallocated = self.builder.build_call(realloc, vec![casted, byte_size]);
        Ok(self.builder.build_bitcast(reallocated, ptr_ty))
    }

    /// Branch on `size == 0`: the merge block receives a typed null from
    /// the branching block and the allocation result from the nonzero
    /// block.
    fn emit_null_on_zero_otherwise(
        &mut self,
        size: Value,
        ptr_ty: IrType,
        unless_zero: impl FnOnce(&mut Self) -> CodegenResult<Value>,
    ) -> CodegenResult<Value> {
        let func = self.builder.current_function();
        let zero_block = self.builder.current_block();
        let nonzero_block = self.builder.append_block(func, "alloc.nonzero");
        let merge_block = self.builder.append_block(func, "alloc.merge");

        let zero = self.builder.const_int(IrType::I64, 0);
        let cond = self.builder.build_icmp("eq", size, zero);
        self.builder.build_cond_br(cond, merge_block, nonzero_block);

        self.builder.position_at_end(func, nonzero_block);
        let nonnull_value = unless_zero(self)?;
        debug_assert_eq!(nonnull_value.ty(), ptr_ty);
        let nonzero_end = self.builder.current_block();
        self.builder.build_br(merge_block);

        self.builder.position_at_end(func, merge_block);
        let null = self.builder.const_null(ptr_ty.clone());
        let phi = self.builder.build_phi(ptr_ty);
        self.builder.add_incoming(&phi, null, zero_block);
        self.builder.add_incoming(&phi, nonnull_value, nonzero_end);
        Ok(phi)
    }
}

#[cfg(test)]
mod tests {
    use crate::codegen::emitter::{test_emitter, IrEmitter};
    use crate::ir::{IrType, Value};
    use crate::semantics::types::INT;
    use crate::semantics::SemanticContext;

    /// Position the emitter inside `void t(i64 n)` and return `%n`.
    fn enter_test_function(emitter: &mut IrEmitter) -> Value {
        let func = emitter
            .builder
            .add_function("t", vec![("n".to_string(), IrType::I64)], IrType::Void);
        let entry = emitter.builder.append_block(func, "entry");
        emitter.builder.position_at_end(func, entry);
        emitter.builder.param_value(func, 0)
    }

    #[test]
    fn test_malloc_zero_is_typed_null() {
        let ctx = SemanticContext::default();
        let mut emitter = test_emitter(&ctx);
        enter_test_function(&mut emitter);

        let zero = emitter.builder.const_int(IrType::I64, 0);
        let value = emitter.emit_malloc(&INT, zero).unwrap();
        assert_eq!(value, Value::Null(IrType::I64.ptr_to()));
    }

    #[test]
    fn test_malloc_constant_count() {
        let ctx = SemanticContext::default();
        let mut emitter = test_emitter(&ctx);
        enter_test_function(&mut emitter);

        let four = emitter.builder.const_int(IrType::I64, 4);
        let value = emitter.emit_malloc(&INT, four).unwrap();
        assert_eq!(value.ty(), IrType::I64.ptr_to());

        let printed = emitter.builder.module.to_string();
        assert!(printed.contains("malloc i64, i64 4"));
        // no branching for a compile-time count
        assert!(!printed.contains("alloc.nonzero"));
    }

    #[test]
    fn test_malloc_runtime_count_branches_on_zero() {
        let ctx = SemanticContext::default();
        let mut emitter = test_emitter(&ctx);
        let count = enter_test_function(&mut emitter);

        let value = emitter.emit_malloc(&INT, count).unwrap();
        assert_eq!(value.ty(), IrType::I64.ptr_to());

        let printed = emitter.builder.module.to_string();
        assert!(printed.contains("icmp eq i64 %n, 0"));
        assert!(printed.contains("alloc.nonzero"));
        assert!(printed.contains("alloc.merge"));
        assert!(printed.contains("phi i64* [ null, %entry ], [ %t2, %alloc.nonzero ]"));
    }

    #[test]
    fn test_realloc_scales_by_element_size() {
        let ctx = SemanticContext::default();
        let mut emitter = test_emitter(&ctx);
        let count = enter_test_function(&mut emitter);

        let one = emitter.builder.const_int(IrType::I64, 1);
        let ptr = emitter.emit_malloc(&INT, one).unwrap();
        emitter.emit_realloc(ptr, count).unwrap();

        let printed = emitter.builder.module.to_string();
        // byte size = n * sizeof(i64)
        assert!(printed.contains("mul i64 %n, 8"));
        assert!(printed.contains("declare i8* @\"realloc\"(i8*, i64)"));
        assert!(printed.contains("call i8* @\"realloc\""));
    }

    #[test]
    fn test_realloc_constant_count_is_folded() {
        let ctx = SemanticContext::default();
        let mut emitter = test_emitter(&ctx);
        enter_test_function(&mut emitter);

        let one = emitter.builder.const_int(IrType::I64, 1);
        let ptr = emitter.emit_malloc(&INT, one).unwrap();
        let three = emitter.builder.const_int(IrType::I64, 3);
        emitter.emit_realloc(ptr, three).unwrap();

        let printed = emitter.builder.module.to_string();
        assert!(printed.contains("call i8* @\"realloc\"(i8* %t1, i64 24)"));
        assert!(!printed.contains("mul"));
    }

    #[test]
    fn test_realloc_zero_is_typed_null_without_call() {
        let ctx = SemanticContext::default();
        let mut emitter = test_emitter(&ctx);
        enter_test_function(&mut emitter);

        let one = emitter.builder.const_int(IrType::I64, 1);
        let ptr = emitter.emit_malloc(&INT, one).unwrap();
        let zero = emitter.builder.const_int(IrType::I64, 0);
        let value = emitter.emit_realloc(ptr, zero).unwrap();

        assert_eq!(value, Value::Null(IrType::I64.ptr_to()));
        assert!(!emitter.builder.module.to_string().contains("realloc"));
    }
}
