//! Mapping from the semantic type lattice to IR types.
//!
//! Class struct types are memoized by class scope identity and named
//! `class.<name>`. Aggregates (tuple, array, dict, class, range) are always
//! represented as pointers to their storage.

use std::collections::HashMap;

use crate::ir::{Builder, IrType};
use crate::semantics::scope::ClassId;
use crate::semantics::types::{BuiltinType, Type};
use crate::semantics::SemanticContext;

use super::{CodegenError, CodegenResult};

#[derive(Debug, Default)]
pub struct TypeIrEmitter {
    class_table: HashMap<ClassId, IrType>,
}

impl TypeIrEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(
        &mut self,
        builder: &mut Builder,
        ctx: &SemanticContext,
        typ: &Type,
    ) -> CodegenResult<IrType> {
        match typ {
            Type::Builtin(builtin) => Ok(match builtin {
                BuiltinType::Int | BuiltinType::Uint | BuiltinType::Symbol => IrType::I64,
                BuiltinType::Float => IrType::Double,
                BuiltinType::Char => IrType::I8,
                BuiltinType::Bool => IrType::I1,
                BuiltinType::String => IrType::i8_ptr(),
            }),
            Type::Class(class, _) => {
                if let Some(cached) = self.class_table.get(class) {
                    return Ok(cached.clone());
                }
                let scope = ctx.scopes.class(*class);
                let mut fields = Vec::with_capacity(scope.instance_vars.len());
                for symbol in &scope.instance_vars {
                    let Some(field_type) = ctx.scopes.symbol(*symbol).typ.clone() else {
                        return Err(CodegenError::internal(format!(
                            "instance variable of class '{}' has no type",
                            scope.name
                        )));
                    };
                    fields.push(self.emit(builder, ctx, &field_type)?);
                }
                let name = format!("class.{}", scope.name);
                let emitted = builder.get_or_define_struct(&name, fields).ptr_to();
                self.class_table.insert(*class, emitted.clone());
                Ok(emitted)
            }
            Type::Tuple(elements) => {
                let fields = elements
                    .iter()
                    .map(|e| self.emit(builder, ctx, e))
                    .collect::<CodegenResult<Vec<_>>>()?;
                Ok(IrType::Struct(fields).ptr_to())
            }
            Type::Array(element, Some(size)) => {
                Ok(self.emit_alloc_fixed_array(builder, ctx, element, *size)?.ptr_to())
            }
            // without a static size the higher layer carries the length;
            // the storage is addressed through the element pointer
            Type::Array(element, None) => {
                Ok(self.emit_element_type(builder, ctx, element)?.ptr_to())
            }
            Type::Pointer(pointee) => {
                let inner = self.emit(builder, ctx, pointee)?;
                if pointee.is_aggregate() {
                    // aggregates are already pointers: i64* -> i64*,
                    // {i64, double}* -> {i64, double}*
                    Ok(inner)
                } else {
                    Ok(inner.ptr_to())
                }
            }
            Type::Func { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.emit(builder, ctx, p))
                    .collect::<CodegenResult<Vec<_>>>()?;
                let ret = match ret {
                    Some(ret) => self.emit(builder, ctx, ret)?,
                    None => IrType::Void,
                };
                Ok(IrType::Func {
                    params,
                    ret: Box::new(ret),
                }
                .ptr_to())
            }
            Type::GenericFunc(func) => {
                let captures = ctx.captures_of(*func);
                let mut fields = Vec::with_capacity(captures.len());
                for capture in captures {
                    let Some(capture_type) = ctx.scopes.symbol(*capture).typ.clone() else {
                        return Err(CodegenError::internal(
                            "captured variable has no type".to_string(),
                        ));
                    };
                    fields.push(self.emit(builder, ctx, &capture_type)?);
                }
                Ok(IrType::Struct(fields).ptr_to())
            }
            Type::Dict(key, value) => {
                let key = self.emit_element_type(builder, ctx, key)?;
                let value = self.emit_element_type(builder, ctx, value)?;
                Ok(IrType::Struct(vec![key.ptr_to(), value.ptr_to(), IrType::I64]).ptr_to())
            }
            Type::Range { begin, end, .. } => {
                let begin = self.emit(builder, ctx, begin)?;
                let end = self.emit(builder, ctx, end)?;
                Ok(IrType::Struct(vec![begin, end]).ptr_to())
            }
            Type::Qualified(_) => Err(CodegenError::at(
                &Default::default(),
                format!("qualified type '{typ}' can not be lowered"),
            )),
            Type::Template(_) => Err(CodegenError::internal(format!(
                "template type '{typ}' reached code generation"
            ))),
        }
    }

    /// The value type to pass to malloc: one pointer level stripped for
    /// aggregates, scalars and pointer/function types unchanged.
    pub fn emit_alloc_type(
        &mut self,
        builder: &mut Builder,
        ctx: &SemanticContext,
        typ: &Type,
    ) -> CodegenResult<IrType> {
        let emitted = self.emit(builder, ctx, typ)?;
        if typ.is_aggregate() || matches!(typ, Type::GenericFunc(_)) {
            match emitted {
                IrType::Ptr(inner) => Ok(*inner),
                other => Ok(other),
            }
        } else {
            Ok(emitted)
        }
    }

    pub fn emit_alloc_fixed_array(
        &mut self,
        builder: &mut Builder,
        ctx: &SemanticContext,
        element: &Type,
        size: u64,
    ) -> CodegenResult<IrType> {
        let elem = self.emit_element_type(builder, ctx, element)?;
        Ok(IrType::Array(Box::new(elem), size))
    }

    /// Array/dict element representation: aggregates stay pointers, scalars
    /// are stored in place.
    fn emit_element_type(
        &mut self,
        builder: &mut Builder,
        ctx: &SemanticContext,
        element: &Type,
    ) -> CodegenResult<IrType> {
        if element.is_aggregate() {
            self.emit(builder, ctx, element)
        } else {
            self.emit_alloc_type(builder, ctx, element)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::generate_id;
    use crate::semantics::types::{BOOL, CHAR, FLOAT, INT, STRING, SYMBOL, UINT};

    fn emit_one(typ: &Type) -> CodegenResult<IrType> {
        let mut builder = Builder::new("test");
        let ctx = SemanticContext::default();
        TypeIrEmitter::new().emit(&mut builder, &ctx, typ)
    }

    #[test]
    fn test_builtin_lowering() {
        assert_eq!(emit_one(&INT).unwrap(), IrType::I64);
        assert_eq!(emit_one(&UINT).unwrap(), IrType::I64);
        assert_eq!(emit_one(&SYMBOL).unwrap(), IrType::I64);
        assert_eq!(emit_one(&FLOAT).unwrap(), IrType::Double);
        assert_eq!(emit_one(&CHAR).unwrap(), IrType::I8);
        assert_eq!(emit_one(&BOOL).unwrap(), IrType::I1);
        assert_eq!(emit_one(&STRING).unwrap(), IrType::i8_ptr());
    }

    #[test]
    fn test_tuple_is_pointer_to_struct() {
        let tuple = Type::Tuple(vec![INT, FLOAT]);
        assert_eq!(
            emit_one(&tuple).unwrap(),
            IrType::Struct(vec![IrType::I64, IrType::Double]).ptr_to()
        );
    }

    #[test]
    fn test_fixed_array_is_pointer_to_array() {
        let array = Type::Array(Box::new(INT), Some(4));
        assert_eq!(
            emit_one(&array).unwrap(),
            IrType::Array(Box::new(IrType::I64), 4).ptr_to()
        );
    }

    #[test]
    fn test_pointer_to_aggregate_is_unchanged() {
        let tuple = Type::Tuple(vec![INT]);
        let emitted_tuple = emit_one(&tuple).unwrap();
        let pointer = Type::Pointer(Box::new(tuple));
        assert_eq!(emit_one(&pointer).unwrap(), emitted_tuple);
    }

    #[test]
    fn test_pointer_to_scalar_gains_indirection() {
        let pointer = Type::Pointer(Box::new(FLOAT));
        assert_eq!(emit_one(&pointer).unwrap(), IrType::Double.ptr_to());
    }

    #[test]
    fn test_func_type_is_function_pointer() {
        let func = Type::Func {
            params: vec![INT, FLOAT],
            ret: Some(Box::new(INT)),
        };
        assert_eq!(
            emit_one(&func).unwrap(),
            IrType::Func {
                params: vec![IrType::I64, IrType::Double],
                ret: Box::new(IrType::I64),
            }
            .ptr_to()
        );
    }

    #[test]
    fn test_template_type_is_internal_error() {
        let err = emit_one(&Type::Template(generate_id())).unwrap_err();
        assert!(matches!(err, CodegenError::Internal(_)));
    }

    #[test]
    fn test_qualified_type_is_codegen_error() {
        let err = emit_one(&Type::Qualified(Box::new(INT))).unwrap_err();
        assert!(matches!(err, CodegenError::Codegen { .. }));
    }

    #[test]
    fn test_alloc_type_strips_one_pointer_for_aggregates() {
        let mut builder = Builder::new("test");
        let ctx = SemanticContext::default();
        let mut types = TypeIrEmitter::new();

        let tuple = Type::Tuple(vec![INT, INT]);
        assert_eq!(
            types.emit_alloc_type(&mut builder, &ctx, &tuple).unwrap(),
            IrType::Struct(vec![IrType::I64, IrType::I64])
        );
        // scalars and pointers stay as they are
        assert_eq!(
            types.emit_alloc_type(&mut builder, &ctx, &INT).unwrap(),
            IrType::I64
        );
        let ptr = Type::Pointer(Box::new(FLOAT));
        assert_eq!(
            types.emit_alloc_type(&mut builder, &ctx, &ptr).unwrap(),
            IrType::Double.ptr_to()
        );
    }
}
