//! Semantic analysis: scope construction (forward pass), symbol and
//! overload resolution, type inference and template instantiation.
//!
//! The forward pass builds the [`scope::ScopeTree`]; the analyzer pass
//! annotates every expression with its concrete type in per-function side
//! tables ([`analyzer::FuncAnalysis`]), which the IR emitter consumes.
//! Semantic errors are batched (see [`error`]); parse errors upstream and
//! codegen errors downstream are fatal at first occurrence.

pub mod analyzer;
pub mod error;
pub mod forward;
pub mod member;
pub mod scope;
pub mod types;

pub use analyzer::{analyze, Callee, CastResolution, FuncAnalysis, MemberAccess, SemanticContext};
pub use error::SemanticCheckError;
pub use forward::analyze_forward;
pub use types::Type;

use crate::parser::ast::TypeName;

use self::scope::ScopeTree;
use self::types::BuiltinType;

/// Resolve a parsed type name against the scope tree. `typeof` types are
/// only resolvable during expression analysis and report an error here.
pub(crate) fn type_from_type_name(tree: &ScopeTree, name: &TypeName) -> Result<Type, String> {
    match name {
        TypeName::Primary(primary) => {
            let params = primary
                .template_params
                .iter()
                .map(|p| type_from_type_name(tree, p))
                .collect::<Result<Vec<_>, _>>()?;

            if let Some(builtin) = BuiltinType::from_name(&primary.name) {
                if !params.is_empty() {
                    return Err(format!("'{}' takes no type parameters", primary.name));
                }
                return Ok(Type::Builtin(builtin));
            }

            match primary.name.as_str() {
                "array" => match params.into_iter().next() {
                    Some(Type::Pointer(elem)) => Ok(Type::Array(elem, None)),
                    Some(elem) => Ok(Type::Array(Box::new(elem), None)),
                    None => Err("array type requires its element type".to_string()),
                },
                "range" => {
                    let mut params = params.into_iter();
                    let begin = params
                        .next()
                        .ok_or_else(|| "range type requires its bound types".to_string())?;
                    let end = params.next().unwrap_or_else(|| begin.clone());
                    Ok(Type::Range {
                        begin: Box::new(begin),
                        end: Box::new(end),
                        inclusive: false,
                    })
                }
                _ => match tree.resolve_class_by_name(&primary.name) {
                    Some(class) => Ok(Type::Class(class, params)),
                    None => Err(format!("Undefined type '{}'", primary.name)),
                },
            }
        }
        TypeName::Tuple(tuple) => {
            let elements = tuple
                .elements
                .iter()
                .map(|e| type_from_type_name(tree, e))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Type::Tuple(elements))
        }
        TypeName::Func(func) => {
            let params = func
                .params
                .iter()
                .map(|p| type_from_type_name(tree, p))
                .collect::<Result<Vec<_>, _>>()?;
            let ret = match &func.ret {
                Some(ret) => Some(Box::new(type_from_type_name(tree, ret)?)),
                None => None,
            };
            Ok(Type::Func { params, ret })
        }
        TypeName::Array(array) => match &array.element {
            Some(element) => Ok(Type::Array(
                Box::new(type_from_type_name(tree, element)?),
                None,
            )),
            None => Err("static_array requires its element type".to_string()),
        },
        TypeName::Dict(dict) => Ok(Type::Dict(
            Box::new(type_from_type_name(tree, &dict.key)?),
            Box::new(type_from_type_name(tree, &dict.value)?),
        )),
        TypeName::Pointer(pointer) => match &pointer.pointee {
            Some(pointee) => Ok(Type::Pointer(Box::new(type_from_type_name(
                tree, pointee,
            )?))),
            None => Err("pointer requires its pointee type".to_string()),
        },
        TypeName::Typeof(_) => Err("typeof(..) is not resolvable in this context".to_string()),
        TypeName::Qualified(qualified) => Ok(Type::Qualified(Box::new(type_from_type_name(
            tree,
            &qualified.inner,
        )?))),
    }
}
