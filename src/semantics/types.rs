//! The semantic type lattice.
//!
//! Types are value semantic and compared structurally; builtins are
//! constants. Class and generic-function types refer into the scope tree
//! by id rather than by pointer, which keeps the lattice free of ownership
//! cycles with the AST.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parser::ast::NodeId;

use super::scope::{ClassId, FuncId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuiltinType {
    Int,
    Uint,
    Float,
    Char,
    Bool,
    String,
    Symbol,
}

impl BuiltinType {
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinType::Int => "int",
            BuiltinType::Uint => "uint",
            BuiltinType::Float => "float",
            BuiltinType::Char => "char",
            BuiltinType::Bool => "bool",
            BuiltinType::String => "string",
            BuiltinType::Symbol => "symbol",
        }
    }

    pub fn from_name(name: &str) -> Option<BuiltinType> {
        Some(match name {
            "int" => BuiltinType::Int,
            "uint" => BuiltinType::Uint,
            "float" => BuiltinType::Float,
            "char" => BuiltinType::Char,
            "bool" => BuiltinType::Bool,
            "string" => BuiltinType::String,
            "symbol" => BuiltinType::Symbol,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Type {
    Builtin(BuiltinType),
    /// Class instance: scope reference plus instance type arguments.
    Class(ClassId, Vec<Type>),
    Tuple(Vec<Type>),
    /// Element type plus optional compile-time size.
    Array(Box<Type>, Option<u64>),
    Pointer(Box<Type>),
    Func {
        params: Vec<Type>,
        ret: Option<Box<Type>>,
    },
    /// Reference to a function scope; the capture descriptor lives in the
    /// semantic side tables.
    GenericFunc(FuncId),
    Dict(Box<Type>, Box<Type>),
    Range {
        begin: Box<Type>,
        end: Box<Type>,
        inclusive: bool,
    },
    /// `T?`
    Qualified(Box<Type>),
    /// Unresolved type parameter bound to the parameter node lacking an
    /// annotation.
    Template(NodeId),
}

pub const INT: Type = Type::Builtin(BuiltinType::Int);
pub const UINT: Type = Type::Builtin(BuiltinType::Uint);
pub const FLOAT: Type = Type::Builtin(BuiltinType::Float);
pub const CHAR: Type = Type::Builtin(BuiltinType::Char);
pub const BOOL: Type = Type::Builtin(BuiltinType::Bool);
pub const STRING: Type = Type::Builtin(BuiltinType::String);
pub const SYMBOL: Type = Type::Builtin(BuiltinType::Symbol);

impl Type {
    /// A type is template if any leaf is a template parameter.
    pub fn is_template(&self) -> bool {
        match self {
            Type::Template(_) => true,
            Type::Builtin(_) | Type::GenericFunc(_) => false,
            Type::Class(_, args) => args.iter().any(Type::is_template),
            Type::Tuple(elems) => elems.iter().any(Type::is_template),
            Type::Array(elem, _) => elem.is_template(),
            Type::Pointer(pointee) => pointee.is_template(),
            Type::Func { params, ret } => {
                params.iter().any(Type::is_template)
                    || ret.as_ref().is_some_and(|r| r.is_template())
            }
            Type::Dict(k, v) => k.is_template() || v.is_template(),
            Type::Range { begin, end, .. } => begin.is_template() || end.is_template(),
            Type::Qualified(inner) => inner.is_template(),
        }
    }

    /// Aggregates are passed by pointer at the IR layer.
    pub fn is_aggregate(&self) -> bool {
        matches!(
            self,
            Type::Tuple(_) | Type::Array(..) | Type::Dict(..) | Type::Class(..) | Type::Range { .. }
        )
    }

    pub fn is_builtin(&self, name: &str) -> bool {
        matches!(self, Type::Builtin(b) if b.name() == name)
    }

    /// Structural equality where any two template parameters are considered
    /// equal. Used by overload equality.
    pub fn overload_eq(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Template(_), Type::Template(_)) => true,
            (Type::Class(l, largs), Type::Class(r, rargs)) => {
                l == r
                    && largs.len() == rargs.len()
                    && largs.iter().zip(rargs).all(|(a, b)| a.overload_eq(b))
            }
            (Type::Tuple(l), Type::Tuple(r)) => {
                l.len() == r.len() && l.iter().zip(r).all(|(a, b)| a.overload_eq(b))
            }
            (Type::Array(l, ls), Type::Array(r, rs)) => ls == rs && l.overload_eq(r),
            (Type::Pointer(l), Type::Pointer(r)) => l.overload_eq(r),
            (
                Type::Func {
                    params: lp,
                    ret: lr,
                },
                Type::Func {
                    params: rp,
                    ret: rr,
                },
            ) => {
                lp.len() == rp.len()
                    && lp.iter().zip(rp).all(|(a, b)| a.overload_eq(b))
                    && match (lr, rr) {
                        (Some(a), Some(b)) => a.overload_eq(b),
                        (None, None) => true,
                        _ => false,
                    }
            }
            (Type::Dict(lk, lv), Type::Dict(rk, rv)) => lk.overload_eq(rk) && lv.overload_eq(rv),
            (
                Type::Range {
                    begin: lb, end: le, ..
                },
                Type::Range {
                    begin: rb, end: re, ..
                },
            ) => lb.overload_eq(rb) && le.overload_eq(re),
            (Type::Qualified(l), Type::Qualified(r)) => l.overload_eq(r),
            _ => self == other,
        }
    }

    /// Substitute template parameters with their bindings.
    pub fn substitute(&self, subst: &dyn Fn(NodeId) -> Option<Type>) -> Type {
        match self {
            Type::Template(id) => subst(*id).unwrap_or_else(|| self.clone()),
            Type::Builtin(_) | Type::GenericFunc(_) => self.clone(),
            Type::Class(id, args) => Type::Class(
                *id,
                args.iter().map(|a| a.substitute(subst)).collect(),
            ),
            Type::Tuple(elems) => {
                Type::Tuple(elems.iter().map(|e| e.substitute(subst)).collect())
            }
            Type::Array(elem, size) => Type::Array(Box::new(elem.substitute(subst)), *size),
            Type::Pointer(pointee) => Type::Pointer(Box::new(pointee.substitute(subst))),
            Type::Func { params, ret } => Type::Func {
                params: params.iter().map(|p| p.substitute(subst)).collect(),
                ret: ret.as_ref().map(|r| Box::new(r.substitute(subst))),
            },
            Type::Dict(k, v) => Type::Dict(
                Box::new(k.substitute(subst)),
                Box::new(v.substitute(subst)),
            ),
            Type::Range {
                begin,
                end,
                inclusive,
            } => Type::Range {
                begin: Box::new(begin.substitute(subst)),
                end: Box::new(end.substitute(subst)),
                inclusive: *inclusive,
            },
            Type::Qualified(inner) => Type::Qualified(Box::new(inner.substitute(subst))),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Builtin(b) => f.write_str(b.name()),
            Type::Class(id, args) => {
                write!(f, "class#{}", id.0)?;
                if !args.is_empty() {
                    let args = args
                        .iter()
                        .map(|a| a.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "({args})")?;
                }
                Ok(())
            }
            Type::Tuple(elems) => {
                let elems = elems
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({elems})")
            }
            Type::Array(elem, Some(size)) => write!(f, "static_array({elem}, {size})"),
            Type::Array(elem, None) => write!(f, "[{elem}]"),
            Type::Pointer(pointee) => write!(f, "pointer({pointee})"),
            Type::Func { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                match ret {
                    Some(ret) => write!(f, "func({params}): {ret}"),
                    None => write!(f, "proc({params})"),
                }
            }
            Type::GenericFunc(id) => write!(f, "func#{}", id.0),
            Type::Dict(k, v) => write!(f, "{{{k} => {v}}}"),
            Type::Range {
                begin,
                end,
                inclusive,
            } => {
                let op = if *inclusive { "..." } else { ".." };
                write!(f, "range({begin}{op}{end})")
            }
            Type::Qualified(inner) => write!(f, "{inner}?"),
            Type::Template(id) => write!(f, "'t{}", id.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_detection() {
        assert!(Type::Template(NodeId(1)).is_template());
        assert!(Type::Tuple(vec![INT, Type::Template(NodeId(2))]).is_template());
        assert!(!Type::Tuple(vec![INT, FLOAT]).is_template());
        assert!(Type::Array(Box::new(Type::Template(NodeId(3))), None).is_template());
    }

    #[test]
    fn test_aggregate_detection() {
        assert!(Type::Tuple(vec![]).is_aggregate());
        assert!(Type::Array(Box::new(INT), Some(4)).is_aggregate());
        assert!(Type::Dict(Box::new(INT), Box::new(STRING)).is_aggregate());
        assert!(!INT.is_aggregate());
        assert!(!Type::Pointer(Box::new(INT)).is_aggregate());
    }

    #[test]
    fn test_overload_eq_unifies_templates() {
        let a = Type::Template(NodeId(1));
        let b = Type::Template(NodeId(2));
        assert!(a.overload_eq(&b));
        assert!(!a.overload_eq(&INT));
        assert!(INT.overload_eq(&INT));
    }

    #[test]
    fn test_substitution() {
        let template = Type::Tuple(vec![Type::Template(NodeId(7)), FLOAT]);
        let concrete = template.substitute(&|id| (id == NodeId(7)).then(|| INT.clone()));
        assert_eq!(concrete, Type::Tuple(vec![INT, FLOAT]));
    }

    #[test]
    fn test_is_builtin_by_name() {
        assert!(INT.is_builtin("int"));
        assert!(!INT.is_builtin("uint"));
        assert!(STRING.is_builtin("string"));
    }
}
