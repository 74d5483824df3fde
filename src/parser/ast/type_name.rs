use serde::{Deserialize, Serialize};

use super::{Expression, Location, NodeId};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeName {
    Primary(PrimaryType),
    Tuple(TupleType),
    Func(FuncType),
    Array(ArrayType),
    Dict(DictType),
    Pointer(PointerType),
    Typeof(TypeofType),
    Qualified(QualifiedType),
}

impl TypeName {
    pub fn id(&self) -> NodeId {
        match self {
            TypeName::Primary(t) => t.id,
            TypeName::Tuple(t) => t.id,
            TypeName::Func(t) => t.id,
            TypeName::Array(t) => t.id,
            TypeName::Dict(t) => t.id,
            TypeName::Pointer(t) => t.id,
            TypeName::Typeof(t) => t.id,
            TypeName::Qualified(t) => t.id,
        }
    }

    pub fn location(&self) -> &Location {
        match self {
            TypeName::Primary(t) => &t.location,
            TypeName::Tuple(t) => &t.location,
            TypeName::Func(t) => &t.location,
            TypeName::Array(t) => &t.location,
            TypeName::Dict(t) => &t.location,
            TypeName::Pointer(t) => &t.location,
            TypeName::Typeof(t) => &t.location,
            TypeName::Qualified(t) => &t.location,
        }
    }
}

impl std::fmt::Display for TypeName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeName::Primary(t) => {
                f.write_str(&t.name)?;
                if !t.template_params.is_empty() {
                    let params = t
                        .template_params
                        .iter()
                        .map(|p| p.to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    write!(f, "({params})")?;
                }
                Ok(())
            }
            TypeName::Tuple(t) => {
                let elems = t
                    .elements
                    .iter()
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "({elems})")
            }
            TypeName::Func(t) => {
                let params = t
                    .params
                    .iter()
                    .map(|p| p.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                match &t.ret {
                    Some(ret) => write!(f, "func({params}): {ret}"),
                    None => write!(f, "proc({params})"),
                }
            }
            TypeName::Array(t) => match &t.element {
                Some(elem) => write!(f, "static_array({elem})"),
                None => f.write_str("static_array"),
            },
            TypeName::Dict(t) => write!(f, "{{{} => {}}}", t.key, t.value),
            TypeName::Pointer(t) => match &t.pointee {
                Some(p) => write!(f, "pointer({p})"),
                None => f.write_str("pointer"),
            },
            TypeName::Typeof(_) => f.write_str("typeof(...)"),
            TypeName::Qualified(t) => write!(f, "{}?", t.inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryType {
    pub id: NodeId,
    pub location: Location,
    pub name: String,
    pub template_params: Vec<TypeName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TupleType {
    pub id: NodeId,
    pub location: Location,
    pub elements: Vec<TypeName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncType {
    pub id: NodeId,
    pub location: Location,
    pub params: Vec<TypeName>,
    /// `func(..): T` has a return type, `proc(..)` and the bare callable
    /// template `func` do not.
    pub ret: Option<Box<TypeName>>,
}

/// `static_array` / `static_array(T)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayType {
    pub id: NodeId,
    pub location: Location,
    pub element: Option<Box<TypeName>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictType {
    pub id: NodeId,
    pub location: Location,
    pub key: Box<TypeName>,
    pub value: Box<TypeName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointerType {
    pub id: NodeId,
    pub location: Location,
    pub pointee: Option<Box<TypeName>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeofType {
    pub id: NodeId,
    pub location: Location,
    pub expr: Box<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Qualifier {
    Maybe,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualifiedType {
    pub id: NodeId,
    pub location: Location,
    pub inner: Box<TypeName>,
    pub qualifier: Qualifier,
}
