//! Built-in member access on types that are not classes: tuples expose
//! `size`, `first`, `second` and `last`, arrays expose `size` when it is
//! statically known, ranges expose their bounds, and every value answers
//! the pseudo-member `__type` with its printed type.

use serde::{Deserialize, Serialize};

use super::types::{Type, STRING, UINT};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinMember {
    TupleSize(u64),
    TupleAt(usize),
    ArraySize(Option<u64>),
    RangeBegin,
    RangeEnd,
    TypeString(String),
}

/// Check `child_type.member_name` against the built-in members.
///
/// `Ok(Some(..))` resolves the member, `Ok(None)` means the name is not a
/// built-in member of this type, `Err` carries a diagnostic for a built-in
/// member used wrongly.
pub fn check_builtin_member(
    child_type: &Type,
    member_name: &str,
) -> Result<Option<(Type, BuiltinMember)>, String> {
    if member_name == "__type" {
        return Ok(Some((
            STRING,
            BuiltinMember::TypeString(child_type.to_string()),
        )));
    }

    match child_type {
        Type::Tuple(elements) => match member_name {
            "size" => Ok(Some((UINT, BuiltinMember::TupleSize(elements.len() as u64)))),
            "first" => match elements.first() {
                Some(first) => Ok(Some((first.clone(), BuiltinMember::TupleAt(0)))),
                None => Err("index out of bounds for tuple '()'".to_string()),
            },
            "second" => match elements.get(1) {
                Some(second) => Ok(Some((second.clone(), BuiltinMember::TupleAt(1)))),
                None => Err(format!(
                    "index out of bounds for tuple {child_type}"
                )),
            },
            "last" => match elements.last() {
                Some(last) => Ok(Some((
                    last.clone(),
                    BuiltinMember::TupleAt(elements.len() - 1),
                ))),
                None => Err("index out of bounds for tuple '()'".to_string()),
            },
            _ => Ok(None),
        },
        Type::Array(element, size) => match member_name {
            "size" => {
                if size.is_some() || element.is_builtin("string") {
                    // arrays of string cover the main function's argument
                    Ok(Some((UINT, BuiltinMember::ArraySize(*size))))
                } else {
                    Err(format!(
                        "size of array '{child_type}' can't be determined"
                    ))
                }
            }
            _ => Ok(None),
        },
        Type::Range { begin, end, .. } => match member_name {
            "begin" => Ok(Some(((**begin).clone(), BuiltinMember::RangeBegin))),
            "end" => Ok(Some(((**end).clone(), BuiltinMember::RangeEnd))),
            _ => Ok(None),
        },
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantics::types::{FLOAT, INT};

    #[test]
    fn test_tuple_members() {
        let tuple = Type::Tuple(vec![INT, FLOAT]);
        assert_eq!(
            check_builtin_member(&tuple, "size").unwrap(),
            Some((UINT, BuiltinMember::TupleSize(2)))
        );
        assert_eq!(
            check_builtin_member(&tuple, "first").unwrap(),
            Some((INT, BuiltinMember::TupleAt(0)))
        );
        assert_eq!(
            check_builtin_member(&tuple, "second").unwrap(),
            Some((FLOAT, BuiltinMember::TupleAt(1)))
        );
        assert_eq!(
            check_builtin_member(&tuple, "last").unwrap(),
            Some((FLOAT, BuiltinMember::TupleAt(1)))
        );
    }

    #[test]
    fn test_empty_tuple_bounds() {
        let tuple = Type::Tuple(vec![]);
        assert!(check_builtin_member(&tuple, "first").is_err());
        assert!(check_builtin_member(&tuple, "size").is_ok());
    }

    #[test]
    fn test_array_size_requires_static_size() {
        let sized = Type::Array(Box::new(INT), Some(4));
        assert_eq!(
            check_builtin_member(&sized, "size").unwrap(),
            Some((UINT, BuiltinMember::ArraySize(Some(4))))
        );

        let unsized_ = Type::Array(Box::new(INT), None);
        assert!(check_builtin_member(&unsized_, "size").is_err());
    }

    #[test]
    fn test_type_pseudo_member() {
        let (typ, member) = check_builtin_member(&INT, "__type").unwrap().unwrap();
        assert_eq!(typ, STRING);
        assert_eq!(member, BuiltinMember::TypeString("int".to_string()));
    }

    #[test]
    fn test_unknown_member_is_none() {
        assert_eq!(check_builtin_member(&INT, "size").unwrap(), None);
    }
}
