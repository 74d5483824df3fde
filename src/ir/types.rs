use std::fmt;

/// Low-level IR types. Named structs are defined in the module's struct
/// table and referenced by name here.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    I1,
    I8,
    I64,
    Double,
    Ptr(Box<IrType>),
    Struct(Vec<IrType>),
    Named(String),
    Array(Box<IrType>, u64),
    Func {
        params: Vec<IrType>,
        ret: Box<IrType>,
    },
}

impl IrType {
    pub fn ptr_to(self) -> IrType {
        IrType::Ptr(Box::new(self))
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, IrType::Ptr(_))
    }

    pub fn pointee(&self) -> Option<&IrType> {
        match self {
            IrType::Ptr(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn i8_ptr() -> IrType {
        IrType::I8.ptr_to()
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Void => f.write_str("void"),
            IrType::I1 => f.write_str("i1"),
            IrType::I8 => f.write_str("i8"),
            IrType::I64 => f.write_str("i64"),
            IrType::Double => f.write_str("double"),
            IrType::Ptr(inner) => write!(f, "{inner}*"),
            IrType::Struct(fields) => {
                let fields = fields
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{ {fields} }}")
            }
            IrType::Named(name) => write!(f, "%{name}"),
            IrType::Array(elem, size) => write!(f, "[{size} x {elem}]"),
            IrType::Func { params, ret } => {
                let params = params
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{ret} ({params})")
            }
        }
    }
}
