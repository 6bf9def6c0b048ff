use crate::contract::ContractRef;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Scalar value kinds. Conversion rules are keyed by pairs of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    Bool,
    Int,
    Float,
    Text,
    Uuid,
}

impl ScalarKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarKind::Bool => "bool",
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Text => "text",
            ScalarKind::Uuid => "uuid",
        }
    }
}

/// Declared or inferred type of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDesc {
    Unit,
    Scalar(ScalarKind),
    /// Accepts any value, including absence.
    Any,
    List(Box<TypeDesc>),
    Map,
    Optional(Box<TypeDesc>),
    /// A member whose type is itself a contract; adapted recursively.
    Contract(ContractRef),
    /// A concrete record type exposed by a source.
    Record(&'static str),
}

impl TypeDesc {
    pub fn of<T: Typed + ?Sized>() -> TypeDesc {
        T::type_desc()
    }

    pub fn optional(inner: TypeDesc) -> TypeDesc {
        TypeDesc::Optional(Box::new(inner))
    }

    pub fn list(inner: TypeDesc) -> TypeDesc {
        TypeDesc::List(Box::new(inner))
    }

    /// Whether an absent (`Null`) value is a legal inhabitant of this type.
    ///
    /// Text is reference-like and nullable; numbers, bools and uuids are not.
    pub fn accepts_absent(&self) -> bool {
        matches!(
            self,
            TypeDesc::Any
                | TypeDesc::Optional(_)
                | TypeDesc::Contract(_)
                | TypeDesc::Scalar(ScalarKind::Text)
        )
    }

    pub fn scalar(&self) -> Option<ScalarKind> {
        match self {
            TypeDesc::Scalar(kind) => Some(*kind),
            _ => None,
        }
    }

    /// The nested contract this type refers to, looking through `Optional`.
    pub fn contract(&self) -> Option<ContractRef> {
        match self {
            TypeDesc::Contract(contract) => Some(*contract),
            TypeDesc::Optional(inner) => inner.contract(),
            _ => None,
        }
    }

    /// Strips any number of `Optional` wrappers.
    pub fn base(&self) -> &TypeDesc {
        match self {
            TypeDesc::Optional(inner) => inner.base(),
            other => other,
        }
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Unit => f.write_str("unit"),
            TypeDesc::Scalar(kind) => f.write_str(kind.as_str()),
            TypeDesc::Any => f.write_str("any"),
            TypeDesc::List(inner) => write!(f, "list<{inner}>"),
            TypeDesc::Map => f.write_str("map"),
            TypeDesc::Optional(inner) => write!(f, "option<{inner}>"),
            TypeDesc::Contract(contract) => write!(f, "contract {}", contract.name()),
            TypeDesc::Record(name) => write!(f, "record {name}"),
        }
    }
}

/// Compile-time type description used by contract and record reflection.
pub trait Typed {
    fn type_desc() -> TypeDesc;
}

/// Read/write capability of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    pub fn can_read(&self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }

    /// Whether `self` offers every capability `required` asks for.
    pub fn satisfies(&self, required: Access) -> bool {
        (!required.can_read() || self.can_read()) && (!required.can_write() || self.can_write())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_is_accepted_by_nullable_types_only() {
        assert!(TypeDesc::Any.accepts_absent());
        assert!(TypeDesc::optional(TypeDesc::Scalar(ScalarKind::Int)).accepts_absent());
        assert!(TypeDesc::Scalar(ScalarKind::Text).accepts_absent());
        assert!(!TypeDesc::Scalar(ScalarKind::Int).accepts_absent());
        assert!(!TypeDesc::Scalar(ScalarKind::Bool).accepts_absent());
        assert!(!TypeDesc::Scalar(ScalarKind::Uuid).accepts_absent());
        assert!(!TypeDesc::Map.accepts_absent());
    }

    #[test]
    fn access_satisfaction() {
        assert!(Access::ReadWrite.satisfies(Access::Read));
        assert!(Access::ReadWrite.satisfies(Access::Write));
        assert!(!Access::Read.satisfies(Access::ReadWrite));
        assert!(!Access::Write.satisfies(Access::Read));
    }

    #[test]
    fn display_nests() {
        let ty = TypeDesc::optional(TypeDesc::list(TypeDesc::Scalar(ScalarKind::Uuid)));
        assert_eq!(ty.to_string(), "option<list<uuid>>");
    }
}
