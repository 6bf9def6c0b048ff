use thiserror::Error;

/// Failure converting between a dynamic [`Value`](crate::Value) and a concrete Rust type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },
    #[error("no member named {0}")]
    NoSuchMember(String),
    #[error("member {0} is read-only")]
    ReadOnly(String),
}

impl ValueError {
    pub fn mismatch(expected: &'static str, found: &crate::Value) -> Self {
        ValueError::TypeMismatch {
            expected,
            found: found.kind_name(),
        }
    }
}

/// Errors raised by the matching and adaptation engine.
///
/// A source that simply does not satisfy a contract is not an error; it is reported through
/// [`MatchResult`](crate::MatchResult) diagnostics. Everything here is either a malformed contract
/// or a misuse of an adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DuckError {
    #[error("contract {contract} declares unsupported member {member}: {reason}")]
    UnsupportedContractShape {
        contract: String,
        member: String,
        reason: String,
    },
    #[error("contract {contract} has no member named {member}")]
    UnknownMember { contract: String, member: String },
    #[error("member {0} is not readable")]
    NotReadable(String),
    #[error("member {0} is not writable")]
    NotWritable(String),
    #[error("member {0} is a property, not a method")]
    NotAMethod(String),
    #[error("member {0} is a method, not a property")]
    NotAProperty(String),
    #[error("member {0} is not a nested contract")]
    NotNested(String),
    #[error("method {member} takes {expected} argument(s), got {actual}")]
    Arity {
        member: String,
        expected: usize,
        actual: usize,
    },
    #[error("source no longer exposes {0}")]
    SourceMemberGone(String),
    #[error("could not convert {member} from {from} to {to}")]
    Conversion {
        member: String,
        from: String,
        to: String,
    },
    #[error("invalid value for {member}: {source}")]
    Value {
        member: String,
        #[source]
        source: ValueError,
    },
    #[error("invalid engine configuration: {0}")]
    Config(String),
}

impl DuckError {
    pub(crate) fn value(member: &str, source: ValueError) -> Self {
        DuckError::Value {
            member: member.to_string(),
            source,
        }
    }
}

pub type Result<T, E = DuckError> = std::result::Result<T, E>;
