//! Runtime duck typing: check whether a record or a nested string-keyed map structurally
//! satisfies a declared contract, and adapt it to that contract.
//!
//! Contracts are declared with `#[derive(Contract)]` (or a manual [`Contract`] impl), records
//! with `#[derive(Record)]` plus an optional `#[methods]` impl block, and maps are [`DuckMap`]s.
//! [`Engine`] does the matching; [`Adaptable`] puts the common calls on every source.

extern crate self as ducktype_core;

mod adapter;
mod config;
mod contract;
mod convert;
mod engine;
mod error;
mod matching;
mod source;
mod types;
mod value;

pub use adapter::Adapter;
pub use config::{
    config_schema_json, load_config, write_schema_file, EngineConfig, ENV_CONFIG_PATH,
    ENV_MAX_DEPTH,
};
pub use contract::{
    registered_contracts, Contract, ContractDecl, ContractDescriptor, ContractIntrospector,
    ContractRef, MemberDescriptor, RegisteredContract,
};
pub use convert::{Conversion, ConversionRegistry, ConversionRule};
pub use engine::{Adaptable, Engine};
pub use error::{DuckError, Result, ValueError};
pub use matching::{Coercion, MatchResult, MemberDiagnostic, Mode, Outcome};
pub use source::{
    AsSource, CatalogProperty, Lookup, MethodInfo, NestedSource, PropertyInfo, Record, RecordMethods,
    SourceCatalog, SourceMut, SourceRef,
};
pub use types::{Access, ScalarKind, TypeDesc, Typed};
pub use value::{CaseSensitivity, DuckMap, FromValue, ToValue, Value};

pub use ducktype_macros::{methods, Contract, Record};

#[doc(hidden)]
pub mod __private {
    pub use inventory;
}
