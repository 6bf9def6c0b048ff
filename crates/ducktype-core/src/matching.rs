//! Structural matching of a source catalog against a contract descriptor.

use crate::contract::{ContractDescriptor, ContractIntrospector, ContractRef, MemberDescriptor};
use crate::convert::ConversionRegistry;
use crate::error::Result;
use crate::source::{CatalogProperty, Lookup, SourceCatalog, SourceRef};
use crate::types::{Access, ScalarKind, TypeDesc};
use crate::value::{CaseSensitivity, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Matching strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Names follow the source's own case rule; types must agree without conversion.
    #[default]
    Strict,
    /// Names compare case-insensitively; registered conversions bridge scalar mismatches.
    Fuzzy,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Strict => "strict",
            Mode::Fuzzy => "fuzzy",
        }
    }
}

/// A scalar conversion applied when values cross between source and contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Coercion {
    pub from: ScalarKind,
    pub to: ScalarKind,
}

impl Coercion {
    pub fn inverse(&self) -> Coercion {
        Coercion {
            from: self.to,
            to: self.from,
        }
    }
}

impl fmt::Display for Coercion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from.as_str(), self.to.as_str())
    }
}

/// Per-member verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "coercion", rename_all = "snake_case")]
pub enum Outcome {
    Matched(Option<Coercion>),
    Missing,
    TypeIncompatible,
    ShapeUnsupported,
}

impl Outcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, Outcome::Matched(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberDiagnostic {
    pub member: String,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Name of the source member the contract member resolved to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_member: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// How an adapter reaches one contract member.
#[derive(Debug, Clone)]
pub(crate) enum Binding {
    Property {
        source: String,
        ty: TypeDesc,
        access: Access,
        read: Option<Coercion>,
        write: Option<Coercion>,
    },
    Nested {
        source: String,
        ty: TypeDesc,
        contract: ContractRef,
        access: Access,
    },
    Method {
        source: String,
        params: Vec<TypeDesc>,
        args: Vec<Option<Coercion>>,
        returns: TypeDesc,
        ret: Option<Coercion>,
    },
}

/// Verdict of matching one source against one contract.
#[derive(Debug, Clone)]
pub struct MatchResult {
    contract: Arc<ContractDescriptor>,
    mode: Mode,
    satisfied: bool,
    diagnostics: Vec<MemberDiagnostic>,
    pub(crate) bindings: Vec<(String, Binding)>,
}

impl MatchResult {
    pub fn satisfied(&self) -> bool {
        self.satisfied
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn contract(&self) -> &Arc<ContractDescriptor> {
        &self.contract
    }

    pub fn diagnostics(&self) -> &[MemberDiagnostic] {
        &self.diagnostics
    }

    pub fn diagnostic(&self, member: &str) -> Option<&MemberDiagnostic> {
        self.diagnostics.iter().find(|d| d.member == member)
    }

    pub fn failures(&self) -> impl Iterator<Item = &MemberDiagnostic> {
        self.diagnostics.iter().filter(|d| !d.outcome.is_matched())
    }

    /// Diagnostics as a JSON document, for logging and debugging.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "contract": self.contract.name(),
            "mode": self.mode,
            "satisfied": self.satisfied,
            "members": self.diagnostics,
        })
    }
}

struct Checked {
    diagnostic: MemberDiagnostic,
    binding: Option<Binding>,
}

impl Checked {
    fn fail(member: &str, outcome: Outcome, source: Option<&str>, note: impl Into<String>) -> Self {
        Checked {
            diagnostic: MemberDiagnostic {
                member: member.to_string(),
                outcome,
                source_member: source.map(str::to_string),
                note: Some(note.into()),
            },
            binding: None,
        }
    }

    fn matched(member: &str, coercion: Option<Coercion>, binding: Binding) -> Self {
        let source = match &binding {
            Binding::Property { source, .. }
            | Binding::Nested { source, .. }
            | Binding::Method { source, .. } => source.clone(),
        };
        Checked {
            diagnostic: MemberDiagnostic {
                member: member.to_string(),
                outcome: Outcome::Matched(coercion),
                source_member: Some(source),
                note: None,
            },
            binding: Some(binding),
        }
    }

    fn with_note(mut self, note: impl Into<String>) -> Self {
        self.diagnostic.note = Some(note.into());
        self
    }
}

/// Type flow verdict: `None` when incompatible, `Some(coercion)` otherwise.
type Flow = Option<Option<Coercion>>;

pub(crate) struct Matcher<'e> {
    pub registry: &'e ConversionRegistry,
    pub introspector: &'e ContractIntrospector,
    pub max_depth: u32,
}

impl Matcher<'_> {
    pub fn run(
        &self,
        descriptor: Arc<ContractDescriptor>,
        source: SourceRef<'_>,
        mode: Mode,
        depth: u32,
    ) -> Result<MatchResult> {
        let catalog = SourceCatalog::build(source);
        let case = match mode {
            Mode::Strict => catalog.native_case(),
            Mode::Fuzzy => CaseSensitivity::Insensitive,
        };

        let mut diagnostics = Vec::with_capacity(descriptor.members().len());
        let mut bindings = Vec::with_capacity(descriptor.members().len());
        for member in descriptor.members() {
            let checked = match member {
                MemberDescriptor::Property { name, ty, access } => {
                    self.property(&catalog, name, ty, *access, case, mode, depth)?
                }
                MemberDescriptor::Method {
                    name,
                    params,
                    returns,
                } => self.method(&catalog, name, params, returns, case, mode),
            };
            if let Some(binding) = checked.binding {
                bindings.push((member.name().to_string(), binding));
            }
            diagnostics.push(checked.diagnostic);
        }

        let satisfied = diagnostics.iter().all(|d| d.outcome.is_matched());
        if !satisfied {
            let failing: Vec<&str> = diagnostics
                .iter()
                .filter(|d| !d.outcome.is_matched())
                .map(|d| d.member.as_str())
                .collect();
            tracing::debug!(
                contract = descriptor.name(),
                mode = mode.as_str(),
                depth,
                ?failing,
                "contract not satisfied"
            );
        }

        Ok(MatchResult {
            contract: descriptor,
            mode,
            satisfied,
            diagnostics,
            bindings,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn property(
        &self,
        catalog: &SourceCatalog<'_>,
        name: &str,
        declared: &TypeDesc,
        required: Access,
        case: CaseSensitivity,
        mode: Mode,
        depth: u32,
    ) -> Result<Checked> {
        let found = match catalog.property(name, case) {
            Lookup::Found(found) => found,
            Lookup::NotFound => {
                return Ok(Checked::fail(name, Outcome::Missing, None, "no such member"))
            }
            Lookup::Ambiguous(candidates) => {
                return Ok(Checked::fail(
                    name,
                    Outcome::TypeIncompatible,
                    None,
                    format!("ambiguous between {}", candidates.join(", ")),
                ))
            }
        };
        if !found.access.satisfies(required) {
            let note = if required.can_write() && !found.access.can_write() {
                "source member is not writable"
            } else {
                "source member is not readable"
            };
            return Ok(Checked::fail(
                name,
                Outcome::Missing,
                Some(found.name.as_str()),
                note,
            ));
        }

        if let Some(contract) = declared.contract() {
            return self.nested(name, declared, contract, required, &found, mode, depth);
        }

        let Some(actual) = found.ty.clone() else {
            // Only null map entries have no type.
            return Ok(if declared.accepts_absent() {
                Checked::matched(
                    name,
                    None,
                    Binding::Property {
                        source: found.name.clone(),
                        ty: declared.clone(),
                        access: required,
                        read: None,
                        write: None,
                    },
                )
            } else {
                Checked::fail(
                    name,
                    Outcome::TypeIncompatible,
                    Some(found.name.as_str()),
                    format!("absent value cannot satisfy {declared}"),
                )
            });
        };

        // Map entries are typed by what they hold; record fields by their declaration.
        let current = found.value.as_deref();
        let fit = if catalog.is_map() { current } else { None };
        let read = if required.can_read() {
            self.flow(&actual, declared, fit, mode)
        } else {
            Some(None)
        };
        if let (Some(Some(coercion)), Some(value)) = (read, current) {
            if !self.converts(coercion, value) {
                return Ok(Checked::fail(
                    name,
                    Outcome::TypeIncompatible,
                    Some(found.name.as_str()),
                    format!(
                        "current {} value cannot be converted ({coercion})",
                        value.kind_name()
                    ),
                ));
            }
        }
        let write = if required.can_write() {
            self.flow(declared, &actual, None, mode)
        } else {
            Some(None)
        };
        match (read, write) {
            (Some(read), Some(write)) => Ok(Checked::matched(
                name,
                read.or(write.map(|w| w.inverse())),
                Binding::Property {
                    source: found.name.clone(),
                    ty: declared.clone(),
                    access: required,
                    read,
                    write,
                },
            )),
            (None, _) => Ok(Checked::fail(
                name,
                Outcome::TypeIncompatible,
                Some(found.name.as_str()),
                format!("{actual} cannot be read as {declared}"),
            )),
            (_, None) => Ok(Checked::fail(
                name,
                Outcome::TypeIncompatible,
                Some(found.name.as_str()),
                format!("{declared} cannot be written into {actual}"),
            )),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn nested(
        &self,
        name: &str,
        declared: &TypeDesc,
        contract: ContractRef,
        required: Access,
        found: &CatalogProperty<'_>,
        mode: Mode,
        depth: u32,
    ) -> Result<Checked> {
        let binding = Binding::Nested {
            source: found.name.clone(),
            ty: declared.clone(),
            contract,
            access: required,
        };
        if !found.nestable {
            let actual = found.ty.as_ref().map(ToString::to_string);
            return Ok(Checked::fail(
                name,
                Outcome::TypeIncompatible,
                Some(found.name.as_str()),
                format!(
                    "{} is not a nested source for contract {}",
                    actual.as_deref().unwrap_or("value"),
                    contract.name()
                ),
            ));
        }
        let Some(inner) = found.nested else {
            return Ok(Checked::matched(name, None, binding).with_note("absent"));
        };
        let next = depth + 1;
        if next > self.max_depth {
            return Ok(Checked::matched(name, None, binding)
                .with_note(format!("depth limit {} reached; treated as absent", self.max_depth)));
        }

        let descriptor = self.introspector.describe(contract)?;
        let result = self.run(descriptor, inner, mode, next)?;
        if result.satisfied {
            Ok(Checked::matched(name, None, binding))
        } else {
            // The outer contract stays usable; the member reads as absent until it adapts.
            let failing: Vec<&str> = result.failures().map(|d| d.member.as_str()).collect();
            Ok(Checked::matched(name, None, binding).with_note(format!(
                "nested contract {} not adaptable ({}); reads as absent",
                contract.name(),
                failing.join(", ")
            )))
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn method(
        &self,
        catalog: &SourceCatalog<'_>,
        name: &str,
        params: &[TypeDesc],
        returns: &TypeDesc,
        case: CaseSensitivity,
        mode: Mode,
    ) -> Checked {
        if catalog.is_map() {
            return Checked::fail(
                name,
                Outcome::ShapeUnsupported,
                None,
                "map sources expose no methods",
            );
        }
        let info = match catalog.method(name, case) {
            Lookup::Found(info) => info,
            Lookup::NotFound => return Checked::fail(name, Outcome::Missing, None, "no such method"),
            Lookup::Ambiguous(candidates) => {
                return Checked::fail(
                    name,
                    Outcome::TypeIncompatible,
                    None,
                    format!("ambiguous between {}", candidates.join(", ")),
                )
            }
        };
        if info.params.len() != params.len() {
            return Checked::fail(
                name,
                Outcome::TypeIncompatible,
                Some(info.name.as_str()),
                format!(
                    "source takes {} argument(s), contract declares {}",
                    info.params.len(),
                    params.len()
                ),
            );
        }

        let mut args = Vec::with_capacity(params.len());
        for (idx, (declared, actual)) in params.iter().zip(&info.params).enumerate() {
            let flow = match mode {
                Mode::Strict => (declared == actual).then_some(None),
                Mode::Fuzzy => self.flow(declared, actual, None, mode),
            };
            match flow {
                Some(coercion) => args.push(coercion),
                None => {
                    return Checked::fail(
                        name,
                        Outcome::TypeIncompatible,
                        Some(info.name.as_str()),
                        format!("argument {idx}: {declared} cannot be passed as {actual}"),
                    )
                }
            }
        }

        let ret = if returns.contract().is_some() {
            matches!(
                info.returns.base(),
                TypeDesc::Record(_) | TypeDesc::Map | TypeDesc::Contract(_)
            )
            .then_some(None)
        } else {
            self.flow(&info.returns, returns, None, mode)
        };
        let Some(ret) = ret else {
            return Checked::fail(
                name,
                Outcome::TypeIncompatible,
                Some(info.name.as_str()),
                format!("returns {}, contract declares {returns}", info.returns),
            );
        };

        let coercion = ret.or_else(|| args.iter().flatten().next().copied());
        Checked::matched(
            name,
            coercion,
            Binding::Method {
                source: info.name.clone(),
                params: params.to_vec(),
                args,
                returns: returns.clone(),
                ret,
            },
        )
    }

    /// Whether the registered conversion accepts `value` as it stands now.
    fn converts(&self, coercion: Coercion, value: &Value) -> bool {
        self.registry
            .find(coercion.from, coercion.to)
            .is_some_and(|conversion| conversion.apply(value).is_some())
    }

    /// Whether a value of type `from` (currently `value`, when known) can flow into `to`.
    fn flow(&self, from: &TypeDesc, to: &TypeDesc, value: Option<&Value>, mode: Mode) -> Flow {
        if value.is_some_and(|v| v.fits(to)) || assignable(from, to) {
            return Some(None);
        }
        if mode != Mode::Fuzzy {
            return None;
        }
        if matches!(from, TypeDesc::Optional(_)) && !to.accepts_absent() {
            return None;
        }
        let (from, to) = (from.base().scalar()?, to.base().scalar()?);
        self.registry
            .find(from, to)
            .map(|_| Some(Coercion { from, to }))
    }
}

/// Static assignability without conversion.
pub(crate) fn assignable(from: &TypeDesc, to: &TypeDesc) -> bool {
    match (from, to) {
        _ if from == to => true,
        (_, TypeDesc::Any) => true,
        (TypeDesc::Optional(a), TypeDesc::Optional(b)) => assignable(a, b),
        (a, TypeDesc::Optional(b)) => assignable(a, b),
        (TypeDesc::List(a), TypeDesc::List(b)) => assignable(a, b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(kind: ScalarKind) -> TypeDesc {
        TypeDesc::Scalar(kind)
    }

    #[test]
    fn assignability_widens_into_any_and_optional() {
        let int = scalar(ScalarKind::Int);
        assert!(assignable(&int, &int));
        assert!(assignable(&int, &TypeDesc::Any));
        assert!(assignable(&int, &TypeDesc::optional(int.clone())));
        assert!(!assignable(&TypeDesc::optional(int.clone()), &int));
        assert!(assignable(
            &TypeDesc::list(int.clone()),
            &TypeDesc::list(TypeDesc::Any)
        ));
        assert!(!assignable(&TypeDesc::list(TypeDesc::Any), &TypeDesc::list(int.clone())));
        assert!(!assignable(&int, &scalar(ScalarKind::Float)));
    }

    #[test]
    fn fuzzy_flow_uses_registered_conversions_only() {
        let registry = ConversionRegistry::with_builtins();
        let introspector = ContractIntrospector::default();
        let matcher = Matcher {
            registry: &registry,
            introspector: &introspector,
            max_depth: 4,
        };
        let uuid = scalar(ScalarKind::Uuid);
        let text = scalar(ScalarKind::Text);

        assert_eq!(matcher.flow(&uuid, &text, None, Mode::Strict), None);
        assert_eq!(
            matcher.flow(&uuid, &text, None, Mode::Fuzzy),
            Some(Some(Coercion {
                from: ScalarKind::Uuid,
                to: ScalarKind::Text
            }))
        );
        assert_eq!(
            matcher.flow(&uuid, &TypeDesc::optional(text.clone()), None, Mode::Fuzzy),
            Some(Some(Coercion {
                from: ScalarKind::Uuid,
                to: ScalarKind::Text
            }))
        );
        // Text is nullable, so an optional uuid may still flow into it.
        assert_eq!(
            matcher.flow(&TypeDesc::optional(uuid.clone()), &text, None, Mode::Fuzzy),
            Some(Some(Coercion {
                from: ScalarKind::Uuid,
                to: ScalarKind::Text
            }))
        );
        assert_eq!(
            matcher.flow(&TypeDesc::optional(text.clone()), &uuid, None, Mode::Fuzzy),
            None
        );
        assert_eq!(
            matcher.flow(&scalar(ScalarKind::Bool), &text, None, Mode::Fuzzy),
            None
        );
    }

    #[test]
    fn current_values_decide_list_fit() {
        let registry = ConversionRegistry::empty();
        let introspector = ContractIntrospector::default();
        let matcher = Matcher {
            registry: &registry,
            introspector: &introspector,
            max_depth: 4,
        };
        let want = TypeDesc::list(scalar(ScalarKind::Int));
        let empty = Value::List(Vec::new());
        let inferred = empty.infer_type().unwrap();
        assert_eq!(
            matcher.flow(&inferred, &want, Some(&empty), Mode::Strict),
            Some(None)
        );
        let mixed = Value::List(vec![Value::Int(1), Value::Text("x".into())]);
        let inferred = mixed.infer_type().unwrap();
        assert_eq!(matcher.flow(&inferred, &want, Some(&mixed), Mode::Fuzzy), None);
    }

    #[test]
    fn conversions_are_tried_against_current_values() {
        let registry = ConversionRegistry::with_builtins();
        let introspector = ContractIntrospector::default();
        let matcher = Matcher {
            registry: &registry,
            introspector: &introspector,
            max_depth: 4,
        };
        let coercion = Coercion {
            from: ScalarKind::Text,
            to: ScalarKind::Uuid,
        };
        assert!(!matcher.converts(coercion, &Value::Text("not-a-uuid".into())));
        assert!(matcher.converts(
            coercion,
            &Value::Text("6f1c2b8e-94a4-4c1d-8d59-2f8f0a4f3b11".into())
        ));
        assert!(matcher.converts(coercion, &Value::Null));

        let empty = ConversionRegistry::empty();
        let bare = Matcher {
            registry: &empty,
            ..matcher
        };
        assert!(!bare.converts(coercion, &Value::Text("x".into())));
    }

    #[test]
    fn outcomes_serialize_with_tags() {
        let diagnostic = MemberDiagnostic {
            member: "Id".into(),
            outcome: Outcome::Matched(Some(Coercion {
                from: ScalarKind::Uuid,
                to: ScalarKind::Text,
            })),
            source_member: Some("id".into()),
            note: None,
        };
        let json = serde_json::to_value(&diagnostic).unwrap();
        assert_eq!(json["outcome"], "matched");
        assert_eq!(json["coercion"]["from"], "uuid");
        assert!(json.get("note").is_none());

        let missing = serde_json::to_value(Outcome::Missing).unwrap();
        assert_eq!(missing, serde_json::json!({"outcome": "missing"}));
    }
}
