//! Adapters: contract-shaped views that forward every access to the borrowed source.

use crate::contract::{ContractDescriptor, MemberDescriptor};
use crate::engine::Engine;
use crate::error::{DuckError, Result};
use crate::matching::{Binding, Coercion, MatchResult, Mode};
use crate::source::SourceMut;
use crate::types::TypeDesc;
use crate::value::{FromValue, ToValue, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A source viewed through a contract.
///
/// Holds the source exclusively for `'a` and a table from contract member name to the source
/// member it forwards to. Nothing is copied: reads fetch the current value, writes store into the
/// source, so adapters created one after another over the same source observe each other's
/// writes.
pub struct Adapter<'a> {
    source: SourceMut<'a>,
    contract: Arc<ContractDescriptor>,
    table: HashMap<String, Binding>,
    engine: Engine,
    mode: Mode,
    depth: u32,
}

impl<'a> Adapter<'a> {
    pub(crate) fn new(source: SourceMut<'a>, result: MatchResult, engine: Engine, depth: u32) -> Self {
        let mode = result.mode();
        let contract = result.contract().clone();
        let table = result.bindings.into_iter().collect();
        Self {
            source,
            contract,
            table,
            engine,
            mode,
            depth,
        }
    }

    pub fn contract(&self) -> &ContractDescriptor {
        &self.contract
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Nesting depth of this adapter; top-level adapters are at depth 0.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Contract member names in declaration order.
    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.contract.members().iter().map(MemberDescriptor::name)
    }

    /// Name of the source member backing `member`.
    pub fn source_member(&self, member: &str) -> Option<&str> {
        self.table.get(member).map(|binding| match binding {
            Binding::Property { source, .. }
            | Binding::Nested { source, .. }
            | Binding::Method { source, .. } => source.as_str(),
        })
    }

    fn binding(&self, member: &str) -> Result<&Binding> {
        self.table.get(member).ok_or_else(|| DuckError::UnknownMember {
            contract: self.contract.name().to_string(),
            member: member.to_string(),
        })
    }

    /// Reads a property, applying the conversion recorded at match time.
    ///
    /// Reading a nested contract member returns the raw nested value, or `Null` when it cannot
    /// currently be adapted.
    pub fn get(&self, member: &str) -> Result<Value> {
        match self.binding(member)? {
            Binding::Property {
                source,
                ty,
                access,
                read,
                ..
            } => {
                if !access.can_read() {
                    return Err(DuckError::NotReadable(member.to_string()));
                }
                let raw = self
                    .source
                    .read(source)
                    .ok_or_else(|| DuckError::SourceMemberGone(source.clone()))?;
                self.convert(member, raw, *read, ty)
            }
            Binding::Nested {
                source,
                contract,
                access,
                ..
            } => {
                if !access.can_read() {
                    return Err(DuckError::NotReadable(member.to_string()));
                }
                let next = self.depth + 1;
                if next > self.engine.config().max_depth {
                    return Ok(Value::Null);
                }
                let Some(inner) = self.source.as_shared().nested(source) else {
                    return Ok(Value::Null);
                };
                let descriptor = self.engine.describe_ref(*contract)?;
                let result = self.engine.matcher().run(descriptor, inner, self.mode, next)?;
                if !result.satisfied() {
                    return Ok(Value::Null);
                }
                Ok(self.source.read(source).unwrap_or_default())
            }
            Binding::Method { .. } => Err(DuckError::NotAProperty(member.to_string())),
        }
    }

    /// Reads a property and converts it into a Rust value.
    pub fn get_as<T: FromValue>(&self, member: &str) -> Result<T> {
        let value = self.get(member)?;
        T::from_value(value).map_err(|e| DuckError::value(member, e))
    }

    /// Writes a property. The value must fit the declared type; the inverse of the read
    /// conversion is applied before storing.
    pub fn set(&mut self, member: &str, value: impl ToValue) -> Result<()> {
        let value = value.to_value();
        let (source, stored) = match self.binding(member)? {
            Binding::Property {
                source,
                ty,
                access,
                write,
                ..
            } => {
                if !access.can_write() {
                    return Err(DuckError::NotWritable(member.to_string()));
                }
                if !value.fits(ty) {
                    return Err(DuckError::Conversion {
                        member: member.to_string(),
                        from: value.kind_name().to_string(),
                        to: ty.to_string(),
                    });
                }
                let stored = match write {
                    Some(coercion) => self.apply(member, &value, *coercion)?,
                    None => value,
                };
                (source.clone(), stored)
            }
            Binding::Nested {
                source, ty, access, ..
            } => {
                if !access.can_write() {
                    return Err(DuckError::NotWritable(member.to_string()));
                }
                if !value.fits(ty) {
                    return Err(DuckError::Conversion {
                        member: member.to_string(),
                        from: value.kind_name().to_string(),
                        to: ty.to_string(),
                    });
                }
                (source.clone(), value)
            }
            Binding::Method { .. } => return Err(DuckError::NotAProperty(member.to_string())),
        };
        self.source
            .write(&source, stored)
            .map_err(|e| DuckError::value(member, e))
    }

    /// Invokes a method with dynamic arguments.
    pub fn call(&mut self, member: &str, args: Vec<Value>) -> Result<Value> {
        let Binding::Method {
            source,
            params,
            args: conversions,
            returns,
            ret,
        } = self.binding(member)?
        else {
            return Err(DuckError::NotAMethod(member.to_string()));
        };
        if args.len() != params.len() {
            return Err(DuckError::Arity {
                member: member.to_string(),
                expected: params.len(),
                actual: args.len(),
            });
        }
        let mut converted = Vec::with_capacity(args.len());
        for ((arg, param), coercion) in args.into_iter().zip(params).zip(conversions) {
            if !arg.fits(param) {
                return Err(DuckError::Conversion {
                    member: member.to_string(),
                    from: arg.kind_name().to_string(),
                    to: param.to_string(),
                });
            }
            converted.push(match coercion {
                Some(coercion) => self.apply(member, &arg, *coercion)?,
                None => arg,
            });
        }
        let (source, returns, ret) = (source.clone(), returns.clone(), *ret);
        let result = self
            .source
            .invoke(&source, converted)
            .map_err(|e| DuckError::value(member, e))?;
        if returns.contract().is_some() {
            return Ok(result);
        }
        self.convert(member, result, ret, &returns)
    }

    /// Adapts a nested contract member against its current value.
    ///
    /// Returns `Ok(None)` when the value is absent, no longer matches, or lies beyond the
    /// configured depth. The outer adapter stays usable either way.
    pub fn nested(&mut self, member: &str) -> Result<Option<Adapter<'_>>> {
        let (source, contract) = match self.binding(member)? {
            Binding::Nested {
                source,
                contract,
                access,
                ..
            } => {
                if !access.can_read() {
                    return Err(DuckError::NotReadable(member.to_string()));
                }
                (source.clone(), *contract)
            }
            _ => return Err(DuckError::NotNested(member.to_string())),
        };

        let next = self.depth + 1;
        if next > self.engine.config().max_depth {
            tracing::debug!(
                contract = self.contract.name(),
                member,
                max_depth = self.engine.config().max_depth,
                "nested adaptation beyond depth limit"
            );
            return Ok(None);
        }
        let descriptor = self.engine.describe_ref(contract)?;
        let Some(inner) = self.source.reborrow().into_nested(&source) else {
            tracing::debug!(contract = self.contract.name(), member, "nested value absent");
            return Ok(None);
        };
        let result = self
            .engine
            .matcher()
            .run(descriptor, inner.as_shared(), self.mode, next)?;
        if !result.satisfied() {
            tracing::debug!(
                contract = self.contract.name(),
                member,
                nested = contract.name(),
                "nested value no longer matches"
            );
            return Ok(None);
        }
        Ok(Some(Adapter::new(inner, result, self.engine.clone(), next)))
    }

    /// Converts a value read from the source into the declared type.
    fn convert(
        &self,
        member: &str,
        value: Value,
        coercion: Option<Coercion>,
        declared: &TypeDesc,
    ) -> Result<Value> {
        if value.fits(declared) {
            return Ok(value);
        }
        match coercion {
            Some(coercion) if value.scalar_kind() == Some(coercion.from) => {
                self.apply(member, &value, coercion)
            }
            _ => Err(DuckError::Conversion {
                member: member.to_string(),
                from: value.kind_name().to_string(),
                to: declared.to_string(),
            }),
        }
    }

    fn apply(&self, member: &str, value: &Value, coercion: Coercion) -> Result<Value> {
        self.engine
            .registry()
            .find(coercion.from, coercion.to)
            .and_then(|conversion| conversion.apply(value))
            .ok_or_else(|| DuckError::Conversion {
                member: member.to_string(),
                from: coercion.from.as_str().to_string(),
                to: coercion.to.as_str().to_string(),
            })
    }
}

impl fmt::Debug for Adapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Adapter")
            .field("contract", &self.contract.name())
            .field("mode", &self.mode)
            .field("depth", &self.depth)
            .field("members", &self.members().collect::<Vec<_>>())
            .finish()
    }
}
