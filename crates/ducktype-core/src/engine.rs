use crate::adapter::Adapter;
use crate::config::EngineConfig;
use crate::contract::{
    registered_contracts, Contract, ContractDescriptor, ContractIntrospector, ContractRef,
};
use crate::convert::ConversionRegistry;
use crate::error::{DuckError, Result};
use crate::matching::{MatchResult, Matcher, Mode};
use crate::source::{AsSource, SourceCatalog, SourceMut, SourceRef};
use once_cell::sync::Lazy;
use std::sync::Arc;

/// Entry point for matching and adaptation.
///
/// Cheap to clone. Descriptors are shared process-wide; the conversion registry and options are
/// per engine.
#[derive(Clone)]
pub struct Engine {
    registry: Arc<ConversionRegistry>,
    introspector: &'static ContractIntrospector,
    config: EngineConfig,
}

static GLOBAL: Lazy<Engine> = Lazy::new(|| {
    let config = EngineConfig::from_env().unwrap_or_else(|err| {
        tracing::warn!(error = %format!("{err:#}"), "invalid ducktype configuration, using defaults");
        EngineConfig::default()
    });
    Engine::with_config(config)
});

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let registry = if config.builtin_conversions {
            ConversionRegistry::with_builtins()
        } else {
            ConversionRegistry::empty()
        };
        Self::with_registry(config, registry)
    }

    /// Uses `registry` as given; `config.builtin_conversions` is not consulted.
    pub fn with_registry(config: EngineConfig, registry: ConversionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            introspector: ContractIntrospector::global(),
            config,
        }
    }

    /// Shared engine configured from the environment (see [`EngineConfig::from_env`]).
    pub fn global() -> &'static Engine {
        &GLOBAL
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConversionRegistry {
        &self.registry
    }

    pub fn describe<C: Contract>(&self) -> Result<Arc<ContractDescriptor>> {
        self.describe_ref(ContractRef::of::<C>())
    }

    pub fn describe_ref(&self, contract: ContractRef) -> Result<Arc<ContractDescriptor>> {
        self.introspector.describe(contract)
    }

    pub fn catalog<'s, S: AsSource + ?Sized>(&self, source: &'s S) -> SourceCatalog<'s> {
        SourceCatalog::build(source.as_source())
    }

    /// Matches `source` against `C` and returns the full diagnostics.
    pub fn check<C: Contract, S: AsSource + ?Sized>(
        &self,
        source: &S,
        mode: Mode,
    ) -> Result<MatchResult> {
        self.check_ref(ContractRef::of::<C>(), source.as_source(), mode)
    }

    pub fn check_ref(
        &self,
        contract: ContractRef,
        source: SourceRef<'_>,
        mode: Mode,
    ) -> Result<MatchResult> {
        let descriptor = self.describe_ref(contract)?;
        self.matcher().run(descriptor, source, mode, 0)
    }

    pub fn can_adapt<C: Contract, S: AsSource + ?Sized>(&self, source: &S, mode: Mode) -> Result<bool> {
        Ok(self.check::<C, S>(source, mode)?.satisfied())
    }

    /// Adapts `source` to `C`, or returns `None` when it does not satisfy the contract.
    pub fn adapt<'a, C: Contract, S: AsSource + ?Sized>(
        &self,
        source: &'a mut S,
        mode: Mode,
    ) -> Result<Option<Adapter<'a>>> {
        self.adapt_ref(ContractRef::of::<C>(), source.as_source_mut(), mode)
    }

    pub fn adapt_ref<'a>(
        &self,
        contract: ContractRef,
        source: SourceMut<'a>,
        mode: Mode,
    ) -> Result<Option<Adapter<'a>>> {
        let result = self.check_ref(contract, source.as_shared(), mode)?;
        if !result.satisfied() {
            return Ok(None);
        }
        Ok(Some(Adapter::new(source, result, self.clone(), 0)))
    }

    /// Introspects every contract registered through `#[derive(Contract)]` and returns the
    /// ones that are malformed.
    pub fn verify_registered(&self) -> Vec<(&'static str, DuckError)> {
        let mut failures = Vec::new();
        for registered in registered_contracts() {
            if let Err(err) = self.describe_ref((registered.contract)()) {
                tracing::warn!(contract = registered.name, %err, "malformed contract");
                failures.push((registered.name, err));
            }
        }
        failures
    }

    pub(crate) fn matcher(&self) -> Matcher<'_> {
        Matcher {
            registry: &self.registry,
            introspector: self.introspector,
            max_depth: self.config.max_depth,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("conversions", &self.registry.len())
            .finish()
    }
}

/// Duck-typing helpers on every source, backed by [`Engine::global`].
///
/// Errors from malformed contracts are logged and reported as "does not adapt".
pub trait Adaptable: AsSource {
    fn can_adapt<C: Contract>(&self, mode: Mode) -> bool {
        Engine::global()
            .can_adapt::<C, Self>(self, mode)
            .unwrap_or_else(|err| {
                tracing::warn!(contract = C::contract_name(), %err, "contract check failed");
                false
            })
    }

    fn adapt<C: Contract>(&mut self, mode: Mode) -> Option<Adapter<'_>> {
        Engine::global()
            .adapt::<C, Self>(self, mode)
            .unwrap_or_else(|err| {
                tracing::warn!(contract = C::contract_name(), %err, "adaptation failed");
                None
            })
    }

    fn can_duck_as<C: Contract>(&self) -> bool {
        self.can_adapt::<C>(Mode::Strict)
    }

    fn duck_as<C: Contract>(&mut self) -> Option<Adapter<'_>> {
        self.adapt::<C>(Mode::Strict)
    }

    fn can_fuzzy_duck_as<C: Contract>(&self) -> bool {
        self.can_adapt::<C>(Mode::Fuzzy)
    }

    fn fuzzy_duck_as<C: Contract>(&mut self) -> Option<Adapter<'_>> {
        self.adapt::<C>(Mode::Fuzzy)
    }
}

impl<T: AsSource + ?Sized> Adaptable for T {}
