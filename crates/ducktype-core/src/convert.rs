//! Scalar conversions consulted when a declared type and an actual type differ.

use crate::types::ScalarKind;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

type ConvertFn = Arc<dyn Fn(&Value) -> Option<Value> + Send + Sync>;

/// Largest magnitude an `f64` represents without losing integer precision.
const EXACT_FLOAT_INT: i64 = 1 << 53;

/// One direction of a registered rule.
#[derive(Clone)]
pub struct Conversion {
    name: Arc<str>,
    from: ScalarKind,
    to: ScalarKind,
    apply: ConvertFn,
}

impl Conversion {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn from(&self) -> ScalarKind {
        self.from
    }

    pub fn to(&self) -> ScalarKind {
        self.to
    }

    /// Applies the conversion. `Null` passes through untouched.
    pub fn apply(&self, value: &Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        (self.apply)(value)
    }
}

impl fmt::Debug for Conversion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Conversion")
            .field("name", &self.name)
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

/// A bidirectional conversion between two scalar kinds.
///
/// Each direction returns `None` when its precondition does not hold. Rules must round-trip:
/// whenever `forward(v)` succeeds, `backward(forward(v)) == v` over the rule's canonical domain.
pub struct ConversionRule {
    name: Arc<str>,
    from: ScalarKind,
    to: ScalarKind,
    forward: ConvertFn,
    backward: ConvertFn,
}

impl ConversionRule {
    pub fn new<F, B>(name: &str, from: ScalarKind, to: ScalarKind, forward: F, backward: B) -> Self
    where
        F: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
        B: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
    {
        Self {
            name: Arc::from(name),
            from,
            to,
            forward: Arc::new(forward),
            backward: Arc::new(backward),
        }
    }
}

/// Registry of scalar conversions keyed by `(from, to)`.
#[derive(Clone, Default)]
pub struct ConversionRegistry {
    rules: BTreeMap<(ScalarKind, ScalarKind), Conversion>,
}

impl ConversionRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding the text/uuid and int/float pairs.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(text_uuid());
        registry.register(int_float());
        registry
    }

    /// Registers both directions of `rule`, replacing any rule for the same pairs.
    pub fn register(&mut self, rule: ConversionRule) -> &mut Self {
        let ConversionRule {
            name,
            from,
            to,
            forward,
            backward,
        } = rule;
        if from == to {
            tracing::warn!(rule = %name, kind = from.as_str(), "ignoring conversion between identical kinds");
            return self;
        }
        for (from, to, apply) in [(from, to, forward), (to, from, backward)] {
            let previous = self.rules.insert(
                (from, to),
                Conversion {
                    name: name.clone(),
                    from,
                    to,
                    apply,
                },
            );
            if let Some(previous) = previous {
                tracing::debug!(
                    replaced = previous.name(),
                    rule = %name,
                    from = from.as_str(),
                    to = to.as_str(),
                    "conversion replaced"
                );
            }
        }
        self
    }

    pub fn find(&self, from: ScalarKind, to: ScalarKind) -> Option<&Conversion> {
        self.rules.get(&(from, to))
    }

    /// Converts `value` from `from` to `to`. Identical kinds bypass the registry.
    pub fn try_convert(&self, value: &Value, from: ScalarKind, to: ScalarKind) -> Option<Value> {
        if from == to {
            return Some(value.clone());
        }
        self.find(from, to)?.apply(value)
    }

    pub fn rules(&self) -> impl Iterator<Item = &Conversion> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl fmt::Debug for ConversionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.rules.values()).finish()
    }
}

fn text_uuid() -> ConversionRule {
    ConversionRule::new(
        "text-uuid",
        ScalarKind::Text,
        ScalarKind::Uuid,
        |value| match value {
            Value::Text(text) => Uuid::parse_str(text.trim()).ok().map(Value::Uuid),
            _ => None,
        },
        |value| match value {
            Value::Uuid(id) => Some(Value::Text(id.hyphenated().to_string())),
            _ => None,
        },
    )
}

fn int_float() -> ConversionRule {
    ConversionRule::new(
        "int-float",
        ScalarKind::Int,
        ScalarKind::Float,
        |value| match value {
            Value::Int(i) if i.unsigned_abs() <= EXACT_FLOAT_INT.unsigned_abs() => {
                Some(Value::Float(*i as f64))
            }
            _ => None,
        },
        |value| match value {
            Value::Float(f)
                if f.is_finite()
                    && f.fract() == 0.0
                    && *f >= i64::MIN as f64
                    && *f < i64::MAX as f64 =>
            {
                Some(Value::Int(*f as i64))
            }
            _ => None,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn builtins_register_both_directions() {
        let registry = ConversionRegistry::with_builtins();
        assert_eq!(registry.len(), 4);
        for (from, to) in [
            (ScalarKind::Text, ScalarKind::Uuid),
            (ScalarKind::Uuid, ScalarKind::Text),
            (ScalarKind::Int, ScalarKind::Float),
            (ScalarKind::Float, ScalarKind::Int),
        ] {
            assert!(registry.find(from, to).is_some(), "{from:?} -> {to:?}");
        }
        assert!(registry.find(ScalarKind::Bool, ScalarKind::Text).is_none());
    }

    #[test]
    fn text_to_uuid_requires_valid_identifier() {
        let registry = ConversionRegistry::with_builtins();
        assert_eq!(
            registry.try_convert(&Value::Text("not-a-uuid".into()), ScalarKind::Text, ScalarKind::Uuid),
            None
        );
        let id = Uuid::new_v4();
        assert_eq!(
            registry.try_convert(
                &Value::Text(id.to_string().to_uppercase()),
                ScalarKind::Text,
                ScalarKind::Uuid
            ),
            Some(Value::Uuid(id))
        );
    }

    #[test]
    fn uuid_text_round_trip() {
        let registry = ConversionRegistry::with_builtins();
        for _ in 0..32 {
            let id = Value::Uuid(Uuid::new_v4());
            let text = registry
                .try_convert(&id, ScalarKind::Uuid, ScalarKind::Text)
                .unwrap();
            let back = registry
                .try_convert(&text, ScalarKind::Text, ScalarKind::Uuid)
                .unwrap();
            assert_eq!(back, id);
        }
    }

    #[test]
    fn int_float_round_trip_within_exact_range() {
        let registry = ConversionRegistry::with_builtins();
        let mut rng = rand::rng();
        for _ in 0..256 {
            let i = rng.random_range(-EXACT_FLOAT_INT..=EXACT_FLOAT_INT);
            let float = registry
                .try_convert(&Value::Int(i), ScalarKind::Int, ScalarKind::Float)
                .unwrap();
            let back = registry
                .try_convert(&float, ScalarKind::Float, ScalarKind::Int)
                .unwrap();
            assert_eq!(back, Value::Int(i));
        }
    }

    #[test]
    fn int_float_preconditions() {
        let registry = ConversionRegistry::with_builtins();
        let to_float = |i| registry.try_convert(&Value::Int(i), ScalarKind::Int, ScalarKind::Float);
        let to_int = |f| registry.try_convert(&Value::Float(f), ScalarKind::Float, ScalarKind::Int);

        assert!(to_float(i64::MAX).is_none());
        assert!(to_float(i64::MIN).is_none());
        assert!(to_float(-EXACT_FLOAT_INT).is_some());
        assert!(to_float(EXACT_FLOAT_INT + 1).is_none());
        assert!(to_int(1.5).is_none());
        assert!(to_int(f64::NAN).is_none());
        assert!(to_int(f64::INFINITY).is_none());
        assert!(to_int(1e300).is_none());
        assert_eq!(to_int(-4.0), Some(Value::Int(-4)));
    }

    #[test]
    fn null_passes_through_and_identity_bypasses() {
        let registry = ConversionRegistry::empty();
        assert_eq!(
            registry.try_convert(&Value::Int(3), ScalarKind::Int, ScalarKind::Int),
            Some(Value::Int(3))
        );
        assert!(registry
            .try_convert(&Value::Int(3), ScalarKind::Int, ScalarKind::Float)
            .is_none());

        let builtins = ConversionRegistry::with_builtins();
        let conversion = builtins.find(ScalarKind::Text, ScalarKind::Uuid).unwrap();
        assert_eq!(conversion.apply(&Value::Null), Some(Value::Null));
    }

    #[test]
    fn custom_rules_register_pairs() {
        let mut registry = ConversionRegistry::empty();
        registry.register(ConversionRule::new(
            "bool-int",
            ScalarKind::Bool,
            ScalarKind::Int,
            |v| match v {
                Value::Bool(b) => Some(Value::Int(i64::from(*b))),
                _ => None,
            },
            |v| match v {
                Value::Int(0) => Some(Value::Bool(false)),
                Value::Int(1) => Some(Value::Bool(true)),
                _ => None,
            },
        ));
        assert_eq!(
            registry.try_convert(&Value::Int(1), ScalarKind::Int, ScalarKind::Bool),
            Some(Value::Bool(true))
        );
        assert!(registry
            .try_convert(&Value::Int(2), ScalarKind::Int, ScalarKind::Bool)
            .is_none());
        assert_eq!(registry.find(ScalarKind::Int, ScalarKind::Bool).unwrap().name(), "bool-int");
    }
}
