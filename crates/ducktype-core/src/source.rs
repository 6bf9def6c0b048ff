//! Source shapes and the catalog of members they offer.

use crate::error::ValueError;
use crate::types::{Access, TypeDesc};
use crate::value::{CaseSensitivity, DuckMap, Value};
use std::borrow::Cow;

/// Reflected property of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyInfo {
    pub name: String,
    pub ty: TypeDesc,
    pub access: Access,
    /// Whether the property can be walked into as a nested source.
    pub nested: bool,
}

impl PropertyInfo {
    pub fn new(name: impl Into<String>, ty: TypeDesc, access: Access) -> Self {
        Self {
            name: name.into(),
            ty,
            access,
            nested: false,
        }
    }

    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }
}

/// Reflected method of a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodInfo {
    pub name: String,
    pub params: Vec<TypeDesc>,
    pub returns: TypeDesc,
}

impl MethodInfo {
    pub fn new(name: impl Into<String>, params: Vec<TypeDesc>, returns: TypeDesc) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
        }
    }
}

/// A typed value whose public members can be enumerated and accessed by name.
///
/// Implemented by `#[derive(Record)]`. Only public fields are reflected.
pub trait Record {
    fn properties(&self) -> Vec<PropertyInfo>;

    fn methods(&self) -> Vec<MethodInfo> {
        Vec::new()
    }

    fn get(&self, name: &str) -> Option<Value>;

    fn set(&mut self, name: &str, value: Value) -> Result<(), ValueError>;

    fn invoke(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ValueError> {
        let _ = args;
        Err(ValueError::NoSuchMember(name.to_string()))
    }

    fn nested(&self, name: &str) -> Option<SourceRef<'_>> {
        let _ = name;
        None
    }

    fn nested_mut(&mut self, name: &str) -> Option<SourceMut<'_>> {
        let _ = name;
        None
    }
}

/// Method table of a record, generated by `#[methods]` on an inherent impl block.
pub trait RecordMethods {
    fn method_infos() -> Vec<MethodInfo>
    where
        Self: Sized;

    fn invoke_method(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ValueError>;
}

/// Shared view of a source.
#[derive(Clone, Copy)]
pub enum SourceRef<'a> {
    Record(&'a (dyn Record + 'a)),
    Map(&'a DuckMap),
}

/// Exclusive view of a source; adapters hold one of these.
pub enum SourceMut<'a> {
    Record(&'a mut (dyn Record + 'a)),
    Map(&'a mut DuckMap),
}

impl<'a> SourceMut<'a> {
    pub fn as_shared(&self) -> SourceRef<'_> {
        match self {
            SourceMut::Record(record) => SourceRef::Record(&**record),
            SourceMut::Map(map) => SourceRef::Map(&**map),
        }
    }

    pub fn reborrow(&mut self) -> SourceMut<'_> {
        match self {
            SourceMut::Record(record) => SourceMut::Record(&mut **record),
            SourceMut::Map(map) => SourceMut::Map(&mut **map),
        }
    }

    pub(crate) fn read(&self, name: &str) -> Option<Value> {
        match self {
            SourceMut::Record(record) => record.get(name),
            SourceMut::Map(map) => map.get(name).cloned(),
        }
    }

    /// Stores into an existing member. Map entries are overwritten in place.
    pub(crate) fn write(&mut self, name: &str, value: Value) -> Result<(), ValueError> {
        match self {
            SourceMut::Record(record) => record.set(name, value),
            SourceMut::Map(map) => match map.get_mut(name) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(ValueError::NoSuchMember(name.to_string())),
            },
        }
    }

    pub(crate) fn invoke(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ValueError> {
        match self {
            SourceMut::Record(record) => record.invoke(name, args),
            SourceMut::Map(_) => Err(ValueError::NoSuchMember(name.to_string())),
        }
    }

    pub(crate) fn into_nested(self, name: &str) -> Option<SourceMut<'a>> {
        match self {
            SourceMut::Record(record) => record.nested_mut(name),
            SourceMut::Map(map) => match map.get_mut(name) {
                Some(Value::Map(inner)) => Some(SourceMut::Map(inner)),
                _ => None,
            },
        }
    }
}

impl<'a> SourceRef<'a> {
    pub(crate) fn nested(self, name: &str) -> Option<SourceRef<'a>> {
        match self {
            SourceRef::Record(record) => record.nested(name),
            SourceRef::Map(map) => match map.get(name) {
                Some(Value::Map(inner)) => Some(SourceRef::Map(inner)),
                _ => None,
            },
        }
    }
}

/// Anything that can be viewed as a source.
pub trait AsSource {
    fn as_source(&self) -> SourceRef<'_>;
    fn as_source_mut(&mut self) -> SourceMut<'_>;
}

impl AsSource for DuckMap {
    fn as_source(&self) -> SourceRef<'_> {
        SourceRef::Map(self)
    }

    fn as_source_mut(&mut self) -> SourceMut<'_> {
        SourceMut::Map(self)
    }
}

impl<'r> AsSource for dyn Record + 'r {
    fn as_source(&self) -> SourceRef<'_> {
        SourceRef::Record(self)
    }

    fn as_source_mut(&mut self) -> SourceMut<'_> {
        SourceMut::Record(self)
    }
}

/// Field types a record can expose as nested sources (`#[duck(nested)]`).
///
/// `None` means the nested value is currently absent.
pub trait NestedSource {
    fn nested_source(&self) -> Option<SourceRef<'_>>;
    fn nested_source_mut(&mut self) -> Option<SourceMut<'_>>;
}

impl NestedSource for DuckMap {
    fn nested_source(&self) -> Option<SourceRef<'_>> {
        Some(SourceRef::Map(self))
    }

    fn nested_source_mut(&mut self) -> Option<SourceMut<'_>> {
        Some(SourceMut::Map(self))
    }
}

impl NestedSource for Value {
    fn nested_source(&self) -> Option<SourceRef<'_>> {
        self.as_map().map(SourceRef::Map)
    }

    fn nested_source_mut(&mut self) -> Option<SourceMut<'_>> {
        self.as_map_mut().map(SourceMut::Map)
    }
}

impl<T: NestedSource> NestedSource for Option<T> {
    fn nested_source(&self) -> Option<SourceRef<'_>> {
        self.as_ref().and_then(T::nested_source)
    }

    fn nested_source_mut(&mut self) -> Option<SourceMut<'_>> {
        self.as_mut().and_then(T::nested_source_mut)
    }
}

impl<T: NestedSource + ?Sized> NestedSource for Box<T> {
    fn nested_source(&self) -> Option<SourceRef<'_>> {
        (**self).nested_source()
    }

    fn nested_source_mut(&mut self) -> Option<SourceMut<'_>> {
        (**self).nested_source_mut()
    }
}

/// Property-like member offered by a source.
#[derive(Clone)]
pub struct CatalogProperty<'s> {
    /// Member name as the source spells it.
    pub name: String,
    /// `None` when a map entry currently holds `Null`.
    pub ty: Option<TypeDesc>,
    pub access: Access,
    /// Current value: borrowed for map entries, a snapshot for readable record fields.
    pub value: Option<Cow<'s, Value>>,
    /// Whether the member can hold a nested source at all.
    pub nestable: bool,
    /// The nested source, when one is currently present.
    pub nested: Option<SourceRef<'s>>,
}

/// Result of a name lookup in a catalog.
pub enum Lookup<T> {
    Found(T),
    NotFound,
    Ambiguous(Vec<String>),
}

impl<T> Lookup<T> {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }
}

/// Members available on a source, built per match.
pub enum SourceCatalog<'s> {
    Object {
        record: &'s (dyn Record + 's),
        properties: Vec<PropertyInfo>,
        methods: Vec<MethodInfo>,
    },
    /// Map members are read straight from the map; nested maps are cataloged on demand.
    Map { map: &'s DuckMap },
}

impl<'s> SourceCatalog<'s> {
    pub fn build(source: SourceRef<'s>) -> Self {
        match source {
            SourceRef::Record(record) => SourceCatalog::Object {
                record,
                properties: record.properties(),
                methods: record.methods(),
            },
            SourceRef::Map(map) => SourceCatalog::Map { map },
        }
    }

    pub fn is_map(&self) -> bool {
        matches!(self, SourceCatalog::Map { .. })
    }

    /// Case rule used by strict lookups: records compare exactly, maps use their own rule.
    pub fn native_case(&self) -> CaseSensitivity {
        match self {
            SourceCatalog::Object { .. } => CaseSensitivity::Sensitive,
            SourceCatalog::Map { map } => map.case(),
        }
    }

    pub fn property(&self, name: &str, case: CaseSensitivity) -> Lookup<CatalogProperty<'s>> {
        match self {
            SourceCatalog::Object {
                record, properties, ..
            } => {
                let record: &'s (dyn Record + 's) = *record;
                let hits: Vec<&PropertyInfo> = properties
                    .iter()
                    .filter(|p| case.keys_equal(&p.name, name))
                    .collect();
                match hits.as_slice() {
                    [] => Lookup::NotFound,
                    [info] => Lookup::Found(CatalogProperty {
                        name: info.name.clone(),
                        ty: Some(info.ty.clone()),
                        access: info.access,
                        value: if info.access.can_read() && !info.nested {
                            record.get(&info.name).map(Cow::Owned)
                        } else {
                            None
                        },
                        nestable: info.nested,
                        nested: if info.nested {
                            record.nested(&info.name)
                        } else {
                            None
                        },
                    }),
                    many => Lookup::Ambiguous(many.iter().map(|p| p.name.clone()).collect()),
                }
            }
            SourceCatalog::Map { map } => {
                let map: &'s DuckMap = *map;
                let hits: Vec<(&'s str, &'s Value)> =
                    map.iter().filter(|(k, _)| case.keys_equal(k, name)).collect();
                match hits.as_slice() {
                    [] => Lookup::NotFound,
                    [(key, value)] => {
                        let value: &'s Value = *value;
                        Lookup::Found(CatalogProperty {
                            name: key.to_string(),
                            ty: value.infer_type(),
                            access: Access::ReadWrite,
                            value: Some(Cow::Borrowed(value)),
                            nestable: matches!(value, Value::Null | Value::Map(_)),
                            nested: value.as_map().map(SourceRef::Map),
                        })
                    }
                    many => Lookup::Ambiguous(many.iter().map(|(k, _)| k.to_string()).collect()),
                }
            }
        }
    }

    /// Methods are never available on maps; callers check [`SourceCatalog::is_map`] first.
    pub fn method(&self, name: &str, case: CaseSensitivity) -> Lookup<MethodInfo> {
        match self {
            SourceCatalog::Object { methods, .. } => {
                let hits: Vec<&MethodInfo> = methods
                    .iter()
                    .filter(|m| case.keys_equal(&m.name, name))
                    .collect();
                match hits.as_slice() {
                    [] => Lookup::NotFound,
                    [info] => Lookup::Found((*info).clone()),
                    many => Lookup::Ambiguous(many.iter().map(|m| m.name.clone()).collect()),
                }
            }
            SourceCatalog::Map { .. } => Lookup::NotFound,
        }
    }

    pub fn member_names(&self) -> Vec<String> {
        match self {
            SourceCatalog::Object {
                properties, methods, ..
            } => properties
                .iter()
                .map(|p| p.name.clone())
                .chain(methods.iter().map(|m| m.name.clone()))
                .collect(),
            SourceCatalog::Map { map } => map.keys().map(str::to_string).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;

    #[test]
    fn map_lookup_reports_ambiguity_only_when_folding_case() {
        let map = DuckMap::new().with("Name", "a").with("name", "b");
        let catalog = SourceCatalog::build(map.as_source());

        match catalog.property("name", CaseSensitivity::Sensitive) {
            Lookup::Found(prop) => {
                assert_eq!(prop.value.as_deref(), Some(&Value::Text("b".into())))
            }
            _ => panic!("exact lookup should hit"),
        }
        match catalog.property("NAME", CaseSensitivity::Insensitive) {
            Lookup::Ambiguous(names) => assert_eq!(names, vec!["Name", "name"]),
            _ => panic!("folded lookup should be ambiguous"),
        }
    }

    struct Badge {
        code: String,
    }

    impl Record for Badge {
        fn properties(&self) -> Vec<PropertyInfo> {
            vec![
                PropertyInfo::new("Code", TypeDesc::Scalar(ScalarKind::Text), Access::ReadWrite),
                PropertyInfo::new("Pin", TypeDesc::Scalar(ScalarKind::Int), Access::Write),
            ]
        }

        fn get(&self, name: &str) -> Option<Value> {
            (name == "Code").then(|| Value::Text(self.code.clone()))
        }

        fn set(&mut self, name: &str, _value: Value) -> Result<(), ValueError> {
            Err(ValueError::NoSuchMember(name.to_string()))
        }
    }

    #[test]
    fn readable_record_fields_carry_a_value_snapshot() {
        let badge = Badge { code: "b-7".into() };
        let catalog = SourceCatalog::build(SourceRef::Record(&badge));
        let Lookup::Found(code) = catalog.property("Code", CaseSensitivity::Sensitive) else {
            panic!("missing field");
        };
        assert_eq!(code.value.as_deref(), Some(&Value::Text("b-7".into())));
        let Lookup::Found(pin) = catalog.property("Pin", CaseSensitivity::Sensitive) else {
            panic!("missing field");
        };
        assert!(pin.value.is_none());
    }

    #[test]
    fn null_entries_have_no_type() {
        let map = DuckMap::new().with("Id", Value::Null);
        let catalog = SourceCatalog::build(map.as_source());
        let Lookup::Found(prop) = catalog.property("Id", catalog.native_case()) else {
            panic!("missing entry");
        };
        assert!(prop.ty.is_none());
        assert_eq!(prop.access, Access::ReadWrite);
    }

    #[test]
    fn nested_maps_are_exposed_for_recursion() {
        let map = DuckMap::new().with("Inner", DuckMap::new().with("Count", 3));
        let catalog = SourceCatalog::build(map.as_source());
        let Lookup::Found(prop) = catalog.property("Inner", CaseSensitivity::Sensitive) else {
            panic!("missing entry");
        };
        assert_eq!(prop.ty, Some(TypeDesc::Map));
        let Some(SourceRef::Map(inner)) = prop.nested else {
            panic!("nested map not exposed");
        };
        assert_eq!(inner.get("Count").and_then(Value::infer_type), Some(TypeDesc::Scalar(ScalarKind::Int)));
        assert!(catalog.method("Count", CaseSensitivity::Sensitive).is_not_found());
    }

    #[test]
    fn writes_into_map_entries_keep_the_key() {
        let mut map = DuckMap::case_insensitive().with("Total", 1);
        let mut source = map.as_source_mut();
        source.write("TOTAL", Value::Int(7)).unwrap();
        assert!(source.write("Missing", Value::Null).is_err());
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["Total"]);
        assert_eq!(map.get("total"), Some(&Value::Int(7)));
    }
}
