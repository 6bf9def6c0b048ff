//! Contract declaration, introspection and the process-wide descriptor cache.

use crate::error::DuckError;
use crate::types::{Access, TypeDesc, Typed};
use once_cell::sync::{Lazy, OnceCell};
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock};

/// A statically declared capability contract.
///
/// Usually derived with `#[derive(Contract)]`; a manual implementation pushes its members into
/// the [`ContractDecl`] it is handed.
pub trait Contract: 'static {
    fn declare(decl: &mut ContractDecl);

    fn contract_name() -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Type-erased handle to a [`Contract`]. Equality and hashing follow the contract's `TypeId`.
#[derive(Clone, Copy)]
pub struct ContractRef {
    type_id: fn() -> TypeId,
    name: fn() -> &'static str,
    declare: fn(&mut ContractDecl),
}

impl ContractRef {
    pub fn of<C: Contract>() -> Self {
        Self {
            type_id: TypeId::of::<C>,
            name: C::contract_name,
            declare: C::declare,
        }
    }

    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    fn declare_into(&self, decl: &mut ContractDecl) {
        (self.declare)(decl)
    }
}

impl PartialEq for ContractRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl Eq for ContractRef {}

impl Hash for ContractRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id().hash(state)
    }
}

impl fmt::Debug for ContractRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContractRef").field(&self.name()).finish()
    }
}

/// One required member of a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberDescriptor {
    Property {
        name: String,
        ty: TypeDesc,
        access: Access,
    },
    Method {
        name: String,
        params: Vec<TypeDesc>,
        returns: TypeDesc,
    },
}

impl MemberDescriptor {
    pub fn name(&self) -> &str {
        match self {
            MemberDescriptor::Property { name, .. } | MemberDescriptor::Method { name, .. } => name,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self, MemberDescriptor::Method { .. })
    }
}

#[derive(Debug, Clone)]
enum Declared {
    Member(MemberDescriptor),
    Unsupported { name: String, shape: &'static str },
}

/// Collector handed to [`Contract::declare`].
#[derive(Debug, Default)]
pub struct ContractDecl {
    members: Vec<Declared>,
    bases: Vec<ContractRef>,
}

impl ContractDecl {
    pub fn extends<C: Contract>(&mut self) -> &mut Self {
        self.bases.push(ContractRef::of::<C>());
        self
    }

    pub fn property(&mut self, name: impl Into<String>, ty: TypeDesc, access: Access) -> &mut Self {
        self.members.push(Declared::Member(MemberDescriptor::Property {
            name: name.into(),
            ty,
            access,
        }));
        self
    }

    /// Shorthand for a property whose type is given by a Rust type.
    pub fn field<T: Typed>(&mut self, name: impl Into<String>, access: Access) -> &mut Self {
        self.property(name, T::type_desc(), access)
    }

    pub fn method(
        &mut self,
        name: impl Into<String>,
        params: Vec<TypeDesc>,
        returns: TypeDesc,
    ) -> &mut Self {
        self.members.push(Declared::Member(MemberDescriptor::Method {
            name: name.into(),
            params,
            returns,
        }));
        self
    }

    /// Declares an indexer. Indexers cannot be adapted; introspection rejects the contract.
    pub fn indexer(&mut self, key: TypeDesc, value: TypeDesc) -> &mut Self {
        self.members.push(Declared::Unsupported {
            name: format!("[{key}] -> {value}"),
            shape: "indexers cannot be adapted",
        });
        self
    }

    /// Declares an event. Events cannot be adapted; introspection rejects the contract.
    pub fn event(&mut self, name: impl Into<String>) -> &mut Self {
        self.members.push(Declared::Unsupported {
            name: name.into(),
            shape: "events cannot be adapted",
        });
        self
    }
}

/// Flattened, de-duplicated member list of a contract.
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    contract: ContractRef,
    members: Vec<MemberDescriptor>,
}

impl ContractDescriptor {
    pub fn contract(&self) -> ContractRef {
        self.contract
    }

    pub fn name(&self) -> &'static str {
        self.contract.name()
    }

    pub fn members(&self) -> &[MemberDescriptor] {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&MemberDescriptor> {
        self.members.iter().find(|m| m.name() == name)
    }
}

type Described = Result<Arc<ContractDescriptor>, DuckError>;

/// Memoizes [`ContractDescriptor`]s per contract identity.
///
/// The map lock is only held while finding or inserting the per-contract cell; building happens
/// inside that cell's `get_or_init`, so concurrent first callers wait for one published result.
#[derive(Default)]
pub struct ContractIntrospector {
    cells: RwLock<HashMap<TypeId, Arc<OnceCell<Described>>>>,
}

static GLOBAL: Lazy<ContractIntrospector> = Lazy::new(ContractIntrospector::default);

impl ContractIntrospector {
    pub fn global() -> &'static ContractIntrospector {
        &GLOBAL
    }

    pub fn describe(&self, contract: ContractRef) -> Described {
        let id = contract.type_id();
        let existing = self
            .cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .cloned();
        let cell = match existing {
            Some(cell) => cell,
            None => self
                .cells
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(id)
                .or_default()
                .clone(),
        };
        cell.get_or_init(|| {
            let built = build(contract).map(Arc::new);
            match &built {
                Ok(descriptor) => tracing::trace!(
                    contract = contract.name(),
                    members = descriptor.members.len(),
                    "introspected contract"
                ),
                Err(err) => tracing::trace!(contract = contract.name(), %err, "rejected contract"),
            }
            built
        })
        .clone()
    }

    /// Number of contract identities seen so far.
    pub fn cached(&self) -> usize {
        self.cells
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

fn build(contract: ContractRef) -> Result<ContractDescriptor, DuckError> {
    let mut members = Vec::new();
    let mut seen = HashSet::new();
    let mut chain = Vec::new();
    flatten(contract, contract, &mut chain, &mut seen, &mut members)?;
    Ok(ContractDescriptor { contract, members })
}

fn flatten(
    root: ContractRef,
    contract: ContractRef,
    chain: &mut Vec<ContractRef>,
    seen: &mut HashSet<String>,
    out: &mut Vec<MemberDescriptor>,
) -> Result<(), DuckError> {
    if chain.contains(&contract) {
        let path = chain
            .iter()
            .chain(std::iter::once(&contract))
            .map(|c| c.name())
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(DuckError::UnsupportedContractShape {
            contract: root.name().to_string(),
            member: contract.name().to_string(),
            reason: format!("inheritance cycle {path}"),
        });
    }
    chain.push(contract);

    let mut decl = ContractDecl::default();
    contract.declare_into(&mut decl);

    for declared in decl.members {
        let member = match declared {
            Declared::Member(member) => member,
            Declared::Unsupported { name, shape } => {
                return Err(unsupported(root, contract, &name, shape));
            }
        };
        check_shape(root, contract, &member)?;
        if seen.insert(member.name().to_string()) {
            out.push(member);
        }
    }
    for base in decl.bases {
        flatten(root, base, chain, seen, out)?;
    }

    chain.pop();
    Ok(())
}

fn check_shape(
    root: ContractRef,
    owner: ContractRef,
    member: &MemberDescriptor,
) -> Result<(), DuckError> {
    match member {
        MemberDescriptor::Property { name, ty, .. } => {
            if matches!(ty.base(), TypeDesc::Unit) {
                return Err(unsupported(root, owner, name, "unit-typed properties carry no value"));
            }
        }
        MemberDescriptor::Method { name, params, .. } => {
            if params.iter().any(|p| p.contract().is_some()) {
                return Err(unsupported(
                    root,
                    owner,
                    name,
                    "nested contracts cannot be passed as method arguments",
                ));
            }
        }
    }
    Ok(())
}

fn unsupported(root: ContractRef, owner: ContractRef, member: &str, reason: &str) -> DuckError {
    let member = if root == owner {
        member.to_string()
    } else {
        format!("{}::{member}", owner.name())
    };
    DuckError::UnsupportedContractShape {
        contract: root.name().to_string(),
        member,
        reason: reason.to_string(),
    }
}

/// Link-time registration of a contract, emitted by `#[derive(Contract)]` for non-generic
/// contracts.
pub struct RegisteredContract {
    pub name: &'static str,
    pub contract: fn() -> ContractRef,
}

inventory::collect!(RegisteredContract);

/// All registered contracts, sorted and de-duplicated by name.
pub fn registered_contracts() -> Vec<&'static RegisteredContract> {
    let mut out: Vec<&'static RegisteredContract> =
        inventory::iter::<RegisteredContract>.into_iter().collect();
    out.sort_by(|a, b| a.name.cmp(b.name));
    out.dedup_by(|a, b| a.name == b.name);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarKind;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct HasAnActorId;
    impl Contract for HasAnActorId {
        fn declare(decl: &mut ContractDecl) {
            decl.field::<uuid::Uuid>("ActorId", Access::Read);
        }
    }

    struct ActivityParameters;
    impl Contract for ActivityParameters {
        fn declare(decl: &mut ContractDecl) {
            decl.field::<uuid::Uuid>("TaskId", Access::Read)
                .method("DoNothing", vec![], TypeDesc::Unit)
                .extends::<HasAnActorId>();
        }
    }

    struct WithPayload<T>(std::marker::PhantomData<T>);
    impl<T: Typed + 'static> Contract for WithPayload<T> {
        fn declare(decl: &mut ContractDecl) {
            decl.field::<T>("Payload", Access::Read)
                .extends::<ActivityParameters>();
        }
    }

    #[test]
    fn flattens_bases_after_own_members() {
        let descriptor = ContractIntrospector::default()
            .describe(ContractRef::of::<WithPayload<String>>())
            .unwrap();
        let names: Vec<_> = descriptor.members().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["Payload", "TaskId", "DoNothing", "ActorId"]);
        assert!(matches!(
            descriptor.member("Payload"),
            Some(MemberDescriptor::Property { ty: TypeDesc::Scalar(ScalarKind::Text), .. })
        ));
    }

    #[test]
    fn generic_instantiations_are_distinct_contracts() {
        let introspector = ContractIntrospector::default();
        let text = introspector.describe(ContractRef::of::<WithPayload<String>>()).unwrap();
        let uid = introspector
            .describe(ContractRef::of::<WithPayload<uuid::Uuid>>())
            .unwrap();
        assert_ne!(text.member("Payload"), uid.member("Payload"));
        assert_eq!(introspector.cached(), 2);
    }

    struct Left;
    impl Contract for Left {
        fn declare(decl: &mut ContractDecl) {
            decl.field::<String>("Name", Access::Read);
        }
    }

    struct Right;
    impl Contract for Right {
        fn declare(decl: &mut ContractDecl) {
            decl.field::<i32>("Name", Access::ReadWrite)
                .field::<i32>("Size", Access::Read);
        }
    }

    struct Diamond;
    impl Contract for Diamond {
        fn declare(decl: &mut ContractDecl) {
            decl.extends::<Left>().extends::<Right>();
        }
    }

    #[test]
    fn diamond_collision_keeps_first_declaration() {
        let descriptor = ContractIntrospector::default()
            .describe(ContractRef::of::<Diamond>())
            .unwrap();
        assert_eq!(descriptor.members().len(), 2);
        assert_eq!(
            descriptor.member("Name"),
            Some(&MemberDescriptor::Property {
                name: "Name".into(),
                ty: TypeDesc::Scalar(ScalarKind::Text),
                access: Access::Read,
            })
        );
    }

    struct Indexed;
    impl Contract for Indexed {
        fn declare(decl: &mut ContractDecl) {
            decl.field::<String>("Name", Access::Read)
                .indexer(TypeDesc::Scalar(ScalarKind::Int), TypeDesc::Any);
        }
    }

    #[test]
    fn indexers_are_rejected_and_rejection_is_cached() {
        let introspector = ContractIntrospector::default();
        let first = introspector.describe(ContractRef::of::<Indexed>()).unwrap_err();
        let second = introspector.describe(ContractRef::of::<Indexed>()).unwrap_err();
        assert!(matches!(first, DuckError::UnsupportedContractShape { .. }));
        assert_eq!(first, second);
    }

    struct InheritsEvent;
    impl Contract for InheritsEvent {
        fn declare(decl: &mut ContractDecl) {
            decl.extends::<Evented>();
        }
    }

    struct Evented;
    impl Contract for Evented {
        fn declare(decl: &mut ContractDecl) {
            decl.event("Changed");
        }
    }

    #[test]
    fn inherited_events_are_rejected_with_owner_prefix() {
        let err = ContractIntrospector::default()
            .describe(ContractRef::of::<InheritsEvent>())
            .unwrap_err();
        match err {
            DuckError::UnsupportedContractShape { member, .. } => {
                assert!(member.ends_with("::Changed"), "{member}");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    struct Ping;
    impl Contract for Ping {
        fn declare(decl: &mut ContractDecl) {
            decl.extends::<Pong>();
        }
    }

    struct Pong;
    impl Contract for Pong {
        fn declare(decl: &mut ContractDecl) {
            decl.extends::<Ping>();
        }
    }

    #[test]
    fn inheritance_cycles_are_rejected() {
        let err = ContractIntrospector::default()
            .describe(ContractRef::of::<Ping>())
            .unwrap_err();
        assert!(err.to_string().contains("inheritance cycle"));
    }

    struct Node;
    impl Contract for Node {
        fn declare(decl: &mut ContractDecl) {
            decl.property("Next", TypeDesc::Contract(ContractRef::of::<Node>()), Access::Read);
        }
    }

    #[test]
    fn self_referencing_members_do_not_recurse() {
        let descriptor = ContractIntrospector::default()
            .describe(ContractRef::of::<Node>())
            .unwrap();
        assert_eq!(descriptor.members().len(), 1);
    }

    struct Sink;
    impl Contract for Sink {
        fn declare(decl: &mut ContractDecl) {
            decl.method(
                "Accept",
                vec![TypeDesc::Contract(ContractRef::of::<Node>())],
                TypeDesc::Unit,
            );
        }
    }

    #[test]
    fn contract_typed_parameters_are_rejected() {
        assert!(ContractIntrospector::default()
            .describe(ContractRef::of::<Sink>())
            .is_err());
    }

    static DECLARATIONS: AtomicUsize = AtomicUsize::new(0);

    struct Counted;
    impl Contract for Counted {
        fn declare(decl: &mut ContractDecl) {
            DECLARATIONS.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(5));
            decl.field::<String>("Name", Access::Read);
        }
    }

    #[test]
    fn concurrent_first_use_publishes_one_descriptor() {
        let introspector = ContractIntrospector::default();
        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| introspector.describe(ContractRef::of::<Counted>())))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap().unwrap()).collect()
        });
        assert_eq!(DECLARATIONS.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
