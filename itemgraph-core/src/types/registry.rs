//! Process-wide type registry.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::{factory, ItemType, TypeError};
use crate::catalog::{ItemDefinition, TYPE_NAMESPACE};

#[derive(Debug, Default)]
struct Registered {
    by_name: HashMap<String, Arc<ItemType>>,
    by_id: HashMap<i64, Arc<ItemType>>,
    synthesized: HashMap<String, Arc<ItemType>>,
}

impl Registered {
    fn insert(&mut self, ty: &Arc<ItemType>) -> Result<(), TypeError> {
        let identity = ty.identity();
        let collides = |other: &Arc<ItemType>| other.identity() != identity;
        let existing = self
            .by_id
            .get(&identity.id())
            .filter(|other| collides(*other))
            .or_else(|| self.by_name.get(identity.name()).filter(|other| collides(*other)));
        if let Some(existing) = existing {
            return Err(TypeError::DuplicateIdentity {
                type_name: ty.name().to_string(),
                existing: existing.identity().clone(),
            });
        }
        self.by_name
            .insert(identity.name().to_string(), Arc::clone(ty));
        self.by_id.insert(identity.id(), Arc::clone(ty));
        Ok(())
    }
}

/// Registry of types keyed by host identity.
///
/// Registering a type under an identity that is already present replaces the
/// entry, so a user subtype takes over lookups for its kind. Synthesized base
/// types are additionally memoized per kind so synthesis stays idempotent.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    inner: RwLock<Registered>,
}

impl TypeRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type according to its registration mode. Returns whether
    /// it was added.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError::DuplicateIdentity`] if the numeric id or the
    /// qualified name is already taken by a different identity.
    pub fn register(&self, ty: &Arc<ItemType>, register_private: bool) -> Result<bool, TypeError> {
        if ty.is_generic() || !ty.registration.applies(ty.name(), register_private) {
            return Ok(false);
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.insert(ty)?;
        tracing::debug!(type_name = ty.name(), identity = %ty.identity(), "item type registered");
        Ok(true)
    }

    /// Synthesize (once) and register the base type for a definition.
    ///
    /// # Errors
    ///
    /// Returns [`TypeError`] if composition or registration fails.
    pub fn synthesize(
        &self,
        def: &Arc<ItemDefinition>,
        register_private: bool,
    ) -> Result<Arc<ItemType>, TypeError> {
        if let Some(ty) = self.synthesized(&def.kind_name) {
            return Ok(ty);
        }
        let ty = Arc::new(factory::synthesize(def)?);

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = inner.synthesized.get(&def.kind_name) {
            return Ok(Arc::clone(existing));
        }
        if ty.registration.applies(ty.name(), register_private) {
            inner.insert(&ty)?;
        }
        inner
            .synthesized
            .insert(def.kind_name.clone(), Arc::clone(&ty));
        Ok(ty)
    }

    /// Previously synthesized base type of a kind.
    #[must_use]
    pub fn synthesized(&self, kind: &str) -> Option<Arc<ItemType>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.synthesized.get(kind).cloned()
    }

    /// Registered type for a qualified host type name or a bare kind name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<ItemType>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_name.get(name).cloned().or_else(|| {
            inner
                .by_name
                .get(&format!("{TYPE_NAMESPACE}::{name}"))
                .cloned()
        })
    }

    /// Registered type for a numeric type id.
    #[must_use]
    pub fn by_id(&self, id: i64) -> Option<Arc<ItemType>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.by_id.get(&id).cloned()
    }

    /// All registered types, ordered by numeric id.
    #[must_use]
    pub fn types(&self) -> Vec<Arc<ItemType>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let mut types: Vec<_> = inner.by_id.values().cloned().collect();
        types.sort_by_key(|ty| ty.identity().id());
        types
    }

    /// Registered types matching a predicate, ordered by numeric id.
    #[must_use]
    pub fn filter(&self, predicate: impl Fn(&ItemType) -> bool) -> Vec<Arc<ItemType>> {
        self.types().into_iter().filter(|ty| predicate(ty)).collect()
    }

    /// Number of registered types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_id
            .len()
    }

    /// Whether nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandForm, CommandSpec, ParamSpec, ReturnKind};
    use crate::types::{Registration, TypeBuilder, TypeIdentity};
    use serde_json::json;

    fn def(kind: &str, id: i64) -> Arc<ItemDefinition> {
        let spec = CommandSpec {
            name: format!("add_{}", kind.trim_start_matches("mv").to_lowercase()),
            form: CommandForm::Simple,
            returns: ReturnKind::Handle,
            params: vec![
                ParamSpec::keyword("tag", json!(0)),
                ParamSpec::keyword("parent", json!(0)),
            ],
        };
        Arc::new(ItemDefinition::from_command(kind, id, &spec, None))
    }

    #[test]
    fn test_synthesize_is_idempotent() {
        let registry = TypeRegistry::new();
        let button = def("mvButton", 1);
        let first = registry.synthesize(&button, false).unwrap();
        let second = registry.synthesize(&button, false).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_by_id_and_name() {
        let registry = TypeRegistry::new();
        let text = registry.synthesize(&def("mvText", 9), false).unwrap();
        assert!(Arc::ptr_eq(&registry.by_id(9).unwrap(), &text));
        assert!(Arc::ptr_eq(&registry.get("mvAppItemType::mvText").unwrap(), &text));
        assert!(Arc::ptr_eq(&registry.get("mvText").unwrap(), &text));
        assert!(registry.get("mvButton").is_none());
    }

    #[test]
    fn test_duplicate_numeric_id_is_rejected() {
        let registry = TypeRegistry::new();
        registry.synthesize(&def("mvText", 9), false).unwrap();
        let err = registry.synthesize(&def("mvButton", 9), false).unwrap_err();
        assert!(matches!(err, TypeError::DuplicateIdentity { .. }));
    }

    #[test]
    fn test_subtype_replaces_registration_but_not_synthesis() {
        let registry = TypeRegistry::new();
        let button = registry.synthesize(&def("mvButton", 1), false).unwrap();
        let fancy = Arc::new(TypeBuilder::new("FancyButton").inherit(&button).build().unwrap());
        assert!(registry.register(&fancy, false).unwrap());

        assert!(Arc::ptr_eq(&registry.by_id(1).unwrap(), &fancy));
        assert!(Arc::ptr_eq(&registry.synthesized("mvButton").unwrap(), &button));
    }

    #[test]
    fn test_private_names_skip_registration() {
        let registry = TypeRegistry::new();
        let ty = Arc::new(
            TypeBuilder::new("_Hidden")
                .identity(TypeIdentity::new(3, "mvAppItemType::mvGroup").unwrap())
                .build()
                .unwrap(),
        );
        assert!(!registry.register(&ty, false).unwrap());
        assert!(registry.is_empty());
        assert!(registry.register(&ty, true).unwrap());

        let forced = Arc::new(
            TypeBuilder::new("_Forced")
                .identity(TypeIdentity::new(4, "mvAppItemType::mvTab").unwrap())
                .register(Registration::Force)
                .build()
                .unwrap(),
        );
        assert!(registry.register(&forced, false).unwrap());
        assert_eq!(registry.len(), 2);
    }
}
