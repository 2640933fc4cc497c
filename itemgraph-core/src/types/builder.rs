//! Type composition.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::{
    ConfigurationHook, ConfigureHook, GetStateHook, InitHook, ItemType, Property, PropertyGetter,
    PropertySetter, SetStateHook, TypeError, TypeHooks, TypeIdentity,
};
use crate::catalog::ItemDefinition;
use crate::item::Interface;
use crate::mixin::{linearize, Accessor, Layer, Mixin, Shape};
use crate::ItemResult;

/// Member names that carry the handle's identity and truthiness. The integer
/// handle must stay the only truthiness signal, so no type may shadow them.
pub const RESERVED_MEMBERS: &[&str] = &["tag", "handle", "uuid", "truthy", "bool"];

/// State keys every item reports, exposed as read-only attributes.
const COMMON_STATE: &[&str] = &[
    "pos",
    "rect_min",
    "rect_max",
    "rect_size",
    "hovered",
    "active",
    "focused",
    "clicked",
    "visible",
];

/// Whether a built type is added to the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Registration {
    /// Register unless the name follows the private `_` convention.
    #[default]
    Auto,
    /// Always register.
    Force,
    /// Never register.
    Never,
}

impl Registration {
    /// Whether a type called `name` should be registered.
    #[must_use]
    pub fn applies(self, name: &str, register_private: bool) -> bool {
        match self {
            Self::Force => true,
            Self::Never => false,
            Self::Auto => register_private || !name.starts_with('_'),
        }
    }
}

/// Builder for synthesized and user-defined item types.
///
/// # Example
///
/// ```
/// use itemgraph_core::mixin::{Mixin, Shape};
/// use itemgraph_core::types::{TypeBuilder, TypeIdentity};
///
/// let ty = TypeBuilder::new("Labelled")
///     .identity(TypeIdentity::new(12, "mvAppItemType::mvText").unwrap())
///     .shape(Shape::Basic)
///     .mixin(Mixin::Callback)
///     .build()
///     .unwrap();
/// assert!(ty.has(Mixin::Basic));
/// ```
#[derive(Default)]
pub struct TypeBuilder {
    name: String,
    identity: Option<TypeIdentity>,
    definition: Option<Arc<ItemDefinition>>,
    bases: Vec<Arc<ItemType>>,
    mixins: Vec<Mixin>,
    shape: Option<Shape>,
    hooks: TypeHooks,
    properties: Vec<(String, Property)>,
    registration: Registration,
}

impl std::fmt::Debug for TypeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeBuilder")
            .field("name", &self.name)
            .field("identity", &self.identity)
            .field("bases", &self.bases.len())
            .field("mixins", &self.mixins)
            .finish_non_exhaustive()
    }
}

impl TypeBuilder {
    /// Start a type called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the host identity.
    #[must_use]
    pub fn identity(mut self, identity: TypeIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the kind definition (creation command and parameter tables).
    #[must_use]
    pub fn definition(mut self, definition: Arc<ItemDefinition>) -> Self {
        self.definition = Some(definition);
        self
    }

    /// Extend an existing type.
    #[must_use]
    pub fn inherit(mut self, base: &Arc<ItemType>) -> Self {
        self.bases.push(Arc::clone(base));
        self
    }

    /// Add a functional or family mixin.
    #[must_use]
    pub fn mixin(mut self, mixin: Mixin) -> Self {
        self.mixins.push(mixin);
        self
    }

    /// Set the low-level shape.
    #[must_use]
    pub fn shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Run `hook` after every successful creation.
    #[must_use]
    pub fn on_init(
        mut self,
        hook: impl Fn(&Interface<'_>) -> ItemResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.init = Some(Arc::new(hook) as InitHook);
        self
    }

    /// Intercept configure calls. The hook returns the keys to forward.
    #[must_use]
    pub fn on_configure(
        mut self,
        hook: impl Fn(&Interface<'_>, Map<String, Value>) -> ItemResult<Map<String, Value>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.hooks.configure = Some(Arc::new(hook) as ConfigureHook);
        self
    }

    /// Amend the configuration read back from the host.
    #[must_use]
    pub fn on_configuration(
        mut self,
        hook: impl Fn(&Interface<'_>, &mut Map<String, Value>) -> ItemResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.configuration = Some(Arc::new(hook) as ConfigurationHook);
        self
    }

    /// Produce custom state for save states.
    #[must_use]
    pub fn get_state(
        mut self,
        hook: impl Fn(&Interface<'_>) -> ItemResult<Option<Map<String, Value>>> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.get_state = Some(Arc::new(hook) as GetStateHook);
        self
    }

    /// Apply custom state from save states.
    #[must_use]
    pub fn set_state(
        mut self,
        hook: impl Fn(&Interface<'_>, &Map<String, Value>) -> ItemResult<()> + Send + Sync + 'static,
    ) -> Self {
        self.hooks.set_state = Some(Arc::new(hook) as SetStateHook);
        self
    }

    /// Add a custom attribute. It shadows every generated one.
    #[must_use]
    pub fn property(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&Interface<'_>) -> ItemResult<Value> + Send + Sync + 'static,
        set: Option<PropertySetter>,
    ) -> Self {
        self.properties.push((
            name.into(),
            Property::Custom {
                get: Arc::new(get) as PropertyGetter,
                set,
            },
        ));
        self
    }

    /// Choose the registration mode.
    #[must_use]
    pub fn register(mut self, registration: Registration) -> Self {
        self.registration = registration;
        self
    }

    /// Compose the type.
    ///
    /// # Errors
    ///
    /// - [`TypeError::TruthinessOverride`] if a property shadows an identity member.
    /// - [`TypeError::IncompatibleBases`] if bases disagree on creation command,
    ///   host identity or shape.
    pub fn build(self) -> Result<ItemType, TypeError> {
        let Self {
            name,
            identity,
            definition,
            bases,
            mixins,
            shape,
            mut hooks,
            properties,
            registration,
        } = self;

        if let Some((member, _)) = properties
            .iter()
            .find(|(n, _)| RESERVED_MEMBERS.contains(&n.as_str()))
        {
            return Err(TypeError::TruthinessOverride {
                type_name: name,
                member: member.clone(),
            });
        }

        let incompatible = |reason: String| TypeError::IncompatibleBases {
            type_name: name.clone(),
            reason,
        };

        let mut commands: Vec<&str> = Vec::new();
        let mut identities: Vec<TypeIdentity> = Vec::new();
        let mut shapes: Vec<Shape> = Vec::new();
        if let Some(def) = &definition {
            commands.push(&def.creation_command);
            identities.push(TypeIdentity::new(def.numeric_type_id, def.qualified_name())?);
        }
        identities.extend(identity);
        shapes.extend(shape);
        for base in &bases {
            commands.extend(base.command());
            identities.push(base.identity.clone());
            shapes.extend(base.shape);
        }
        commands.sort_unstable();
        commands.dedup();
        identities.retain(|i| !i.is_generic());
        identities.dedup();
        if identities.iter().any(|i| *i != identities[0]) {
            let names: Vec<String> = identities.iter().map(ToString::to_string).collect();
            return Err(incompatible(format!("identities {}", names.join(", "))));
        }
        if commands.len() > 1 {
            return Err(incompatible(format!("creation commands {}", commands.join(", "))));
        }
        if shapes.iter().any(|s| *s != shapes[0]) {
            return Err(incompatible(format!("shapes {shapes:?}")));
        }

        let identity = identities.into_iter().next().unwrap_or_else(TypeIdentity::generic);
        let definition = definition.or_else(|| bases.iter().find_map(|b| b.definition.clone()));
        let shape = shapes.first().copied();

        let mut declared: Vec<Mixin> = mixins;
        for base in &bases {
            declared.extend(base.bases.iter().filter(|m| m.layer() != Layer::Shape));
        }
        if let Some(shape) = shape {
            declared.extend(shape.mixins());
        }
        let mut seen = Vec::with_capacity(declared.len());
        declared.retain(|m| {
            let fresh = !seen.contains(m);
            seen.push(*m);
            fresh
        });
        declared.sort_by_key(|m| m.layer());
        let mro = linearize(&declared);

        let mut custom_properties = properties;
        for base in &bases {
            custom_properties.extend(base.custom_properties.iter().cloned());
        }
        for base in &bases {
            hooks.inherit(&base.hooks);
        }

        let properties = resolve_properties(&custom_properties, &mro, definition.as_deref());

        Ok(ItemType {
            name,
            identity,
            definition,
            shape,
            bases: declared,
            mro,
            properties,
            custom_properties,
            hooks,
            registration,
        })
    }
}

/// Attribute table in resolution order: custom properties, mixin accessors in
/// resolution order, common accessors, then configuration forwarding.
fn resolve_properties(
    custom: &[(String, Property)],
    mro: &[Mixin],
    definition: Option<&ItemDefinition>,
) -> BTreeMap<String, Property> {
    let mut properties = BTreeMap::new();
    for (name, property) in custom {
        properties
            .entry(name.clone())
            .or_insert_with(|| property.clone());
    }
    for mixin in mro {
        for (name, accessor) in mixin.accessors() {
            properties
                .entry((*name).to_string())
                .or_insert(Property::Derived(*accessor));
        }
    }
    for (name, accessor) in [
        ("value", Accessor::Value),
        ("alias", Accessor::Alias),
        ("parent", Accessor::Parent),
    ] {
        properties
            .entry(name.to_string())
            .or_insert(Property::Derived(accessor));
    }
    for key in COMMON_STATE {
        properties
            .entry((*key).to_string())
            .or_insert_with(|| Property::State((*key).to_string()));
    }
    if let Some(def) = definition {
        for key in def.read_config.iter().chain(&def.write_config) {
            properties
                .entry(key.clone())
                .or_insert_with(|| Property::Config(key.clone()));
        }
    }
    properties
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CommandForm, CommandSpec, ParamSpec, ReturnKind};
    use serde_json::json;

    fn definition(kind: &str, id: i64, command: &str) -> Arc<ItemDefinition> {
        let spec = CommandSpec {
            name: command.to_string(),
            form: CommandForm::Simple,
            returns: ReturnKind::Handle,
            params: vec![
                ParamSpec::keyword("tag", json!(0)),
                ParamSpec::keyword("parent", json!(0)),
                ParamSpec::keyword("label", json!(null)),
                ParamSpec::keyword("width", json!(0)),
                ParamSpec::keyword("height", json!(0)),
                ParamSpec::keyword("pos", json!([])),
            ],
        };
        Arc::new(ItemDefinition::from_command(kind, id, &spec, None))
    }

    fn base(kind: &str, id: i64, command: &str) -> Arc<ItemType> {
        Arc::new(
            TypeBuilder::new(kind)
                .definition(definition(kind, id, command))
                .shape(Shape::Basic)
                .mixin(Mixin::Sized)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn test_union_of_different_commands_is_rejected() {
        let button = base("mvButton", 1, "add_button");
        let text = base("mvText", 2, "add_text");
        let err = TypeBuilder::new("Both")
            .inherit(&button)
            .inherit(&text)
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::IncompatibleBases { .. }));
    }

    #[test]
    fn test_conflicting_identity_is_rejected() {
        let button = base("mvButton", 1, "add_button");
        let err = TypeBuilder::new("Mislabelled")
            .inherit(&button)
            .identity(TypeIdentity::new(2, "mvAppItemType::mvText").unwrap())
            .build()
            .unwrap_err();
        assert!(matches!(err, TypeError::IncompatibleBases { .. }));
    }

    #[test]
    fn test_reserved_members_are_refused() {
        for member in RESERVED_MEMBERS {
            let err = TypeBuilder::new("Sneaky")
                .property(*member, |_| Ok(Value::Bool(false)), None)
                .build()
                .unwrap_err();
            assert!(matches!(err, TypeError::TruthinessOverride { .. }));
        }
    }

    #[test]
    fn test_subtype_inherits_definition_and_mixins() {
        let button = base("mvButton", 1, "add_button");
        let custom = TypeBuilder::new("FancyButton")
            .inherit(&button)
            .mixin(Mixin::Callback)
            .build()
            .unwrap();
        assert_eq!(custom.identity(), button.identity());
        assert_eq!(custom.command(), Some("add_button"));
        assert_eq!(custom.bases(), &[Mixin::Callback, Mixin::Sized, Mixin::Basic]);
    }

    #[test]
    fn test_property_resolution_order() {
        let button = base("mvButton", 1, "add_button");
        assert!(matches!(
            button.property("rect_max"),
            Some(Property::Derived(Accessor::RectMax))
        ));
        assert!(matches!(button.property("label"), Some(Property::Config(k)) if k == "label"));
        assert!(matches!(button.property("hovered"), Some(Property::State(_))));

        let custom = TypeBuilder::new("Shadowed")
            .inherit(&button)
            .property("label", |_| Ok(json!("fixed")), None)
            .build()
            .unwrap();
        assert!(matches!(custom.property("label"), Some(Property::Custom { .. })));
    }

    #[test]
    fn test_registration_modes() {
        assert!(Registration::Auto.applies("Public", false));
        assert!(!Registration::Auto.applies("_Private", false));
        assert!(Registration::Auto.applies("_Private", true));
        assert!(Registration::Force.applies("_Private", false));
        assert!(!Registration::Never.applies("Public", true));
    }
}
