//! The process-wide item service.
//!
//! A [`Context`] owns everything that would otherwise be ambient global
//! state: the host handle, the handle counter, the alias table, the cached
//! catalog and the type registry. Consumers receive it by reference.

use std::sync::{Arc, OnceLock};

use crate::catalog::{extract_catalog, Catalog};
use crate::config::ContextConfig;
use crate::diagnose;
use crate::handle::{AliasTable, HandleAllocator, Item, Tag};
use crate::host::{CreateArgs, HostEngine, HostFault};
use crate::item::Interface;
use crate::mixin::Mixin;
use crate::types::{factory, ItemType, TypeError, TypeRegistry};
use crate::{ConfigFault, ItemError, ItemResult};

/// Shared service object over one host engine.
pub struct Context {
    host: Arc<dyn HostEngine>,
    config: ContextConfig,
    handles: Arc<HandleAllocator>,
    aliases: AliasTable,
    catalog: OnceLock<Arc<Catalog>>,
    types: TypeRegistry,
    generic: Arc<ItemType>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.config)
            .field("handles", &self.handles)
            .field("catalog", &self.catalog.get().map(|c| c.len()))
            .field("types", &self.types.len())
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Create a context and redirect the host's handle generation to its
    /// counter.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::TypeComposition`] if the generic type cannot be
    /// composed.
    pub fn new(host: Arc<dyn HostEngine>, config: ContextConfig) -> ItemResult<Self> {
        let handles = Arc::new(HandleAllocator::new(
            config.handle_floor,
            host.reserved_handles(),
        ));
        host.install_handle_generator(handles.generator());
        tracing::debug!(seed = handles.seed(), "handle counter installed");

        Ok(Self {
            aliases: AliasTable::new(Arc::clone(&host)),
            host,
            config,
            handles,
            catalog: OnceLock::new(),
            types: TypeRegistry::new(),
            generic: Arc::new(factory::generic()?),
        })
    }

    /// Create a context with default settings.
    ///
    /// # Errors
    ///
    /// See [`Context::new`].
    pub fn with_defaults(host: Arc<dyn HostEngine>) -> ItemResult<Self> {
        Self::new(host, ContextConfig::default())
    }

    /// The host engine.
    #[must_use]
    pub fn host(&self) -> &dyn HostEngine {
        self.host.as_ref()
    }

    /// Settings.
    #[must_use]
    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Issue a fresh handle.
    #[must_use]
    pub fn next_handle(&self) -> Item {
        Item::new(self.handles.next_handle())
    }

    /// The handle counter.
    #[must_use]
    pub fn handles(&self) -> &HandleAllocator {
        &self.handles
    }

    /// The alias table.
    #[must_use]
    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// The type registry.
    #[must_use]
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The generic fallback type.
    #[must_use]
    pub fn generic_type(&self) -> &Arc<ItemType> {
        &self.generic
    }

    // -- session --

    /// Make sure a host session is live, starting one if allowed.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::Host`] if no session is live and none may or can
    /// be started.
    pub fn ensure_session(&self) -> ItemResult<()> {
        if self.host.session_ready() {
            return Ok(());
        }
        if !self.config.auto_session {
            return Err(ItemError::host(
                "session",
                HostFault::new("no live session and auto_session is disabled"),
            ));
        }
        self.host
            .create_session()
            .map_err(|fault| ItemError::host("session", fault))?;
        tracing::info!("host session started");
        Ok(())
    }

    /// Tear the host session down.
    pub fn teardown(&self) {
        self.host.teardown_session();
        tracing::info!("host session torn down");
    }

    // -- catalog and types --

    /// The command catalog, extracted on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::Catalog`] if extraction fails.
    pub fn catalog(&self) -> ItemResult<Arc<Catalog>> {
        if let Some(catalog) = self.catalog.get() {
            return Ok(Arc::clone(catalog));
        }
        let extracted = Arc::new(extract_catalog(self.host.as_ref())?);
        Ok(Arc::clone(self.catalog.get_or_init(|| extracted)))
    }

    /// Synthesized base type of a kind.
    ///
    /// # Errors
    ///
    /// - [`ItemError::Catalog`] if the catalog cannot be extracted.
    /// - [`ItemError::TypeComposition`] if the kind is unknown or cannot be composed.
    pub fn synthesize(&self, kind: &str) -> ItemResult<Arc<ItemType>> {
        let catalog = self.catalog()?;
        let def = catalog
            .get(kind)
            .ok_or_else(|| TypeError::UnknownKind(kind.to_string()))?;
        Ok(self.types.synthesize(def, self.config.register_private)?)
    }

    /// Synthesize every kind in the catalog.
    ///
    /// # Errors
    ///
    /// Fails on the first kind that cannot be composed.
    pub fn synthesize_all(&self) -> ItemResult<Vec<Arc<ItemType>>> {
        let catalog = self.catalog()?;
        catalog
            .iter()
            .map(|def| {
                self.types
                    .synthesize(def, self.config.register_private)
                    .map_err(ItemError::from)
            })
            .collect()
    }

    /// Register a user-built type.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::TypeComposition`] on an identity collision.
    pub fn register(&self, ty: ItemType) -> ItemResult<Arc<ItemType>> {
        let ty = Arc::new(ty);
        self.types.register(&ty, self.config.register_private)?;
        Ok(ty)
    }

    /// Best registered type for a host type name, synthesizing it from the
    /// catalog when needed.
    ///
    /// # Errors
    ///
    /// Propagates catalog and composition errors.
    pub fn type_for(&self, type_name: &str) -> ItemResult<Option<Arc<ItemType>>> {
        if let Some(ty) = self.types.get(type_name) {
            return Ok(Some(ty));
        }
        let catalog = self.catalog()?;
        let Some(def) = catalog.get(type_name) else {
            return Ok(None);
        };
        let synthesized = self.types.synthesize(def, self.config.register_private)?;
        Ok(Some(self.types.get(type_name).unwrap_or(synthesized)))
    }

    /// Interface of the best-matching type for an existing item; the
    /// generic type when the kind is unknown.
    ///
    /// # Errors
    ///
    /// Returns [`ItemError::MissingItem`] naming the tag if it does not refer
    /// to a live item.
    pub fn interface(&self, tag: impl Into<Tag>) -> ItemResult<Interface<'_>> {
        let tag = tag.into();
        let item = self
            .aliases
            .resolve_tag(&tag)
            .filter(|item| self.host.item_exists(item.uuid()))
            .ok_or_else(|| ItemError::missing(&tag, "unknown"))?;
        let info = self
            .host
            .item_info(item.uuid())
            .map_err(|_| ItemError::missing(&tag, "unknown"))?;
        let ty = self
            .type_for(&info.type_name)?
            .unwrap_or_else(|| Arc::clone(&self.generic));
        Ok(Interface::new(self, ty, item))
    }

    /// Interface of a specific type over an existing item, without checks.
    #[must_use]
    pub fn interface_as(&self, ty: &Arc<ItemType>, item: impl Into<Item>) -> Interface<'_> {
        Interface::new(self, Arc::clone(ty), item.into())
    }

    // -- creation --

    /// Create an item of `ty`.
    ///
    /// `tag` selects the handle: `None` issues a fresh one; a tag naming an
    /// existing item binds the interface to it instead of creating; a new
    /// alias is bound to a fresh handle after creation.
    ///
    /// # Errors
    ///
    /// - [`ItemError::NotCreatable`] for the generic or abstract types.
    /// - [`ItemError::ItemInUse`] when `tag` names an existing item and
    ///   arguments were supplied, or when the chosen handle already belongs
    ///   to a live item.
    /// - [`ItemError::Configuration`] naming unexpected constructor arguments.
    /// - [`ItemError::InvalidParent`] when the parent cannot hold the item.
    pub fn create(
        &self,
        ty: &Arc<ItemType>,
        tag: Option<Tag>,
        args: CreateArgs,
    ) -> ItemResult<Interface<'_>> {
        let Some(command) = ty.command() else {
            return Err(ItemError::NotCreatable(ty.name().to_string()));
        };
        self.ensure_session()?;
        let kind = ty.identity().kind();

        let (uuid, alias) = match tag.filter(|t| !t.is_null()) {
            None => (self.next_handle(), None),
            Some(tag) => match self.aliases.resolve_tag(&tag) {
                Some(existing) if self.host.item_exists(existing.uuid()) => {
                    if !args.is_empty() {
                        return Err(self.in_use(existing));
                    }
                    return Ok(Interface::new(self, Arc::clone(ty), existing));
                }
                Some(existing) if matches!(tag, Tag::Uuid(_)) => (existing, None),
                _ => match tag {
                    Tag::Alias(alias) => (self.next_handle(), Some(alias)),
                    Tag::Uuid(uuid) => (Item::new(uuid), None),
                },
            },
        };

        if ty.has(Mixin::Root) && args.parent.is_some_and(|p| p != 0) {
            return Err(ItemError::InvalidParent {
                kind: kind.to_string(),
                reason: "root items cannot be parented".to_string(),
            });
        }

        // A live item already holding the handle is never torn down.
        if self.host.item_exists(uuid.uuid()) {
            return Err(self.in_use(uuid));
        }
        if let Err(fault) = self.host.create_item(command, Some(uuid.uuid()), args.clone()) {
            return Err(self.diagnose_create(ty, uuid, &args, fault));
        }
        let itf = Interface::new(self, Arc::clone(ty), uuid);
        tracing::debug!(item = uuid.uuid(), kind, "item created");

        if let Some(alias) = alias {
            self.aliases.bind(uuid, &alias)?;
        }
        if let Some(init) = &ty.hooks().init {
            if let Err(err) = init(&itf) {
                itf.destroy();
                return Err(err);
            }
        }
        Ok(itf)
    }

    fn in_use(&self, item: Item) -> ItemError {
        let existing = self
            .host
            .item_info(item.uuid())
            .map(|info| info.type_name)
            .unwrap_or_default();
        ItemError::ItemInUse {
            uuid: item.uuid(),
            existing,
        }
    }

    fn diagnose_create(
        &self,
        ty: &ItemType,
        uuid: Item,
        args: &CreateArgs,
        fault: HostFault,
    ) -> ItemError {
        let kind = ty.identity().kind().to_string();
        if let Err(err) = self.host.delete_item(uuid.uuid(), false) {
            tracing::trace!(item = uuid.uuid(), %err, "no half-created item to destroy");
        }

        let unexpected = ty.unexpected_args(&args.params);
        if !unexpected.is_empty() {
            return ItemError::Configuration {
                kind,
                keys: unexpected,
                fault: ConfigFault::Unexpected,
            };
        }
        if !ty.has(Mixin::Root) {
            if let Some(reason) = diagnose::invalid_parent(self.host.as_ref(), &kind, args.parent) {
                return ItemError::InvalidParent { kind, reason };
            }
        }
        ItemError::host(kind, fault)
    }

    /// Create an item by kind name.
    ///
    /// # Errors
    ///
    /// See [`Context::synthesize`] and [`Context::create`].
    pub fn create_kind(&self, kind: &str, args: CreateArgs) -> ItemResult<Interface<'_>> {
        let ty = self.synthesize(kind)?;
        self.create(&ty, None, args)
    }

    /// Create an item, first creating a parent through `parent_factory` when
    /// neither an explicit parent nor a container stack top is available.
    ///
    /// # Errors
    ///
    /// - [`ItemError::InvalidParent`] for root types.
    /// - Errors of the factory or of [`Context::create`].
    pub fn create_auto_parented<'c, F>(
        &'c self,
        ty: &Arc<ItemType>,
        parent_factory: F,
        mut args: CreateArgs,
    ) -> ItemResult<Interface<'c>>
    where
        F: FnOnce(&'c Context) -> ItemResult<Interface<'c>>,
    {
        if ty.has(Mixin::Root) {
            return Err(ItemError::InvalidParent {
                kind: ty.identity().kind().to_string(),
                reason: "root items cannot be auto-parented".to_string(),
            });
        }
        self.ensure_session()?;
        if args.parent.is_none() && self.host.top_container().is_none() {
            let parent = parent_factory(self)?;
            tracing::debug!(parent = parent.uuid(), "auto-parent created");
            args.parent = Some(parent.uuid());
        }
        self.create(ty, None, args)
    }

    // -- classification queries --

    /// Registered types composing `mixin`.
    #[must_use]
    pub fn types_with(&self, mixin: Mixin) -> Vec<Arc<ItemType>> {
        self.types.filter(|ty| ty.has(mixin))
    }

    /// Registered registry types.
    #[must_use]
    pub fn registry_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Registry)
    }

    /// Registered root types, registries included.
    #[must_use]
    pub fn root_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Root)
    }

    /// Registered container types.
    #[must_use]
    pub fn container_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Container)
    }

    /// Registered parentable types.
    #[must_use]
    pub fn basic_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Basic)
    }

    /// Registered table-family types.
    #[must_use]
    pub fn table_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Table)
    }

    /// Registered drawing-family types.
    #[must_use]
    pub fn drawing_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Drawing)
    }

    /// Registered plotting-family types.
    #[must_use]
    pub fn plotting_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Plotting)
    }

    /// Registered node-editor-family types.
    #[must_use]
    pub fn node_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Node)
    }

    /// Registered theme-family types.
    #[must_use]
    pub fn theme_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Theme)
    }

    /// Registered window types.
    #[must_use]
    pub fn window_types(&self) -> Vec<Arc<ItemType>> {
        self.types_with(Mixin::Window)
    }
}
