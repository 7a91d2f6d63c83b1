//! Components and Component Registries
//!
//! A component is a pluggable module attached to a host: either an actor
//! instance or the server process itself. Every host owns one
//! [`ComponentRegistry`] holding at most one instance per concrete component
//! type, in attachment order. That order is persistent host state and drives
//! every lifecycle phase fan-out.
//!
//! ## Design Principles
//!
//! 1. **One per type**: attaching a type twice is rejected
//! 2. **Attach only**: components live exactly as long as their host
//! 3. **Context threading**: every hook receives the host's context object
//! 4. **Typed factories**: [`Blueprint`] maps component types to constructor
//!    closures invoked with a fixed, statically typed argument
//!
//! ## Example
//!
//! ```ignore
//! use hearth_core::{Component, ComponentError};
//!
//! #[derive(Default)]
//! struct Mailroom { /* ... */ }
//!
//! #[async_trait]
//! impl Component<NodeContext> for Mailroom {
//!     async fn tick(&self, ctx: &NodeContext) -> Result<(), ComponentError> {
//!         // Flush outgoing mail
//!         Ok(())
//!     }
//! }
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ComponentError;

/// A module attachable to a host with context type `C`
///
/// Every hook is optional and defaults to a no-op. Hooks take `&self`:
/// components that hold state use interior mutability, and never hold a
/// lock across an `.await`.
#[async_trait]
pub trait Component<C: ?Sized + Sync>: Send + Sync + 'static {
    /// Name used in diagnostics
    fn name(&self) -> &'static str {
        type_name::<Self>()
    }

    /// Load state before the host starts serving
    async fn load(&self, _ctx: &C) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Called once after every component on the host has loaded
    async fn start(&self, _ctx: &C) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Periodic work
    async fn tick(&self, _ctx: &C) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Called when the host begins shutting down
    async fn pre_stop(&self, _ctx: &C) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Final hook before the host is dropped
    async fn stop(&self, _ctx: &C) -> Result<(), ComponentError> {
        Ok(())
    }
}

struct Slot<C: ?Sized + Sync + 'static> {
    name: &'static str,
    hooks: Arc<dyn Component<C>>,
    instance: Arc<dyn Any + Send + Sync>,
}

/// Per-host registry of components, keyed by concrete type
pub struct ComponentRegistry<C: ?Sized + Sync + 'static> {
    owner: String,
    index: HashMap<TypeId, usize>,
    slots: Vec<Slot<C>>,
}

impl<C: ?Sized + Sync + 'static> ComponentRegistry<C> {
    /// Create an empty registry; `owner` labels diagnostics
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            index: HashMap::new(),
            slots: Vec::new(),
        }
    }

    /// Label of the host owning this registry
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Attach an already constructed component
    pub fn attach<T: Component<C>>(&mut self, component: T) -> Result<Arc<T>, ComponentError> {
        self.attach_with(|| component)
    }

    /// Attach a component, constructing it only if the type is not present yet
    pub fn attach_with<T, F>(&mut self, ctor: F) -> Result<Arc<T>, ComponentError>
    where
        T: Component<C>,
        F: FnOnce() -> T,
    {
        let key = TypeId::of::<T>();
        if self.index.contains_key(&key) {
            return Err(ComponentError::duplicate(
                self.owner.clone(),
                type_name::<T>(),
            ));
        }

        let component = Arc::new(ctor());
        self.index.insert(key, self.slots.len());
        self.slots.push(Slot {
            name: type_name::<T>(),
            hooks: component.clone(),
            instance: component.clone(),
        });
        tracing::trace!(owner = %self.owner, component = type_name::<T>(), "component attached");
        Ok(component)
    }

    /// Look up the component of type `T`
    pub fn get<T: Component<C>>(&self) -> Result<Arc<T>, ComponentError> {
        self.index
            .get(&TypeId::of::<T>())
            .and_then(|&slot| self.slots.get(slot))
            .and_then(|slot| Arc::clone(&slot.instance).downcast::<T>().ok())
            .ok_or_else(|| ComponentError::not_found(self.owner.clone(), type_name::<T>()))
    }

    /// Whether a component of type `T` is attached
    pub fn contains<T: Component<C>>(&self) -> bool {
        self.index.contains_key(&TypeId::of::<T>())
    }

    /// Components in attachment order
    pub fn iter(&self) -> impl Iterator<Item = &dyn Component<C>> + '_ {
        self.slots.iter().map(|slot| slot.hooks.as_ref())
    }

    /// Component type names in attachment order
    pub fn names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|slot| slot.name).collect()
    }

    /// Number of attached components
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if nothing is attached
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&'static str, &dyn Component<C>)> + '_ {
        self.slots.iter().map(|slot| (slot.name, slot.hooks.as_ref()))
    }
}

impl<C: ?Sized + Sync + 'static> fmt::Debug for ComponentRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("owner", &self.owner)
            .field("components", &self.names())
            .finish()
    }
}

type Constructor<C, A> =
    Box<dyn Fn(&A, &mut ComponentRegistry<C>) -> Result<(), ComponentError> + Send + Sync>;

/// Typed factory registry for the components of one kind of host
///
/// Each registered component type maps to a constructor closure taking the
/// blueprint's argument type `A`. [`Blueprint::instantiate`] builds a fresh
/// registry whose attachment order equals registration order, so every
/// instance of a host kind fans phases out identically.
pub struct Blueprint<C: ?Sized + Sync + 'static, A: 'static> {
    kind: String,
    constructors: Vec<(TypeId, &'static str, Constructor<C, A>)>,
}

impl<C: ?Sized + Sync + 'static, A: 'static> Blueprint<C, A> {
    /// Create an empty blueprint for hosts of `kind`
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            constructors: Vec::new(),
        }
    }

    /// Register a constructor for component type `T`
    pub fn register<T, F>(&mut self, ctor: F) -> Result<&mut Self, ComponentError>
    where
        T: Component<C>,
        F: Fn(&A) -> T + Send + Sync + 'static,
    {
        let key = TypeId::of::<T>();
        if self.constructors.iter().any(|(existing, _, _)| *existing == key) {
            return Err(ComponentError::duplicate(self.kind.clone(), type_name::<T>()));
        }

        let constructor: Constructor<C, A> =
            Box::new(move |args: &A, registry: &mut ComponentRegistry<C>| {
                registry.attach_with(|| ctor(args)).map(|_| ())
            });
        self.constructors.push((key, type_name::<T>(), constructor));
        Ok(self)
    }

    /// Builder form of [`Blueprint::register`]
    pub fn with<T, F>(mut self, ctor: F) -> Result<Self, ComponentError>
    where
        T: Component<C>,
        F: Fn(&A) -> T + Send + Sync + 'static,
    {
        self.register::<T, F>(ctor)?;
        Ok(self)
    }

    /// Build a registry for one host, running every constructor in order
    pub fn instantiate(
        &self,
        owner: impl Into<String>,
        args: &A,
    ) -> Result<ComponentRegistry<C>, ComponentError> {
        let mut registry = ComponentRegistry::new(owner);
        for (_, _, constructor) in &self.constructors {
            constructor(args, &mut registry)?;
        }
        Ok(registry)
    }

    /// Host kind this blueprint builds
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Registered component type names in registration order
    pub fn names(&self) -> Vec<&'static str> {
        self.constructors.iter().map(|(_, name, _)| *name).collect()
    }

    /// Number of registered component types
    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    /// Returns true if no component type is registered
    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }
}

impl<C: ?Sized + Sync + 'static, A: 'static> fmt::Debug for Blueprint<C, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("kind", &self.kind)
            .field("components", &self.names())
            .finish()
    }
}
