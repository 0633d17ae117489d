//! An explicit-registration `TypeContext` with an optional resolver chain.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::portable::{
    EvolvableObjectSerializer, EvolvablePortableObject, PortableObject, PortableObjectSerializer,
};
use super::{PofSerializer, TypeContext};
use crate::error::PofError;
use crate::types::PofObject;

type Resolver = Arc<dyn Fn(&PofObject) -> Option<i32> + Send + Sync>;

const DEFAULT_CACHE_LIMIT: usize = 1024;

/// Builder for [`SimplePofContext`].
pub struct SimplePofContextBuilder {
    by_id: HashMap<i32, Arc<dyn PofSerializer>>,
    by_type: HashMap<TypeId, i32>,
    resolvers: Vec<Resolver>,
    allow_resolvers: bool,
    cache_limit: usize,
    prefer_chrono: bool,
    conflict: Option<PofError>,
}

impl SimplePofContextBuilder {
    /// Registers `serializer` for the Rust type `T` under `type_id`.
    pub fn register<T: Any>(mut self, type_id: i32, serializer: impl PofSerializer) -> Self {
        if self.conflict.is_some() {
            return self;
        }
        let name = std::any::type_name::<T>();
        if type_id < 0 {
            self.conflict = Some(PofError::Protocol(format!(
                "negative user type id {type_id} for {name}"
            )));
        } else if self.by_id.contains_key(&type_id) {
            self.conflict = Some(PofError::Protocol(format!(
                "user type id {type_id} is already registered"
            )));
        } else if self.by_type.contains_key(&TypeId::of::<T>()) {
            self.conflict = Some(PofError::Protocol(format!("{name} is already registered")));
        } else {
            self.by_id.insert(type_id, Arc::new(serializer));
            self.by_type.insert(TypeId::of::<T>(), type_id);
        }
        self
    }

    /// Registers `T` with a [`PortableObjectSerializer`].
    pub fn register_portable<T: PortableObject + Default + 'static>(self, type_id: i32) -> Self {
        self.register::<T>(type_id, PortableObjectSerializer::<T>::new())
    }

    /// Registers `T` with an [`EvolvableObjectSerializer`].
    pub fn register_evolvable<T: EvolvablePortableObject + Default + 'static>(
        self,
        type_id: i32,
    ) -> Self {
        self.register::<T>(type_id, EvolvableObjectSerializer::<T>::new())
    }

    /// Adds a fallback consulted for values whose concrete type was not
    /// registered directly. Resolvers run in the order they were added.
    pub fn resolver(
        mut self,
        resolver: impl Fn(&PofObject) -> Option<i32> + Send + Sync + 'static,
    ) -> Self {
        self.resolvers.push(Arc::new(resolver));
        self
    }

    /// Enables the resolver chain.
    pub fn allow_resolvers(mut self, allow: bool) -> Self {
        self.allow_resolvers = allow;
        self
    }

    /// Sets the maximum number of resolved types remembered.
    pub fn cache_limit(mut self, limit: usize) -> Self {
        self.cache_limit = limit;
        self
    }

    pub fn prefer_chrono(mut self, prefer: bool) -> Self {
        self.prefer_chrono = prefer;
        self
    }

    /// Finishes the context, failing on the first conflicting registration.
    pub fn build(self) -> Result<SimplePofContext, PofError> {
        if let Some(e) = self.conflict {
            return Err(e);
        }
        Ok(SimplePofContext {
            by_id: self.by_id,
            by_type: self.by_type,
            resolvers: self.resolvers,
            allow_resolvers: self.allow_resolvers,
            cache_limit: self.cache_limit,
            cache: RwLock::new(HashMap::new()),
            prefer_chrono: self.prefer_chrono,
        })
    }
}

/// A `TypeContext` populated by explicit registration.
pub struct SimplePofContext {
    by_id: HashMap<i32, Arc<dyn PofSerializer>>,
    by_type: HashMap<TypeId, i32>,
    resolvers: Vec<Resolver>,
    allow_resolvers: bool,
    cache_limit: usize,
    cache: RwLock<HashMap<TypeId, i32>>,
    prefer_chrono: bool,
}

impl SimplePofContext {
    pub fn builder() -> SimplePofContextBuilder {
        SimplePofContextBuilder {
            by_id: HashMap::new(),
            by_type: HashMap::new(),
            resolvers: Vec::new(),
            allow_resolvers: false,
            cache_limit: DEFAULT_CACHE_LIMIT,
            prefer_chrono: true,
            conflict: None,
        }
    }

    /// Number of registered user types.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Number of types currently held by the resolution cache.
    pub fn cached(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    fn resolve(&self, value: &PofObject) -> Option<i32> {
        let key = value.concrete_type_id();
        if let Some(id) = self.cache.read().unwrap().get(&key) {
            return Some(*id);
        }
        let id = self
            .resolvers
            .iter()
            .find_map(|r| r(value))
            .filter(|id| self.by_id.contains_key(id))?;

        let mut cache = self.cache.write().unwrap();
        if cache.len() >= self.cache_limit {
            debug!(limit = self.cache_limit, "type resolution cache reset");
            cache.clear();
        }
        // a racing thread may have filled the slot first; keep its answer
        let id = *cache.entry(key).or_insert(id);
        debug!(type_name = value.type_name(), id, "user type resolved");
        Some(id)
    }
}

impl TypeContext for SimplePofContext {
    fn serializer_for(&self, type_id: i32) -> Result<Arc<dyn PofSerializer>, PofError> {
        self.by_id
            .get(&type_id)
            .cloned()
            .ok_or_else(|| PofError::UnknownUserType(type_id.to_string()))
    }

    fn type_id_for(&self, value: &PofObject) -> Result<i32, PofError> {
        if let Some(id) = self.by_type.get(&value.concrete_type_id()) {
            return Ok(*id);
        }
        if self.allow_resolvers {
            if let Some(id) = self.resolve(value) {
                return Ok(id);
            }
        }
        Err(PofError::UnknownUserType(value.type_name().to_string()))
    }

    fn prefer_chrono(&self) -> bool {
        self.prefer_chrono
    }
}

impl std::fmt::Debug for SimplePofContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.by_id.keys().copied().collect();
        ids.sort_unstable();
        f.debug_struct("SimplePofContext")
            .field("type_ids", &ids)
            .field("resolvers", &self.resolvers.len())
            .field("allow_resolvers", &self.allow_resolvers)
            .field("prefer_chrono", &self.prefer_chrono)
            .finish()
    }
}
