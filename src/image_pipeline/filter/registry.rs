//! Process-wide map from filter identifier to the generator that builds it.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::{debug, error};

use crate::image_pipeline::common::error::{PipelineError, Result};
use crate::image_pipeline::filter::params::FilterParams;
use crate::image_pipeline::filter::threaded::ThreadedFilter;

/// Factory for one or more filter identifiers.
pub trait FilterGenerator: Send + Sync {
    fn filter_ids(&self) -> Vec<&'static str>;

    fn supported_versions(&self, id: &str) -> Vec<u32>;

    fn display_name(&self, id: &str) -> Option<String>;

    fn create(&self, id: &str, version: u32, params: &FilterParams) -> Result<Box<dyn ThreadedFilter>>;
}

/// A filter type that describes itself well enough to be registered.
pub trait RegisteredFilter: ThreadedFilter + Sized + 'static {
    const ID: &'static str;
    const NAME: &'static str;
    const VERSIONS: &'static [u32];

    fn from_params(params: &FilterParams) -> Result<Self>;
}

/// Generator for a single [`RegisteredFilter`] type.
pub struct BasicFilterGenerator<F> {
    _filter: PhantomData<fn() -> F>,
}

impl<F> Default for BasicFilterGenerator<F> {
    fn default() -> Self {
        Self {
            _filter: PhantomData,
        }
    }
}

impl<F: RegisteredFilter> BasicFilterGenerator<F> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<F: RegisteredFilter> FilterGenerator for BasicFilterGenerator<F> {
    fn filter_ids(&self) -> Vec<&'static str> {
        vec![F::ID]
    }

    fn supported_versions(&self, id: &str) -> Vec<u32> {
        if id == F::ID {
            F::VERSIONS.to_vec()
        } else {
            Vec::new()
        }
    }

    fn display_name(&self, id: &str) -> Option<String> {
        (id == F::ID).then(|| F::NAME.to_string())
    }

    fn create(&self, id: &str, version: u32, params: &FilterParams) -> Result<Box<dyn ThreadedFilter>> {
        if id != F::ID {
            return Err(PipelineError::NotFound(id.to_string()));
        }
        if !F::VERSIONS.contains(&version) {
            return Err(PipelineError::UnsupportedVersion {
                id: id.to_string(),
                version,
            });
        }
        Ok(Box::new(F::from_params(params)?))
    }
}

/// Identifier to generator map.
///
/// Reads take a shared lock, so lookups from many threads proceed concurrently;
/// registration and removal take the write lock. Identifiers are never
/// overwritten.
#[derive(Default)]
pub struct FilterRegistry {
    generators: RwLock<BTreeMap<String, Arc<dyn FilterGenerator>>>,
}

static GLOBAL: LazyLock<FilterRegistry> = LazyLock::new(FilterRegistry::with_builtin_filters);

impl FilterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every filter this crate ships.
    pub fn with_builtin_filters() -> Self {
        use crate::image_pipeline::filter::{
            BcgFilter, CurvesFilter, LensCorrectionFilter, LevelsFilter, ResizeFilter,
            WhiteBalanceFilter,
        };

        let registry = Self::new();
        registry.add_generator(Arc::new(BasicFilterGenerator::<WhiteBalanceFilter>::new()));
        registry.add_generator(Arc::new(BasicFilterGenerator::<BcgFilter>::new()));
        registry.add_generator(Arc::new(BasicFilterGenerator::<CurvesFilter>::new()));
        registry.add_generator(Arc::new(BasicFilterGenerator::<LevelsFilter>::new()));
        registry.add_generator(Arc::new(BasicFilterGenerator::<ResizeFilter>::new()));
        registry.add_generator(Arc::new(BasicFilterGenerator::<LensCorrectionFilter>::new()));
        registry
    }

    /// The shared registry, built with the built-in filters on first access.
    pub fn global() -> &'static FilterRegistry {
        &GLOBAL
    }

    /// Registers every identifier `generator` claims.
    ///
    /// An identifier already present keeps its first generator; the clash is
    /// logged and registration continues with the remaining identifiers.
    /// Returns how many identifiers were added.
    pub fn add_generator(&self, generator: Arc<dyn FilterGenerator>) -> usize {
        let mut map = self.generators.write().unwrap_or_else(PoisonError::into_inner);
        let mut added = 0;
        for id in generator.filter_ids() {
            if map.contains_key(id) {
                error!(id, "Attempt to register filter identifier twice. Ignoring.");
                continue;
            }
            debug!(id, "Registered filter");
            map.insert(id.to_string(), Arc::clone(&generator));
            added += 1;
        }
        added
    }

    /// Unregisters the generator serving `id`, together with every other
    /// identifier it was registered under. Returns how many identifiers were
    /// removed; zero when `id` is unknown.
    pub fn remove_generator(&self, id: &str) -> usize {
        let mut map = self.generators.write().unwrap_or_else(PoisonError::into_inner);
        let Some(generator) = map.get(id).cloned() else {
            debug!(id, "No generator to remove");
            return 0;
        };
        let before = map.len();
        map.retain(|_, g| !Arc::ptr_eq(g, &generator));
        let removed = before - map.len();
        debug!(id, removed, "Removed filter generator");
        removed
    }

    fn generator(&self, id: &str) -> Option<Arc<dyn FilterGenerator>> {
        self.generators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn create_filter(&self, id: &str, version: u32) -> Result<Box<dyn ThreadedFilter>> {
        self.create_filter_with(id, version, &FilterParams::default())
    }

    pub fn create_filter_with(
        &self,
        id: &str,
        version: u32,
        params: &FilterParams,
    ) -> Result<Box<dyn ThreadedFilter>> {
        let generator = self
            .generator(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;
        if !generator.supported_versions(id).contains(&version) {
            return Err(PipelineError::UnsupportedVersion {
                id: id.to_string(),
                version,
            });
        }
        generator.create(id, version, params)
    }

    pub fn supported_versions(&self, id: &str) -> Vec<u32> {
        self.generator(id)
            .map(|g| g.supported_versions(id))
            .unwrap_or_default()
    }

    pub fn is_supported(&self, id: &str) -> bool {
        self.generator(id).is_some()
    }

    pub fn is_supported_version(&self, id: &str, version: u32) -> bool {
        self.supported_versions(id).contains(&version)
    }

    pub fn displayable_name(&self, id: &str) -> Option<String> {
        self.generator(id).and_then(|g| g.display_name(id))
    }

    /// Every registered identifier, sorted.
    pub fn supported_filters(&self) -> Vec<String> {
        self.generators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}
