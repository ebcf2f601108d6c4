use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::api::algorithm::Algorithm;
use crate::error::{FrameworkError, Result};

type Constructor = Arc<dyn Fn() -> Box<dyn Algorithm> + Send + Sync>;

/// Name, version and blurb of a registered algorithm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    pub name: String,
    pub version: u32,
    pub category: String,
    pub summary: String,
}

/// Registry resolving `(name, version)` to fresh algorithm instances.
#[derive(Default)]
pub struct AlgorithmFactory {
    constructors: RwLock<BTreeMap<(String, u32), (AlgorithmDescriptor, Constructor)>>,
}

impl std::fmt::Debug for AlgorithmFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlgorithmFactory")
            .field("registered", &self.constructors.read().len())
            .finish()
    }
}

impl AlgorithmFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its own name and version, replacing any earlier entry.
    pub fn subscribe<T>(&self)
    where
        T: Algorithm + Default + 'static,
    {
        self.subscribe_with(|| Box::new(T::default()));
    }

    pub fn subscribe_with<F>(&self, constructor: F)
    where
        F: Fn() -> Box<dyn Algorithm> + Send + Sync + 'static,
    {
        let instance = constructor();
        let descriptor = AlgorithmDescriptor {
            name: instance.name().to_string(),
            version: instance.version(),
            category: instance.category().to_string(),
            summary: instance.summary().to_string(),
        };
        log::debug!("Registered algorithm {}-v{}", descriptor.name, descriptor.version);
        self.constructors.write().insert(
            (descriptor.name.clone(), descriptor.version),
            (descriptor, Arc::new(constructor)),
        );
    }

    pub fn unsubscribe(&self, name: &str, version: u32) -> Result<()> {
        self.constructors
            .write()
            .remove(&(name.to_string(), version))
            .map(|_| ())
            .ok_or_else(|| FrameworkError::NotFound(format!("{name} v{version}")))
    }

    /// Highest registered version of `name`.
    pub fn highest_version(&self, name: &str) -> Option<u32> {
        self.constructors
            .read()
            .keys()
            .filter(|(n, _)| n == name)
            .map(|&(_, v)| v)
            .max()
    }

    pub fn exists(&self, name: &str, version: Option<u32>) -> bool {
        match version {
            Some(v) => self.constructors.read().contains_key(&(name.to_string(), v)),
            None => self.highest_version(name).is_some(),
        }
    }

    /// A new, uninitialised instance; `None` picks the highest version.
    pub fn create(&self, name: &str, version: Option<u32>) -> Result<Box<dyn Algorithm>> {
        let version = match version {
            Some(v) => v,
            None => self
                .highest_version(name)
                .ok_or_else(|| FrameworkError::NotFound(format!("algorithm '{name}'")))?,
        };
        let constructor = self
            .constructors
            .read()
            .get(&(name.to_string(), version))
            .map(|(_, c)| Arc::clone(c))
            .ok_or_else(|| FrameworkError::NotFound(format!("algorithm '{name}' v{version}")))?;
        Ok(constructor())
    }

    /// Every registered algorithm, sorted by name then version.
    pub fn descriptors(&self) -> Vec<AlgorithmDescriptor> {
        self.constructors
            .read()
            .values()
            .map(|(d, _)| d.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::algorithm::ExecutionContext;
    use crate::kernel::property_manager::PropertyManager;

    #[derive(Default)]
    struct Versioned<const V: u32>;

    impl<const V: u32> Algorithm for Versioned<V> {
        fn name(&self) -> &str {
            "Versioned"
        }
        fn version(&self) -> u32 {
            V
        }
        fn init(&mut self, _props: &mut PropertyManager) -> Result<()> {
            Ok(())
        }
        fn exec(&mut self, _ctx: &mut ExecutionContext<'_>) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn missing_version_selects_highest() {
        let f = AlgorithmFactory::new();
        f.subscribe::<Versioned<1>>();
        f.subscribe::<Versioned<3>>();
        assert_eq!(f.highest_version("Versioned"), Some(3));
        assert_eq!(f.create("Versioned", None).unwrap().version(), 3);
        assert_eq!(f.create("Versioned", Some(1)).unwrap().version(), 1);
        assert!(matches!(f.create("Versioned", Some(2)), Err(FrameworkError::NotFound(_))));
        assert!(f.create("Nope", None).is_err());
    }

    #[test]
    fn unsubscribe_removes_one_version() {
        let f = AlgorithmFactory::new();
        f.subscribe::<Versioned<1>>();
        f.subscribe::<Versioned<2>>();
        f.unsubscribe("Versioned", 2).unwrap();
        assert_eq!(f.descriptors().len(), 1);
        assert!(f.unsubscribe("Versioned", 2).is_err());
    }
}
