use std::sync::{Arc, OnceLock};

use crate::ads::AnalysisDataService;
use crate::algorithms;
use crate::api::algorithm::AlgorithmRunner;
use crate::api::factory::AlgorithmFactory;
use crate::config::FrameworkConfig;
use crate::error::Result;

/// Entry point for clients: the data service, the algorithm registry and the
/// configuration, bundled so that tests can build isolated instances.
#[derive(Debug, Clone)]
pub struct Framework {
    ads: Arc<AnalysisDataService>,
    algorithms: Arc<AlgorithmFactory>,
    config: Arc<FrameworkConfig>,
}

impl Default for Framework {
    fn default() -> Self {
        Self::new()
    }
}

impl Framework {
    /// A private data service with the built-in algorithms and default config.
    pub fn new() -> Self {
        Self::with_config(FrameworkConfig::default())
    }

    pub fn with_config(config: FrameworkConfig) -> Self {
        let algorithms = AlgorithmFactory::new();
        algorithms::register_all(&algorithms);
        Framework {
            ads: AnalysisDataService::new(),
            algorithms: Arc::new(algorithms),
            config: Arc::new(config),
        }
    }

    /// Assemble from parts, e.g. to share one data service between frameworks.
    pub fn from_parts(
        ads: Arc<AnalysisDataService>,
        algorithms: Arc<AlgorithmFactory>,
        config: FrameworkConfig,
    ) -> Self {
        Framework {
            ads,
            algorithms,
            config: Arc::new(config),
        }
    }

    /// The process-wide framework over [`AnalysisDataService::global`].
    pub fn global() -> Framework {
        static GLOBAL: OnceLock<Framework> = OnceLock::new();
        GLOBAL
            .get_or_init(|| {
                let config = FrameworkConfig::from_env().unwrap_or_else(|e| {
                    log::warn!("Ignoring framework configuration: {e}");
                    FrameworkConfig::default()
                });
                let algorithms = AlgorithmFactory::new();
                algorithms::register_all(&algorithms);
                Framework::from_parts(AnalysisDataService::global(), Arc::new(algorithms), config)
            })
            .clone()
    }

    pub fn ads(&self) -> &Arc<AnalysisDataService> {
        &self.ads
    }

    pub fn algorithms(&self) -> &Arc<AlgorithmFactory> {
        &self.algorithms
    }

    pub fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// A new, initialised top-level algorithm; `None` picks the highest version.
    pub fn create_algorithm(&self, name: &str, version: Option<u32>) -> Result<AlgorithmRunner> {
        let algorithm = self.algorithms.create(name, version)?;
        let mut runner = AlgorithmRunner::new(algorithm, self.clone());
        runner.initialize()?;
        Ok(runner)
    }

    /// Drop every registered workspace.
    pub fn shutdown(&self) {
        log::debug!("Clearing {} workspaces", self.ads.size());
        self.ads.clear();
    }
}
