//! Histogram workspaces and a provenance-tracking algorithm engine for
//! scattering data reduction.
//!
//! ```text
//!   kernel      properties, validators, progress, cancellation
//!   data        Histogram, MatrixWorkspace, WorkspaceGroup, Run, history
//!   ads         named workspace registry with observers
//!   api         Algorithm trait, AlgorithmRunner, factory, parallel helpers
//!   algorithms  built-in algorithms
//! ```

pub mod ads;
pub mod algorithms;
pub mod api;
pub mod config;
pub mod data;
pub mod error;
pub mod kernel;
pub mod numeric;

pub use ads::{AdsEvent, AdsObserver, AnalysisDataService, ObserverId};
pub use api::algorithm::{Algorithm, AlgorithmRunner, ExecutionContext, ExecutionState};
pub use api::async_exec::{AsyncExecution, AsyncResult};
pub use api::factory::{AlgorithmDescriptor, AlgorithmFactory};
pub use api::framework::Framework;
pub use config::FrameworkConfig;
pub use data::histogram::Histogram;
pub use data::history::{AlgorithmHistory, WorkspaceHistory};
pub use data::workspace::{MatrixHandle, MatrixWorkspace, Workspace, WorkspaceGroup};
pub use error::{FrameworkError, Result};
pub use kernel::property::{Direction, PropertyValue};
pub use kernel::property_manager::PropertyManager;
