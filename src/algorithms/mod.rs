/// Built-in algorithms.
///
/// | module | algorithms |
/// |---|---|
/// | `create` | CreateWorkspace, CreateSampleWorkspace |
/// | `rebin` | Rebin, Rebunch, RebinToWorkspace |
/// | `distribution` | ConvertToDistribution, ConvertFromDistribution |
/// | `integration` | Integration, CropWorkspace |
/// | `masking` | MaskBins, FindDetectorsOutsideLimits |
/// | `normalise` | NormaliseToMonitor |
/// | `group` | GroupWorkspaces |
/// | `io` | LoadSpectra, SaveSpectra |
use crate::api::factory::AlgorithmFactory;

pub mod create;
pub mod distribution;
pub mod group;
pub mod integration;
pub mod io;
pub mod masking;
pub mod normalise;
pub mod rebin;

pub use create::{CreateSampleWorkspace, CreateWorkspace};
pub use distribution::{ConvertFromDistribution, ConvertToDistribution};
pub use group::GroupWorkspaces;
pub use integration::{CropWorkspace, Integration};
pub use io::{LoadSpectra, SaveSpectra};
pub use masking::{FindDetectorsOutsideLimits, MaskBins};
pub use normalise::NormaliseToMonitor;
pub use rebin::{Rebin, RebinToWorkspace, Rebunch};

/// Register every built-in algorithm.
pub fn register_all(factory: &AlgorithmFactory) {
    factory.subscribe::<CreateWorkspace>();
    factory.subscribe::<CreateSampleWorkspace>();
    factory.subscribe::<Rebin>();
    factory.subscribe::<Rebunch>();
    factory.subscribe::<RebinToWorkspace>();
    factory.subscribe::<ConvertToDistribution>();
    factory.subscribe::<ConvertFromDistribution>();
    factory.subscribe::<Integration>();
    factory.subscribe::<CropWorkspace>();
    factory.subscribe::<MaskBins>();
    factory.subscribe::<FindDetectorsOutsideLimits>();
    factory.subscribe::<NormaliseToMonitor>();
    factory.subscribe::<GroupWorkspaces>();
    factory.subscribe::<LoadSpectra>();
    factory.subscribe::<SaveSpectra>();
}
