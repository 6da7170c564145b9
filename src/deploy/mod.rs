pub mod error;
pub mod executor;
pub mod pipeline;
pub mod provision;
pub mod resolver;

pub use error::*;
pub use executor::{DeployExecutor, DeployOutcome};
pub use pipeline::{BuildOptions, DeployOptions, InitRequest, Pipeline};
pub use provision::{
    Compensation, ProvisionRequest, ProvisionStep, Provisioned, ProvisioningOrchestrator,
    ProvisioningPlan,
};
pub use resolver::{select_version, VersionResolver};
