//! Schema provisioning: planning, the three-phase pipeline and the
//! resumable manifest

mod create;
mod finalize;
pub mod manifest;
pub mod pipeline;
pub mod plan;
mod repair;
pub mod report;

#[cfg(test)]
pub(crate) mod testing;

pub use manifest::{EntityPhase, FileManifestStore, ManifestStore};
pub use pipeline::{Provisioner, ProvisioningContext};
pub use plan::ProvisioningPlan;
pub use report::RunReport;
