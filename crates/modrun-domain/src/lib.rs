pub mod manifest;
pub mod types;

pub use manifest::{
    output_section, result_is_success, ExecutionManifest, ManifestMode, OutputPayload, RunManifestBuilder,
};
pub use types::{
    AssetId, AssetKind, AssetStatus, Capabilities, ContractType, InputConstraints, InputSpec,
    ModuleId, ModuleManifest, ModuleStatus, OutputSpec, TaskId, TaskStatus,
};
