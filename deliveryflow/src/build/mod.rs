//! The build stage: how a source artifact becomes a scanned build artifact.

mod runner;
mod spec;

pub use runner::{BuildRunner, BuildToolchain, ScanReport, TemplateScanner};
pub use spec::{
    template_file_name, ArtifactManifest, BuildPhase, BuildSpec, PhaseName, BUILD_IMAGE,
    TEMPLATE_SUFFIX,
};
