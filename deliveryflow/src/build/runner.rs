//! Build execution: install, synthesize, scan, export.

use super::BuildSpec;
use crate::core::{ActionOutput, Artifact, ArtifactFiles};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The compile toolchain a build runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BuildToolchain: Send + Sync {
    /// Runs the install phase against the source checkout.
    async fn install(&self, spec: &BuildSpec, source: &Artifact) -> ActionOutput;

    /// Runs the build phase and returns the synthesized output directory
    /// as the output's files, keyed by file name.
    async fn synthesize(&self, spec: &BuildSpec, source: &Artifact) -> ActionOutput;
}

/// Findings of a static security scan over one template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    /// Template file name.
    pub template: String,
    /// Whether the template passed.
    pub passed: bool,
    /// Rule violations, empty when the template passed.
    #[serde(default)]
    pub findings: Vec<String>,
}

impl ScanReport {
    /// A clean report.
    #[must_use]
    pub fn clean(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            passed: true,
            findings: Vec::new(),
        }
    }

    /// A failing report.
    #[must_use]
    pub fn failed(template: impl Into<String>, findings: Vec<String>) -> Self {
        Self {
            template: template.into(),
            passed: false,
            findings,
        }
    }
}

/// Static security scanner for synthesized templates.
#[async_trait]
pub trait TemplateScanner: Send + Sync {
    /// Scans one template.
    async fn scan(&self, template: &str, contents: &[u8]) -> ScanReport;
}

/// Runs a [`BuildSpec`] with a toolchain and a scanner.
///
/// The build is the pipeline's only automated gate before any cloud
/// resource is touched: any phase failure, any failing template, or an
/// empty template set fails the whole build.
#[derive(Clone)]
pub struct BuildRunner {
    spec: Arc<BuildSpec>,
    toolchain: Arc<dyn BuildToolchain>,
    scanner: Arc<dyn TemplateScanner>,
}

impl fmt::Debug for BuildRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRunner")
            .field("build_image", &self.spec.build_image)
            .field("artifacts", &self.spec.artifacts.files)
            .finish_non_exhaustive()
    }
}

impl BuildRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        spec: Arc<BuildSpec>,
        toolchain: Arc<dyn BuildToolchain>,
        scanner: Arc<dyn TemplateScanner>,
    ) -> Self {
        Self {
            spec,
            toolchain,
            scanner,
        }
    }

    /// Returns the build spec.
    #[must_use]
    pub fn spec(&self) -> &BuildSpec {
        &self.spec
    }

    /// Transforms a source artifact into a build artifact.
    ///
    /// On success the output carries exactly the templates matched by the
    /// artifact manifest.
    pub async fn run(&self, source: &Artifact) -> ActionOutput {
        let install = self.toolchain.install(&self.spec, source).await;
        if !install.is_success() {
            return ActionOutput::fail(format!("install phase failed: {}", install.reason()));
        }

        let synthesized = self.toolchain.synthesize(&self.spec, source).await;
        if !synthesized.is_success() {
            return ActionOutput::fail(format!("build phase failed: {}", synthesized.reason()));
        }
        let produced = synthesized.files.unwrap_or_default();
        let templates = self.spec.artifacts.select(&produced);
        debug!(
            produced = produced.len(),
            selected = templates.len(),
            "Synthesized templates"
        );

        if templates.is_empty() {
            return ActionOutput::fail(format!(
                "no synthesized file matches {}",
                self.spec.artifacts.files.join(", ")
            ));
        }

        let failures = self.scan_all(&templates).await;
        if !failures.is_empty() {
            let reason = failures
                .iter()
                .map(|r| format!("{} ({})", r.template, r.findings.join("; ")))
                .collect::<Vec<_>>()
                .join(", ");
            warn!(failed = failures.len(), "Security scan failed");
            return ActionOutput::fail(format!("security scan failed: {reason}"))
                .with_metadata("scan_failures", serde_json::json!(failures));
        }

        info!(templates = templates.len(), "Build passed security scan");
        let count = templates.len();
        ActionOutput::ok_with_files(templates).with_metadata("scanned", serde_json::json!(count))
    }

    async fn scan_all(&self, templates: &ArtifactFiles) -> Vec<ScanReport> {
        let mut failures = Vec::new();
        for (name, contents) in templates {
            let report = self.scanner.scan(name, contents).await;
            if !report.passed {
                failures.push(report);
            }
        }
        failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ActionStatus;
    use crate::iam::Arn;
    use crate::testing::{source_artifact, ScriptedScanner, ScriptedToolchain};

    fn spec() -> Arc<BuildSpec> {
        let key = Arn::kms_key("us-east-1", "111111111111", "key-1").unwrap();
        Arc::new(BuildSpec::synth_and_scan(key).unwrap())
    }

    fn runner(toolchain: Arc<dyn BuildToolchain>, scanner: ScriptedScanner) -> BuildRunner {
        BuildRunner::new(spec(), toolchain, Arc::new(scanner))
    }

    #[tokio::test]
    async fn test_build_exports_only_manifest_templates() {
        let toolchain = Arc::new(ScriptedToolchain::synthesizing([
            "ApplicationStack.template.json",
            "IntegTestSfnStack.template.json",
            "manifest.json",
        ]));
        let output = runner(toolchain, ScriptedScanner::clean())
            .run(&source_artifact())
            .await;

        assert!(output.is_success());
        let files = output.files.unwrap();
        assert_eq!(files.len(), 2);
        assert!(!files.contains_key("manifest.json"));
    }

    #[tokio::test]
    async fn test_scan_failure_fails_build() {
        let toolchain = Arc::new(ScriptedToolchain::synthesizing([
            "ApplicationStack.template.json",
            "IntegTestSfnStack.template.json",
        ]));
        let scanner = ScriptedScanner::failing("IntegTestSfnStack.template.json", "W35 bucket logging");
        let output = runner(toolchain, scanner).run(&source_artifact()).await;

        assert_eq!(output.status, ActionStatus::Failed);
        assert!(output.files.is_none());
        let reason = output.reason();
        assert!(reason.contains("IntegTestSfnStack.template.json"));
        assert!(reason.contains("W35 bucket logging"));
    }

    #[tokio::test]
    async fn test_no_templates_fails_build() {
        let toolchain = Arc::new(ScriptedToolchain::synthesizing(["manifest.json"]));
        let output = runner(toolchain, ScriptedScanner::clean())
            .run(&source_artifact())
            .await;

        assert!(!output.is_success());
        assert!(output.reason().contains("*Stack.template.json"));
    }

    #[tokio::test]
    async fn test_install_failure_skips_synthesis() {
        let mut toolchain = MockBuildToolchain::new();
        toolchain
            .expect_install()
            .times(1)
            .returning(|_, _| ActionOutput::fail("npm ERR! network"));
        toolchain.expect_synthesize().times(0);

        let output = runner(Arc::new(toolchain), ScriptedScanner::clean())
            .run(&source_artifact())
            .await;

        assert_eq!(output.reason(), "install phase failed: npm ERR! network");
    }

    #[tokio::test]
    async fn test_synthesis_failure() {
        let mut toolchain = MockBuildToolchain::new();
        toolchain.expect_install().returning(|_, _| ActionOutput::ok());
        toolchain
            .expect_synthesize()
            .returning(|_, _| ActionOutput::fail("tsc exited with 2"));

        let output = runner(Arc::new(toolchain), ScriptedScanner::clean())
            .run(&source_artifact())
            .await;

        assert!(output.reason().starts_with("build phase failed"));
    }
}
