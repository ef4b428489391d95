//! Build project description: phases, artifact manifest and image.

use crate::errors::ConfigurationError;
use crate::iam::Arn;
use glob::{MatchOptions, Pattern};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::core::ArtifactFiles;

/// Image the build runs on.
pub const BUILD_IMAGE: &str = "aws/codebuild/amazonlinux2-x86_64-standard:3.0";

/// Suffix of every synthesized template file.
pub const TEMPLATE_SUFFIX: &str = ".template.json";

/// Returns the template file name a stack synthesizes to.
#[must_use]
pub fn template_file_name(stack: &str) -> String {
    format!("{stack}{TEMPLATE_SUFFIX}")
}

/// A build phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    /// Install dependencies and tooling.
    Install,
    /// Compile and synthesize templates.
    Build,
    /// Scan the synthesized templates.
    PostBuild,
}

impl fmt::Display for PhaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Install => write!(f, "install"),
            Self::Build => write!(f, "build"),
            Self::PostBuild => write!(f, "post_build"),
        }
    }
}

/// The commands of one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildPhase {
    /// Phase name.
    pub name: PhaseName,
    /// Runtime versions requested by the phase.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub runtime_versions: BTreeMap<String, String>,
    /// Shell commands, run in order.
    pub commands: Vec<String>,
}

impl BuildPhase {
    fn new(name: PhaseName, commands: &[&str]) -> Self {
        Self {
            name,
            runtime_versions: BTreeMap::new(),
            commands: commands.iter().map(ToString::to_string).collect(),
        }
    }

    #[must_use]
    fn with_runtime(mut self, runtime: &str, version: &str) -> Self {
        self.runtime_versions.insert(runtime.to_string(), version.to_string());
        self
    }
}

/// The files a build exports, as globs relative to a base directory.
#[derive(Debug, Clone, Serialize)]
pub struct ArtifactManifest {
    /// Directory the globs are evaluated in.
    pub base_directory: String,
    /// File name globs (`*`, `?` and `[...]` wildcards).
    pub files: Vec<String>,
    #[serde(skip)]
    patterns: Vec<Pattern>,
}

/// Wildcards never cross a directory separator.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

impl ArtifactManifest {
    /// Compiles a manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if no glob is given or a glob cannot be compiled.
    pub fn new(
        base_directory: impl Into<String>,
        files: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<Self, ConfigurationError> {
        let files: Vec<String> = files.into_iter().map(Into::into).collect();
        if files.is_empty() {
            return Err(ConfigurationError::missing("artifact_files"));
        }
        let patterns = files
            .iter()
            .map(|glob| {
                Pattern::new(glob).map_err(|err| {
                    ConfigurationError::invalid("artifact_files", glob, err.to_string())
                })
            })
            .collect::<Result<_, _>>()?;
        Ok(Self {
            base_directory: base_directory.into(),
            files,
            patterns,
        })
    }

    /// Returns true if `file_name` matches one of the globs.
    #[must_use]
    pub fn matches(&self, file_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| pattern.matches_with(file_name, MATCH_OPTIONS))
    }

    /// Returns exactly the files matching the manifest.
    #[must_use]
    pub fn select(&self, files: &ArtifactFiles) -> ArtifactFiles {
        files
            .iter()
            .filter(|(name, _)| self.matches(name))
            .map(|(name, bytes)| (name.clone(), bytes.clone()))
            .collect()
    }
}

impl PartialEq for ArtifactManifest {
    fn eq(&self, other: &Self) -> bool {
        self.base_directory == other.base_directory && self.files == other.files
    }
}

impl Eq for ArtifactManifest {}

/// The build project: what runs, where, and what it exports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSpec {
    /// Build spec format version.
    pub version: String,
    /// Phases in execution order.
    pub phases: Vec<BuildPhase>,
    /// Exported files.
    pub artifacts: ArtifactManifest,
    /// Build image.
    pub build_image: String,
    /// Key the build encrypts its output with.
    pub encryption_key: Arn,
}

impl BuildSpec {
    /// The synthesize-and-scan build: install the toolchain and the
    /// template scanner, synthesize every stack into `dist`, scan each
    /// `*Stack.template.json`, and export exactly those templates.
    ///
    /// # Errors
    ///
    /// Returns an error if the artifact manifest cannot be compiled.
    pub fn synth_and_scan(encryption_key: Arn) -> Result<Self, ConfigurationError> {
        let template_glob = format!("*Stack{TEMPLATE_SUFFIX}");
        let scan_loop = format!(
            "for filename in dist/{template_glob}; do (cfn_nag_scan -i $filename); [ $? -eq 0 ]  || exit 1 ; done"
        );
        Ok(Self {
            version: "0.2".to_string(),
            phases: vec![
                BuildPhase::new(
                    PhaseName::Install,
                    &["npm install", "yum -y install gem", "gem install cfn-nag"],
                )
                .with_runtime("nodejs", "14"),
                BuildPhase::new(PhaseName::Build, &["npm run build", "npm run cdk synth -- -o dist"]),
                BuildPhase::new(PhaseName::PostBuild, &[scan_loop.as_str()]),
            ],
            artifacts: ArtifactManifest::new("dist", [template_glob])?,
            build_image: BUILD_IMAGE.to_string(),
            encryption_key,
        })
    }

    /// Returns a phase by name.
    #[must_use]
    pub fn phase(&self, name: PhaseName) -> Option<&BuildPhase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Renders the build spec document.
    #[must_use]
    pub fn render(&self) -> serde_json::Value {
        let mut phases = serde_json::Map::new();
        for phase in &self.phases {
            let mut body = serde_json::Map::new();
            if !phase.runtime_versions.is_empty() {
                body.insert(
                    "runtime-versions".to_string(),
                    serde_json::json!(phase.runtime_versions),
                );
            }
            body.insert("commands".to_string(), serde_json::json!(phase.commands));
            phases.insert(phase.name.to_string(), serde_json::Value::Object(body));
        }
        serde_json::json!({
            "version": self.version,
            "phases": phases,
            "artifacts": {
                "base-directory": self.artifacts.base_directory,
                "files": self.artifacts.files,
            },
        })
    }
}
