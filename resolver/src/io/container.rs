//! Container build/run collaborator.
//!
//! The [`ContainerRunner`] trait decouples the resolution loop from the
//! container engine (currently the `docker` CLI). Tests use scripted runners
//! that return predetermined logs without touching an engine.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::dockerfile;
use crate::core::env_spec::EnvSpec;
use crate::io::config::ResolverConfig;
use crate::io::process::run_captured;

/// Locations derived from the target snippet.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    /// Directory containing the snippet (build context, log destination).
    pub project_dir: PathBuf,
    /// Name of that directory; used to derive image/container names.
    pub dir_name: String,
    /// File name of the snippet itself.
    pub file_name: String,
}

impl SourcePaths {
    pub fn from_file(file: &Path) -> Result<Self> {
        let project_dir = file
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let file_name = file
            .file_name()
            .ok_or_else(|| anyhow!("target path {} has no file name", file.display()))?
            .to_string_lossy()
            .into_owned();
        let dir_name = project_dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "snippet".to_string());
        Ok(Self {
            project_dir,
            dir_name,
            file_name,
        })
    }
}

/// Result of one container build.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub ok: bool,
    pub log: String,
}

/// Result of one container run, observed to completion.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub log: String,
    pub exited_nonzero: bool,
}

/// Abstraction over container engines.
pub trait ContainerRunner {
    /// Build an image for `spec`. A failed build is a normal outcome, not an
    /// error; errors are reserved for the engine being unreachable.
    fn build(&mut self, spec: &EnvSpec, source: &SourcePaths) -> Result<BuildOutput>;

    /// Run the most recently built image to completion.
    fn run(&mut self) -> Result<RunOutput>;

    /// Remove the container. Idempotent: absence is not an error.
    fn remove_container(&mut self) -> Result<()>;

    /// Remove the image. Idempotent: absence is not an error.
    fn remove_image(&mut self) -> Result<()>;
}

/// Container runner that drives the `docker` CLI.
pub struct DockerCli {
    build_timeout: Duration,
    run_timeout: Duration,
    output_limit_bytes: usize,
    image_tag: Option<String>,
    container_name: Option<String>,
}

impl DockerCli {
    pub fn new(cfg: &ResolverConfig) -> Self {
        Self {
            build_timeout: Duration::from_secs(cfg.build_timeout_secs),
            run_timeout: Duration::from_secs(cfg.run_timeout_secs),
            output_limit_bytes: cfg.output_limit_bytes,
            image_tag: None,
            container_name: None,
        }
    }

    /// Best-effort removal; a missing resource (or an engine grumble about
    /// one) must not fail teardown.
    fn remove_resource(&self, args: &[&str], what: &str) {
        let mut cmd = Command::new("docker");
        cmd.args(args);
        match run_captured(cmd, None, Duration::from_secs(60), self.output_limit_bytes) {
            Ok(output) if output.success() => debug!(what, "removed"),
            Ok(_) => debug!(what, "already absent"),
            Err(err) => warn!(what, err = %err, "removal failed"),
        }
    }
}

/// Image/container names must be unique per candidate so parallel loops
/// never collide, and must satisfy engine naming rules.
fn name_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches(|c| c == '-' || c == '.');
    if trimmed.is_empty() {
        "snippet".to_string()
    } else {
        trimmed.to_string()
    }
}

impl ContainerRunner for DockerCli {
    #[instrument(skip_all, fields(runtime = %spec.runtime_version))]
    fn build(&mut self, spec: &EnvSpec, source: &SourcePaths) -> Result<BuildOutput> {
        let dockerfile_name = format!("Dockerfile-resolver-{}", spec.runtime_version);
        let dockerfile_path = source.project_dir.join(&dockerfile_name);
        fs::write(&dockerfile_path, dockerfile::render(spec, &source.file_name))
            .with_context(|| format!("write {}", dockerfile_path.display()))?;

        let stem = name_component(&source.dir_name);
        let version = name_component(&spec.runtime_version);
        let image_tag = format!("resolver/{stem}:{version}");
        self.container_name = Some(format!("{stem}-{version}"));

        let mut cmd = Command::new("docker");
        cmd.arg("build")
            .arg("--force-rm")
            .arg("-f")
            .arg(&dockerfile_path)
            .arg("-t")
            .arg(&image_tag)
            .arg(&source.project_dir);

        info!(image = %image_tag, "building image");
        self.image_tag = Some(image_tag);
        let output = run_captured(cmd, None, self.build_timeout, self.output_limit_bytes)
            .context("run docker build")?;
        Ok(BuildOutput {
            ok: output.success(),
            log: output.combined_log(),
        })
    }

    #[instrument(skip_all)]
    fn run(&mut self) -> Result<RunOutput> {
        let image = self
            .image_tag
            .as_deref()
            .ok_or_else(|| anyhow!("no image built yet"))?;
        let name = self
            .container_name
            .as_deref()
            .ok_or_else(|| anyhow!("no container name assigned"))?
            .to_string();

        // A leftover container with the same name would shadow this run.
        self.remove_resource(&["rm", "-f", "-v", &name], "stale container");

        let mut cmd = Command::new("docker");
        cmd.arg("run").arg("--name").arg(&name).arg(image);

        info!(%name, "running container");
        let output = run_captured(cmd, None, self.run_timeout, self.output_limit_bytes)
            .context("run docker run")?;
        Ok(RunOutput {
            exited_nonzero: !output.success(),
            log: output.combined_log(),
        })
    }

    fn remove_container(&mut self) -> Result<()> {
        if let Some(name) = self.container_name.clone() {
            self.remove_resource(&["rm", "-f", "-v", &name], "container");
        }
        Ok(())
    }

    fn remove_image(&mut self) -> Result<()> {
        if let Some(tag) = self.image_tag.clone() {
            self.remove_resource(&["rmi", "-f", &tag], "image");
        }
        Ok(())
    }
}
