//! Requirement installation through an external package manager.

use std::io::ErrorKind;
use std::path::Path;

use anyhow::{bail, Context, Result};
use appkit_bootstrap::config::InstallerConfig;
use async_trait::async_trait;
use tokio::process::Command;

use super::RuntimeError;
use crate::extract::extract_requirements_from_file;

#[async_trait]
pub trait Installer: Send + Sync {
    async fn install(&self, requirements: &[String], cache_dir: &Path) -> Result<()>;
}

/// Runs `{program} {args...} {requirements...}` and waits for it to exit.
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    args: Vec<String>,
    cache_env: Option<String>,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cache_env: None,
        }
    }

    pub fn from_config(cfg: &InstallerConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            cache_env: cfg.cache_env.clone().filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// The package manager sees the cache directory through this variable.
    pub fn cache_env(mut self, var: impl Into<String>) -> Self {
        self.cache_env = Some(var.into());
        self
    }

    fn command(&self, requirements: &[String], cache_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).args(requirements).kill_on_drop(true);
        if let Some(var) = &self.cache_env {
            cmd.env(var, cache_dir);
        }
        cmd
    }
}

impl Default for CommandInstaller {
    fn default() -> Self {
        Self::from_config(&InstallerConfig::default())
    }
}

#[async_trait]
impl Installer for CommandInstaller {
    async fn install(&self, requirements: &[String], cache_dir: &Path) -> Result<()> {
        tracing::debug!(
            program = %self.program,
            args = ?self.args,
            requirements = ?requirements,
            "Spawning installer"
        );

        let status = match self.command(requirements, cache_dir).status().await {
            Ok(status) => status,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                bail!("'{}' command not found. Install it or set installer.program", self.program)
            }
            Err(e) => {
                return Err(e).with_context(|| format!("failed to spawn '{}'", self.program))
            }
        };

        if !status.success() {
            bail!("'{}' exited with {status}", self.program);
        }
        Ok(())
    }
}

/// Extract requirements from `file` without compiling it and hand them to `installer`.
/// Nothing is spawned when the app declares no requirements.
pub async fn install_requirements(
    file: &Path,
    cache_dir: &Path,
    installer: &dyn Installer,
) -> Result<Vec<String>, RuntimeError> {
    let requirements = extract_requirements_from_file(file)?;
    if requirements.is_empty() {
        tracing::debug!(file = %file.display(), "No requirements declared");
        return Ok(requirements);
    }

    tracing::info!(requirements = %requirements.join(", "), "Installing requirements");
    installer
        .install(&requirements, cache_dir)
        .await
        .map_err(|source| RuntimeError::Install { source })?;
    Ok(requirements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<Vec<String>>>,
    }

    #[async_trait]
    impl Installer for Recording {
        async fn install(&self, requirements: &[String], _cache_dir: &Path) -> Result<()> {
            self.calls.lock().push(requirements.to_vec());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Installer for Failing {
        async fn install(&self, _requirements: &[String], _cache_dir: &Path) -> Result<()> {
            bail!("resolver exploded")
        }
    }

    #[tokio::test]
    async fn declared_requirements_are_installed_in_order() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("app.rs");
        fs::write(
            &file,
            r#"
            #[appkit::app(requirements = ["torch>=2.0", "numpy"])]
            impl Model {}
            "#,
        )
        .unwrap();

        let installer = Recording::default();
        let reqs = install_requirements(&file, tmp.path(), &installer).await.unwrap();
        assert_eq!(reqs, vec!["torch>=2.0", "numpy"]);
        assert_eq!(installer.calls.lock().clone(), vec![reqs]);
    }

    #[tokio::test]
    async fn nothing_is_installed_without_requirements() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("app.rs");
        fs::write(&file, "#[app] impl Model {}").unwrap();

        let installer = Recording::default();
        let reqs = install_requirements(&file, tmp.path(), &installer).await.unwrap();
        assert!(reqs.is_empty());
        assert!(installer.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn installer_failure_is_wrapped() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("app.rs");
        fs::write(&file, r#"#[app(requirements = ["x"])] impl Model {}"#).unwrap();

        let err = install_requirements(&file, tmp.path(), &Failing)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Install { .. }));
        assert!(err.to_string().contains("resolver exploded"), "{err}");
    }

    #[tokio::test]
    async fn syntax_errors_surface_as_extract_errors() {
        let tmp = tempdir().unwrap();
        let file = tmp.path().join("broken.rs");
        fs::write(&file, "impl {{{").unwrap();

        let err = install_requirements(&file, tmp.path(), &Recording::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Extract(_)));
    }

    #[test]
    fn from_config_copies_the_invocation() {
        let installer = CommandInstaller::default();
        assert_eq!(installer.program, "uv");
        assert_eq!(installer.args, vec!["pip", "install"]);
        assert_eq!(installer.cache_env.as_deref(), Some("UV_CACHE_DIR"));
    }

    #[tokio::test]
    async fn missing_program_is_reported() {
        let installer = CommandInstaller::new("appkit-definitely-not-a-real-installer");
        let err = installer
            .install(&["x".to_string()], Path::new("."))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("command not found"), "{err}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn command_sees_cache_dir_and_requirements() {
        let tmp = tempdir().unwrap();
        // $1 is the first requirement; it must equal the exported cache dir.
        let installer = CommandInstaller::new("sh")
            .args(["-c", r#"[ "$APPKIT_TEST_CACHE" = "$1" ]"#, "sh"])
            .cache_env("APPKIT_TEST_CACHE");
        let dir = tmp.path().to_string_lossy().to_string();
        installer.install(&[dir], tmp.path()).await.unwrap();

        let err = installer
            .install(&["/somewhere/else".to_string()], tmp.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with"), "{err}");
    }
}
