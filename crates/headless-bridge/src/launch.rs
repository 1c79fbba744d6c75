//! Worker launch resolution
//!
//! A [`Launcher`] turns configuration into a concrete [`LaunchSpec`]: program,
//! arguments, environment and working directory.

use headless_rl_core::{BridgeError, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Worker entry point, relative to the core directory
pub const WORKER_ENTRY: &str = "headless/rl_server.ts";

/// Environment variable that turns on worker debug logging
pub const DEBUG_ENV: &str = "NONAME_HEADLESS_DEBUG";

/// Environment variable pointing tsx at the worker's tsconfig
pub const TSCONFIG_ENV: &str = "TSX_TSCONFIG";

/// Concrete command used to spawn a worker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    /// Variables set on top of the inherited environment
    pub envs: Vec<(OsString, OsString)>,
    /// Variables removed from the inherited environment
    pub env_removals: Vec<OsString>,
    pub cwd: Option<PathBuf>,
}

impl LaunchSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<OsString>, value: impl Into<OsString>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<OsString>) -> Self {
        self.env_removals.push(key.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Build a command with all three standard streams piped
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        for key in &self.env_removals {
            command.env_remove(key);
        }
        for (key, value) in &self.envs {
            command.env(key, value);
        }
        if let Some(cwd) = &self.cwd {
            command.current_dir(cwd);
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

/// Resolves how to start a worker
pub trait Launcher: Send + Sync {
    fn resolve(&self) -> Result<LaunchSpec>;
}

/// A fixed spec launches itself
impl Launcher for LaunchSpec {
    fn resolve(&self) -> Result<LaunchSpec> {
        Ok(self.clone())
    }
}

/// Launches the TypeScript worker of a repository checkout.
///
/// Prefers `pnpm tsx`; falls back to `node --import <tsx loader>` when the
/// repository has tsx installed under `node_modules`.
#[derive(Debug, Clone)]
pub struct TsxLauncher {
    repo_root: PathBuf,
    debug: bool,
}

impl TsxLauncher {
    pub fn new(repo_root: impl AsRef<Path>) -> Self {
        let repo_root = repo_root.as_ref();
        Self {
            repo_root: std::fs::canonicalize(repo_root).unwrap_or_else(|_| repo_root.to_path_buf()),
            debug: false,
        }
    }

    /// Ask the worker for verbose stderr logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Directory the worker runs in
    pub fn core_dir(&self) -> PathBuf {
        self.repo_root.join("apps").join("core")
    }

    fn loader_path(&self) -> PathBuf {
        self.repo_root
            .join("node_modules")
            .join("tsx")
            .join("dist")
            .join("loader.mjs")
    }

    /// Resolve using `find` to look up executables on `PATH`
    fn resolve_with(&self, find: impl Fn(&str) -> Option<PathBuf>) -> Result<LaunchSpec> {
        let core_dir = self.core_dir();

        let spec = if let Some(pnpm) = find("pnpm") {
            LaunchSpec::new(pnpm).arg("tsx").arg(WORKER_ENTRY)
        } else {
            let loader = self.loader_path();
            if !loader.exists() {
                return Err(BridgeError::LaunchUnavailable(format!(
                    "neither pnpm nor {} is available",
                    loader.display()
                )));
            }
            let node = find("node").ok_or_else(|| {
                BridgeError::LaunchUnavailable("node is required but not found in PATH".into())
            })?;
            LaunchSpec::new(node)
                .arg("--import")
                .arg(file_url(&loader))
                .arg(WORKER_ENTRY)
        };

        let spec = spec
            .env(TSCONFIG_ENV, core_dir.join("tsconfig.json"))
            .current_dir(&core_dir);
        let spec = if self.debug {
            spec.env(DEBUG_ENV, "1")
        } else {
            spec.env_remove(DEBUG_ENV)
        };

        debug!("Resolved worker launch: {:?} {:?}", spec.program, spec.args);
        Ok(spec)
    }
}

impl Launcher for TsxLauncher {
    fn resolve(&self) -> Result<LaunchSpec> {
        self.resolve_with(|name| which::which(name).ok())
    }
}

/// `file://` URL of an absolute path
fn file_url(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}
