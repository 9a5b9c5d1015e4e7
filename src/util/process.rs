//! Subprocess execution utilities.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use anyhow::{Context, Result};

/// A command line plus environment changes, run with inherited stdio or
/// used to replace the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<OsString>,
    env: BTreeMap<String, OsString>,
    env_remove: Vec<String>,
}

impl ProcessBuilder {
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: BTreeMap::new(),
            env_remove: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|s| s.as_ref().to_os_string()));
        self
    }

    /// Set a variable for the child, undoing an earlier removal.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<OsStr>) -> Self {
        let key = key.as_ref().to_string();
        self.env_remove.retain(|k| *k != key);
        self.env.insert(key, value.as_ref().to_os_string());
        self
    }

    /// Clear a variable for the child, undoing an earlier set.
    pub fn env_remove(mut self, key: impl AsRef<str>) -> Self {
        let key = key.as_ref().to_string();
        self.env.remove(&key);
        self.env_remove.push(key);
        self
    }

    pub fn get_program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Value set for an environment variable, if any.
    pub fn get_env(&self, key: &str) -> Option<&OsStr> {
        self.env.get(key).map(OsString::as_os_str)
    }

    /// Whether the variable is cleared for the child.
    pub fn is_env_removed(&self, key: &str) -> bool {
        self.env_remove.iter().any(|k| k == key)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).envs(&self.env);
        for key in &self.env_remove {
            cmd.env_remove(key);
        }
        cmd
    }

    /// Execute with inherited stdio and return the status.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut cmd = self.command();
        cmd.status()
            .with_context(|| format!("failed to execute `{}`", self.display_command()))
    }

    /// Replace the current process with this command.
    ///
    /// Only returns on failure to start the program.
    #[cfg(unix)]
    pub fn exec_replace(self) -> Result<Infallible> {
        use std::os::unix::process::CommandExt;

        tracing::debug!("exec: {}", self.display_command());
        let err = self.command().exec();
        Err(err).with_context(|| format!("failed to exec `{}`", self.display_command()))
    }

    /// Run this command to completion and exit with its status.
    #[cfg(not(unix))]
    pub fn exec_replace(self) -> Result<Infallible> {
        tracing::debug!("exec: {}", self.display_command());
        let status = self.status()?;
        std::process::exit(status.code().unwrap_or(1))
    }

    /// The command line as one string, for logs and errors.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().map(|a| a.to_string_lossy().into_owned()));
        parts.join(" ")
    }
}
