//! Running a zip-app's preludes and entry point.

use std::process::ExitStatus;

use anyhow::{Context, Result};

use crate::core::errors::ZappError;
use crate::core::EntryRef;
use crate::runtime::loader::Runtime;
use crate::runtime::registry::{EntryRegistry, Step};
use crate::util::context::TMPDIR_ENV;
use crate::util::process::ProcessBuilder;

/// Runs a prelude module to completion.
pub trait ModuleRunner {
    fn run(&mut self, cmd: &ProcessBuilder) -> Result<ExitStatus>;
}

/// Runs modules with the configured interpreter, inheriting stdio.
#[derive(Debug, Default)]
pub struct InterpreterRunner;

impl ModuleRunner for InterpreterRunner {
    fn run(&mut self, cmd: &ProcessBuilder) -> Result<ExitStatus> {
        cmd.status()
    }
}

/// Build the interpreter command that runs `entry`.
///
/// Modules run as main programs. A `module:function` reference calls the
/// function instead only when `call_entry_functions` is enabled.
pub fn module_command(rt: &Runtime, entry: &EntryRef) -> Result<ProcessBuilder> {
    let mut argv = rt.config().interpreter().into_iter();
    let program = argv.next().unwrap_or_default();
    let mut cmd = ProcessBuilder::new(program).args(argv);

    cmd = match entry.function() {
        Some(function) if rt.config().call_entry_functions => {
            cmd.arg("-c").arg(call_script(entry.module(), function)?)
        }
        _ => cmd.arg("-m").arg(entry.module()),
    };

    cmd = cmd
        .args(rt.args())
        .env(rt.config().path_var(), rt.search_path().to_env_value()?);
    if let Some(scratch) = rt.scratch_dir_if_set() {
        cmd = cmd.env(TMPDIR_ENV, scratch);
    }
    Ok(cmd)
}

fn call_script(module: &str, function: &str) -> Result<String> {
    let module = serde_json::to_string(module).context("failed to encode module name")?;
    let function = serde_json::to_string(function).context("failed to encode function name")?;
    Ok(format!(
        "import sys\n\
         from importlib import import_module\n\
         target = import_module({module})\n\
         for attr in {function}.split('.'):\n    target = getattr(target, attr)\n\
         sys.exit(target())\n"
    ))
}

/// Run every prelude and return the command for the entry point.
///
/// All references are validated before anything runs. Loader operations
/// run in-process; user preludes run through `runner` and must succeed.
/// The caller replaces the process with the returned command.
pub fn bootstrap(
    rt: &mut Runtime,
    registry: &EntryRegistry,
    runner: &mut dyn ModuleRunner,
) -> Result<ProcessBuilder> {
    let manifest = rt.manifest()?;
    let mut steps = registry.plan(manifest.scripts())?;
    let entry = match steps.pop() {
        Some(Step::Module(entry)) => entry,
        Some(Step::Loader(name, _)) => {
            anyhow::bail!("entry point `{}` is a loader operation", name)
        }
        None => anyhow::bail!("manifest has no entry point"),
    };

    for step in steps {
        match step {
            Step::Loader(name, op) => {
                tracing::debug!("loader: {}", name);
                op(rt).with_context(|| format!("loader operation `{}` failed", name))?;
            }
            Step::Module(prelude) => {
                let cmd = module_command(rt, &prelude)?;
                tracing::debug!("prelude: {}", cmd.display_command());
                let status = runner.run(&cmd)?;
                if !status.success() {
                    return Err(ZappError::PreludeFailed {
                        reference: prelude.to_string(),
                        status: status.to_string(),
                    }
                    .into());
                }
            }
        }
    }

    module_command(rt, &entry)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::ops::{compile, CompileOptions};
    use crate::runtime::registry::CANONICALIZE_PATH;
    use crate::test_support::ManifestFixture;
    use crate::util::config::RuntimeConfig;
    use std::os::unix::process::ExitStatusExt;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Recorder {
        commands: Vec<ProcessBuilder>,
        fail: bool,
    }

    impl ModuleRunner for Recorder {
        fn run(&mut self, cmd: &ProcessBuilder) -> Result<ExitStatus> {
            self.commands.push(cmd.clone());
            Ok(ExitStatus::from_raw(if self.fail { 1 << 8 } else { 0 }))
        }
    }

    fn config(call_entry_functions: bool) -> RuntimeConfig {
        RuntimeConfig {
            interpreter: Some(vec!["python3".into(), "-I".into()]),
            path_var: Some("ZAPP_TEST_SEARCH_PATH".into()),
            call_entry_functions,
        }
    }

    fn build(tmp: &TempDir, preludes: &[&str], entry: &str) -> PathBuf {
        let mut fixture = ManifestFixture::simple(tmp.path());
        fixture.manifest.prelude_points = preludes.iter().map(|s| s.to_string()).collect();
        fixture.manifest.entry_point = entry.to_string();
        let opts = CompileOptions {
            output: tmp.path().join("app.zapp"),
            ..Default::default()
        };
        compile(fixture.manifest, &opts).unwrap().output
    }

    fn args(cmd: &ProcessBuilder) -> Vec<String> {
        cmd.get_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_preludes_run_before_entry() {
        let tmp = TempDir::new().unwrap();
        let app = build(&tmp, &["setup", CANONICALIZE_PATH], "pkg.mod");
        let mut rt = Runtime::new(&app, vec!["--flag".into()], config(false)).unwrap();
        let mut runner = Recorder::default();

        let entry = bootstrap(&mut rt, &EntryRegistry::with_loader_ops(), &mut runner).unwrap();

        assert_eq!(runner.commands.len(), 1);
        assert_eq!(args(&runner.commands[0]), ["-I", "-m", "setup", "--flag"]);
        assert_eq!(entry.get_program(), Path::new("python3"));
        assert_eq!(args(&entry), ["-I", "-m", "pkg.mod", "--flag"]);

        let exported = entry.get_env("ZAPP_TEST_SEARCH_PATH").unwrap();
        let first = std::env::split_paths(exported).next().unwrap();
        assert_eq!(first, rt.root());
    }

    #[test]
    fn test_failed_prelude_stops_bootstrap() {
        let tmp = TempDir::new().unwrap();
        let app = build(&tmp, &["setup"], "pkg.mod");
        let mut rt = Runtime::new(&app, Vec::new(), config(false)).unwrap();
        let mut runner = Recorder {
            fail: true,
            ..Default::default()
        };

        let err = bootstrap(&mut rt, &EntryRegistry::with_loader_ops(), &mut runner).unwrap_err();

        assert!(matches!(
            ZappError::find(&err),
            Some(ZappError::PreludeFailed { reference, .. }) if reference == "setup"
        ));
    }

    #[test]
    fn test_function_references_run_module_by_default() {
        let tmp = TempDir::new().unwrap();
        let app = build(&tmp, &[], "pkg.mod:main");
        let mut rt = Runtime::new(&app, Vec::new(), config(false)).unwrap();

        let entry = bootstrap(&mut rt, &EntryRegistry::new(), &mut Recorder::default()).unwrap();

        assert_eq!(args(&entry), ["-I", "-m", "pkg.mod"]);
    }

    #[test]
    fn test_function_references_can_be_called() {
        let tmp = TempDir::new().unwrap();
        let app = build(&tmp, &[], "pkg.mod:cli.main");
        let mut rt = Runtime::new(&app, Vec::new(), config(true)).unwrap();

        let entry = bootstrap(&mut rt, &EntryRegistry::new(), &mut Recorder::default()).unwrap();

        let args = args(&entry);
        assert_eq!(args[..2], ["-I", "-c"]);
        assert!(args[2].contains(r#"import_module("pkg.mod")"#));
        assert!(args[2].contains(r#""cli.main".split('.')"#));
    }
}
