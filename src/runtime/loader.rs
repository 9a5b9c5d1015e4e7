//! Runtime state of a running zip-app.
//!
//! A [`Runtime`] is created once per process for the archive (or extracted
//! tree) being run. It owns the search path the user code will see and
//! implements the loader operations a manifest can schedule.

use std::cell::OnceCell;
use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::manifest::{DEPS_PREFIX, EMBEDDED_MANIFEST, MAIN_SCRIPT};
use crate::core::Manifest;
use crate::runtime::search_path::SearchPath;
use crate::util::archive;
use crate::util::config::RuntimeConfig;
use crate::util::context::{default_cache_dir, CACHE_DIR_ENV, TMPDIR_ENV};
use crate::util::fs::{resolve_path, write_bytes};
use crate::util::process::ProcessBuilder;
use crate::wheel::WheelCache;

/// Subdirectory of the scratch directory holding an extracted archive.
const EXTRACT_DIR: &str = "usr";

/// Cache root used when no persistent cache is writable.
const SCRATCH_CACHE_DIR: &str = "deps";

/// The process-wide loader state.
#[derive(Debug)]
pub struct Runtime {
    /// The archive, or the extracted tree's root directory
    root: PathBuf,

    /// Whether `root` is a zip archive
    is_zip: bool,

    /// Arguments forwarded to the user program
    args: Vec<OsString>,

    config: RuntimeConfig,
    search_path: SearchPath,

    manifest: OnceCell<Manifest>,
    scratch_dir: OnceCell<PathBuf>,
    cache_root: OnceCell<PathBuf>,
}

impl Runtime {
    /// Set up the runtime for `target`.
    ///
    /// `target` is either a zip-app or the `__main__.py` (or root
    /// directory) of one extracted by [`Runtime::unpack_zapp`].
    pub fn new(target: &Path, args: Vec<OsString>, config: RuntimeConfig) -> Result<Self> {
        let target = resolve_path(target);
        let (root, is_zip) = if archive::is_zip(&target) {
            (target, true)
        } else if target.is_dir() {
            (target, false)
        } else if target.file_name().is_some_and(|n| n == MAIN_SCRIPT) {
            let root = target
                .parent()
                .map(Path::to_path_buf)
                .with_context(|| format!("invalid target: {}", target.display()))?;
            (root, false)
        } else {
            bail!("{} is not a zip-app", target.display());
        };

        let mut search_path = SearchPath::new();
        search_path.push_back(root.clone());
        if let Some(existing) = env::var_os(config.path_var()) {
            for entry in SearchPath::from_env_value(&existing).iter() {
                search_path.push_back(entry.to_path_buf());
            }
        }

        Ok(Runtime {
            root,
            is_zip,
            args,
            config,
            search_path,
            manifest: OnceCell::new(),
            scratch_dir: OnceCell::new(),
            cache_root: OnceCell::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_zip(&self) -> bool {
        self.is_zip
    }

    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn search_path(&self) -> &SearchPath {
        &self.search_path
    }

    pub fn search_path_mut(&mut self) -> &mut SearchPath {
        &mut self.search_path
    }

    /// The embedded manifest, read on first use.
    pub fn manifest(&self) -> Result<&Manifest> {
        if let Some(manifest) = self.manifest.get() {
            return Ok(manifest);
        }
        let manifest = self.read_manifest()?;
        Ok(self.manifest.get_or_init(|| manifest))
    }

    fn read_manifest(&self) -> Result<Manifest> {
        if self.is_zip {
            let mut zip = archive::open(&self.root)?;
            let bytes = archive::read_member(&mut zip, EMBEDDED_MANIFEST)?;
            let text = String::from_utf8(bytes)
                .with_context(|| format!("{} is not UTF-8", EMBEDDED_MANIFEST))?;
            Manifest::from_json(&text).with_context(|| format!("in {}", self.root.display()))
        } else {
            Manifest::load(&self.root.join(EMBEDDED_MANIFEST))
        }
    }

    /// The scratch directory shared with relaunched children.
    ///
    /// `ZAPP_TMPDIR` when set, otherwise a fresh temp directory that is
    /// kept for the children.
    pub fn scratch_dir(&self) -> Result<&Path> {
        if let Some(dir) = self.scratch_dir.get() {
            return Ok(dir);
        }
        let dir = match inherited_scratch_dir() {
            Some(dir) => {
                fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                dir
            }
            None => fresh_temp_dir()?,
        };
        tracing::debug!("scratch directory: {}", dir.display());
        Ok(self.scratch_dir.get_or_init(|| dir))
    }

    /// Scratch directory, if one has been created or inherited.
    pub fn scratch_dir_if_set(&self) -> Option<&Path> {
        self.scratch_dir.get().map(PathBuf::as_path)
    }

    /// The cache root for wheels.
    ///
    /// `ZAPP_CACHE_DIR` when set, else the per-user cache directory if it
    /// can be written, else `<scratch>/deps`.
    pub fn cache_root(&self) -> Result<&Path> {
        if let Some(dir) = self.cache_root.get() {
            return Ok(dir);
        }
        let dir = match env::var_os(CACHE_DIR_ENV).filter(|v| !v.is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => match default_cache_dir().filter(|d| is_writable_dir(d)) {
                Some(dir) => dir,
                None => self.scratch_dir()?.join(SCRATCH_CACHE_DIR),
            },
        };
        tracing::debug!("cache root: {}", dir.display());
        Ok(self.cache_root.get_or_init(|| dir))
    }

    fn wheel_cache(&self) -> Result<WheelCache> {
        Ok(WheelCache::new(self.cache_root()?))
    }

    /// Copy every wheel missing from the cache out of the archive.
    ///
    /// Does nothing unless running from a zip archive.
    pub fn unpack_deps(&mut self) -> Result<()> {
        if !self.is_zip {
            tracing::debug!("not running from an archive, skipping unpack_deps");
            return Ok(());
        }
        let names: Vec<String> = self.manifest()?.wheels.keys().cloned().collect();
        if names.is_empty() {
            return Ok(());
        }

        let cache = self.wheel_cache()?;
        cache.ensure_dir()?;
        let mut zip = archive::open(&self.root)?;

        for name in names {
            if cache.touch(&name) {
                continue;
            }
            let member = format!("{}{}", DEPS_PREFIX, name);
            let mut reader = zip
                .by_name(&member)
                .with_context(|| format!("archive has no member `{}`", member))?;
            let insertion = cache.insert_from(&name, &mut reader)?;
            tracing::debug!("unpacked {} to {}", member, insertion.path().display());
        }
        Ok(())
    }

    /// Put every wheel at the front of the search path.
    ///
    /// Wheels are visited in manifest order, each inserted at the front.
    pub fn install_deps(&mut self) -> Result<()> {
        let names: Vec<String> = self.manifest()?.wheels.keys().cloned().collect();
        if names.is_empty() {
            return Ok(());
        }

        let cache = self.wheel_cache()?;
        for name in names {
            if !cache.touch(&name) {
                tracing::warn!("{} is not in the wheel cache", name);
            }
            let path = resolve_path(&cache.path_for(&name));
            self.search_path.remove(&path);
            self.search_path.push_front(path);
        }
        Ok(())
    }

    /// Resolve every search-path entry, dropping later duplicates.
    pub fn canonicalize_path(&mut self) {
        self.search_path.canonicalize();
    }

    /// Extract a non-zip-safe archive and build the relaunch command.
    ///
    /// Every extraction gets a new temp directory. The scratch directory
    /// handed to the child is the inherited one when set, else that same
    /// new directory. Returns `None` when running from an extracted tree
    /// or a zip-safe archive.
    pub fn prepare_unpack_zapp(&self) -> Result<Option<ProcessBuilder>> {
        if !self.is_zip || self.manifest()?.zip_safe {
            return Ok(None);
        }

        let extract_root = fresh_temp_dir()?;
        let scratch = match inherited_scratch_dir() {
            Some(_) => self.scratch_dir()?.to_path_buf(),
            None => self.scratch_dir.get_or_init(|| extract_root.clone()).clone(),
        };

        let usr = extract_root.join(EXTRACT_DIR);
        let mut zip = archive::open(&self.root)?;
        for dest in self.manifest()?.sources.keys() {
            let bytes = archive::read_member(&mut zip, dest)?;
            write_bytes(&usr.join(dest), &bytes)?;
        }
        tracing::debug!("extracted {} to {}", self.root.display(), usr.display());

        let loader = env::current_exe().context("failed to locate the zapp-run executable")?;
        let cmd = ProcessBuilder::new(loader)
            .arg(usr.join(MAIN_SCRIPT))
            .args(&self.args)
            .env(TMPDIR_ENV, &scratch)
            .env_remove(self.config.path_var());
        Ok(Some(cmd))
    }

    /// Extract a non-zip-safe archive and relaunch from the extracted tree.
    ///
    /// Does not return when a relaunch happens.
    pub fn unpack_zapp(&mut self) -> Result<()> {
        if let Some(cmd) = self.prepare_unpack_zapp()? {
            match cmd.exec_replace()? {}
        }
        Ok(())
    }
}

/// `ZAPP_TMPDIR` from the environment, if set and non-empty.
fn inherited_scratch_dir() -> Option<PathBuf> {
    env::var_os(TMPDIR_ENV)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// A new, process-unique directory under the system temp dir; not removed.
fn fresh_temp_dir() -> Result<PathBuf> {
    let dir = tempfile::Builder::new()
        .prefix("zapp-")
        .tempdir()
        .context("failed to create temp directory")?;
    Ok(dir.into_path())
}

/// Whether `dir` exists (or can be created) and accepts new files.
fn is_writable_dir(dir: &Path) -> bool {
    fs::create_dir_all(dir).is_ok() && tempfile::tempfile_in(dir).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::{compile, CompileOptions};
    use crate::runtime::registry::{INSTALL_DEPS, UNPACK_DEPS};
    use crate::test_support::{ManifestFixture, UnpackedWheelFixture};
    use crate::wheel::cache::WHEELS_DIR;
    use tempfile::TempDir;

    fn config() -> RuntimeConfig {
        RuntimeConfig {
            path_var: Some("ZAPP_TEST_UNSET_PATH".into()),
            ..Default::default()
        }
    }

    /// Compile a fixture with a wheel, caching into a directory that the
    /// runtime will not see.
    fn build_app(tmp: &TempDir, zip_safe: bool) -> PathBuf {
        let wheel = UnpackedWheelFixture::foo(tmp.path());
        let mut fixture = ManifestFixture::simple(tmp.path());
        fixture.manifest.zip_safe = zip_safe;
        fixture
            .manifest
            .sources
            .extend(wheel.sources("site-packages"));
        let opts = CompileOptions {
            output: tmp.path().join("app.zapp"),
            use_wheels: true,
            cache_dir: Some(tmp.path().join("build-cache")),
            ..Default::default()
        };
        compile(fixture.manifest, &opts).unwrap().output
    }

    fn runtime_with_cache(app: &Path, cache: &Path) -> Runtime {
        let rt = Runtime::new(app, vec!["--flag".into()], config()).unwrap();
        rt.cache_root.set(cache.to_path_buf()).unwrap();
        rt
    }

    #[test]
    fn test_manifest_is_read_from_archive() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, true);

        let rt = Runtime::new(&app, Vec::new(), config()).unwrap();

        assert!(rt.is_zip());
        let manifest = rt.manifest().unwrap();
        assert_eq!(manifest.entry_point, "pkg.mod");
        assert_eq!(manifest.prelude_points, [UNPACK_DEPS, INSTALL_DEPS]);
        assert_eq!(rt.search_path().iter().next().unwrap(), rt.root());
    }

    #[test]
    fn test_non_archive_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("script.py");
        fs::write(&path, "").unwrap();
        assert!(Runtime::new(&path, Vec::new(), config()).is_err());
    }

    #[test]
    fn test_unpack_and_install_deps() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, true);
        let cache = tmp.path().join("run-cache");
        let mut rt = runtime_with_cache(&app, &cache);

        rt.unpack_deps().unwrap();
        let cached = cache.join(WHEELS_DIR).join("Foo-1.0-py3-none-any.whl");
        assert!(cached.is_file());
        assert_eq!(
            fs::read(&cached).unwrap(),
            fs::read(tmp.path().join("build-cache/wheels/Foo-1.0-py3-none-any.whl")).unwrap()
        );

        rt.install_deps().unwrap();
        let first = rt.search_path().iter().next().unwrap();
        assert_eq!(first, cached.canonicalize().unwrap());
        assert_eq!(rt.search_path().len(), 2);

        // Installing again moves rather than duplicates
        rt.install_deps().unwrap();
        assert_eq!(rt.search_path().len(), 2);
    }

    #[test]
    fn test_install_deps_follows_wheel_order() {
        let tmp = TempDir::new().unwrap();
        let foo = UnpackedWheelFixture::foo(tmp.path());
        let bar = UnpackedWheelFixture::bar(&tmp.path().join("bar-site"));
        let mut fixture = ManifestFixture::simple(tmp.path());
        fixture.manifest.sources.extend(foo.sources("site-packages"));
        fixture.manifest.sources.extend(bar.sources("site-packages"));
        let opts = CompileOptions {
            output: tmp.path().join("app.zapp"),
            use_wheels: true,
            cache_dir: Some(tmp.path().join("build-cache")),
            ..Default::default()
        };
        let app = compile(fixture.manifest, &opts).unwrap().output;
        let cache = tmp.path().join("run-cache");
        let mut rt = runtime_with_cache(&app, &cache);

        rt.unpack_deps().unwrap();
        rt.install_deps().unwrap();

        // Wheels are visited in key order, each moved to the front
        let wheels = cache.join(WHEELS_DIR).canonicalize().unwrap();
        let path: Vec<_> = rt.search_path().iter().map(Path::to_path_buf).collect();
        assert_eq!(
            path,
            [
                wheels.join("Foo-1.0-py3-none-any.whl"),
                wheels.join("Bar-2.0-py3-none-any.whl"),
                rt.root().to_path_buf(),
            ]
        );
    }

    #[test]
    fn test_unpack_deps_keeps_existing_entry() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, true);
        let cache = tmp.path().join("run-cache");
        let cached = cache.join(WHEELS_DIR).join("Foo-1.0-py3-none-any.whl");
        fs::create_dir_all(cached.parent().unwrap()).unwrap();
        fs::write(&cached, b"already here").unwrap();
        let mut rt = runtime_with_cache(&app, &cache);

        rt.unpack_deps().unwrap();

        assert_eq!(fs::read(&cached).unwrap(), b"already here");
    }

    #[test]
    fn test_unpack_zapp_is_noop_when_zip_safe() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, true);
        let rt = Runtime::new(&app, Vec::new(), config()).unwrap();

        assert!(rt.prepare_unpack_zapp().unwrap().is_none());
        assert!(rt.scratch_dir_if_set().is_none());
    }

    /// Directory the relaunch command runs `__main__.py` from.
    fn extracted_tree(cmd: &ProcessBuilder) -> PathBuf {
        let main = PathBuf::from(&cmd.get_args()[0]);
        main.parent().unwrap().to_path_buf()
    }

    #[test]
    fn test_unpack_zapp_extracts_and_relaunches() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, false);
        let rt = Runtime::new(&app, vec!["--flag".into()], config()).unwrap();
        let scratch = tmp.path().join("scratch");
        rt.scratch_dir.set(scratch.clone()).unwrap();

        let cmd = rt.prepare_unpack_zapp().unwrap().unwrap();

        let usr = extracted_tree(&cmd);
        assert_eq!(usr.file_name().unwrap(), "usr");
        assert_eq!(
            fs::read_to_string(usr.join("pkg/mod.py")).unwrap(),
            "print('hello')\n"
        );
        assert!(usr.join("pkg/__init__.py").is_file());
        assert!(usr.join("zapp/manifest.json").is_file());
        assert!(!usr.join(".deps").exists());

        assert_eq!(
            cmd.get_args(),
            [usr.join("__main__.py").into_os_string(), "--flag".into()]
        );
        assert_eq!(cmd.get_env(TMPDIR_ENV), Some(scratch.as_os_str()));
        assert!(cmd.is_env_removed("ZAPP_TEST_UNSET_PATH"));

        // The relaunched loader runs from the extracted tree
        let child = Runtime::new(&usr.join("__main__.py"), Vec::new(), config()).unwrap();
        assert!(!child.is_zip());
        assert_eq!(child.root(), usr.canonicalize().unwrap());
        assert!(!child.manifest().unwrap().zip_safe);
        assert!(child.prepare_unpack_zapp().unwrap().is_none());

        fs::remove_dir_all(usr.parent().unwrap()).unwrap();
    }

    #[test]
    fn test_unpack_zapp_never_reuses_scratch_tree() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, false);
        let rt = Runtime::new(&app, Vec::new(), config()).unwrap();
        let scratch = tmp.path().join("parent-scratch");
        let live = scratch.join("usr/other_app/live.py");
        fs::create_dir_all(live.parent().unwrap()).unwrap();
        fs::write(&live, "LIVE = True\n").unwrap();
        rt.scratch_dir.set(scratch.clone()).unwrap();

        let first = extracted_tree(&rt.prepare_unpack_zapp().unwrap().unwrap());
        let second = extracted_tree(&rt.prepare_unpack_zapp().unwrap().unwrap());

        assert!(!first.starts_with(&scratch));
        assert_ne!(first, second);
        assert!(!first.join("other_app").exists());
        assert_eq!(fs::read_to_string(&live).unwrap(), "LIVE = True\n");
        assert!(!scratch.join("usr/pkg").exists());

        for usr in [first, second] {
            fs::remove_dir_all(usr.parent().unwrap()).unwrap();
        }
    }

    #[test]
    fn test_unpack_zapp_uses_extraction_dir_as_scratch() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, false);
        let rt = Runtime::new(&app, Vec::new(), config()).unwrap();

        let cmd = rt.prepare_unpack_zapp().unwrap().unwrap();

        let root = extracted_tree(&cmd).parent().unwrap().to_path_buf();
        if std::env::var_os(TMPDIR_ENV).is_none() {
            assert_eq!(rt.scratch_dir_if_set(), Some(root.as_path()));
            assert_eq!(cmd.get_env(TMPDIR_ENV), Some(root.as_os_str()));
        }
        fs::remove_dir_all(root).unwrap();
    }

    #[test]
    fn test_canonicalize_path() {
        let tmp = TempDir::new().unwrap();
        let app = build_app(&tmp, true);
        let mut rt = Runtime::new(&app, Vec::new(), config()).unwrap();
        rt.search_path_mut().push_back(tmp.path().join("."));
        rt.search_path_mut().push_back(tmp.path().to_path_buf());

        rt.canonicalize_path();

        assert_eq!(rt.search_path().len(), 2);
    }

    #[test]
    fn test_is_writable_dir() {
        let tmp = TempDir::new().unwrap();
        assert!(is_writable_dir(&tmp.path().join("new")));

        let blocker = tmp.path().join("file");
        fs::write(&blocker, b"").unwrap();
        assert!(!is_writable_dir(&blocker.join("sub")));
    }
}
