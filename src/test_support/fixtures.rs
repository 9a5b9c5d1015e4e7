//! Test fixtures for common test scenarios.
//!
//! Fixtures write real files under a caller-owned temp directory and hand
//! back the manifest fragments that point at them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{Manifest, SourceRef};

/// An unpacked wheel tree on disk.
#[derive(Debug, Clone)]
pub struct UnpackedWheelFixture {
    /// Directory holding the package and its `.dist-info`
    pub root: PathBuf,
    /// Member paths relative to `root`, in RECORD order
    pub files: Vec<String>,
}

impl UnpackedWheelFixture {
    /// Write a wheel tree under its own root in `base`.
    pub fn new(
        base: &Path,
        dist_info: &str,
        metadata: &str,
        wheel: &str,
        package: &[(&str, &str)],
    ) -> Self {
        Self::at(&base.join("unpacked").join(dist_info), dist_info, metadata, wheel, package)
    }

    /// Write a wheel tree directly into `root`, which other wheels may share.
    pub fn at(
        root: &Path,
        dist_info: &str,
        metadata: &str,
        wheel: &str,
        package: &[(&str, &str)],
    ) -> Self {
        let root = root.to_path_buf();
        let mut files = Vec::new();

        for (name, content) in package {
            write(&root.join(name), content);
            files.push(name.to_string());
        }
        for (doc, content) in [("METADATA", metadata), ("WHEEL", wheel)] {
            let name = format!("{}/{}", dist_info, doc);
            write(&root.join(&name), content);
            files.push(name);
        }

        let record_name = format!("{}/RECORD", dist_info);
        files.push(record_name.clone());
        let record: String = files
            .iter()
            .map(|f| format!("{},,\n", f))
            .collect();
        write(&root.join(&record_name), &record);

        UnpackedWheelFixture { root, files }
    }

    /// A small pure wheel: `Foo 1.0`, tagged `py3-none-any`.
    pub fn foo(base: &Path) -> Self {
        Self::new(
            base,
            "Foo-1.0.dist-info",
            "Metadata-Version: 2.1\nName: Foo\nVersion: 1.0\n",
            "Wheel-Version: 1.0\nRoot-Is-Purelib: true\nTag: py3-none-any\n",
            &[
                ("foo/__init__.py", "VALUE = 1\n"),
                ("foo/util.py", "def helper():\n    return 2\n"),
            ],
        )
    }

    /// A second pure wheel, `Bar 2.0`, installed into an existing `root`.
    pub fn bar(root: &Path) -> Self {
        Self::at(
            root,
            "Bar-2.0.dist-info",
            "Metadata-Version: 2.1\nName: Bar\nVersion: 2.0\n",
            "Wheel-Version: 1.0\nRoot-Is-Purelib: true\nTag: py3-none-any\n",
            &[("bar/__init__.py", "VALUE = 2\n")],
        )
    }

    /// Manifest sources for this tree, placed under `dest_prefix`.
    pub fn sources(&self, dest_prefix: &str) -> BTreeMap<String, Option<SourceRef>> {
        self.files
            .iter()
            .map(|f| {
                (
                    format!("{}/{}", dest_prefix, f),
                    Some(SourceRef::new(self.root.join(f))),
                )
            })
            .collect()
    }
}

/// A manifest whose sources exist under a temp directory.
#[derive(Debug, Clone)]
pub struct ManifestFixture {
    pub base: PathBuf,
    pub manifest: Manifest,
}

impl ManifestFixture {
    /// `pkg/__init__.py` (placeholder) plus `pkg/mod.py`, entry `pkg.mod`.
    pub fn simple(base: &Path) -> Self {
        let module = base.join("src/mod.py");
        write(&module, "print('hello')\n");

        let mut sources = BTreeMap::new();
        sources.insert("pkg/__init__.py".to_string(), None);
        sources.insert("pkg/mod.py".to_string(), Some(SourceRef::new(&module)));

        ManifestFixture {
            base: base.to_path_buf(),
            manifest: Manifest {
                sources,
                wheels: BTreeMap::new(),
                requirements: BTreeMap::new(),
                prelude_points: Vec::new(),
                entry_point: "pkg.mod".to_string(),
                shebang: "/usr/bin/env python3".to_string(),
                zip_safe: true,
            },
        }
    }

    /// Add a source file with the given content.
    pub fn with_source(mut self, dest: &str, content: &str) -> Self {
        let path = self.base.join("src").join(dest);
        write(&path, content);
        self.manifest
            .sources
            .insert(dest.to_string(), Some(SourceRef::new(path)));
        self
    }

    /// Write the manifest JSON next to the sources.
    pub fn write(&self) -> PathBuf {
        let path = self.base.join("manifest.json");
        fs::write(&path, self.manifest.to_json_pretty().unwrap()).unwrap();
        path
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
