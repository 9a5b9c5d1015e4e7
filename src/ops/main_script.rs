//! The entry script placed at the archive root.
//!
//! The interpreter runs `__main__.py` when it is handed the archive. The
//! script validates every reference up front, then runs each prelude and
//! finally the entry point as a main program.

use anyhow::{Context, Result};

use crate::core::EntryRef;

const TEMPLATE: &str = r#"# -*- coding: utf-8 -*-

"""Entry point generated by zapp."""

from importlib import import_module
from runpy import _run_module_as_main

SCRIPTS = @SCRIPTS@
CALL_FUNCTIONS = @CALL_FUNCTIONS@


def _split(script):
    mod, _, fn = script.partition(":")
    if not all(part.isidentifier() for part in mod.split(".")):
        raise RuntimeError("Invalid module reference {!r}".format(mod))
    if fn and not all(part.isidentifier() for part in fn.split(".")):
        raise RuntimeError("Invalid function reference {!r}".format(fn))
    return mod, fn


_PLAN = [_split(script) for script in SCRIPTS]

for mod, fn in _PLAN:
    if fn and CALL_FUNCTIONS:
        target = import_module(mod)
        for attr in fn.split("."):
            target = getattr(target, attr)
        target()
    else:
        _run_module_as_main(mod)
"#;

/// Render the entry script for the given references.
///
/// References are validated here as well, so a bad one fails the build
/// rather than the first run.
pub fn render<'a>(
    scripts: impl IntoIterator<Item = &'a str>,
    call_functions: bool,
) -> Result<String> {
    let scripts: Vec<&str> = scripts.into_iter().collect();
    EntryRef::parse_all(scripts.iter().copied())?;

    // A JSON list of strings is also a valid literal in the script
    let literal = serde_json::to_string(&scripts).context("failed to encode entry references")?;
    let flag = if call_functions { "True" } else { "False" };

    Ok(TEMPLATE
        .replace("@SCRIPTS@", &literal)
        .replace("@CALL_FUNCTIONS@", flag))
}
