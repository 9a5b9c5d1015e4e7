//! `zapp compile` command

use anyhow::Result;

use crate::cli::CompileArgs;
use zapp::ops::zapp_compile::{compile_file, CompileOptions};
use zapp::util::GlobalContext;

pub fn execute(args: CompileArgs, verbose: bool) -> Result<()> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(verbose);
    let config = &ctx.config().build;

    // Flags turn features on; config can only supply defaults
    let opts = CompileOptions {
        output: args.output,
        use_wheels: args.use_wheels || config.use_wheels,
        call_entry_functions: args.call_entry_functions || config.call_entry_functions,
        cache_dir: ctx.cache_dir(),
    };

    let result = compile_file(&args.manifest, &opts)?;

    if args.debug {
        eprintln!("{}", result.manifest.to_json_pretty()?);
    }
    if ctx.is_verbose() {
        eprintln!("    Finished {}", result.output.display());
    }

    Ok(())
}
