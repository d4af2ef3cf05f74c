use clap::Parser;

use lockable_cli::cli::{RootOptions, SubCommand};
use lockable_cli::commands::{allocate, check, labels, load_pool, resolve};
use lockable_cli::output::make_output;
use lockable_cli::setup::setup_logging;

fn main() -> anyhow::Result<()> {
    let opts = RootOptions::parse();
    setup_logging(opts.common.debug);

    let Some(catalog) = opts.common.catalog.as_deref() else {
        anyhow::bail!("No catalog given, use --catalog or LOCKCTL_CATALOG");
    };
    let pool = load_pool(catalog)?;
    let output = make_output(opts.common.output_mode);

    let text = match &opts.subcmd {
        SubCommand::Check => output.print_check(&check(&pool)),
        SubCommand::Labels => output.print_labels(&labels(&pool)),
        SubCommand::Resolve(resolve_opts) => output.print_resolve(&resolve(&pool, resolve_opts)?),
        SubCommand::Allocate(allocate_opts) => {
            output.print_allocate(&allocate(&pool, allocate_opts)?)
        }
    };
    println!("{text}");
    Ok(())
}
