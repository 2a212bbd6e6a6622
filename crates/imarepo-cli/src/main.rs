use std::{num::NonZeroUsize, thread};

use clap::Parser;
use cli::Args;
use imarepo_core::{
    finalize::finalize_document, metadata::write_imadata, repomd::register_artifact,
    scanner::scan_repository, ImaResult,
};
use logging::setup_logging;
use tracing::info;

mod cli;
mod logging;

fn default_jobs() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

fn handle_cli() -> ImaResult<()> {
    let args = Args::parse();

    setup_logging(&args);

    let jobs = args.jobs.unwrap_or_else(default_jobs);
    let records = scan_repository(&args.repository, jobs)?;
    info!("Analyzed {} packages", records.len());

    let doc_path = write_imadata(&args.repository, &records)?;
    info!("Wrote {}", doc_path.display());

    if args.modify {
        let artifact = finalize_document(&doc_path)?;
        register_artifact(&args.repository, &artifact)?;
        info!("Registered {} in repomd.xml", artifact.path.display());
    }

    Ok(())
}

fn main() {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(2)
                .build(),
        )
    }))
    .ok();

    if let Err(err) = handle_cli() {
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(1);
    }
}
