//! Entry point: parse arguments, set up logging, drop capabilities, and
//! hand off to [`daemon::run`].

mod adapters;
mod callbacks;
mod cli;
mod daemon;
mod direct_mount;
mod logging;
mod privilege;
mod signals;

use clap::Parser;

fn main() -> std::process::ExitCode {
    let args = cli::Args::parse();
    logging::init(args.verbose);
    privilege::drop_unneeded_capabilities();

    match daemon::run(args) {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(%err, "automountd exited with error");
            std::process::ExitCode::FAILURE
        }
    }
}
