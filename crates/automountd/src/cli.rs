//! Command-line surface (spec §1 "CLI parsing... the core only reads the
//! parsed result"). Mirrors `liboci-cli`'s derive-based style, scaled down
//! to this daemon's single entry point instead of a subcommand enum.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Control-plane daemon for autofs-style automount points", long_about = None)]
pub struct Args {
    /// Master map to read at startup and on SIGHUP.
    #[arg(short, long, default_value = "/etc/auto.master")]
    pub master: String,

    /// Repeat for more verbose logging (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to the nsswitch configuration, overriding DaemonConfig's
    /// default (test/debugging seam, spec.md §4.I supplement).
    #[arg(long)]
    pub nsswitch_path: Option<String>,
}
