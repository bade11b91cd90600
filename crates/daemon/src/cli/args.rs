pub use clap::Parser;

use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "extstore")]
#[command(about = "Extension routed file store: one router, several backend stores")]
pub struct Args {
    /// Path to the extstore config directory (defaults to ~/.extstore)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
