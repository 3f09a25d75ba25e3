use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    /// One human readable line per event
    #[default]
    Text,

    /// One JSON object per event
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a project and launch the ROM in the configured emulator
    Build {
        /// Project file
        project: PathBuf,

        /// Remove the build folder before building
        #[arg(long)]
        clean: bool,

        /// Build configuration id (defaults to the saved preference)
        #[arg(long, value_name = "id")]
        config: Option<String>,

        /// Directory holding the bundled templates
        #[arg(long, value_name = "dir")]
        resources: Option<PathBuf>,

        /// How progress events are printed
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },

    /// Remove the build folder of a project
    Clean {
        /// Project file
        project: PathBuf,
    },

    /// Print where the ROM of a project is written
    RomPath {
        /// Project file
        project: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(name = "neobuild")]
#[command(about = "Builds handheld console game projects")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

pub fn parse() -> Args {
    Args::parse()
}
