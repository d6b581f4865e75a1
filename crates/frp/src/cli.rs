use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "frp")]
#[command(about = "Fault report pipeline operator tool")]
#[command(version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Submit a fault through the configured pipeline and wait for it to finish
    Report {
        /// Fault kind, e.g. CommandError
        kind: String,

        /// Fault message
        #[arg(trailing_var_arg = true)]
        message: Vec<String>,
    },

    /// Print the plaintext of an archived payload
    Decode {
        /// File holding the payload as downloaded from the paste host
        path: PathBuf,
    },

    /// Write a new AES-256-GCM keyset
    Keygen {
        /// Destination; an existing file is never overwritten
        path: PathBuf,
    },
}
