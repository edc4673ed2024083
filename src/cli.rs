use clap::{Parser, Subcommand};

/// Inkwell — multi-tenant blogging backend
#[derive(Parser)]
#[command(name = "inkwell", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the API server (also runs an in-process job worker)
    Serve {
        /// Port to bind; overrides INKWELL_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a standalone background job worker
    Worker,
}
