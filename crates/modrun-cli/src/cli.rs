use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "modrun",
    about = "Atomic task runner: versioned modules, tracked assets, dependency-sequenced execution",
    version
)]
pub struct Cli {
    /// Path to the service configuration file. Defaults to ./modrun.yml when present.
    #[arg(long, env = "MODRUN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP API and the execution workers.
    Serve,

    /// Discover, install, and self-test modules under the modules root.
    Scan,

    /// List registered modules and their lifecycle state.
    Modules,

    /// List tracked assets.
    Assets,

    /// Ingest a file into managed storage as an AVAILABLE asset.
    Ingest {
        /// Source file to copy in.
        path: PathBuf,

        /// Human label. Defaults to the file name.
        #[arg(long)]
        label: Option<String>,

        /// Media type of the file.
        #[arg(long, default_value = "application/octet-stream")]
        media_type: String,
    },

    /// Create an inline VALUE asset.
    Value {
        /// Human label.
        label: String,

        /// Content. Parsed as JSON; anything that does not parse is stored
        /// as a plain string.
        value: String,

        #[arg(long, default_value = "application/json")]
        media_type: String,
    },

    /// Submit a task binding asset ids to a module's declared inputs.
    Submit {
        /// Target module id.
        module_id: String,

        /// Input binding as key=asset-id. Repeatable.
        #[arg(long = "input", value_parser = parse_key_val)]
        inputs: Vec<(String, String)>,

        /// Per-invocation options as a JSON object (e.g. '{"timeout": 60}').
        #[arg(long)]
        config: Option<String>,
    },

    /// Show one task record.
    Task {
        id: String,
    },
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() && !value.is_empty() => {
            Ok((key.to_string(), value.to_string()))
        }
        _ => Err(format!("expected key=asset-id, got '{}'", raw)),
    }
}
