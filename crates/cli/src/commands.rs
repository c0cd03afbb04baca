use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Export a table split by split into the destination, reusing unchanged splits
    Copy {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Copy a table and bring its warehouse table up to date
    Ingest {
        #[command(flatten)]
        run: RunArgs,

        #[arg(long, help = "Load even when the warehouse row count already matches")]
        force_load: bool,
    },
}

#[derive(Args, Clone, Default)]
pub struct RunArgs {
    #[arg(short, long, help = "YAML config file path (CONFIG_FILE takes precedence)")]
    pub config: Option<String>,

    #[arg(long, help = "Load additional variables from a .env file")]
    pub env_file: Option<String>,

    #[arg(long, help = "Source table, overrides DB_TABLE")]
    pub table: Option<String>,

    #[arg(long, help = "Source schema, overrides DB_SCHEMA")]
    pub schema: Option<String>,

    #[arg(
        long,
        allow_hyphen_values = true,
        help = "-1 for a single split, 0 for dynamic sizing, otherwise rows per split"
    )]
    pub split_size: Option<i64>,

    #[arg(long, help = "Root path or gs:// prefix for the exported files")]
    pub destination: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Ranking fields used instead of the primary key")]
    pub key_fields: Vec<String>,

    #[arg(long, value_delimiter = ',', help = "Extra fields added to every split fingerprint")]
    pub extra_fields: Vec<String>,

    #[arg(long, help = "Print the result as JSON instead of the text report")]
    pub json: bool,

    #[arg(long, help = "Also write every ingest event to stderr as a JSON line")]
    pub events: bool,

    #[arg(long, help = "If specified, writes the report to this file instead of stdout")]
    pub output: Option<String>,
}
