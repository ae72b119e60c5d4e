//! Command-line interface

pub mod commands;

use clap::Parser;
use std::path::PathBuf;

/// Provision the life-logging schemas into a Notion-compatible workspace
#[derive(Parser, Debug)]
#[command(
    name = "lifelog-provision",
    version,
    about = "Create the life-logging databases under a parent page",
    after_help = "Missing values are read from LIFELOG_NOTION_KEY and LIFELOG_PARENT_ID \
                  (a .env file is honored) or prompted for.\n\
                  Re-running after a failure resumes from the manifest."
)]
pub struct Cli {
    /// Integration key
    pub api_key: Option<String>,

    /// Id of the page the databases are created under
    pub parent_id: Option<String>,

    /// Manifest file used to resume interrupted runs
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Config file (TOML)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the store's API base URL
    #[arg(long)]
    pub base_url: Option<String>,

    /// Print the computed plan and exit without calling the store
    #[arg(long)]
    pub plan: bool,

    /// Print the full run report as JSON instead of the id map
    #[arg(long)]
    pub report: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
