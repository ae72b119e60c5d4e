mod api;
mod catalog;
mod cli;
mod config;
mod provision;

use clap::Parser;
use colored::*;

use cli::Cli;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init();
}

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let code = match cli::commands::provision::handle_provision_command(cli).await {
        Ok(true) => 0,
        Ok(false) => 1,
        Err(err) => {
            log::error!("{:#}", err);
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            1
        }
    };
    std::process::exit(code);
}
