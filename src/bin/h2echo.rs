use std::path::PathBuf;

use clap::Parser;
use dotenv::dotenv;
use tokio::runtime;

use h2echo::{setup_tracing, AppResult, Server, ServerConfig, GLOBAL_CONFIG};

#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// path to config file
    #[arg(short, long)]
    pub conf: Option<String>,
    /// log level (v: debug, vv: trace), overridden by RUST_LOG
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn main() -> AppResult<()> {
    dotenv().ok();

    let commandline: CommandLine = CommandLine::parse();
    let default_directive = match commandline.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    // startup tokio runtime
    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;

    let _log_guard = setup_tracing(default_directive);

    //setup config
    let config_path = commandline
        .conf
        .as_ref()
        .map_or_else(|| PathBuf::from("conf.toml"), PathBuf::from);
    let server_config = ServerConfig::set_up_config(config_path)?;
    GLOBAL_CONFIG
        .set(server_config)
        .expect("set server config failed");

    rt.block_on(Server::start())
}
