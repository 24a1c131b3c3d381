use bytes::Bytes;
use clap::Parser;
use dotenv::dotenv;
use tokio::runtime;

use h2echo::{setup_local_tracing, AppResult, EchoClient, EchoRequest};

/// Plays one echo exchange against an h2echo server: preface, SETTINGS,
/// HEADERS and DATA on stream 1, then prints the response.
#[derive(Parser)]
#[command(version)]
pub struct CommandLine {
    /// server host
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    /// server port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
    /// request path
    #[arg(long, default_value = "/")]
    pub path: String,
    /// request body the server echoes back
    #[arg(long, default_value = "Hello Serverrrr!")]
    pub body: String,
}

fn main() -> AppResult<()> {
    dotenv().ok();
    setup_local_tracing()?;

    let commandline: CommandLine = CommandLine::parse();

    let rt = runtime::Builder::new_multi_thread().enable_all().build()?;
    rt.block_on(run(commandline))
}

async fn run(commandline: CommandLine) -> AppResult<()> {
    let addr = format!("{}:{}", commandline.host, commandline.port);
    let client = EchoClient::connect(&addr).await?;

    let request = EchoRequest {
        authority: commandline.host,
        path: commandline.path,
        body: Bytes::from(commandline.body),
    };
    let reply = client.fetch(request).await?;

    for field in &reply.headers {
        println!("{}: {}", field.name, field.value);
    }
    println!();
    println!("{}", String::from_utf8_lossy(&reply.body));
    Ok(())
}
