use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "tripwire-cli")]
#[command(about = "Management CLI for the tripwire circuit breaker gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "TRIPWIRE_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check gateway status and circuit counts
    Status,
    /// List every circuit with its state and counters
    Circuits,
    /// Inspect a single circuit
    Circuit { key: String },
    /// Force a circuit back to closed
    Reset { key: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let request = match &cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Circuits => client.get(format!("{base}/admin/circuits")),
        Commands::Circuit { key } => client.get(format!("{base}/admin/circuits/{}", encode(key)?)),
        Commands::Reset { key } => {
            client.post(format!("{base}/admin/circuits/{}/reset", encode(key)?))
        }
    };

    let res = request.headers(headers).send().await?;
    print_response(res).await
}

/// Percent-encode a circuit key for use as a path segment.
fn encode(key: &str) -> Result<String, Box<dyn std::error::Error>> {
    let mut url = url::Url::parse("http://localhost/")?;
    url.path_segments_mut()
        .map_err(|_| "URL cannot carry path segments")?
        .push(key);
    Ok(url.path().trim_start_matches('/').to_string())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            if !text.is_empty() {
                eprintln!("Response: {}", text);
            }
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
