use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Admin CLI for the news gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080", env = "GATEWAY_URL")]
    url: String,

    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Uptime, cache backend and breaker overview
    Status,
    /// Show all breakers, or one by name
    Breakers { name: Option<String> },
    /// Force a breaker open until reset
    Open { name: String },
    /// Close a breaker and clear its statistics
    Close { name: String },
    /// Reset a breaker (same effect as close)
    Reset { name: String },
    /// Per-route in-flight counts and rejections
    Bulkheads,
    /// Purge cache entries by tag or key pattern
    Purge {
        #[arg(long, conflicts_with = "pattern", required_unless_present = "pattern")]
        tag: Option<String>,
        #[arg(long)]
        pattern: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );
    let client = reqwest::Client::builder().default_headers(headers).build()?;
    let base = cli.url.trim_end_matches('/');

    let request = match cli.command {
        Commands::Status => client.get(format!("{base}/admin/status")),
        Commands::Breakers { name: None } => client.get(format!("{base}/admin/breakers")),
        Commands::Breakers { name: Some(name) } => client.get(format!("{base}/admin/breakers/{name}")),
        Commands::Open { name } => client.post(format!("{base}/admin/breakers/{name}/open")),
        Commands::Close { name } => client.post(format!("{base}/admin/breakers/{name}/close")),
        Commands::Reset { name } => client.post(format!("{base}/admin/breakers/{name}/reset")),
        Commands::Bulkheads => client.get(format!("{base}/admin/bulkheads")),
        Commands::Purge { tag, pattern } => client
            .post(format!("{base}/admin/cache/purge"))
            .json(&json!({ "tag": tag, "pattern": pattern })),
    };

    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let pretty = serde_json::from_str::<Value>(&text)
        .ok()
        .and_then(|v| serde_json::to_string_pretty(&v).ok())
        .unwrap_or(text);

    if status.is_success() {
        println!("{pretty}");
        Ok(())
    } else {
        eprintln!("Error: admin API returned {status}");
        eprintln!("{pretty}");
        std::process::exit(1);
    }
}
