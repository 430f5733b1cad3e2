use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Serialize;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "audit-cli")]
#[command(about = "Inspect and prune traffic captured by the honeypot proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer key for the audit routes, when the proxy requires one.
    #[arg(short, long)]
    key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List captured requests with their responses
    List(ListArgs),
    /// Delete a captured request and its response
    Delete { id: i64 },
    /// Check proxy and store health
    Health,
}

#[derive(Args, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListArgs {
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<u32>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    page_size: Option<u32>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<String>,
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    /// RFC 3339 lower bound on arrival time
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    date_from: Option<String>,
    /// RFC 3339 upper bound on arrival time
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    date_to: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();
    let base = cli.url.trim_end_matches('/');

    let mut headers = HeaderMap::new();
    if let Some(key) = &cli.key {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))?,
        );
    }

    match cli.command {
        Commands::List(args) => {
            let res = client
                .get(format!("{}/audit/requests", base))
                .headers(headers)
                .query(&args)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Delete { id } => {
            let res = client
                .delete(format!("{}/audit/requests/{}", base, id))
                .headers(headers)
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Health => {
            let res = client.get(format!("{}/health", base)).send().await?;
            print_response(res).await?;
        }
    }

    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;

    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    if !status.is_success() {
        eprintln!("Error: proxy returned status {}", status);
    }
    Ok(())
}
