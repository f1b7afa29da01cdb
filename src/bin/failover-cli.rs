use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "failover-cli")]
#[command(about = "Management CLI for the local failover proxy", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:15722")]
    url: String,

    #[arg(short, long, env = "FAILOVER_ADMIN_KEY", default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show proxy status and request statistics
    Status,
    /// Start the proxy server
    Start,
    /// Stop the proxy server and restore every takeover
    Stop,
    /// Show takeover flags and their health
    Takeover,
    /// Enable or disable takeover for an app
    SetTakeover {
        app: String,
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },
    /// Pin an app to one provider
    Switch { app: String, provider: String },
    /// Show an app's failover queue
    Queue { app: String },
    /// Append a provider to an app's failover queue
    Add { app: String, provider: String },
    /// Remove a provider from an app's failover queue
    Remove { app: String, provider: String },
    /// Replace an app's queue order
    Reorder { app: String, providers: Vec<String> },
    /// Turn automatic failover on or off
    AutoFailover { app: String, enabled: Option<bool> },
    /// Show a provider's health
    Health { app: String, provider: String },
    /// Reset a provider's circuit breaker
    Reset { app: String, provider: String },
    /// Show an app's proxy tunables, or replace them with `--set <json>`
    Config {
        app: String,
        #[arg(long)]
        set: Option<String>,
    },
    /// Show the global circuit breaker config, or replace it with `--set <json>`
    Breaker {
        #[arg(long)]
        set: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string(), None),
        Commands::Start => (Method::POST, "/admin/proxy/start".to_string(), None),
        Commands::Stop => (Method::POST, "/admin/proxy/stop".to_string(), None),
        Commands::Takeover => (Method::GET, "/admin/takeover/health".to_string(), None),
        Commands::SetTakeover { app, enabled } => (
            Method::PUT,
            format!("/admin/takeover/{app}"),
            Some(json!({ "enabled": enabled })),
        ),
        Commands::Switch { app, provider } => (
            Method::PUT,
            format!("/admin/apps/{app}/provider"),
            Some(json!({ "providerId": provider })),
        ),
        Commands::Queue { app } => (Method::GET, format!("/admin/apps/{app}/queue"), None),
        Commands::Add { app, provider } => (
            Method::POST,
            format!("/admin/apps/{app}/queue"),
            Some(json!({ "providerId": provider })),
        ),
        Commands::Remove { app, provider } => (
            Method::DELETE,
            format!("/admin/apps/{app}/queue/{provider}"),
            None,
        ),
        Commands::Reorder { app, providers } => (
            Method::PUT,
            format!("/admin/apps/{app}/queue"),
            Some(json!({ "providerIds": providers })),
        ),
        Commands::AutoFailover { app, enabled: None } => {
            (Method::GET, format!("/admin/apps/{app}/auto-failover"), None)
        }
        Commands::AutoFailover {
            app,
            enabled: Some(enabled),
        } => (
            Method::PUT,
            format!("/admin/apps/{app}/auto-failover"),
            Some(json!({ "enabled": enabled })),
        ),
        Commands::Health { app, provider } => (
            Method::GET,
            format!("/admin/apps/{app}/providers/{provider}/health"),
            None,
        ),
        Commands::Reset { app, provider } => (
            Method::POST,
            format!("/admin/apps/{app}/providers/{provider}/reset"),
            None,
        ),
        Commands::Config { app, set: None } => (Method::GET, format!("/admin/apps/{app}/config"), None),
        Commands::Config { app, set: Some(raw) } => (
            Method::PUT,
            format!("/admin/apps/{app}/config"),
            Some(serde_json::from_str(&raw)?),
        ),
        Commands::Breaker { set: None } => (Method::GET, "/admin/circuit-breaker".to_string(), None),
        Commands::Breaker { set: Some(raw) } => (
            Method::PUT,
            "/admin/circuit-breaker".to_string(),
            Some(serde_json::from_str(&raw)?),
        ),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }
    print_response(request.send().await?).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if !text.is_empty() {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    if text.is_empty() {
        println!("OK");
        return Ok(());
    }

    let json: Value = serde_json::from_str(&text)?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
