use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use giftpipe::config::{LogFormat, ServeArgs};
use giftpipe::{http, logging};

#[derive(Parser, Debug)]
#[command(name = "giftpipe")]
#[command(about = "Gift-suggestion service", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the gift-suggestion endpoint over HTTP.
    Serve(ServeArgs),
    /// Diagnose configuration (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version information (json).
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "output", alias = "format", default_value = "json")]
    output: String,
}

/// Opt-in env file. Values already present in the process environment win.
fn load_env_file() -> Result<()> {
    let Some(path) = std::env::var("GIFTPIPE_ENV_FILE")
        .ok()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
    else {
        return Ok(());
    };
    dotenvy::from_path(&path).with_context(|| format!("failed to load env file {path}"))?;
    Ok(())
}

fn user_agent() -> String {
    format!("giftpipe/{}", env!("CARGO_PKG_VERSION"))
}

async fn serve(args: ServeArgs) -> Result<()> {
    logging::init_tracing(args.log_format == LogFormat::Json)?;
    let client = reqwest::Client::builder()
        .user_agent(user_agent())
        .build()
        .context("failed to build http client")?;
    let pipeline = args.build_pipeline(client)?;
    let app = http::router(http::AppState::new(pipeline));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    tracing::info!(addr = %listener.local_addr()?, "giftpipe listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn doctor(args: &DoctorCmd) -> Result<()> {
    use giftpipe_local::openai_compat::OpenAiCompatClient;
    use giftpipe_local::search::{RainforestProductSearch, SerpApiProductSearch};
    use giftpipe_local::supabase::SupabaseBackend;

    fn has_env(k: &str) -> bool {
        std::env::var(k).ok().is_some_and(|v| !v.trim().is_empty())
    }

    let t0 = std::time::Instant::now();
    let client = reqwest::Client::new();

    // Presence only; the constructors read the same variables `serve` does.
    let backend = SupabaseBackend::from_env(client.clone()).is_ok();
    let serpapi = SerpApiProductSearch::from_env(client.clone()).is_ok();
    let rainforest = RainforestProductSearch::from_env(client.clone()).is_ok();
    let llm = OpenAiCompatClient::from_env(client, None).is_ok();
    let affiliate_tag = has_env("GIFTPIPE_AFFILIATE_TAG");

    let mut warnings: Vec<&str> = Vec::new();
    if !backend {
        warnings.push(
            "backend not configured: set GIFTPIPE_SUPABASE_URL and GIFTPIPE_SUPABASE_SERVICE_KEY",
        );
    }
    if !serpapi && !rainforest {
        warnings.push("no product search provider: requests will use curated fallback ideas");
    }
    if (serpapi || rainforest) && !llm {
        warnings.push("product search without a language model: verified requests will fail");
    }

    let v = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": backend,
        "name": "giftpipe",
        "version": env!("CARGO_PKG_VERSION"),
        "elapsed_ms": t0.elapsed().as_millis() as u64,
        "configured": {
            "backend": backend,
            "serpapi": serpapi,
            "rainforest": rainforest,
            "language_model": llm,
            "affiliate_tag": affiliate_tag,
        },
        "warnings": warnings,
    });
    match args.output.to_ascii_lowercase().as_str() {
        "text" => {
            println!("giftpipe {} ok={}", env!("CARGO_PKG_VERSION"), backend);
            for w in &warnings {
                println!("warning: {w}");
            }
        }
        _ => println!("{v}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env_file()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await?,
        Commands::Doctor(args) => doctor(&args)?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "giftpipe",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.output.to_ascii_lowercase().as_str() {
                "text" => println!("giftpipe {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(())
}
