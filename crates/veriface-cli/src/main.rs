use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "veriface", about = "veriface face verification CLI")]
struct Cli {
    /// Base URL of a running verifaced instance.
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check daemon health
    Health,
    /// Count faces in an image via the preview path
    Count {
        /// Image file to inspect
        image: PathBuf,
    },
    /// Verify a photo against a reference photo
    Verify {
        /// Live-captured photo
        photo: PathBuf,
        /// Stored reference photo of the claimed identity
        reference: PathBuf,
        /// Override the daemon's configured match threshold
        #[arg(short, long)]
        threshold: Option<f32>,
    },
}

fn encode_file(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    Ok(BASE64.encode(bytes))
}

async fn print_response(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    let body: serde_json::Value = response.json().await.context("parsing response body")?;
    if !status.is_success() {
        tracing::warn!(status = %status, "non-success response");
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Health => {
            let response = client
                .get(format!("{}/api/health", cli.server))
                .send()
                .await
                .context("requesting health")?;
            print_response(response).await?;
        }
        Commands::Count { image } => {
            let body = serde_json::json!({ "frame": encode_file(&image)? });
            let response = client
                .post(format!("{}/api/detect-face-frame", cli.server))
                .json(&body)
                .send()
                .await
                .context("requesting face count")?;
            print_response(response).await?;
        }
        Commands::Verify {
            photo,
            reference,
            threshold,
        } => {
            let mut body = serde_json::json!({
                "photo": encode_file(&photo)?,
                "reference_photo": encode_file(&reference)?,
            });
            if let Some(threshold) = threshold {
                body["threshold"] = serde_json::json!(threshold);
            }
            let response = client
                .post(format!("{}/api/validate-face", cli.server))
                .json(&body)
                .send()
                .await
                .context("requesting verification")?;
            print_response(response).await?;
        }
    }

    Ok(())
}
