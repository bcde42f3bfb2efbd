//! OCR Inference Endpoint
//!
//! An HTTP wrapper around a pre-trained OCR engine, plus client tools for
//! invoking and benchmarking a running endpoint.
//!
//! # Usage
//!
//! ## Server
//! ```bash
//! ocr-endpoint serve --det-model models/det.onnx --rec-model models/rec.onnx --dict-path models/dict.txt --port 8080
//! ```
//!
//! ## Client
//! ```bash
//! ocr-endpoint invoke --endpoint http://localhost:8080 --file image.jpg
//! ocr-endpoint bench --endpoint http://localhost:8080 --file image.jpg --iterations 3
//! ```

mod api;
mod client;
mod config;
mod engine;
mod error;
mod payload;
mod server;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use config::{EngineConfig, Limits, ServerConfig};

#[derive(Parser)]
#[command(name = "ocr-endpoint")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "OCR inference over HTTP", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the inference server
    Serve {
        /// Path to the text detection model
        #[arg(long = "det-model", env = "OCR_DET_MODEL")]
        det_model: PathBuf,

        /// Path to the text recognition model
        #[arg(long = "rec-model", env = "OCR_REC_MODEL")]
        rec_model: PathBuf,

        /// Path to the character dictionary
        #[arg(long = "dict-path", env = "OCR_DICT_PATH")]
        dict_path: PathBuf,

        /// Device to use (cpu, cuda, cuda:0, etc.)
        #[arg(long, default_value = "cpu", env = "OCR_DEVICE")]
        device: String,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0", env = "OCR_HOST")]
        host: String,

        /// Port to listen on
        #[arg(long, short, default_value = "8080", env = "OCR_PORT")]
        port: u16,

        /// Maximum accepted image payload in bytes
        #[arg(long, default_value_t = config::DEFAULT_MAX_PAYLOAD_BYTES, env = "OCR_MAX_PAYLOAD_BYTES")]
        max_payload_bytes: usize,

        /// Maximum accepted image dimension per axis in pixels
        #[arg(long, default_value_t = config::DEFAULT_MAX_DIMENSION, env = "OCR_MAX_DIMENSION")]
        max_dimension: u32,
    },
    /// Post a single image to a running endpoint
    Invoke {
        /// Base URL of the endpoint
        #[arg(long, default_value = "http://127.0.0.1:8080", env = "OCR_ENDPOINT")]
        endpoint: String,

        /// Image file to post
        #[arg(long)]
        file: PathBuf,

        /// Post raw bytes instead of base64 JSON
        #[arg(long)]
        raw: bool,

        /// Output format (json, text, pretty)
        #[arg(long, default_value = "pretty")]
        output: String,
    },
    /// Benchmark a running endpoint
    Bench {
        /// Base URL of the endpoint
        #[arg(long, default_value = "http://127.0.0.1:8080", env = "OCR_ENDPOINT")]
        endpoint: String,

        /// Image file to post
        #[arg(long)]
        file: PathBuf,

        /// Post raw bytes instead of base64 JSON
        #[arg(long)]
        raw: bool,

        /// Number of invocations
        #[arg(long, default_value_t = 3)]
        iterations: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            det_model,
            rec_model,
            dict_path,
            device,
            host,
            port,
            max_payload_bytes,
            max_dimension,
        } => {
            let config = ServerConfig {
                engine: EngineConfig {
                    det_model,
                    rec_model,
                    dict_path,
                    device,
                },
                host,
                port,
                limits: Limits {
                    max_payload_bytes,
                    max_dimension,
                },
            };

            info!("Starting server on {}:{}", config.host, config.port);
            server::run_server(config).await?;
        }
        Commands::Invoke {
            endpoint,
            file,
            raw,
            output,
        } => {
            client::invoke(&client::InvokeOptions {
                endpoint: &endpoint,
                file: &file,
                raw,
                output: &output,
            })
            .await?;
        }
        Commands::Bench {
            endpoint,
            file,
            raw,
            iterations,
        } => {
            client::bench(&client::BenchOptions {
                endpoint: &endpoint,
                file: &file,
                raw,
                iterations,
            })
            .await?;
        }
    }

    Ok(())
}

/// Initializes the tracing subscriber for logging.
fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();
}
