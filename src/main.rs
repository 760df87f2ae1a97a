use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use era::cli;

#[derive(Parser)]
#[command(name = "era")]
#[command(about = "Emergency Relief Assistant - expert protocols with optional AI enrichment", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive emergency assistance session
    Assist {
        /// Base model: HuggingFace model ID or local directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
        model: String,

        /// LoRA adapter directory (optional)
        #[arg(short, long)]
        adapter: Option<String>,

        /// Answer mode: template, hybrid, or model
        #[arg(long, default_value = "hybrid")]
        mode: String,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,

        /// Seconds to wait for the model before falling back to templates
        #[arg(long, default_value = "5")]
        deadline: u64,
    },

    /// Generate one guidance response and exit (requires the model)
    Generate {
        /// Emergency situation to respond to
        prompt: String,

        /// Base model: HuggingFace model ID or local directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
        model: String,

        /// LoRA adapter directory (optional)
        #[arg(short, long)]
        adapter: Option<String>,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,

        /// Maximum new tokens to generate
        #[arg(long, default_value = "300")]
        max_tokens: usize,

        /// Seconds to wait for generation before giving up
        #[arg(long, default_value = "120")]
        deadline: u64,
    },

    /// Run the guidance HTTP API
    Serve {
        /// Host to bind
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Base model: HuggingFace model ID or local directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
        model: String,

        /// LoRA adapter directory (optional)
        #[arg(short, long)]
        adapter: Option<String>,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,

        /// Per-request model deadline in seconds
        #[arg(long, default_value = "45")]
        deadline: u64,

        /// Load the model before accepting requests
        #[arg(long)]
        preload: bool,
    },

    /// Run the browser demo server
    Demo {
        /// Host to bind
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Port to bind
        #[arg(short, long, default_value = "5000")]
        port: u16,

        /// Base model: HuggingFace model ID or local directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
        model: String,

        /// LoRA adapter directory (optional)
        #[arg(short, long)]
        adapter: Option<String>,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,

        /// Per-request model deadline in seconds
        #[arg(long, default_value = "30")]
        deadline: u64,
    },

    /// Fine-tune the LoRA adapter on emergency response data
    Train {
        /// Training config JSON file
        #[arg(short, long, default_value = "config/training.json")]
        config: String,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,
    },

    /// Score the model against the built-in emergency scenarios
    Eval {
        /// Base model: HuggingFace model ID or local directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
        model: String,

        /// LoRA adapter directory (optional)
        #[arg(short, long)]
        adapter: Option<String>,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,

        /// CSV file for per-scenario results (optional)
        #[arg(short, long)]
        output: Option<String>,

        /// Per-scenario model deadline in seconds
        #[arg(long, default_value = "60")]
        deadline: u64,
    },

    /// Validate the training setup without loading model weights
    Doctor {
        /// Training config JSON file
        #[arg(short, long, default_value = "config/training.json")]
        config: String,
    },

    /// Run a staged smoke test of the model stack
    Diagnose {
        /// Base model: HuggingFace model ID or local directory
        #[arg(short, long, default_value = "Qwen/Qwen2.5-0.5B-Instruct")]
        model: String,

        /// LoRA adapter directory (optional)
        #[arg(short, long)]
        adapter: Option<String>,

        /// Device: auto, cpu, cuda, or metal
        #[arg(short, long, default_value = "auto")]
        device: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "era=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Assist {
            model,
            adapter,
            mode,
            device,
            deadline,
        } => {
            cli::assist(model, adapter, mode, device, deadline).await?;
        }

        Commands::Generate {
            prompt,
            model,
            adapter,
            device,
            max_tokens,
            deadline,
        } => {
            cli::generate(prompt, model, adapter, device, max_tokens, deadline).await?;
        }

        Commands::Serve {
            host,
            port,
            model,
            adapter,
            device,
            deadline,
            preload,
        } => {
            cli::serve(host, port, model, adapter, device, deadline, preload).await?;
        }

        Commands::Demo {
            host,
            port,
            model,
            adapter,
            device,
            deadline,
        } => {
            cli::demo(host, port, model, adapter, device, deadline).await?;
        }

        Commands::Train { config, device } => {
            cli::train(config, device).await?;
        }

        Commands::Eval {
            model,
            adapter,
            device,
            output,
            deadline,
        } => {
            cli::eval(model, adapter, device, output, deadline).await?;
        }

        Commands::Doctor { config } => {
            cli::doctor(config).await?;
        }

        Commands::Diagnose {
            model,
            adapter,
            device,
        } => {
            cli::diagnose(model, adapter, device).await?;
        }
    }

    Ok(())
}
