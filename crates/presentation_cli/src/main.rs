//! speechctl
//!
//! Command-line front end for the speech synthesis orchestrator.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use speech_synthesis::{
    Quality, SpeechConfig, SpeechOrchestrator, SynthesisOptions, host_supports_local_model,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// speechctl
#[derive(Parser)]
#[command(name = "speechctl")]
#[command(author, version, about = "Local-first text-to-speech CLI", long_about = None)]
struct Cli {
    /// Verbosity level
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file (defaults to ./speech.toml when present)
    #[arg(short, long, global = true, env = "SPEECH_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize text into an audio file
    ///
    /// Example: speechctl synthesize "Welcome back" --output intro.mp3
    /// Example: speechctl synthesize "Chapter one" --stream --output - | mpv -
    Synthesize(SynthesizeArgs),

    /// Report host capability and local model readiness
    Probe,
}

#[derive(Args)]
struct SynthesizeArgs {
    /// Text to synthesize
    text: String,

    /// Output file, or "-" for stdout
    #[arg(short, long, default_value = "-")]
    output: PathBuf,

    /// Attempt the local model even for high quality requests
    #[arg(long)]
    prefer_local: bool,

    /// Never use the local model
    #[arg(long)]
    force_cloud: bool,

    /// Desired quality tier (high, medium, low)
    #[arg(short, long)]
    quality: Option<Quality>,

    /// Cloud voice identifier
    #[arg(long)]
    voice: Option<String>,

    /// Cloud model identifier
    #[arg(long)]
    model: Option<String>,

    /// Write audio chunks as they arrive (no cloud fallback)
    #[arg(long)]
    stream: bool,

    /// Skip the local model even on capable hosts
    #[arg(long)]
    no_local: bool,
}

impl SynthesizeArgs {
    fn options(&self) -> SynthesisOptions {
        SynthesisOptions {
            prefer_local: self.prefer_local,
            force_cloud: self.force_cloud,
            quality: self.quality,
            voice: self.voice.clone(),
            model: self.model.clone(),
        }
    }
}

/// Determine log filter level from verbosity count
const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Whether `path` designates standard output
fn is_stdout(path: &Path) -> bool {
    path.as_os_str() == "-"
}

fn init_logging(verbose: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_filter_from_verbosity(verbose)));

    // Audio may go to stdout, so logs always use stderr
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn open_output(path: &Path) -> anyhow::Result<Box<dyn AsyncWrite + Unpin + Send>> {
    if is_stdout(path) {
        return Ok(Box::new(tokio::io::stdout()));
    }
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(Box::new(file))
}

async fn synthesize(config: SpeechConfig, args: SynthesizeArgs) -> anyhow::Result<()> {
    let local_capable = !args.no_local && host_supports_local_model();
    let orchestrator = SpeechOrchestrator::new(config, local_capable)?;
    let options = args.options();

    // One-shot process: give the model its chance to load before routing
    if let Some(local) = orchestrator
        .local_provider()
        .filter(|_| orchestrator.should_use_local(&options))
    {
        let readiness = local.wait_until_settled().await;
        debug!(%readiness, "Local model settled");
    }

    // Output is opened only once synthesis has started successfully
    if args.stream {
        let mut stream = orchestrator
            .generate_speech_stream(&args.text, &options)
            .await?;
        let mut out = open_output(&args.output).await?;
        let mut written = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            out.write_all(&chunk).await?;
            written += chunk.len();
        }
        out.flush().await?;
        info!(bytes = written, "Streamed audio");
        if !is_stdout(&args.output) {
            eprintln!("🔊 Wrote {written} bytes to {}", args.output.display());
        }
    } else {
        let audio = orchestrator.generate_speech(&args.text, &options).await?;
        let mut out = open_output(&args.output).await?;
        out.write_all(audio.data()).await?;
        out.flush().await?;
        info!(bytes = audio.size_bytes(), format = %audio.format(), "Synthesized audio");
        if !is_stdout(&args.output) {
            eprintln!(
                "🔊 Wrote {} bytes ({}) to {}",
                audio.size_bytes(),
                audio.mime_type(),
                args.output.display()
            );
        }
    }

    Ok(())
}

async fn probe(config: SpeechConfig) -> anyhow::Result<()> {
    let capable = host_supports_local_model();

    println!("🖥️  Host: {}/{}", std::env::consts::ARCH, std::env::consts::OS);
    println!(
        "   Local model support: {}",
        if capable { "yes" } else { "no" }
    );

    let orchestrator = SpeechOrchestrator::new(config, capable)?;
    match orchestrator.local_provider() {
        Some(local) => {
            let readiness = local.wait_until_settled().await;
            println!("   Local model: {readiness}");
            if let Some(reason) = local.failure_reason() {
                println!("   ⚠️  {reason}");
            }
        },
        None => println!("   Local model: disabled"),
    }

    let cloud = orchestrator.cloud_provider();
    println!(
        "☁️  Cloud voice: {} (model {})",
        cloud.default_voice(),
        cloud.model_name()
    );

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.log_json);

    let config = SpeechConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Synthesize(args) => synthesize(config, args).await,
        Commands::Probe => probe(config).await,
    }
}
