use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pyspa_assistant::audio::{CHUNK_FRAMES, SAMPLE_RATE_HZ};
use pyspa_assistant::{Assistant, AudioOutput, AudioSink, Config, CpalOutput};

/// pyspa - ask the embedded assistant from the command line
#[derive(Parser)]
#[command(name = "pyspa", version, about)]
struct Cli {
    /// OAuth2 client credential JSON
    #[arg(long, global = true, env = "PYSPA_ASSISTANT_CREDENTIALS")]
    credentials: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Authorize this device and cache the token
    Auth,
    /// Ask a question and print the answer
    Ask {
        /// Query text
        text: String,
        /// Skip the spoken reply
        #[arg(long)]
        text_only: bool,
        /// Override the conversation deadline
        #[arg(long)]
        deadline_secs: Option<u64>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "info,pyspa_assistant=info",
        1 => "info,pyspa_assistant=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load();
    if cli.credentials.is_some() {
        config.assistant.credentials = cli.credentials;
    }

    match cli.command {
        Command::Auth => {
            let assistant = Assistant::from_config(&config)?;
            assistant.authorize().await?;
            println!("Authorized; token cached at {}", config.auth.token_cache.display());
            Ok(())
        }
        Command::Ask {
            text,
            text_only,
            deadline_secs,
        } => {
            if let Some(secs) = deadline_secs {
                config.assistant.deadline = Duration::from_secs(secs);
            }
            let assistant = Assistant::from_config(&config)?;
            let answer = assistant.ask(&text, text_only).await?;
            println!("{answer}");
            Ok(())
        }
        Command::TestSpeaker => test_speaker().await,
    }
}

/// Play a short tone through the assistant's output path
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut sink: Box<dyn AudioSink> = CpalOutput.open(SAMPLE_RATE_HZ, CHUNK_FRAMES)?;

    let frequency = 440.0_f32;
    let num_samples = CHUNK_FRAMES * 80;

    let samples: Vec<i16> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE_HZ as f32;
            // 30% volume
            ((2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 * f32::from(i16::MAX)) as i16
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), SAMPLE_RATE_HZ);

    sink.write(&samples).await?;
    sink.finish().await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}
