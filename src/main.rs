use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use dali_assistant::assistant::{build_capabilities, build_orchestrator};
use dali_assistant::db::{self, ConversationRepo};
use dali_assistant::providers::{ReachabilityProbe, SarvamClient};
use dali_assistant::session::NO_DATA_REPLY;
use dali_assistant::voice::{AudioCapture, AudioPlayback, calculate_energy};
use dali_assistant::{
    Assistant, AssistantOptions, Config, ConfiguredMode, RealtimeDataAgent, RealtimeQuery,
};

/// DALI - voice assistant with cloud and offline modes
#[derive(Parser)]
#[command(name = "dali", version, about)]
struct Cli {
    /// Mode for new awake windows: online, offline or auto
    #[arg(short, long, env = "DALI_MODE")]
    mode: Option<ConfiguredMode>,

    /// Wait for Enter instead of listening for the wake phrase
    #[arg(long, env = "DALI_NO_WAKE_WORD")]
    no_wake_word: bool,

    /// Do not record turns to the history database
    #[arg(long)]
    no_history: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run one text turn and print the reply
    Ask {
        /// What to ask
        text: String,
    },
    /// Look up the current weather
    Weather {
        /// City (defaults to the configured location)
        location: Option<String>,
    },
    /// Read the top headlines
    News,
    /// Check whether the cloud provider answers
    Probe,
    /// Show recent conversation history
    History {
        /// Number of turns to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Speak text with the configured voice
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("warn,dali_assistant=info,dali=info")),
        1 => EnvFilter::new("info,dali_assistant=debug,dali=debug"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(mode) = cli.mode {
        config.assistant.mode = mode;
    }

    let options = AssistantOptions {
        wake_word: !cli.no_wake_word,
        history: !cli.no_history,
    };

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::Ask { text } => ask(&config, options, &text).await,
            Command::Weather { location } => {
                realtime(&config, RealtimeQuery::Weather { location }).await
            }
            Command::News => {
                let country = config.realtime.news_country.clone();
                realtime(&config, RealtimeQuery::News { country }).await
            }
            Command::Probe => probe(&config).await,
            Command::History { limit } => history(&config, limit),
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Say { text } => say(&config, &text).await,
        };
    }

    tracing::info!(
        mode = %config.assistant.mode,
        wake_word = options.wake_word,
        history = options.history,
        "starting assistant"
    );

    let assistant = Assistant::from_config(&config, options)?;

    match config.assistant.wake_words.first() {
        Some(phrase) if options.wake_word => {
            tracing::info!("{} ready - say \"{phrase}\"", config.assistant.name);
        }
        _ => tracing::info!("{} ready", config.assistant.name),
    }

    // Run until interrupted
    assistant.run().await?;

    Ok(())
}

/// Answer one typed question inside a fresh window
async fn ask(config: &Config, options: AssistantOptions, text: &str) -> anyhow::Result<()> {
    config.validate()?;

    let orchestrator = build_orchestrator(config, build_capabilities(config)?, options.history)?;
    let mut window = orchestrator.start_window(config.assistant.mode).await;

    let result = orchestrator.run_text_turn(&mut window, text).await?;
    orchestrator.end_window(&mut window);

    println!("{}", result.turn.reply_text);
    println!(
        "\n[mode: {}, source: {}, locked: {}]",
        result.turn.resolved_mode,
        result.turn.reply_source,
        window.is_offline_locked()
    );

    Ok(())
}

/// Run one realtime lookup and print the answer
async fn realtime(config: &Config, query: RealtimeQuery) -> anyhow::Result<()> {
    let agent = RealtimeDataAgent::from_config(&config.realtime)?;
    let query = match query {
        RealtimeQuery::Weather { location: None } => RealtimeQuery::Weather {
            location: config.realtime.default_location.clone(),
        },
        other => other,
    };

    let ttl = match query {
        RealtimeQuery::Weather { .. } => config.realtime.weather_ttl,
        RealtimeQuery::News { .. } => config.realtime.news_ttl,
    };

    let answer = agent.get(&query, ttl).await.into_value();
    println!("{}", answer.as_deref().unwrap_or(NO_DATA_REPLY));

    Ok(())
}

/// Check cloud reachability
async fn probe(config: &Config) -> anyhow::Result<()> {
    let client = SarvamClient::new(&config.cloud, &config.assistant.name)?;

    if client.is_reachable().await {
        println!("Cloud reachable at {}", config.cloud.base_url);
    } else {
        println!("Cloud NOT reachable at {}", config.cloud.base_url);
    }

    Ok(())
}

/// Print recent turns from the history database
fn history(config: &Config, limit: usize) -> anyhow::Result<()> {
    let path = config.history_path();
    if !path.exists() {
        println!("No conversation history yet ({})", path.display());
        return Ok(());
    }

    let repo = ConversationRepo::new(db::init(&path)?);
    let records = repo.recent(limit)?;

    if records.is_empty() {
        println!("No conversation history yet");
        return Ok(());
    }

    for record in records {
        println!(
            "[{}] ({}, {}{})",
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.mode,
            record.reply_source,
            if record.cloud_failed { ", cloud failed" } else { "" }
        );
        println!("  you: {}", record.user_text);
        println!("  {}: {}\n", config.assistant.name.to_lowercase(), record.reply_text);
    }

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    println!("Device: {}", capture.device_name());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.take_buffer();
        let energy = calculate_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: arecord -l (to list devices)");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..sample_rate * 2)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    tokio::task::spawn_blocking(move || {
        let playback = AudioPlayback::new()?;
        println!("Device: {}", playback.device_name());
        playback.play(&samples, sample_rate)
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");

    Ok(())
}

/// Speak text through the cloud voice, or the local one without a key
async fn say(config: &Config, text: &str) -> anyhow::Result<()> {
    let capabilities = build_capabilities(config)?;

    if let Some(cloud) = &capabilities.cloud {
        match cloud
            .tts
            .speak(text, &config.assistant.language, &config.assistant.speaker)
            .await
        {
            Ok(()) => return Ok(()),
            Err(e) => tracing::warn!(error = %e, "cloud speech failed, using local voice"),
        }
    }

    capabilities.local_tts.speak(text).await?;
    Ok(())
}
