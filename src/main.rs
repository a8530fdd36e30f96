use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use uniconnect_voice::audio::{CaptureFeed, PlaybackScheduler, samples_to_wav};
use uniconnect_voice::{AssistantClient, Config, InboundAudioPacket, VoiceSessionController};

/// UniConnect - realtime voice client for the student assistant
#[derive(Parser)]
#[command(name = "uniconnect", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start a voice session (default)
    Run,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the captured audio to a WAV file
        #[arg(long)]
        save: Option<std::path::PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
    /// Ask the assistant a question over text
    Chat {
        /// The question
        prompt: String,
    },
    /// Show recommended student events
    Events,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,uniconnect_voice=info",
        1 => "info,uniconnect_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

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
    match cli.command {
        None | Some(Command::Run) => run_voice().await,
        Some(Command::TestMic { duration, save }) => test_mic(duration, save.as_deref()).await,
        Some(Command::TestSpeaker) => test_speaker().await,
        Some(Command::Chat { prompt }) => chat(&prompt).await,
        Some(Command::Events) => events().await,
    }
}

/// Run a voice session until Ctrl-C or disconnect
#[allow(clippy::future_not_send)]
async fn run_voice() -> anyhow::Result<()> {
    let config = Config::load()?;
    let mut controller = VoiceSessionController::new(config);

    println!("Starting voice session. Press Ctrl-C to end it.");
    controller.start().await?;
    controller.run().await?;

    println!("Session ended.");
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, save: Option<&std::path::Path>) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = CaptureFeed::open()?;
    capture.start()?;

    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    let mut all_samples: Vec<f32> = Vec::new();
    let mut window: Vec<f32> = Vec::new();
    let started = Instant::now();
    let mut second = 0_u64;

    while started.elapsed() < Duration::from_secs(duration) {
        let Ok(frame) =
            tokio::time::timeout(Duration::from_millis(500), capture.next_frame()).await
        else {
            continue;
        };
        let Some(frame) = frame else { break };

        window.extend_from_slice(&frame.samples);
        if save.is_some() {
            all_samples.extend_from_slice(&frame.samples);
        }

        if window.len() >= sample_rate as usize {
            second += 1;
            let energy = calculate_rms(&window);
            let peak = window.iter().map(|s| s.abs()).fold(0.0_f32, f32::max);

            // Visual meter
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let meter_len = (energy * 100.0).min(50.0) as usize;
            let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

            println!("[{second:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]");
            window.clear();
        }
    }

    capture.close();

    if let Some(path) = save {
        let wav = samples_to_wav(&all_samples, sample_rate)?;
        std::fs::write(path, wav)?;
        println!("\nSaved capture to {}", path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    Ok(())
}

/// Calculate RMS energy
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

/// Test speaker output with a sine wave
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    use uniconnect_voice::PLAYBACK_SAMPLE_RATE;

    println!("Testing speaker output...");
    println!("You should hear three short tones back to back\n");

    let mut playback = PlaybackScheduler::open()?;
    playback.start()?;

    // Three 400 ms tones; gapless scheduling makes them one continuous sweep
    for (i, frequency) in [440.0_f32, 554.0, 659.0].iter().enumerate() {
        #[allow(clippy::cast_precision_loss)]
        let samples: Vec<f32> = (0..PLAYBACK_SAMPLE_RATE as usize * 2 / 5)
            .map(|n| {
                let t = n as f32 / PLAYBACK_SAMPLE_RATE as f32;
                (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
            })
            .collect();

        let handle = playback.enqueue(InboundAudioPacket {
            samples,
            sample_rate: PLAYBACK_SAMPLE_RATE,
        })?;
        println!("Scheduled tone {} ({frequency} Hz): {handle:?}", i + 1);
    }

    // Let the timeline drain
    while playback.live_count() > 0 {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    playback.close();

    println!("\n---");
    println!("If you heard the tones with no gaps, your speakers are working!");
    Ok(())
}

/// Ask the assistant a question over text
async fn chat(prompt: &str) -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = AssistantClient::new(&config)?;

    match client.chat(prompt).await {
        Ok(answer) => println!("{answer}"),
        Err(e) => {
            tracing::debug!(error = %e, "chat request failed");
            println!("I'm sorry, I'm having trouble connecting right now. Please try again in a moment.");
        }
    }
    Ok(())
}

/// Show recommended student events
async fn events() -> anyhow::Result<()> {
    let config = Config::load()?;
    let client = AssistantClient::new(&config)?;

    for event in client.recommended_events().await {
        println!("{} | {}", event.date, event.title);
        println!("    {} · {:?}", event.location, event.category);
        println!("    {}", event.description);
        println!("    {}\n", event.source_url);
    }
    Ok(())
}
