use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use character_call::voice::{
    AudioCapture, AudioInput, CpalOutput, FrameCallback, PlaybackSink, samples_to_wav,
};
use character_call::{
    AudioChunk, CallCommand, CallController, CallExit, CallNotice, CallStatus, Config, CpalBackend,
    Feed, GeminiLiveConnector, MemoryStoryStore, PlaybackScheduler, Speaker, TranscriptTurn,
};

/// Charcall - Voice calls with AI characters
#[derive(Parser)]
#[command(name = "charcall", version, about)]
struct Cli {
    /// JSON file of stories backing the feed
    #[arg(long)]
    stories: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List callable characters
    List,
    /// Start a voice call
    Call {
        /// Character id to call
        #[arg(short, long, conflicts_with = "index")]
        character: Option<String>,
        /// Feed position to call
        #[arg(short, long)]
        index: Option<usize>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Save the recording as WAV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,character_call=info",
        1 => "info,character_call=debug",
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
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load();
    tracing::debug!(?config, "loaded configuration");

    match cli.command {
        Command::List => {
            let feed = load_feed(cli.stories.as_ref(), &config)?;
            for (i, character) in feed.items().iter().enumerate() {
                println!("{i:3}  {:<20} {}", character.id, character.name);
                println!("     {}", character.concept);
            }
            Ok(())
        }
        Command::Call { character, index } => {
            let mut feed = load_feed(cli.stories.as_ref(), &config)?;
            if let Some(id) = character {
                feed.select(&id)?;
            } else if let Some(index) = index {
                feed.select_index(index)?;
            }
            call(config, feed).await
        }
        Command::TestMic { duration, output } => {
            test_mic(&config, duration, output.as_deref()).await
        }
        Command::TestSpeaker => test_speaker(&config).await,
    }
}

fn load_feed(stories: Option<&PathBuf>, config: &Config) -> anyhow::Result<Feed> {
    let store = match stories.or(config.stories_path.as_ref()) {
        Some(path) => MemoryStoryStore::load(path)?,
        None => MemoryStoryStore::new(),
    };
    Ok(Feed::from_store(&store))
}

/// Run calls until the user hangs up
#[allow(clippy::future_not_send)]
async fn call(config: Config, mut feed: Feed) -> anyhow::Result<()> {
    if config.api_key.is_none() {
        anyhow::bail!("no API key configured (set GEMINI_API_KEY)");
    }

    let connector = Arc::new(GeminiLiveConnector::from_config(&config));
    let mut controller = CallController::new(CpalBackend, connector, config);

    let (commands_tx, mut commands) = mpsc::unbounded_channel();
    spawn_stdin_commands(commands_tx.clone(), feed.clone());
    spawn_ctrl_c(commands_tx);
    spawn_status_printer(&controller);

    println!("Commands: m = mute/unmute, n/p = next/previous character, q = hang up\n");

    loop {
        let character = feed.current().clone();
        println!("Calling {}...", character.name);

        if let Err(e) = controller.start(&character).await {
            anyhow::bail!("could not start call: {e}");
        }

        let exit = controller.run(&mut commands).await;
        print_transcript(controller.transcript(), &character.name);

        match exit {
            CallExit::Ended => break,
            CallExit::SwitchTo(id) => {
                feed.select(&id)?;
            }
        }
    }

    let stats = controller.stats();
    tracing::info!(
        frames_captured = stats.frames_captured,
        frames_sent = stats.frames_sent,
        chunks_scheduled = stats.chunks_scheduled,
        chunks_dropped = stats.chunks_dropped,
        "call finished"
    );

    Ok(())
}

/// Translate stdin lines into call commands
///
/// The task keeps its own copy of the feed cursor; the call loop follows it
/// through the `SwitchCharacter` ids.
fn spawn_stdin_commands(commands: mpsc::UnboundedSender<CallCommand>, mut feed: Feed) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let command = match line.trim() {
                "m" => CallCommand::ToggleMute,
                "q" => CallCommand::End,
                "n" => CallCommand::SwitchCharacter(feed.next_character().id.clone()),
                "p" => CallCommand::SwitchCharacter(feed.previous_character().id.clone()),
                "" => continue,
                other => {
                    println!("unknown command: {other}");
                    continue;
                }
            };
            if commands.send(command).is_err() {
                break;
            }
        }
    });
}

fn spawn_ctrl_c(commands: mpsc::UnboundedSender<CallCommand>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, hanging up");
            if commands.send(CallCommand::End).is_err() {
                break;
            }
        }
    });
}

fn spawn_status_printer(controller: &CallController<CpalBackend>) {
    let mut state = controller.subscribe();
    let mut notices = controller.notices();

    tokio::spawn(async move {
        let mut status = CallStatus::Idle;
        let mut muted = false;
        let mut speaking = false;

        while state.changed().await.is_ok() {
            let snapshot = state.borrow_and_update().clone();

            if snapshot.status != status {
                status = snapshot.status;
                println!("[{status:?}]");
            }
            if snapshot.mic_muted != muted {
                muted = snapshot.mic_muted;
                println!("[{}]", if muted { "muted" } else { "unmuted" });
            }
            if snapshot.ai_speaking != speaking {
                speaking = snapshot.ai_speaking;
                tracing::debug!(speaking, "character speaking changed");
            }
        }
    });

    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                CallNotice::MediaAccessDenied(e) => println!("Microphone unavailable: {e}"),
                CallNotice::ConnectionFailed(e) => println!("Connection failed: {e}"),
                CallNotice::Ended { reason } => println!("Call ended ({reason})"),
            }
        }
    });
}

fn print_transcript(turns: &[TranscriptTurn], character: &str) {
    if turns.is_empty() {
        return;
    }

    println!("\n--- transcript ---");
    for turn in turns {
        let who = match turn.speaker {
            Speaker::User => "You",
            Speaker::Character => character,
        };
        println!("{who}: {}", turn.text.trim());
    }
    println!("------------------\n");
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(
    config: &Config,
    duration: u64,
    output: Option<&std::path::Path>,
) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::open(config.audio.input_sample_rate, config.audio.frame_size)?;
    let sample_rate = capture.sample_rate();

    let (frames_tx, mut frames) = mpsc::unbounded_channel::<Vec<f32>>();
    let on_frame: FrameCallback = Box::new(move |frame| {
        let _ = frames_tx.send(frame);
    });
    let handle = capture.start(on_frame)?;

    println!("Sample rate: {sample_rate} Hz, frame size: {}", config.audio.frame_size);
    println!("---");

    let mut recording = Vec::new();
    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let mut second = Vec::new();
        let mut frame_count = 0;
        while let Ok(frame) = frames.try_recv() {
            second.extend_from_slice(&frame);
            frame_count += 1;
        }

        let energy = calculate_rms(&second);
        let peak = second.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] frames: {frame_count:3} | RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]",
            i + 1
        );

        recording.extend(second);
    }

    capture.stop(handle);
    capture.close();

    if let Some(path) = output {
        let wav = samples_to_wav(&recording, sample_rate)?;
        std::fs::write(path, wav)?;
        println!("\nSaved {} samples to {}", recording.len(), path.display());
    }

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

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

/// Test speaker output with two back-to-back tones
#[allow(clippy::future_not_send)]
async fn test_speaker(config: &Config) -> anyhow::Result<()> {
    let sample_rate = config.audio.output_sample_rate;

    println!("Testing speaker output...");
    println!("You should hear 440Hz then 660Hz with no gap between them\n");

    let (completions_tx, mut completions) = mpsc::unbounded_channel();
    let output = CpalOutput::open(sample_rate, completions_tx)?;
    let mut scheduler = PlaybackScheduler::new(output);

    for frequency in [440.0_f32, 660.0] {
        let handle = scheduler.enqueue(tone(frequency, sample_rate, 1.0))?;
        println!("Scheduled {frequency} Hz as {handle}");
    }

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while scheduler.is_speaking() {
        match tokio::time::timeout_at(deadline, completions.recv()).await {
            Ok(Some(handle)) => {
                scheduler.complete(handle);
                println!("Finished {handle} at {:.2}s", scheduler.sink().current_time());
            }
            Ok(None) => break,
            Err(_) => {
                println!("Timed out waiting for playback");
                break;
            }
        }
    }
    scheduler.close();

    println!("\n---");
    println!("If you heard the tones, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");

    Ok(())
}

/// Sine tone at 30% volume
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn tone(frequency: f32, sample_rate: u32, seconds: f32) -> AudioChunk {
    let num_samples = (sample_rate as f32 * seconds) as usize;
    let samples = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3
        })
        .collect();
    AudioChunk::mono(samples, sample_rate)
}
