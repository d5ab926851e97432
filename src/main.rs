//! AIris Voice - hands-free voice control demo
//!
//! Type what you would say. Lines are fed to the recognition session as
//! final results; `!network`, `!denied`, `!nospeech` and `!end` simulate
//! recognizer events.

use airis_voice::asr::{self, StdinRecognizer};
use airis_voice::commands::{Command, CommandEvent};
use airis_voice::config::Config;
use airis_voice::dictation::DictationUpdate;
use airis_voice::registry::{Speaker, TranscriptEvent};
use airis_voice::session::DictationCallback;
use airis_voice::tts;
use airis_voice::VoiceControlService;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Config file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Disable speech output
    #[arg(long)]
    mute: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if args.mute {
        config.tts_engine = "none".to_string();
    }

    // Setup logging
    let level = if args.verbose {
        "debug"
    } else {
        config.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("airis_voice={}", level)));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("👁️ AIris Voice v{} starting...", env!("CARGO_PKG_VERSION"));

    let (event_tx, events) = asr::event_channel();
    let (recognizer, mut stdin_closed) = StdinRecognizer::spawn(event_tx);
    let engine = tts::create_engine(&config);
    let service = VoiceControlService::new(&config, Box::new(recognizer), events, engine)?;

    service.register_transcription_callback(Arc::new(|event: &TranscriptEvent| {
        match (event.speaker, event.is_final) {
            (Speaker::User, true) => println!("  you   > {}", event.text),
            (Speaker::User, false) => println!("  you   ~ {}", event.text),
            (Speaker::Assistant, _) => println!("  airis < {}", event.text),
        }
    }));

    let (command_tx, mut command_rx) = mpsc::unbounded_channel::<CommandEvent>();
    let (dictation_tx, mut dictation_rx) = mpsc::unbounded_channel::<DictationUpdate>();
    let on_dictation: DictationCallback = Arc::new(move |update: &DictationUpdate| {
        let _ = dictation_tx.send(update.clone());
    });

    // Running the demo counts as the user enabling voice mode
    service.mark_user_interacted();
    let listening = service
        .start_listening(
            Some(Arc::new(move |event: &CommandEvent| {
                let _ = command_tx.send(event.clone());
            })),
            None,
        )
        .await;
    if !listening {
        warn!("⚠️ Recognition could not be started");
    }

    info!("✅ AIris Voice ready - type a command");
    info!("   Try: 'activity guide', 'turn on camera', 'enter task', 'refresh'");

    loop {
        tokio::select! {
            Some(event) = command_rx.recv() => {
                handle_command(&service, &event, on_dictation.clone()).await;
            }
            Some(update) = dictation_rx.recv() => {
                info!("📝 Task so far: '{}'", update.text);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Interrupted");
                break;
            }
            _ = &mut stdin_closed => break,
        }
    }

    service.cleanup().await;
    Ok(())
}

async fn handle_command(
    service: &VoiceControlService,
    event: &CommandEvent,
    on_dictation: DictationCallback,
) {
    info!("🎯 {} ('{}')", event.command, event.transcript);

    match event.command {
        Command::SwitchMode(mode) => {
            service.speak(format!("Switching to {}", mode.phrase()), true);
        }
        Command::CameraOn => {
            service.speak("Camera on", true);
        }
        Command::CameraOff => {
            service.speak("Camera off", true);
        }
        Command::EnterTask => {
            service.speak("Describe your task, then say start task", true);
            service.start_dictation(on_dictation).await;
        }
        Command::StartTask if event.transcript.is_empty() => {
            service.speak("No task given", true);
        }
        Command::StartTask => {
            info!("🚀 Task: '{}'", event.transcript);
            service.speak(format!("Starting task: {}", event.transcript), true);
        }
        Command::StartRecording => {
            service.speak("Recording", false);
        }
        Command::StopRecording => {
            service.speak("Recording stopped", false);
        }
        Command::Yes | Command::No => {
            service.speak("Okay", false);
        }
        // The session restarts itself and announces it
        Command::Refresh => {}
    }
}
