//! Command interpretation module
//!
//! Turns a normalized transcript into at most one application command
//! using an ordered phrase grammar.

use crate::utils::FuzzyMatcher;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

/// Application screens reachable by voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppMode {
    ActivityGuide,
    SceneDescription,
}

impl AppMode {
    /// Canonical spoken phrase for the mode
    pub fn phrase(&self) -> &'static str {
        match self {
            AppMode::ActivityGuide => "activity guide",
            AppMode::SceneDescription => "scene description",
        }
    }
}

/// A discrete voice command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SwitchMode(AppMode),
    CameraOn,
    CameraOff,
    EnterTask,
    StartTask,
    StartRecording,
    StopRecording,
    Yes,
    No,
    Refresh,
}

impl Command {
    /// Token name handed to collaborators
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SwitchMode(_) => "switch_mode",
            Command::CameraOn => "camera_on",
            Command::CameraOff => "camera_off",
            Command::EnterTask => "enter_task",
            Command::StartTask => "start_task",
            Command::StartRecording => "start_recording",
            Command::StopRecording => "stop_recording",
            Command::Yes => "yes",
            Command::No => "no",
            Command::Refresh => "refresh",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched command plus the transcript that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEvent {
    pub command: Command,
    pub transcript: String,
}

impl CommandEvent {
    pub fn new(command: Command, transcript: impl Into<String>) -> Self {
        Self {
            command,
            transcript: transcript.into(),
        }
    }
}

/// Ordered grammar. Earlier entries win, so phrase sets that overlap
/// ("start task" / "start recording") are resolved by position.
pub const GRAMMAR: &[(Command, &[&str])] = &[
    (
        Command::SwitchMode(AppMode::ActivityGuide),
        &["activity guide"],
    ),
    (
        Command::SwitchMode(AppMode::SceneDescription),
        &["scene description", "seen description"],
    ),
    (
        Command::CameraOn,
        &["turn on camera", "start camera", "camera on"],
    ),
    (
        Command::CameraOff,
        &["turn off camera", "stop camera", "camera off", "camera of"],
    ),
    (
        Command::EnterTask,
        &["enter task", "input task", "enter desk", "input desk"],
    ),
    (Command::StartTask, &["start task", "start desk"]),
    (Command::StartRecording, &["start recording"]),
    (Command::StopRecording, &["stop recording"]),
    (Command::Yes, &["yes", "yeah", "yep"]),
    (Command::No, &["no", "nope"]),
    (Command::Refresh, &["refresh", "restart", "reset"]),
];

/// Maps transcripts onto [`Command`]s
#[derive(Debug, Clone, Default)]
pub struct CommandInterpreter {
    matcher: FuzzyMatcher,
}

impl CommandInterpreter {
    pub fn new(matcher: FuzzyMatcher) -> Self {
        Self { matcher }
    }

    /// Interpret a normalized transcript. `None` is the common case.
    pub fn interpret(&self, transcript: &str) -> Option<CommandEvent> {
        let matched = GRAMMAR
            .iter()
            .find(|(_, phrases)| self.matcher.matches(transcript, phrases))
            .map(|(command, _)| *command);

        match matched {
            Some(command) => {
                info!("🎯 Matched command: {} ('{}')", command, transcript);
                let transcript = match command {
                    Command::SwitchMode(mode) => mode.phrase().to_string(),
                    _ => transcript.to_string(),
                };
                Some(CommandEvent::new(command, transcript))
            }
            None => {
                debug!("No command matched for: '{}'", transcript);
                None
            }
        }
    }
}
