use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What the host page is asked to generate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Image,
    Video,
}

impl GenerationMode {
    pub fn toggled(self) -> Self {
        match self {
            GenerationMode::Image => GenerationMode::Video,
            GenerationMode::Video => GenerationMode::Image,
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::Image => write!(f, "image"),
            GenerationMode::Video => write!(f, "video"),
        }
    }
}

/// Ratio token as shown in the host page's option text, e.g. "9:16"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AspectRatio(pub String);

impl AspectRatio {
    /// Ratios the host page is known to offer, in UI order.
    pub const KNOWN: [&'static str; 3] = ["9:16", "1:1", "16:9"];

    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Next known ratio after this one (wraps around).
    pub fn cycled(&self) -> Self {
        let idx = Self::KNOWN.iter().position(|r| *r == self.0);
        let next = idx.map_or(0, |i| (i + 1) % Self::KNOWN.len());
        Self::new(Self::KNOWN[next])
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self::new("9:16")
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptStatus {
    Pending,
    Generating,
    Downloading,
    Completed,
    Error,
}

impl PromptStatus {
    pub fn label(self) -> &'static str {
        match self {
            PromptStatus::Pending => "pending",
            PromptStatus::Generating => "generating",
            PromptStatus::Downloading => "downloading",
            PromptStatus::Completed => "completed",
            PromptStatus::Error => "error",
        }
    }
}

/// One queued prompt. Text never changes once queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptItem {
    pub id: u64,
    pub text: String,
    pub status: PromptStatus,
}

impl PromptItem {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            status: PromptStatus::Pending,
        }
    }

    /// First `n` characters of the prompt, for log lines.
    pub fn preview(&self, n: usize) -> String {
        let mut s: String = self.text.chars().take(n).collect();
        if self.text.chars().count() > n {
            s.push_str("...");
        }
        s
    }
}

/// Media observed right before a prompt is submitted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaBaseline {
    Images(HashSet<String>),
    Videos(usize),
}

impl MediaBaseline {
    pub fn len(&self) -> usize {
        match self {
            MediaBaseline::Images(urls) => urls.len(),
            MediaBaseline::Videos(count) => *count,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Result of waiting for a generation to settle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// Delta held steady for the required number of checks.
    Stable(Vec<String>),
    /// Timed out, but some new media showed up late.
    Partial(Vec<String>),
    /// Stop was requested while waiting.
    Cancelled,
}

/// Everything the orchestrator needs to run one batch
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub mode: GenerationMode,
    pub aspect_ratio: AspectRatio,
    pub auto_download: bool,
    pub delay_seconds: u64,
    pub reference_image: Option<Vec<u8>>,
    pub prompts: Vec<PromptItem>,
}

/// Where the orchestrator currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorState {
    Idle,
    ConfiguringMode,
    ConfiguringRatio,
    EnteringPrompt,
    Submitting,
    Polling,
    Downloading,
}

impl OrchestratorState {
    pub fn is_idle(self) -> bool {
        self == OrchestratorState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    Finished,
    Stopped,
    Failed,
}

/// Outbound notification from orchestrator to UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    UpdateQueue { prompt_id: u64, status: PromptStatus },
    GenerationComplete { reason: CompletionReason },
    Error { message: String },
}

/// Command from UI to orchestrator
#[derive(Debug)]
pub enum Command {
    Ping,
    StartGeneration(BatchRequest),
    StopGeneration,
    Quit,
}

/// Immediate answer to a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    Ok,
    Started,
    Busy,
    Stopped,
    /// The orchestrator thread is gone
    Unreachable,
}
