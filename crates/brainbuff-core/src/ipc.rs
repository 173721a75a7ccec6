use crate::geometry::Rect;
use crate::question::{QuestionSource, QuizCard, QuizMode};
use serde::{Deserialize, Serialize};

/// Messages from daemon to overlay/clients (JSON-lines over Unix socket).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DaemonMsg {
    /// Show the quiz card.
    #[serde(rename = "show_question")]
    ShowQuestion {
        card: QuizCard,
        source: QuestionSource,
        mode: QuizMode,
        snooze_minutes: u64,
    },
    /// Result of the user's answer; the daemon hides the card shortly after.
    #[serde(rename = "feedback")]
    Feedback { correct: bool, explanation: String },
    #[serde(rename = "hide_question")]
    HideQuestion,
    /// The question source was toggled; the overlay flashes it in the hint.
    #[serde(rename = "mode_changed")]
    ModeChanged { mode: QuizMode },
    /// Status response.
    #[serde(rename = "status")]
    Status {
        enabled: bool,
        overlay_visible: bool,
        mode: QuizMode,
        popups_last_hour: usize,
        snoozed_for_secs: u64,
        version: String,
    },
    /// Acknowledgement for commands.
    #[serde(rename = "ack")]
    Ack { ok: bool, message: String },
}

/// Messages from overlay/clients to daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMsg {
    /// Overlay announcing itself (for routing ShowQuestion/HideQuestion).
    #[serde(rename = "register_overlay")]
    RegisterOverlay,
    /// User picked a choice (1-indexed).
    #[serde(rename = "answer")]
    Answer { index: u8 },
    #[serde(rename = "dismiss")]
    Dismiss,
    #[serde(rename = "snooze")]
    Snooze,
    /// Switch the question source between off and cache.
    #[serde(rename = "toggle_mode")]
    ToggleMode,
    #[serde(rename = "enable")]
    Enable,
    #[serde(rename = "disable")]
    Disable,
    #[serde(rename = "toggle")]
    Toggle,
    #[serde(rename = "get_status")]
    GetStatus,
    /// Where the overlay placed the card on screen.
    #[serde(rename = "geometry")]
    Geometry { rect: Rect },
    /// Pointer position in screen coordinates, reported while it is over the card.
    #[serde(rename = "pointer")]
    Pointer { x: i32, y: i32 },
    /// The pointer left the card.
    #[serde(rename = "pointer_left")]
    PointerLeft,
}

/// Serialize a message as a JSON line (with trailing newline).
pub fn encode(msg: &impl Serialize) -> String {
    let mut s = serde_json::to_string(msg).expect("serialize IPC message");
    s.push('\n');
    s
}

/// Deserialize a JSON line. Returns None on empty/whitespace input.
pub fn decode_daemon(line: &str) -> Option<DaemonMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

pub fn decode_client(line: &str) -> Option<ClientMsg> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}
