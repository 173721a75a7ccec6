mod activity;
mod admission;
mod config_watch;
mod monitor;
mod pointer;
mod quiz;

use activity::MoveThrottle;
use admission::{Action, AdmissionController, AdmissionSettings};
use anyhow::{Context, Result};
use brainbuff_core::config::{self, Config};
use brainbuff_core::ipc::{self, ClientMsg, DaemonMsg};
use brainbuff_core::question::{QuestionEngine, QuizMode};
use evdev::Key;
use monitor::{InputKind, InputSignal};
use pointer::PointerTracker;
use quiz::QuizSession;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// A client message forwarded to the event loop, with the channel that
/// writes back to that client.
struct Command {
    msg: ClientMsg,
    reply: mpsc::UnboundedSender<String>,
}

/// Everything the event loop owns. Nothing here is shared with other tasks.
struct Daemon {
    config: Config,
    config_path: PathBuf,
    admission: AdmissionController,
    quiz: QuizSession,
    pointer: PointerTracker,
    move_throttle: MoveThrottle,
    rng: StdRng,
    /// Channels to send messages to connected overlay clients.
    overlay_txs: Vec<mpsc::UnboundedSender<String>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("brainbuffd=info".parse()?),
        )
        .init();

    info!("brainbuffd starting");

    let config_path = Config::config_path();
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("loading config {}", config_path.display()))?;
    let engine = QuestionEngine::load(&config).context("loading questions")?;
    info!(
        bank = engine.bank().len(),
        bank_skipped = engine.bank().skipped(),
        cached = engine.cache().len(),
        mode = %engine.mode(),
        "questions loaded"
    );

    let devices = monitor::find_input_devices().context("finding input devices")?;
    if devices.is_empty() {
        anyhow::bail!("no input devices found: check permissions (group 'input' or udev rules)");
    }

    let mut daemon = Daemon::new(config, engine, config_path.clone());

    // Input events from watched devices
    let (input_tx, mut input_rx) = mpsc::unbounded_channel();
    for path in devices {
        let tx = input_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = monitor::watch_device(path.clone(), tx).await {
                error!(path = %path.display(), error = %e, "device watch failed");
            }
        });
    }
    drop(input_tx);

    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    if let Err(e) = config_watch::spawn(config_path, reload_tx) {
        warn!(error = %e, "config hot-reload unavailable");
    }

    // Start IPC listener
    let socket_path = config::socket_path();
    // Remove stale socket
    let _ = std::fs::remove_file(&socket_path);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&socket_path, std::fs::Permissions::from_mode(0o600)).ok();
    }
    info!(path = %socket_path.display(), "IPC socket listening");

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(handle_ipc_client(stream, cmd_tx.clone()));
                }
                Err(e) => {
                    warn!(error = %e, "IPC accept error");
                }
            }
        }
    });

    let mut tick = tick_interval(daemon.config.general.tick_ms);

    // Main event loop: the only place admission state changes.
    loop {
        tokio::select! {
            Some(signal) = input_rx.recv() => daemon.handle_input(signal),
            Some(cmd) = cmd_rx.recv() => daemon.handle_command(cmd),
            Some(()) = reload_rx.recv() => {
                if let Some(tick_ms) = daemon.reload() {
                    tick = tick_interval(tick_ms);
                }
            }
            _ = tick.tick() => {
                // One timestamp per tick for every eviction and comparison.
                let now = Instant::now();
                let actions = daemon.admission.tick(now);
                daemon.process_actions(actions);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    info!("brainbuffd shutting down");
    let _ = std::fs::remove_file(&socket_path);
    Ok(())
}

fn tick_interval(tick_ms: u64) -> Interval {
    let mut tick = tokio::time::interval(Duration::from_millis(tick_ms));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick
}

/// Digit keys 1–4 answer a visible question.
fn answer_digit(code: u16) -> Option<u8> {
    match Key::new(code) {
        Key::KEY_1 => Some(1),
        Key::KEY_2 => Some(2),
        Key::KEY_3 => Some(3),
        Key::KEY_4 => Some(4),
        _ => None,
    }
}

impl Daemon {
    fn new(config: Config, engine: QuestionEngine, config_path: PathBuf) -> Self {
        let admission = AdmissionController::new(
            AdmissionSettings::from_config(&config),
            config.general.enabled,
        );
        let quiz = QuizSession::new(engine, &config.quiz);
        let pointer = PointerTracker::new(config.screen.width, config.screen.height);
        let move_throttle =
            MoveThrottle::new(Duration::from_millis(config.activity.mouse_move_throttle_ms));
        Self {
            config,
            config_path,
            admission,
            quiz,
            pointer,
            move_throttle,
            rng: StdRng::from_entropy(),
            overlay_txs: Vec::new(),
        }
    }

    fn handle_input(&mut self, signal: InputSignal) {
        let InputSignal { at, kind } = signal;
        match kind {
            // Hotkeys are not activity.
            InputKind::KeyPress(code) if code == Key::KEY_F9.code() => {
                info!("snooze hotkey");
                let actions = self.admission.snooze(at);
                self.process_actions(actions);
            }
            InputKind::KeyPress(code) if code == Key::KEY_F10.code() => {
                self.toggle_mode();
            }
            InputKind::KeyPress(code) => {
                if self.admission.is_visible() {
                    if let Some(index) = answer_digit(code) {
                        self.answer(index, at);
                        return;
                    }
                }
                self.admission.record_input(at);
            }
            // Clicks on the card are answers, not activity.
            InputKind::Click => {
                if !self.admission.pointer_over_overlay() {
                    self.admission.record_input(at);
                }
            }
            InputKind::Scroll => self.admission.record_input(at),
            InputKind::Motion { dx, dy } => {
                let (x, y) = self.pointer.apply_delta(dx, dy);
                self.admission.set_pointer(x, y);
                if !self.admission.pointer_over_overlay() && self.move_throttle.admit(at) {
                    self.admission.record_input(at);
                }
            }
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        let Command { msg, reply } = cmd;
        let now = Instant::now();

        match msg {
            ClientMsg::RegisterOverlay => {
                self.overlay_txs.push(reply.clone());
                send_ack(&reply, true, "overlay registered");
            }
            ClientMsg::Answer { index } => {
                debug!(index, "answer via IPC");
                self.answer(index, now);
            }
            ClientMsg::Dismiss => {
                info!("question dismissed via IPC");
                let actions = self.admission.dismiss();
                self.process_actions(actions);
                send_ack(&reply, true, "dismissed");
            }
            ClientMsg::Snooze => {
                let actions = self.admission.snooze(now);
                self.process_actions(actions);
                send_ack(
                    &reply,
                    true,
                    &format!("snoozed for {} minutes", self.config.popup.snooze_minutes),
                );
            }
            ClientMsg::ToggleMode => {
                let mode = self.toggle_mode();
                send_ack(&reply, true, &format!("mode: {}", mode));
            }
            ClientMsg::Enable => self.set_enabled(true, &reply),
            ClientMsg::Disable => self.set_enabled(false, &reply),
            ClientMsg::Toggle => {
                let enabled = !self.admission.is_enabled();
                self.set_enabled(enabled, &reply);
            }
            ClientMsg::GetStatus => {
                let status = DaemonMsg::Status {
                    enabled: self.admission.is_enabled(),
                    overlay_visible: self.admission.is_visible(),
                    mode: self.quiz.mode(),
                    popups_last_hour: self.admission.popups_last_hour(now),
                    snoozed_for_secs: self.admission.snooze_remaining(now).as_secs(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                };
                let _ = reply.send(ipc::encode(&status));
            }
            ClientMsg::Geometry { rect } => {
                debug!(?rect, "overlay geometry");
                self.admission.set_overlay_rect(rect);
            }
            ClientMsg::Pointer { x, y } => {
                self.pointer.sync(x, y);
                self.admission.set_pointer(x, y);
                self.admission.set_hover(true);
            }
            ClientMsg::PointerLeft => self.admission.set_hover(false),
        }
    }

    fn set_enabled(&mut self, enabled: bool, reply: &mpsc::UnboundedSender<String>) {
        let actions = self.admission.set_enabled(enabled);
        self.process_actions(actions);
        info!(enabled, "enabled state changed");
        send_ack(reply, true, &format!("enabled: {}", enabled));
    }

    /// Flip the question source, persist it, and let the overlay show it.
    fn toggle_mode(&mut self) -> QuizMode {
        let mode = self.quiz.toggle_mode();
        self.config.quiz.mode = mode;
        if let Err(e) = Config::save_quiz_mode_to(&self.config_path, mode) {
            warn!(error = %format!("{:#}", e), "could not save quiz mode");
        }
        self.broadcast(&DaemonMsg::ModeChanged { mode });
        mode
    }

    fn answer(&mut self, index: u8, now: Instant) {
        if !self.admission.is_visible() {
            return;
        }
        if let Some(feedback) = self.quiz.answer(index) {
            self.admission.answered(now);
            self.broadcast(&feedback);
        }
    }

    fn process_actions(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::ShowPopup => {
                    let msg = self.quiz.next(&mut self.rng, self.config.popup.snooze_minutes);
                    if self.overlay_txs.is_empty() {
                        debug!("no overlay connected");
                    }
                    self.broadcast(&msg);
                }
                Action::HidePopup(reason) => {
                    info!(?reason, "hiding question");
                    self.quiz.clear();
                    self.broadcast(&DaemonMsg::HideQuestion);
                }
            }
        }
    }

    /// Fire-and-forget to every overlay; closed clients are dropped.
    fn broadcast(&mut self, msg: &DaemonMsg) {
        let line = ipc::encode(msg);
        self.overlay_txs.retain(|tx| tx.send(line.clone()).is_ok());
    }

    /// Re-read the config file. Returns the new tick period if it changed.
    fn reload(&mut self) -> Option<u64> {
        let config = match Config::load_or_default(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "rejected config change, keeping previous settings");
                return None;
            }
        };

        self.admission.set_settings(AdmissionSettings::from_config(&config));
        if config.general.enabled != self.config.general.enabled {
            let actions = self.admission.set_enabled(config.general.enabled);
            self.process_actions(actions);
        }
        match QuestionEngine::load(&config) {
            Ok(engine) => self.quiz.replace_engine(engine),
            Err(e) => warn!(error = %format!("{:#}", e), "keeping previous questions"),
        }
        self.quiz.apply_config(&config.quiz);
        // Only an edit to quiz.mode itself overrides a toggled mode.
        if config.quiz.mode != self.config.quiz.mode {
            self.quiz.set_mode(config.quiz.mode);
        }
        self.pointer.set_bounds(config.screen.width, config.screen.height);
        self.move_throttle
            .set_interval(Duration::from_millis(config.activity.mouse_move_throttle_ms));

        let tick_changed = config.general.tick_ms != self.config.general.tick_ms;
        let tick_ms = config.general.tick_ms;
        self.config = config;
        info!("config reloaded");
        tick_changed.then_some(tick_ms)
    }
}

fn send_ack(reply: &mpsc::UnboundedSender<String>, ok: bool, message: &str) {
    let ack = DaemonMsg::Ack {
        ok,
        message: message.to_string(),
    };
    let _ = reply.send(ipc::encode(&ack));
}

async fn handle_ipc_client(stream: UnixStream, cmd_tx: mpsc::UnboundedSender<Command>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Channel for sending messages back to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    // Writer task
    let write_handle = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            if writer.write_all(line.as_bytes()).await.is_err() {
                break;
            }
        }
    });

    while let Ok(Some(line)) = lines.next_line().await {
        let Some(msg) = ipc::decode_client(&line) else {
            debug!(line = %line.trim(), "ignoring undecodable IPC line");
            continue;
        };
        let cmd = Command {
            msg,
            reply: tx.clone(),
        };
        if cmd_tx.send(cmd).is_err() {
            break;
        }
    }

    // Dropping our sender lets the event loop notice the closed overlay on
    // its next broadcast.
    drop(tx);
    write_handle.abort();
}
