use anyhow::{Context, Result};
use evdev::{Device, EventType, InputEvent, Key, RelativeAxisType};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// What a raw evdev event means for activity tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    KeyPress(u16),
    Click,
    Scroll,
    Motion { dx: i32, dy: i32 },
}

/// A classified input, timestamped by the reader task that saw it.
#[derive(Debug, Clone, Copy)]
pub struct InputSignal {
    pub at: Instant,
    pub kind: InputKind,
}

/// Find keyboards and pointing devices under /dev/input/.
pub fn find_input_devices() -> Result<Vec<PathBuf>> {
    let mut devices = Vec::new();
    let input_dir = Path::new("/dev/input");

    for entry in std::fs::read_dir(input_dir).context("reading /dev/input")? {
        let entry = entry?;
        let path = entry.path();

        // Only look at eventN devices
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if !name.starts_with("event") {
            continue;
        }

        match Device::open(&path) {
            Ok(dev) => {
                if is_keyboard(&dev) {
                    info!(path = %path.display(), name = ?dev.name(), "found keyboard");
                    devices.push(path);
                } else if is_pointer(&dev) {
                    info!(path = %path.display(), name = ?dev.name(), "found pointer");
                    devices.push(path);
                }
            }
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping device");
            }
        }
    }

    Ok(devices)
}

/// Heuristic: a device is a keyboard if it has KEY events and supports
/// common letter keys (KEY_A through KEY_Z).
fn is_keyboard(dev: &Device) -> bool {
    let Some(keys) = dev.supported_keys() else {
        return false;
    };

    keys.contains(Key::KEY_A) && keys.contains(Key::KEY_Z) && keys.contains(Key::KEY_ENTER)
}

/// Mice and touchpads: relative X/Y motion plus a left button.
fn is_pointer(dev: &Device) -> bool {
    let (Some(axes), Some(keys)) = (dev.supported_relative_axes(), dev.supported_keys()) else {
        return false;
    };

    axes.contains(RelativeAxisType::REL_X)
        && axes.contains(RelativeAxisType::REL_Y)
        && keys.contains(Key::BTN_LEFT)
}

/// Mouse buttons occupy BTN_MOUSE..BTN_TASK in input-event-codes.h.
fn is_mouse_button(code: u16) -> bool {
    (Key::BTN_LEFT.code()..=Key::BTN_TASK.code()).contains(&code)
}

/// Map an evdev event to an activity kind. Key releases, autorepeat,
/// sync frames and everything else are ignored.
pub fn classify(event: &InputEvent) -> Option<InputKind> {
    let code = event.code();
    let value = event.value();

    match event.event_type() {
        EventType::KEY if value == 1 => {
            if is_mouse_button(code) {
                Some(InputKind::Click)
            } else {
                Some(InputKind::KeyPress(code))
            }
        }
        EventType::RELATIVE if value != 0 => match RelativeAxisType(code) {
            RelativeAxisType::REL_X => Some(InputKind::Motion { dx: value, dy: 0 }),
            RelativeAxisType::REL_Y => Some(InputKind::Motion { dx: 0, dy: value }),
            RelativeAxisType::REL_WHEEL | RelativeAxisType::REL_HWHEEL => Some(InputKind::Scroll),
            _ => None,
        },
        _ => None,
    }
}

/// Read a device and forward classified events to the channel.
///
/// The device is not grabbed: input keeps flowing to the compositor and
/// this task only observes it. Runs until the receiver is dropped or the
/// device errors (e.g. unplugged).
pub async fn watch_device(path: PathBuf, tx: mpsc::UnboundedSender<InputSignal>) -> Result<()> {
    let dev = Device::open(&path).with_context(|| format!("opening {}", path.display()))?;

    let dev_name = dev.name().unwrap_or("unknown").to_string();
    info!(device = %dev_name, path = %path.display(), "watching device");

    let mut stream = dev.into_event_stream().context("creating event stream")?;

    loop {
        match stream.next_event().await {
            Ok(event) => {
                let Some(kind) = classify(&event) else {
                    continue;
                };
                let signal = InputSignal {
                    at: Instant::now(),
                    kind,
                };
                if tx.send(signal).is_err() {
                    // Receiver dropped, shut down
                    break;
                }
            }
            Err(e) => {
                warn!(device = %dev_name, error = %e, "device error, stopping watch");
                break;
            }
        }
    }

    Ok(())
}
