use brainbuff_core::config;
use brainbuff_core::ipc::{self, ClientMsg, DaemonMsg};
use anyhow::{Context, Result};
use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::rc::Rc;
use std::sync::mpsc as std_mpsc;
use tracing::{info, warn};

/// Write half of the daemon connection, shared by the GTK callbacks.
#[derive(Clone)]
pub struct IpcWriter {
    stream: Rc<RefCell<UnixStream>>,
}

impl IpcWriter {
    /// Fire-and-forget; a dead daemon only produces a warning.
    pub fn send(&self, msg: &ClientMsg) {
        let line = ipc::encode(msg);
        if let Err(e) = self.stream.borrow_mut().write_all(line.as_bytes()) {
            warn!(error = %e, "IPC write error");
        }
    }
}

/// Connect to the daemon and register as an overlay client.
/// Returns a receiver for daemon messages and the write half.
pub fn connect() -> Result<(std_mpsc::Receiver<DaemonMsg>, IpcWriter)> {
    let socket_path = config::socket_path();
    let stream = UnixStream::connect(&socket_path)
        .with_context(|| format!("connecting to {}", socket_path.display()))?;

    let mut write_stream = stream.try_clone().context("cloning stream")?;

    let register = ipc::encode(&ClientMsg::RegisterOverlay);
    write_stream
        .write_all(register.as_bytes())
        .context("sending register")?;

    let (tx, rx) = std_mpsc::channel();

    let read_stream = stream;
    std::thread::spawn(move || {
        let reader = BufReader::new(read_stream);
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if let Some(msg) = ipc::decode_daemon(&line) {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "IPC read error");
                    break;
                }
            }
        }
        info!("IPC reader thread exiting");
    });

    let writer = IpcWriter {
        stream: Rc::new(RefCell::new(write_stream)),
    };
    Ok((rx, writer))
}
