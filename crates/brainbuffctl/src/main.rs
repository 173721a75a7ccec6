use brainbuff_core::config::{self, Config};
use brainbuff_core::ipc::{self, ClientMsg, DaemonMsg};
use brainbuff_core::question::QuestionEngine;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

#[derive(Parser)]
#[command(name = "brainbuffctl", about = "Control the brainbuffd daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show daemon status
    Status,
    /// Snooze popups for the configured duration
    Snooze,
    /// Hide the current question
    Dismiss,
    /// Enable popups
    Enable,
    /// Disable popups
    Disable,
    /// Toggle popups on/off
    Toggle,
    /// Switch the question source between off and cache
    Mode,
    /// Validate the config and question files without contacting the daemon
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let msg: ClientMsg = match cli.command {
        Command::Status => ClientMsg::GetStatus,
        Command::Snooze => ClientMsg::Snooze,
        Command::Dismiss => ClientMsg::Dismiss,
        Command::Enable => ClientMsg::Enable,
        Command::Disable => ClientMsg::Disable,
        Command::Toggle => ClientMsg::Toggle,
        Command::Mode => ClientMsg::ToggleMode,
        Command::Check => return check(),
    };

    let socket_path = config::socket_path();
    let stream = UnixStream::connect(&socket_path).with_context(|| {
        format!(
            "connecting to brainbuffd at {}\nIs the daemon running?",
            socket_path.display()
        )
    })?;

    let mut writer = stream.try_clone().context("cloning stream")?;
    let reader = BufReader::new(stream);

    let line = ipc::encode(&msg);
    writer
        .write_all(line.as_bytes())
        .context("sending command")?;

    // Read response
    for line in reader.lines() {
        let line = line.context("reading response")?;
        if let Some(resp) = ipc::decode_daemon(&line) {
            match resp {
                DaemonMsg::Status {
                    enabled,
                    overlay_visible,
                    mode,
                    popups_last_hour,
                    snoozed_for_secs,
                    version,
                } => {
                    println!("brainbuffd v{}", version);
                    println!("  enabled:  {}", enabled);
                    println!("  visible:  {}", overlay_visible);
                    println!("  mode:     {}", mode);
                    println!("  shown/h:  {}", popups_last_hour);
                    if snoozed_for_secs > 0 {
                        println!("  snoozed:  {}s left", snoozed_for_secs);
                    }
                }
                DaemonMsg::Ack { ok, message } => {
                    if ok {
                        println!("{}", message);
                    } else {
                        eprintln!("error: {}", message);
                        std::process::exit(1);
                    }
                }
                _ => continue,
            }
            break;
        }
    }

    Ok(())
}

fn check() -> Result<()> {
    let path = Config::config_path();
    let config = Config::load().with_context(|| format!("checking {}", path.display()))?;
    println!("config ok: {}", path.display());

    let engine = QuestionEngine::load(&config)?;
    println!(
        "bank:  {} questions ({} skipped) from {}",
        engine.bank().len(),
        engine.bank().skipped(),
        config.bank_path().display()
    );
    println!(
        "cache: {} questions ({} skipped) from {}",
        engine.cache().len(),
        engine.cache().skipped(),
        config.cache_path().display()
    );
    Ok(())
}
