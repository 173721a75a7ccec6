mod ipc_client;
mod layer_shell;
mod window;

use brainbuff_core::config::Config;
use brainbuff_core::geometry::Rect;
use brainbuff_core::ipc::{ClientMsg, DaemonMsg};
use gtk4::glib;
use gtk4::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("brainbuff_overlay=info")),
        )
        .init();

    info!("brainbuff-overlay starting");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "invalid config, using defaults for layout");
            Config::default()
        }
    };
    let popup = config.popup;

    let app = gtk4::Application::builder()
        .flags(gtk4::gio::ApplicationFlags::NON_UNIQUE)
        .build();

    app.connect_activate(move |app| {
        let quiz = Rc::new(window::build_window(app, &popup));

        // Connect to daemon IPC
        let (rx, writer) = match ipc_client::connect() {
            Ok(conn) => {
                info!("connected to brainbuffd");
                conn
            }
            Err(e) => {
                warn!(error = %e, "failed to connect to daemon, running in standalone mode");
                return;
            }
        };

        let rect: Rc<Cell<Option<Rect>>> = Rc::new(Cell::new(None));

        for (i, button) in quiz.choices.iter().enumerate() {
            let writer = writer.clone();
            let index = (i + 1) as u8;
            button.connect_clicked(move |_| {
                writer.send(&ClientMsg::Answer { index });
            });
        }

        // Right click anywhere on the card dismisses it
        let dismiss = gtk4::GestureClick::new();
        dismiss.set_button(gtk4::gdk::BUTTON_SECONDARY);
        {
            let writer = writer.clone();
            dismiss.connect_pressed(move |_, _, _, _| {
                writer.send(&ClientMsg::Dismiss);
            });
        }
        quiz.window.add_controller(dismiss);

        // Enter, motion and leave on the card are authoritative for hover;
        // the daemon's own estimate only integrates raw deltas.
        let motion = gtk4::EventControllerMotion::new();
        let report_pointer = {
            let writer = writer.clone();
            let rect = Rc::clone(&rect);
            move |x: f64, y: f64| {
                if let Some(r) = rect.get() {
                    writer.send(&ClientMsg::Pointer {
                        x: r.x + x as i32,
                        y: r.y + y as i32,
                    });
                }
            }
        };
        {
            let report_pointer = report_pointer.clone();
            motion.connect_enter(move |_, x, y| report_pointer(x, y));
        }
        motion.connect_motion(move |_, x, y| report_pointer(x, y));
        {
            let writer = writer.clone();
            let rect = Rc::clone(&rect);
            motion.connect_leave(move |_| {
                if rect.get().is_some() {
                    writer.send(&ClientMsg::PointerLeft);
                }
            });
        }
        quiz.window.add_controller(motion);

        // Poll IPC messages on the GTK main loop
        let popup = popup.clone();
        glib::timeout_add_local(Duration::from_millis(16), move || {
            while let Ok(msg) = rx.try_recv() {
                match msg {
                    DaemonMsg::ShowQuestion {
                        card,
                        source,
                        mode,
                        snooze_minutes,
                    } => {
                        window::show_question(&quiz, &card, source, mode, snooze_minutes);
                        let placed = window::card_rect(&popup);
                        rect.set(placed);
                        match placed {
                            Some(r) => writer.send(&ClientMsg::Geometry { rect: r }),
                            None => warn!("no monitor geometry, pointer hover disabled"),
                        }
                    }
                    DaemonMsg::Feedback {
                        correct,
                        explanation,
                    } => {
                        window::show_feedback(&quiz, correct, &explanation);
                    }
                    DaemonMsg::ModeChanged { mode } => {
                        window::flash_mode(&quiz, mode);
                    }
                    DaemonMsg::HideQuestion => {
                        window::hide(&quiz);
                        rect.set(None);
                    }
                    _ => {}
                }
            }
            glib::ControlFlow::Continue
        });
    });

    app.run_with_args::<&str>(&[]);
}
