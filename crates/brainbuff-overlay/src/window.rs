use brainbuff_core::config::PopupConfig;
use brainbuff_core::geometry::{self, Rect};
use brainbuff_core::question::{QuestionSource, QuizCard, QuizMode, CHOICE_COUNT};
use gtk4::glib;
use gtk4::prelude::*;
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

use crate::layer_shell;

/// Widgets of the quiz card that get updated per question.
pub struct QuizWindow {
    pub window: gtk4::Window,
    title: gtk4::Label,
    meta: gtk4::Label,
    question: gtk4::Label,
    pub choices: Vec<gtk4::Button>,
    hint: gtk4::Label,
    snooze_minutes: Cell<u64>,
    showing_feedback: Cell<bool>,
}

const MODE_FLASH: Duration = Duration::from_millis(900);

/// Build the card window, hidden.
pub fn build_window(app: &gtk4::Application, popup: &PopupConfig) -> QuizWindow {
    let window = gtk4::Window::builder()
        .application(app)
        .title("BrainBuff")
        .decorated(false)
        .resizable(false)
        .default_width(popup.width as i32)
        .default_height(popup.height as i32)
        .build();

    // Try layer-shell first (Sway, Hyprland, KDE Wayland)
    let monitor = monitor(popup.monitor_index);
    layer_shell::try_init_layer_shell(&window, monitor.as_ref(), popup.position, popup.margin_px);

    let title = label("title");
    title.set_text("BrainBuff");
    let meta = label("meta");
    let question = label("question");
    question.set_wrap(true);

    let choices: Vec<gtk4::Button> = (0..CHOICE_COUNT)
        .map(|_| {
            let button = gtk4::Button::with_label("");
            button.add_css_class("choice");
            button
        })
        .collect();

    let hint = label("hint");

    let card = gtk4::Box::new(gtk4::Orientation::Vertical, 10);
    card.add_css_class("card");
    card.append(&title);
    card.append(&meta);
    card.append(&question);
    for button in &choices {
        card.append(button);
    }
    card.append(&hint);

    let css_provider = gtk4::CssProvider::new();
    css_provider.load_from_data(
        "
        window {
            background-color: transparent;
        }
        .card {
            background-color: rgba(18, 18, 18, 0.86);
            border: 1px solid rgba(255, 255, 255, 0.14);
            border-radius: 14px;
            padding: 16px 18px 14px 18px;
        }
        .title { color: white; font-size: 16px; font-weight: bold; }
        .meta { color: rgba(255, 255, 255, 0.67); font-size: 12px; }
        .question { color: white; font-size: 14px; font-weight: 600; padding: 4px 0; }
        .choice {
            color: rgba(255, 255, 255, 0.82);
            font-size: 13px;
            padding: 8px 10px;
            border-radius: 10px;
            background: rgba(255, 255, 255, 0.07);
            border: none;
        }
        .choice:hover { background: rgba(255, 255, 255, 0.14); }
        .hint { color: rgba(255, 255, 255, 0.55); font-size: 12px; }
        ",
    );
    if let Some(display) = gtk4::gdk::Display::default() {
        gtk4::style_context_add_provider_for_display(
            &display,
            &css_provider,
            gtk4::STYLE_PROVIDER_PRIORITY_APPLICATION,
        );
    }

    window.set_child(Some(&card));

    // Start hidden
    window.set_visible(false);

    QuizWindow {
        window,
        title,
        meta,
        question,
        choices,
        hint,
        snooze_minutes: Cell::new(popup.snooze_minutes),
        showing_feedback: Cell::new(false),
    }
}

fn label(class: &str) -> gtk4::Label {
    let label = gtk4::Label::new(None);
    label.set_halign(gtk4::Align::Start);
    label.set_xalign(0.0);
    label.add_css_class(class);
    label
}

/// The configured monitor, or the first one if the index is out of range.
fn monitor(index: u32) -> Option<gtk4::gdk::Monitor> {
    let display = gtk4::gdk::Display::default()?;
    let monitors = display.monitors();
    let item = monitors.item(index).or_else(|| monitors.item(0))?;
    item.downcast::<gtk4::gdk::Monitor>().ok()
}

/// Where the card lands on the configured monitor, in screen coordinates.
pub fn card_rect(popup: &PopupConfig) -> Option<Rect> {
    let area = monitor(popup.monitor_index)?.geometry();
    let screen = Rect::new(area.x(), area.y(), area.width() as u32, area.height() as u32);
    Some(geometry::place_overlay(
        screen,
        popup.width,
        popup.height,
        popup.position,
        popup.margin_px,
    ))
}

pub fn show_question(
    quiz: &QuizWindow,
    card: &QuizCard,
    source: QuestionSource,
    mode: QuizMode,
    snooze_minutes: u64,
) {
    quiz.title.set_text("BrainBuff");
    quiz.meta.set_text(&meta_line(card, source));
    quiz.question.set_text(&card.prompt);
    for (i, button) in quiz.choices.iter().enumerate() {
        match card.choices.get(i) {
            Some(choice) => {
                button.set_label(&format!("{}) {}", i + 1, choice));
                button.set_sensitive(true);
            }
            None => {
                button.set_label("");
                button.set_sensitive(false);
            }
        }
    }
    quiz.hint.set_text(&hint_line(snooze_minutes, mode));
    quiz.snooze_minutes.set(snooze_minutes);
    quiz.showing_feedback.set(false);

    quiz.window.set_visible(true);
    debug!(topic = %card.topic, "question shown");
}

pub fn show_feedback(quiz: &QuizWindow, correct: bool, explanation: &str) {
    quiz.hint.set_text(&feedback_line(correct, explanation));
    quiz.showing_feedback.set(true);
    for button in &quiz.choices {
        button.set_sensitive(false);
    }
}

pub fn hide(quiz: &QuizWindow) {
    quiz.window.set_visible(false);
    debug!("question hidden");
}

/// Briefly show the new question source in the hint line.
pub fn flash_mode(quiz: &Rc<QuizWindow>, mode: QuizMode) {
    let previous = quiz.hint.text().to_string();
    let flash = mode_line(mode);
    quiz.hint.set_text(&flash);

    let quiz = Rc::clone(quiz);
    glib::timeout_add_local_once(MODE_FLASH, move || {
        // Something else rewrote the hint meanwhile.
        if quiz.hint.text().as_str() != flash {
            return;
        }
        if quiz.showing_feedback.get() {
            quiz.hint.set_text(&previous);
        } else {
            quiz.hint.set_text(&hint_line(quiz.snooze_minutes.get(), mode));
        }
    });
}

fn meta_line(card: &QuizCard, source: QuestionSource) -> String {
    format!(
        "Topic: {} • Difficulty: {} • Source: {}",
        card.topic,
        card.difficulty,
        source.to_string().to_uppercase()
    )
}

fn hint_line(snooze_minutes: u64, mode: QuizMode) -> String {
    format!(
        "Click or press 1–4 to answer • F9 snooze {}m • F10 mode {}",
        snooze_minutes,
        mode.to_string().to_uppercase()
    )
}

fn mode_line(mode: QuizMode) -> String {
    format!("Mode: {}", mode.to_string().to_uppercase())
}

fn feedback_line(correct: bool, explanation: &str) -> String {
    let verdict = if correct { "Correct!" } else { "Not quite." };
    if explanation.is_empty() {
        verdict.to_string()
    } else {
        format!("{} {}", verdict, explanation)
    }
}
