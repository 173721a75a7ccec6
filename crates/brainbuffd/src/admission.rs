use crate::activity::ActivityWindow;
use brainbuff_core::config::Config;
use brainbuff_core::geometry::Rect;
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Trailing window the hourly popup cap is counted over.
pub const POPUP_HISTORY_WINDOW: Duration = Duration::from_secs(3600);

/// Tunables read by the controller on every tick. Replacing them between
/// ticks takes effect immediately and keeps all recorded history.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionSettings {
    pub activity_window: Duration,
    pub low_activity_threshold: usize,
    pub spike_threshold: usize,
    pub cooldown: Duration,
    pub snooze: Duration,
    pub max_popups_per_hour: usize,
    /// A freshly shown popup cannot be spike-hidden before this has passed.
    pub spike_grace: Duration,
    pub answer_dismiss_delay: Duration,
}

impl AdmissionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            activity_window: Duration::from_secs(config.activity.window_sec),
            low_activity_threshold: config.activity.low_threshold as usize,
            spike_threshold: config.activity.spike_threshold as usize,
            cooldown: Duration::from_secs(config.popup.cooldown_sec),
            snooze: Duration::from_secs(config.popup.snooze_minutes.saturating_mul(60)),
            max_popups_per_hour: config.popup.max_per_hour as usize,
            spike_grace: Duration::from_millis(config.popup.spike_grace_ms),
            answer_dismiss_delay: Duration::from_millis(config.popup.auto_dismiss_after_answer_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Overlay {
    Hidden,
    Visible {
        shown_at: Instant,
        /// Set once the user answered; the card stays up to show feedback.
        dismiss_at: Option<Instant>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Snooze {
    Off,
    Until(Instant),
    /// The snooze period does not fit in an `Instant`.
    Indefinite,
}

/// Why a visible popup was hidden.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideReason {
    Spike,
    Snoozed,
    Dismissed,
    Answered,
    Disabled,
}

/// Actions the controller wants the event loop to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Pick a question and show the overlay.
    ShowPopup,
    HidePopup(HideReason),
}

/// The first gate that declined a popup on this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Blocker {
    NotIdle { count: usize },
    Cooldown,
    Snoozed,
    HourlyCap,
}

/// Decides when a quiz popup may appear and when a visible one must go.
///
/// Owned by the event loop; input producers never touch it directly.
pub struct AdmissionController {
    settings: AdmissionSettings,
    enabled: bool,
    activity: ActivityWindow,
    last_popup: Option<Instant>,
    snooze: Snooze,
    history: VecDeque<Instant>,
    overlay: Overlay,
    overlay_rect: Option<Rect>,
    /// Estimated pointer position, integrated from raw motion.
    pointer: Option<(i32, i32)>,
    /// Enter/leave as reported by the overlay; overrides the estimate.
    hover: Option<bool>,
}

impl AdmissionController {
    pub fn new(settings: AdmissionSettings, enabled: bool) -> Self {
        Self {
            settings,
            enabled,
            activity: ActivityWindow::default(),
            last_popup: None,
            snooze: Snooze::Off,
            history: VecDeque::new(),
            overlay: Overlay::Hidden,
            overlay_rect: None,
            pointer: None,
            hover: None,
        }
    }

    pub fn settings(&self) -> &AdmissionSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: AdmissionSettings) {
        self.settings = settings;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Disabling hides a visible popup; admission stops until re-enabled.
    pub fn set_enabled(&mut self, enabled: bool) -> Vec<Action> {
        self.enabled = enabled;
        if !enabled && self.is_visible() {
            return self.hide(HideReason::Disabled);
        }
        Vec::new()
    }

    pub fn is_visible(&self) -> bool {
        matches!(self.overlay, Overlay::Visible { .. })
    }

    /// Record one qualifying input. Recording continues while a popup is
    /// visible so renewed activity can hide it.
    pub fn record_input(&mut self, now: Instant) {
        self.activity.record(now);
    }

    pub fn set_overlay_rect(&mut self, rect: Rect) {
        if self.is_visible() {
            self.overlay_rect = Some(rect);
        }
    }

    pub fn set_pointer(&mut self, x: i32, y: i32) {
        self.pointer = Some((x, y));
    }

    /// Overlay report: the pointer entered (`true`) or left the card.
    pub fn set_hover(&mut self, over: bool) {
        if self.is_visible() {
            self.hover = Some(over);
        }
    }

    pub fn pointer_over_overlay(&self) -> bool {
        let Some(rect) = self.overlay_rect else {
            return false;
        };
        match (self.hover, self.pointer) {
            (Some(over), _) => over,
            (None, Some((x, y))) => rect.contains(x, y),
            (None, None) => false,
        }
    }

    /// Evaluate all gates against a single `now`.
    pub fn tick(&mut self, now: Instant) -> Vec<Action> {
        let count = self.activity.count(now, self.settings.activity_window);
        self.evict_history(now);

        if let Overlay::Visible { shown_at, dismiss_at } = self.overlay {
            if dismiss_at.is_some_and(|at| now >= at) {
                return self.hide(HideReason::Answered);
            }
            if self.spike_detected(now, shown_at, count) {
                debug!(count, "activity spike while popup visible");
                return self.hide(HideReason::Spike);
            }
            return Vec::new();
        }

        if !self.enabled {
            return Vec::new();
        }

        if let Some(blocker) = self.blocker(now, count) {
            trace!(?blocker, count, "popup declined");
            return Vec::new();
        }

        self.last_popup = Some(now);
        self.history.push_back(now);
        self.overlay = Overlay::Visible {
            shown_at: now,
            dismiss_at: None,
        };
        debug!(count, popups_last_hour = self.history.len(), "popup admitted");
        vec![Action::ShowPopup]
    }

    /// Hide any visible popup and suppress admission for the snooze period.
    pub fn snooze(&mut self, now: Instant) -> Vec<Action> {
        self.snooze = match now.checked_add(self.settings.snooze) {
            Some(until) => Snooze::Until(until),
            None => Snooze::Indefinite,
        };
        debug!(secs = self.settings.snooze.as_secs(), "snoozed");
        if self.is_visible() {
            return self.hide(HideReason::Snoozed);
        }
        Vec::new()
    }

    pub fn dismiss(&mut self) -> Vec<Action> {
        if self.is_visible() {
            return self.hide(HideReason::Dismissed);
        }
        Vec::new()
    }

    /// The user answered: keep the card up for the feedback delay, then hide
    /// it on a later tick. Returns false if no popup is visible.
    pub fn answered(&mut self, now: Instant) -> bool {
        match &mut self.overlay {
            Overlay::Visible { dismiss_at, .. } => {
                if dismiss_at.is_none() {
                    *dismiss_at = Some(now + self.settings.answer_dismiss_delay);
                }
                true
            }
            Overlay::Hidden => false,
        }
    }

    pub fn popups_last_hour(&self, now: Instant) -> usize {
        self.history
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) <= POPUP_HISTORY_WINDOW)
            .count()
    }

    pub fn snooze_remaining(&self, now: Instant) -> Duration {
        match self.snooze {
            Snooze::Off => Duration::ZERO,
            Snooze::Until(until) => until.saturating_duration_since(now),
            Snooze::Indefinite => Duration::MAX,
        }
    }

    #[cfg(test)]
    pub fn activity_count(&mut self, now: Instant) -> usize {
        self.activity.count(now, self.settings.activity_window)
    }

    fn evict_history(&mut self, now: Instant) {
        while let Some(&oldest) = self.history.front() {
            if now.saturating_duration_since(oldest) > POPUP_HISTORY_WINDOW {
                self.history.pop_front();
            } else {
                break;
            }
        }
    }

    /// All gates must pass; the first failing one is reported.
    fn blocker(&self, now: Instant, count: usize) -> Option<Blocker> {
        if count > self.settings.low_activity_threshold {
            return Some(Blocker::NotIdle { count });
        }
        // Never shown counts as cooled down.
        if self
            .last_popup
            .is_some_and(|last| now.saturating_duration_since(last) < self.settings.cooldown)
        {
            return Some(Blocker::Cooldown);
        }
        let snoozed = match self.snooze {
            Snooze::Off => false,
            Snooze::Until(until) => now < until,
            Snooze::Indefinite => true,
        };
        if snoozed {
            return Some(Blocker::Snoozed);
        }
        if self.history.len() >= self.settings.max_popups_per_hour {
            return Some(Blocker::HourlyCap);
        }
        None
    }

    fn spike_detected(&self, now: Instant, shown_at: Instant, count: usize) -> bool {
        if self.pointer_over_overlay() {
            return false;
        }
        if now.saturating_duration_since(shown_at) < self.settings.spike_grace {
            return false;
        }
        count >= self.settings.spike_threshold
    }

    fn hide(&mut self, reason: HideReason) -> Vec<Action> {
        self.overlay = Overlay::Hidden;
        self.overlay_rect = None;
        self.hover = None;
        debug!(?reason, "popup hidden");
        vec![Action::HidePopup(reason)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn at(t0: Instant, secs: f64) -> Instant {
        t0 + Duration::from_secs_f64(secs)
    }

    fn settings() -> AdmissionSettings {
        AdmissionSettings::from_config(&Config::default())
    }

    fn make_ctl(settings: AdmissionSettings) -> AdmissionController {
        AdmissionController::new(settings, true)
    }

    fn shows(actions: &[Action]) -> bool {
        actions.contains(&Action::ShowPopup)
    }

    fn hidden_by(actions: &[Action], reason: HideReason) -> bool {
        actions.contains(&Action::HidePopup(reason))
    }

    fn record_n(ctl: &mut AdmissionController, now: Instant, n: usize) {
        for _ in 0..n {
            ctl.record_input(now);
        }
    }

    // --- settings from config ---

    #[test]
    fn settings_convert_units() {
        let s = settings();
        assert_eq!(s.activity_window, Duration::from_secs(8));
        assert_eq!(s.snooze, Duration::from_secs(600));
        assert_eq!(s.spike_grace, Duration::from_secs(2));
        assert_eq!(s.answer_dismiss_delay, Duration::from_millis(1200));
    }

    // --- Scenario A: first popup on low activity ---

    #[test]
    fn first_popup_shows_when_idle() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        record_n(&mut ctl, t0, 3);

        let actions = ctl.tick(at(t0, 1.0));
        assert!(shows(&actions), "3 inputs <= 6 with no prior popup should admit");
        assert!(ctl.is_visible());
    }

    #[test]
    fn busy_user_is_not_interrupted() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        record_n(&mut ctl, t0, 7);

        assert!(ctl.tick(at(t0, 1.0)).is_empty());
        assert_eq!(ctl.blocker(at(t0, 1.0), 7), Some(Blocker::NotIdle { count: 7 }));
    }

    #[test]
    fn threshold_is_inclusive() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        record_n(&mut ctl, t0, 6);
        assert!(shows(&ctl.tick(at(t0, 1.0))));
    }

    #[test]
    fn no_second_popup_while_visible() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        assert!(ctl.tick(at(t0, 100.0)).is_empty());
    }

    // --- Scenarios B/C: spike hide and grace period ---

    #[test]
    fn spike_inside_grace_period_keeps_popup() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        record_n(&mut ctl, t0, 3);
        assert!(shows(&ctl.tick(at(t0, 1.0))));

        record_n(&mut ctl, at(t0, 2.0), 20);
        let actions = ctl.tick(at(t0, 2.0));
        assert!(actions.is_empty(), "grace period must block spike hide");
        assert!(ctl.is_visible());
    }

    #[test]
    fn spike_after_grace_period_hides_popup() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        record_n(&mut ctl, t0, 3);
        assert!(shows(&ctl.tick(at(t0, 1.0))));
        record_n(&mut ctl, at(t0, 2.0), 20);
        ctl.tick(at(t0, 2.0));

        let actions = ctl.tick(at(t0, 3.5));
        assert!(hidden_by(&actions, HideReason::Spike));
        assert!(!ctl.is_visible());
    }

    #[test]
    fn moderate_activity_does_not_hide() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        record_n(&mut ctl, at(t0, 3.0), 13);
        assert!(ctl.tick(at(t0, 3.0)).is_empty());
    }

    // --- pointer over popup ---

    #[test]
    fn pointer_over_popup_blocks_spike_hide() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.set_overlay_rect(Rect::new(600, 300, 700, 400));
        ctl.set_pointer(650, 350);

        record_n(&mut ctl, at(t0, 5.0), 50);
        assert!(ctl.tick(at(t0, 5.0)).is_empty());
        assert!(ctl.is_visible());

        ctl.set_pointer(10, 10);
        assert!(hidden_by(&ctl.tick(at(t0, 5.2)), HideReason::Spike));
    }

    #[test]
    fn overlay_leave_report_beats_stale_estimate() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.set_overlay_rect(Rect::new(610, 340, 700, 400));
        ctl.set_pointer(620, 500);
        ctl.set_hover(true);

        // Raw deltas undershoot an accelerated flick off the card.
        ctl.set_pointer(612, 500);
        ctl.set_hover(false);
        assert!(!ctl.pointer_over_overlay());

        record_n(&mut ctl, at(t0, 3.0), 30);
        assert!(hidden_by(&ctl.tick(at(t0, 3.0)), HideReason::Spike));
    }

    #[test]
    fn enter_report_counts_even_if_estimate_is_outside() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.set_overlay_rect(Rect::new(610, 340, 700, 400));
        ctl.set_pointer(0, 0);
        ctl.set_hover(true);
        assert!(ctl.pointer_over_overlay());
    }

    #[test]
    fn hover_reports_are_dropped_on_hide() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.set_overlay_rect(Rect::new(0, 0, 100, 100));
        ctl.set_hover(false);
        ctl.dismiss();
        ctl.set_hover(true);

        assert!(shows(&ctl.tick(at(t0, 60.0))));
        ctl.set_overlay_rect(Rect::new(0, 0, 100, 100));
        ctl.set_pointer(5, 5);
        assert!(ctl.pointer_over_overlay(), "estimate applies until the overlay reports");
    }

    #[test]
    fn overlay_rect_is_forgotten_on_hide() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.set_overlay_rect(Rect::new(0, 0, 100, 100));
        ctl.set_pointer(5, 5);
        assert!(ctl.pointer_over_overlay());

        ctl.dismiss();
        assert!(!ctl.pointer_over_overlay());
        ctl.set_overlay_rect(Rect::new(0, 0, 100, 100));
        assert!(!ctl.pointer_over_overlay(), "rect reports are ignored while hidden");
    }

    // --- cooldown ---

    #[test]
    fn cooldown_blocks_until_elapsed() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.dismiss();

        assert!(ctl.tick(at(t0, 44.9)).is_empty());
        assert_eq!(ctl.blocker(at(t0, 44.9), 0), Some(Blocker::Cooldown));
        assert!(shows(&ctl.tick(at(t0, 45.0))));
    }

    // --- Scenario D: snooze ---

    #[test]
    fn snooze_overrides_low_activity() {
        let t0 = Instant::now();
        let mut s = settings();
        s.snooze = Duration::from_secs(5 * 60);
        let mut ctl = make_ctl(s);

        ctl.snooze(at(t0, 10.0));
        assert!(ctl.tick(at(t0, 11.0)).is_empty());
        assert!(ctl.tick(at(t0, 309.9)).is_empty());
        assert!(shows(&ctl.tick(at(t0, 310.0))));
    }

    #[test]
    fn snooze_hides_visible_popup() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));

        let actions = ctl.snooze(at(t0, 1.0));
        assert!(hidden_by(&actions, HideReason::Snoozed));
        assert_eq!(ctl.snooze_remaining(at(t0, 1.0)), Duration::from_secs(600));
        assert_eq!(ctl.snooze_remaining(at(t0, 700.0)), Duration::ZERO);
    }

    #[test]
    fn oversized_snooze_saturates_instead_of_panicking() {
        let t0 = Instant::now();
        let mut s = settings();
        s.snooze = Duration::MAX;
        let mut ctl = make_ctl(s);
        assert!(shows(&ctl.tick(t0)));

        assert!(hidden_by(&ctl.snooze(at(t0, 1.0)), HideReason::Snoozed));
        assert_eq!(ctl.snooze_remaining(at(t0, 2.0)), Duration::MAX);
        assert!(ctl.tick(at(t0, 1_000_000.0)).is_empty());
        assert_eq!(ctl.blocker(at(t0, 1_000_000.0), 0), Some(Blocker::Snoozed));
    }

    #[test]
    fn snooze_minutes_conversion_saturates() {
        let mut config = Config::default();
        config.popup.snooze_minutes = u64::MAX;
        assert_eq!(
            AdmissionSettings::from_config(&config).snooze,
            Duration::from_secs(u64::MAX)
        );
    }

    #[test]
    fn snooze_without_popup_emits_nothing() {
        let mut ctl = make_ctl(settings());
        assert!(ctl.snooze(Instant::now()).is_empty());
    }

    // --- Scenario E: hourly cap ---

    #[test]
    fn hourly_cap_refuses_then_recovers() {
        let t0 = Instant::now();
        let mut s = settings();
        s.max_popups_per_hour = 2;
        let mut ctl = make_ctl(s);

        assert!(shows(&ctl.tick(t0)));
        ctl.dismiss();
        assert!(shows(&ctl.tick(at(t0, 100.0))));
        ctl.dismiss();

        assert!(ctl.tick(at(t0, 200.0)).is_empty());
        assert_eq!(ctl.blocker(at(t0, 200.0), 0), Some(Blocker::HourlyCap));
        assert_eq!(ctl.popups_last_hour(at(t0, 200.0)), 2);

        assert!(shows(&ctl.tick(at(t0, 3601.0))));
    }

    #[test]
    fn lowering_cap_applies_on_next_tick() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));
        ctl.dismiss();

        let mut s = settings();
        s.max_popups_per_hour = 1;
        ctl.set_settings(s);
        assert!(ctl.tick(at(t0, 60.0)).is_empty());
    }

    // --- answer / dismiss / enable ---

    #[test]
    fn answered_popup_hides_after_delay() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));

        assert!(ctl.answered(at(t0, 3.0)));
        assert!(ctl.tick(at(t0, 4.0)).is_empty());
        // A second answer does not push the deadline back.
        assert!(ctl.answered(at(t0, 4.1)));
        assert!(hidden_by(&ctl.tick(at(t0, 4.3)), HideReason::Answered));
    }

    #[test]
    fn answer_without_popup_is_ignored() {
        let mut ctl = make_ctl(settings());
        assert!(!ctl.answered(Instant::now()));
    }

    #[test]
    fn disabling_hides_and_blocks() {
        let t0 = Instant::now();
        let mut ctl = make_ctl(settings());
        assert!(shows(&ctl.tick(t0)));

        let actions = ctl.set_enabled(false);
        assert!(hidden_by(&actions, HideReason::Disabled));
        assert!(ctl.tick(at(t0, 1000.0)).is_empty());

        ctl.set_enabled(true);
        assert!(shows(&ctl.tick(at(t0, 1001.0))));
    }

    #[test]
    fn dismiss_when_hidden_is_a_no_op() {
        let mut ctl = make_ctl(settings());
        assert!(ctl.dismiss().is_empty());
    }

    // --- properties ---

    proptest! {
        #[test]
        fn no_admission_inside_cooldown(
            cooldown in 1u64..120,
            mut ticks in prop::collection::vec(0u64..600_000, 1..200),
        ) {
            ticks.sort_unstable();
            let t0 = Instant::now();
            let mut s = settings();
            s.cooldown = Duration::from_secs(cooldown);
            s.max_popups_per_hour = usize::MAX;
            let mut ctl = make_ctl(s);

            let mut admitted: Vec<Instant> = Vec::new();
            for ms in ticks {
                let now = t0 + Duration::from_millis(ms);
                if shows(&ctl.tick(now)) {
                    admitted.push(now);
                    ctl.dismiss();
                }
            }
            for pair in admitted.windows(2) {
                prop_assert!(pair[1] - pair[0] >= Duration::from_secs(cooldown));
            }
        }

        #[test]
        fn hourly_cap_holds_over_any_trailing_hour(
            max in 1usize..6,
            mut ticks in prop::collection::vec(0u64..10_000, 1..300),
        ) {
            ticks.sort_unstable();
            let t0 = Instant::now();
            let mut s = settings();
            s.cooldown = Duration::ZERO;
            s.max_popups_per_hour = max;
            let mut ctl = make_ctl(s);

            let mut admitted: Vec<Instant> = Vec::new();
            for secs in ticks {
                let now = t0 + Duration::from_secs(secs);
                if shows(&ctl.tick(now)) {
                    admitted.push(now);
                    ctl.dismiss();
                }
            }
            for &end in &admitted {
                let in_window = admitted
                    .iter()
                    .filter(|&&t| t <= end && end - t <= POPUP_HISTORY_WINDOW)
                    .count();
                prop_assert!(in_window <= max);
            }
        }
    }
}
