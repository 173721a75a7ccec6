use brainbuff_core::config::QuizConfig;
use brainbuff_core::ipc::DaemonMsg;
use brainbuff_core::question::{Question, QuestionEngine, QuizCard, QuizMode};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

/// The question currently on screen and where questions come from.
pub struct QuizSession {
    engine: QuestionEngine,
    topics: Vec<String>,
    difficulty: String,
    current: Option<Question>,
    answered: bool,
}

impl QuizSession {
    pub fn new(mut engine: QuestionEngine, quiz: &QuizConfig) -> Self {
        engine.set_mode(quiz.mode);
        let mut session = Self {
            engine,
            topics: Vec::new(),
            difficulty: String::new(),
            current: None,
            answered: false,
        };
        session.apply_config(quiz);
        session
    }

    /// Topics and difficulty only; the mode is owned by `set_mode` and
    /// `toggle_mode` once the session exists.
    pub fn apply_config(&mut self, quiz: &QuizConfig) {
        self.topics = quiz
            .topics
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        self.difficulty = quiz.difficulty.clone();
    }

    /// Swap in freshly loaded questions, keeping the current mode.
    pub fn replace_engine(&mut self, mut engine: QuestionEngine) {
        engine.set_mode(self.engine.mode());
        self.engine = engine;
    }

    pub fn mode(&self) -> QuizMode {
        self.engine.mode()
    }

    pub fn set_mode(&mut self, mode: QuizMode) {
        if mode != self.engine.mode() {
            self.engine.set_mode(mode);
            info!(%mode, "quiz mode changed");
        }
    }

    pub fn toggle_mode(&mut self) -> QuizMode {
        let mode = self.engine.mode().toggled();
        self.engine.set_mode(mode);
        info!(%mode, "quiz mode changed");
        mode
    }

    /// Pick a question for a random topic and build the message that shows it.
    pub fn next(&mut self, rng: &mut impl Rng, snooze_minutes: u64) -> DaemonMsg {
        let topic = self.topics.choose(rng).map(String::as_str).unwrap_or("General");
        let (question, source) = self.engine.pick(topic, &self.difficulty, rng);
        info!(topic = %question.topic, %source, "showing question");

        let msg = DaemonMsg::ShowQuestion {
            card: QuizCard::from(&question),
            source,
            mode: self.engine.mode(),
            snooze_minutes,
        };
        self.current = Some(question);
        self.answered = false;
        msg
    }

    /// Grade a 1-indexed answer. Only the first answer to a question counts.
    pub fn answer(&mut self, index: u8) -> Option<DaemonMsg> {
        if self.answered {
            return None;
        }
        let question = self.current.as_ref()?;
        let choice = usize::from(index).checked_sub(1)?;
        if choice >= question.choices.len() {
            return None;
        }
        self.answered = true;
        let correct = choice == question.answer_index;
        info!(correct, "question answered");
        Some(DaemonMsg::Feedback {
            correct,
            explanation: question.explanation.clone(),
        })
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.answered = false;
    }
}
