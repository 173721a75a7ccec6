use crate::config::Config;
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

pub const CHOICE_COUNT: usize = 4;

/// A multiple-choice question as stored in the question bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub difficulty: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub choices: Vec<String>,
    /// 0-indexed into `choices`.
    pub answer_index: usize,
    #[serde(default, deserialize_with = "nullable_string")]
    pub explanation: String,
}

fn nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(d).map(Option::unwrap_or_default)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionError {
    #[error("question text is empty")]
    EmptyQuestion,
    #[error("expected 4 choices, found {0}")]
    ChoiceCount(usize),
    #[error("choice {0} is empty")]
    EmptyChoice(usize),
    #[error("answer_index {0} is out of range")]
    AnswerOutOfRange(usize),
    #[error("topic is empty")]
    EmptyTopic,
    #[error("difficulty is empty")]
    EmptyDifficulty,
}

impl Question {
    pub fn validate(&self) -> Result<(), QuestionError> {
        if self.question.trim().is_empty() {
            return Err(QuestionError::EmptyQuestion);
        }
        if self.choices.len() != CHOICE_COUNT {
            return Err(QuestionError::ChoiceCount(self.choices.len()));
        }
        if let Some(i) = self.choices.iter().position(|c| c.trim().is_empty()) {
            return Err(QuestionError::EmptyChoice(i));
        }
        if self.answer_index >= CHOICE_COUNT {
            return Err(QuestionError::AnswerOutOfRange(self.answer_index));
        }
        if self.topic.trim().is_empty() {
            return Err(QuestionError::EmptyTopic);
        }
        if self.difficulty.trim().is_empty() {
            return Err(QuestionError::EmptyDifficulty);
        }
        Ok(())
    }

    fn trimmed(mut self) -> Self {
        self.topic = self.topic.trim().to_string();
        self.difficulty = self.difficulty.trim().to_string();
        self.question = self.question.trim().to_string();
        self.explanation = self.explanation.trim().to_string();
        self
    }

    /// Parse one record, returning `None` for anything malformed or invalid.
    fn from_value(value: serde_json::Value) -> Option<Self> {
        let q = serde_json::from_value::<Question>(value).ok()?.trimmed();
        q.validate().ok().map(|_| q)
    }

    fn builtin() -> Self {
        Self {
            topic: "General".into(),
            difficulty: "easy".into(),
            question: "Which number is the largest?".into(),
            choices: ["2", "9", "5", "1"].into_iter().map(Into::into).collect(),
            answer_index: 1,
            explanation: "9 is the largest among the options.".into(),
        }
    }
}

/// The part of a question the overlay is allowed to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizCard {
    pub topic: String,
    pub difficulty: String,
    pub prompt: String,
    pub choices: Vec<String>,
}

impl From<&Question> for QuizCard {
    fn from(q: &Question) -> Self {
        Self {
            topic: q.topic.clone(),
            difficulty: q.difficulty.clone(),
            prompt: q.question.clone(),
            choices: q.choices.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QuizMode {
    /// Local question bank only.
    #[default]
    Off,
    /// Previously generated questions from the cache first, then the bank.
    Cache,
}

impl QuizMode {
    pub fn toggled(self) -> Self {
        match self {
            QuizMode::Off => QuizMode::Cache,
            QuizMode::Cache => QuizMode::Off,
        }
    }
}

impl fmt::Display for QuizMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuizMode::Off => f.write_str("off"),
            QuizMode::Cache => f.write_str("cache"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionSource {
    Cache,
    Local,
    Fallback,
}

impl fmt::Display for QuestionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuestionSource::Cache => f.write_str("cache"),
            QuestionSource::Local => f.write_str("local"),
            QuestionSource::Fallback => f.write_str("fallback"),
        }
    }
}

/// Local question bank (`questions.json`, a JSON array of records).
#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
    skipped: usize,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions, skipped: 0 }
    }

    /// A missing file is an empty bank; unreadable or non-array JSON is an
    /// error. Individual bad records are skipped and counted.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading question bank {}", path.display()))?;
        let records: Vec<serde_json::Value> = serde_json::from_str(&contents)
            .with_context(|| format!("{} is not a JSON array", path.display()))?;

        let total = records.len();
        let questions: Vec<Question> = records.into_iter().filter_map(Question::from_value).collect();
        Ok(Self {
            skipped: total - questions.len(),
            questions,
        })
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn choose(&self, rng: &mut impl Rng) -> Option<&Question> {
        self.questions.choose(rng)
    }
}

/// Previously generated questions (`ai_cache.jsonl`, one record per line),
/// indexed by topic and difficulty.
#[derive(Debug, Clone, Default)]
pub struct QuestionCache {
    questions: Vec<Question>,
    index: HashMap<String, Vec<usize>>,
    skipped: usize,
}

fn cache_key(topic: &str, difficulty: &str) -> String {
    format!(
        "{}::{}",
        topic.trim().to_lowercase(),
        difficulty.trim().to_lowercase()
    )
}

impl QuestionCache {
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading question cache {}", path.display()))?;

        let mut cache = Self::default();
        for line in contents.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match serde_json::from_str(line).ok().and_then(Question::from_value) {
                Some(q) => cache.insert(q),
                None => cache.skipped += 1,
            }
        }
        Ok(cache)
    }

    pub fn insert(&mut self, q: Question) {
        let key = cache_key(&q.topic, &q.difficulty);
        self.index.entry(key).or_default().push(self.questions.len());
        self.questions.push(q);
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    pub fn choose(&self, topic: &str, difficulty: &str, rng: &mut impl Rng) -> Option<&Question> {
        let indices = self.index.get(&cache_key(topic, difficulty))?;
        indices.choose(rng).map(|&i| &self.questions[i])
    }
}

/// Picks the next question according to the quiz mode.
#[derive(Debug, Clone)]
pub struct QuestionEngine {
    mode: QuizMode,
    bank: QuestionBank,
    cache: QuestionCache,
}

impl QuestionEngine {
    pub fn new(mode: QuizMode, bank: QuestionBank, cache: QuestionCache) -> Self {
        Self { mode, bank, cache }
    }

    pub fn load(config: &Config) -> Result<Self> {
        let bank = QuestionBank::load_from(&config.bank_path())?;
        let cache = QuestionCache::load_from(&config.cache_path())?;
        Ok(Self::new(config.quiz.mode, bank, cache))
    }

    pub fn mode(&self) -> QuizMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: QuizMode) {
        self.mode = mode;
    }

    pub fn bank(&self) -> &QuestionBank {
        &self.bank
    }

    pub fn cache(&self) -> &QuestionCache {
        &self.cache
    }

    /// Cache mode: cache, then bank, then the built-in question.
    /// Off: bank, then the built-in question.
    pub fn pick(&self, topic: &str, difficulty: &str, rng: &mut impl Rng) -> (Question, QuestionSource) {
        if self.mode == QuizMode::Cache {
            if let Some(q) = self.cache.choose(topic, difficulty, rng) {
                return (q.clone(), QuestionSource::Cache);
            }
        }
        if let Some(q) = self.bank.choose(rng) {
            return (q.clone(), QuestionSource::Local);
        }
        (Question::builtin(), QuestionSource::Fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn question(topic: &str, difficulty: &str, text: &str) -> Question {
        Question {
            topic: topic.into(),
            difficulty: difficulty.into(),
            question: text.into(),
            choices: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            answer_index: 2,
            explanation: String::new(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    // --- validation ---

    #[test]
    fn valid_question_passes() {
        assert_eq!(question("Math", "easy", "1+1?").validate(), Ok(()));
    }

    #[test]
    fn three_choices_rejected() {
        let mut q = question("Math", "easy", "1+1?");
        q.choices.pop();
        assert_eq!(q.validate(), Err(QuestionError::ChoiceCount(3)));
    }

    #[test]
    fn blank_choice_rejected() {
        let mut q = question("Math", "easy", "1+1?");
        q.choices[1] = "  ".into();
        assert_eq!(q.validate(), Err(QuestionError::EmptyChoice(1)));
    }

    #[test]
    fn answer_index_out_of_range_rejected() {
        let mut q = question("Math", "easy", "1+1?");
        q.answer_index = 4;
        assert_eq!(q.validate(), Err(QuestionError::AnswerOutOfRange(4)));
    }

    #[test]
    fn blank_question_and_topic_rejected() {
        assert_eq!(question("Math", "easy", " ").validate(), Err(QuestionError::EmptyQuestion));
        assert_eq!(question("", "easy", "q").validate(), Err(QuestionError::EmptyTopic));
        assert_eq!(question("Math", "", "q").validate(), Err(QuestionError::EmptyDifficulty));
    }

    #[test]
    fn null_explanation_reads_as_empty() {
        let q: Question = serde_json::from_str(
            r#"{"topic":"t","difficulty":"d","question":"q","choices":["1","2","3","4"],"answer_index":0,"explanation":null}"#,
        )
        .unwrap();
        assert_eq!(q.explanation, "");
    }

    // --- bank loading ---

    #[test]
    fn bank_skips_invalid_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(
            &path,
            r#"[
  {"topic":" Math ","difficulty":"easy","question":"2+2?","choices":["3","4","5","22"],"answer_index":1,"explanation":"four"},
  {"topic":"Math","difficulty":"easy","question":"bad","choices":["1","2"],"answer_index":0},
  {"topic":"Math","difficulty":"easy","question":"neg","choices":["1","2","3","4"],"answer_index":-1},
  "not an object"
]"#,
        )
        .unwrap();

        let bank = QuestionBank::load_from(&path).unwrap();
        assert_eq!(bank.len(), 1);
        assert_eq!(bank.skipped(), 3);
        assert_eq!(bank.choose(&mut rng()).unwrap().topic, "Math");
    }

    #[test]
    fn missing_bank_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let bank = QuestionBank::load_from(&dir.path().join("none.json")).unwrap();
        assert!(bank.is_empty());
    }

    #[test]
    fn non_array_bank_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.json");
        std::fs::write(&path, r#"{"question":"x"}"#).unwrap();
        assert!(QuestionBank::load_from(&path).is_err());
    }

    // --- cache ---

    #[test]
    fn cache_lookup_ignores_case_and_whitespace() {
        let mut cache = QuestionCache::default();
        cache.insert(question("Science", "Easy", "Water boils at?"));
        let q = cache.choose(" science ", "EASY", &mut rng()).unwrap();
        assert_eq!(q.question, "Water boils at?");
        assert!(cache.choose("science", "hard", &mut rng()).is_none());
    }

    #[test]
    fn cache_load_skips_bad_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ai_cache.jsonl");
        let good = serde_json::to_string(&question("History", "easy", "Who?")).unwrap();
        std::fs::write(&path, format!("{good}\n\nnot json\n{{\"question\":\"\"}}\n")).unwrap();

        let cache = QuestionCache::load_from(&path).unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.skipped(), 2);
    }

    // --- engine source order ---

    #[test]
    fn cache_mode_prefers_cached_question() {
        let mut cache = QuestionCache::default();
        cache.insert(question("Science", "easy", "cached"));
        let bank = QuestionBank::new(vec![question("Science", "easy", "local")]);
        let engine = QuestionEngine::new(QuizMode::Cache, bank, cache);

        let (q, source) = engine.pick("Science", "easy", &mut rng());
        assert_eq!(source, QuestionSource::Cache);
        assert_eq!(q.question, "cached");
    }

    #[test]
    fn cache_mode_falls_back_to_bank_on_miss() {
        let mut cache = QuestionCache::default();
        cache.insert(question("Science", "easy", "cached"));
        let bank = QuestionBank::new(vec![question("Math", "easy", "local")]);
        let engine = QuestionEngine::new(QuizMode::Cache, bank, cache);

        let (_, source) = engine.pick("History", "easy", &mut rng());
        assert_eq!(source, QuestionSource::Local);
    }

    #[test]
    fn off_mode_never_reads_cache() {
        let mut cache = QuestionCache::default();
        cache.insert(question("Science", "easy", "cached"));
        let engine = QuestionEngine::new(QuizMode::Off, QuestionBank::default(), cache);

        let (q, source) = engine.pick("Science", "easy", &mut rng());
        assert_eq!(source, QuestionSource::Fallback);
        assert_eq!(q.question, "Which number is the largest?");
        assert_eq!(q.validate(), Ok(()));
    }

    #[test]
    fn quiz_card_hides_answer() {
        let card = QuizCard::from(&question("Math", "easy", "1+1?"));
        let json = serde_json::to_string(&card).unwrap();
        assert!(!json.contains("answer_index"));
        assert_eq!(card.choices.len(), CHOICE_COUNT);
    }

    #[test]
    fn mode_toggles_between_off_and_cache() {
        assert_eq!(QuizMode::Off.toggled(), QuizMode::Cache);
        assert_eq!(QuizMode::Cache.toggled(), QuizMode::Off);
    }
}
