//! Task classification.
//!
//! Maps a free-text message to exactly one [`TaskCategory`] using weighted
//! keyword sets. Single-word keywords match whole tokens; multi-word
//! keywords match as phrases over the token stream. The category with the
//! highest non-zero score wins, ties are broken by category order, and a
//! message that matches nothing is `General`.
//!
//! Classification is a pure function of the message text.

use memoria_core::model::TaskCategory;
use std::collections::BTreeMap;

/// Anything that can label a message with a task category.
pub trait Classifier: Send + Sync {
    fn classify(&self, message: &str) -> TaskCategory;
}

const CODING: &[&str] = &[
    "code", "coding", "function", "functions", "bug", "debug", "compile", "compiler",
    "python", "rust", "javascript", "typescript", "java", "golang", "c++", "c#", "sql",
    "regex", "api", "script", "algorithm", "class", "method", "implement", "refactor",
    "syntax", "program", "programming", "variable", "loop", "array", "html", "css",
    "json", "git", "segfault", "unit test", "stack trace",
];

const COMPLEX_ANALYSIS: &[&str] = &[
    "analyze", "analyse", "analysis", "compare", "comparison", "evaluate", "evaluation",
    "assess", "tradeoff", "tradeoffs", "implications", "strategy", "research", "critique",
    "investigate", "reasoning", "pros and cons", "trade off", "trade offs", "in depth",
    "step by step",
];

const SIMPLE: &[&str] = &[
    "hello", "hi", "hey", "thanks", "thank", "bye", "goodbye", "ok", "okay", "yes",
    "no", "cool", "good morning", "good night", "how are you",
];

const GENERAL: &[&str] = &[
    "what", "who", "where", "when", "how", "explain", "describe", "tell", "summarize",
    "summary", "recommend", "suggest", "help", "remember",
];

/// The default keyword-scoring classifier.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: BTreeMap<TaskCategory, Vec<String>>,
}

impl KeywordClassifier {
    /// An empty classifier; everything classifies as `General` until
    /// keywords are added.
    pub fn empty() -> Self {
        Self {
            keywords: BTreeMap::new(),
        }
    }

    /// Add keywords for a category. Keywords are matched case-insensitively.
    pub fn with_keywords<I, S>(mut self, category: TaskCategory, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.keywords.entry(category).or_default();
        entry.extend(
            words
                .into_iter()
                .map(|w| tokenize(w.as_ref()).join(" "))
                .filter(|w| !w.is_empty()),
        );
        self
    }

    /// Per-category match counts for `message`.
    pub fn scores(&self, message: &str) -> BTreeMap<TaskCategory, usize> {
        let tokens = tokenize(message);
        // Padded so phrase matches land on token boundaries.
        let joined = format!(" {} ", tokens.join(" "));

        self.keywords
            .iter()
            .map(|(category, words)| {
                let score = words
                    .iter()
                    .map(|word| {
                        if word.contains(' ') {
                            joined.matches(&format!(" {word} ")).count()
                        } else {
                            tokens.iter().filter(|t| *t == word).count()
                        }
                    })
                    .sum();
                (*category, score)
            })
            .collect()
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::empty()
            .with_keywords(TaskCategory::Coding, CODING)
            .with_keywords(TaskCategory::ComplexAnalysis, COMPLEX_ANALYSIS)
            .with_keywords(TaskCategory::Simple, SIMPLE)
            .with_keywords(TaskCategory::General, GENERAL)
    }
}

impl Classifier for KeywordClassifier {
    fn classify(&self, message: &str) -> TaskCategory {
        let scores = self.scores(message);
        // BTreeMap iterates in category order, so on equal scores the
        // earlier category is kept.
        let mut best: Option<(TaskCategory, usize)> = None;
        for (category, score) in scores {
            if score == 0 {
                continue;
            }
            match best {
                Some((_, top)) if top >= score => {}
                _ => best = Some((category, score)),
            }
        }
        best.map(|(c, _)| c).unwrap_or(TaskCategory::General)
    }
}

/// Classify with the built-in keyword sets.
pub fn classify(message: &str) -> TaskCategory {
    KeywordClassifier::default().classify(message)
}

/// Lowercase and split on anything that isn't part of a word.
/// `+` and `#` are kept so `c++` and `c#` survive.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#'))
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}
