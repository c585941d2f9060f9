//! Keyword heuristics
//!
//! Compiles the keyword lists from `HeuristicsConfig` into matchers and
//! answers the yes/no questions the classifier, router and self-QA stage ask
//! about a request: is it a greeting, does it look complex, does it carry code
//! signals, does it ask for deep analysis.
//!
//! Matching works on words: the text is lowercased and split on anything that
//! is not alphanumeric, so "REST-API" yields `rest` and `api`. A term with
//! several words matches a contiguous run of words. A term ending in `*`
//! matches any word that starts with the stem.

use crate::config::HeuristicsConfig;

/// A single compiled term
#[derive(Debug, Clone, PartialEq, Eq)]
enum Term {
    /// Contiguous word sequence
    Phrase(Vec<String>),
    /// Single-word prefix
    Stem(String),
}

impl Term {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        if let Some(stem) = raw.strip_suffix('*') {
            let stem = stem.trim();
            return (!stem.is_empty()).then(|| Term::Stem(stem.to_string()));
        }
        let words = split_words(&raw);
        (!words.is_empty()).then_some(Term::Phrase(words))
    }

    fn matches(&self, words: &[String]) -> bool {
        match self {
            Term::Stem(stem) => words.iter().any(|w| w.starts_with(stem.as_str())),
            Term::Phrase(phrase) => {
                !phrase.is_empty()
                    && words.len() >= phrase.len()
                    && words.windows(phrase.len()).any(|window| window == phrase.as_slice())
            }
        }
    }

    /// Number of leading words the term consumes
    fn prefix_len(&self, words: &[String]) -> Option<usize> {
        match self {
            Term::Stem(stem) => words
                .first()
                .filter(|w| w.starts_with(stem.as_str()))
                .map(|_| 1),
            Term::Phrase(phrase) => words.starts_with(phrase).then_some(phrase.len()),
        }
    }
}

/// A compiled keyword list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSet {
    terms: Vec<Term>,
}

impl TermSet {
    /// Compile a list of raw terms, skipping empty ones
    pub fn new<S: AsRef<str>>(raw: &[S]) -> Self {
        Self {
            terms: raw.iter().filter_map(|t| Term::parse(t.as_ref())).collect(),
        }
    }

    /// True if any term occurs in `words`
    pub fn matches_any(&self, words: &[String]) -> bool {
        self.terms.iter().any(|t| t.matches(words))
    }

    /// Lengths of every term that matches the start of `words`
    fn prefix_lens<'a>(&'a self, words: &'a [String]) -> impl Iterator<Item = usize> + 'a {
        self.terms.iter().filter_map(move |t| t.prefix_len(words))
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Lowercase and split text into alphanumeric words
pub fn split_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// A request text split once and reused by every check
#[derive(Debug, Clone)]
pub struct RequestText<'a> {
    raw: &'a str,
    words: Vec<String>,
}

impl<'a> RequestText<'a> {
    pub fn new(raw: &'a str) -> Self {
        Self {
            raw,
            words: split_words(raw),
        }
    }

    pub fn raw(&self) -> &'a str {
        self.raw
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    pub fn is_blank(&self) -> bool {
        self.raw.trim().is_empty()
    }
}

/// Compiled heuristics
#[derive(Debug, Clone)]
pub struct Heuristics {
    pub search: TermSet,
    pub code: TermSet,
    pub analysis: TermSet,
    pub planning: TermSet,
    pub creative: TermSet,
    pub vision: TermSet,
    pub complex: TermSet,
    pub deep_analysis: TermSet,
    pub greetings: TermSet,
    pub greeting_fillers: TermSet,
    pub self_reference: TermSet,
    command_prefixes: Vec<String>,
    coder_name_hints: Vec<String>,
    complex_min_words: usize,
}

impl Heuristics {
    pub fn new(config: &HeuristicsConfig) -> Self {
        Self {
            search: TermSet::new(&config.search_terms),
            code: TermSet::new(&config.code_terms),
            analysis: TermSet::new(&config.analysis_terms),
            planning: TermSet::new(&config.planning_terms),
            creative: TermSet::new(&config.creative_terms),
            vision: TermSet::new(&config.vision_terms),
            complex: TermSet::new(&config.complex_terms),
            deep_analysis: TermSet::new(&config.deep_analysis_terms),
            greetings: TermSet::new(&config.greetings),
            greeting_fillers: TermSet::new(&config.greeting_fillers),
            self_reference: TermSet::new(&config.self_reference_terms),
            command_prefixes: config
                .command_prefixes
                .iter()
                .filter(|p| !p.is_empty())
                .cloned()
                .collect(),
            coder_name_hints: config
                .coder_name_hints
                .iter()
                .map(|h| h.trim().to_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
            complex_min_words: config.complex_min_words,
        }
    }

    /// Text starts with an explicit command prefix such as `/`
    pub fn is_command(&self, text: &RequestText<'_>) -> bool {
        let trimmed = text.raw().trim_start();
        self.command_prefixes.iter().any(|p| trimmed.starts_with(p.as_str()))
    }

    /// Short text made of greetings and filler words only
    ///
    /// The text must open with a greeting; every later word has to belong to
    /// another greeting or a filler term ("hey there", "danke schön"). Any
    /// other word makes it a request that merely starts politely.
    pub fn is_greeting(&self, text: &RequestText<'_>, max_words: usize) -> bool {
        let words = text.words();
        if words.is_empty() || words.len() > max_words {
            return false;
        }
        self.greetings
            .prefix_lens(words)
            .any(|n| self.greeting_tail(&words[n..]))
    }

    fn greeting_tail(&self, words: &[String]) -> bool {
        words.is_empty()
            || self
                .greetings
                .prefix_lens(words)
                .chain(self.greeting_fillers.prefix_lens(words))
                .any(|n| self.greeting_tail(&words[n..]))
    }

    /// Keyword or length signal for a request that needs a strong model
    pub fn is_complex(&self, text: &RequestText<'_>) -> bool {
        (self.complex_min_words > 0 && text.word_count() >= self.complex_min_words)
            || self.complex.matches_any(text.words())
    }

    /// Request mentions code, APIs, databases and the like
    pub fn has_code_signals(&self, text: &RequestText<'_>) -> bool {
        text.raw().contains("```") || self.code.matches_any(text.words())
    }

    /// Request explicitly asks for thorough, stepwise or checked work
    pub fn wants_deep_analysis(&self, text: &RequestText<'_>) -> bool {
        self.deep_analysis.matches_any(text.words())
    }

    /// Request is about the assistant itself
    pub fn is_self_reference(&self, text: &RequestText<'_>) -> bool {
        self.self_reference.matches_any(text.words())
    }

    /// Model name carries a coder hint such as "coder" or "codellama"
    pub fn is_coder_model(&self, model: &str) -> bool {
        let name = model.to_lowercase();
        self.coder_name_hints.iter().any(|hint| name.contains(hint.as_str()))
    }
}

impl Default for Heuristics {
    fn default() -> Self {
        Self::new(&HeuristicsConfig::default())
    }
}
