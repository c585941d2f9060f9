//! Configuration management
//!
//! This module handles loading, validation, and management of the Switchyard
//! configuration. Configuration is stored in TOML format at
//! ~/.switchyard/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level
//! - **backend**: Inference backend URL and timeouts
//! - **routing**: Default/preferred models and size thresholds
//! - **memory**: Branch history capacity
//! - **progress**: Progress record retention
//! - **heuristics**: Keyword lists used by classification and routing
//! - **prompts**: Per-branch system prompts
//!
//! Every section is optional in the file; missing sections and fields take
//! their defaults, so a config file only needs the values it overrides.
//!
//! # Examples
//!
//! ```no_run
//! use switchyard_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Default model: {}", config.routing.default_model);
//! # Ok(())
//! # }
//! ```

use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    #[serde(default)]
    pub core: CoreConfig,

    /// Inference backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Model routing settings
    #[serde(default)]
    pub routing: RoutingConfig,

    /// Conversation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Progress tracking settings
    #[serde(default)]
    pub progress: ProgressConfig,

    /// Keyword lists for classification and routing
    #[serde(default)]
    pub heuristics: HeuristicsConfig,

    /// Branch system prompts
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// Core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Inference backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL for the Ollama API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Timeout for the main chat call (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for auxiliary calls: fast-router check and self-QA (seconds)
    #[serde(default = "default_aux_timeout")]
    pub aux_timeout_secs: u64,

    /// Sampling temperature for the main call, backend default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            aux_timeout_secs: default_aux_timeout(),
            temperature: None,
        }
    }
}

/// Model routing configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Model used when nothing better is available
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Preferred model for general requests
    #[serde(default = "default_general_model")]
    pub general_model: String,

    /// Preferred models for code requests, in priority order
    #[serde(default = "default_preferred_code_models")]
    pub preferred_code_models: Vec<String>,

    /// Largest model size (billions of parameters) the router may pick
    #[serde(default = "default_max_model_size")]
    pub max_model_size_b: f64,

    /// Minimum size (billions of parameters) of a "strong" model
    #[serde(default = "default_strong_min_size")]
    pub strong_min_size_b: f64,

    /// Ask the fast model for a routing hint
    #[serde(default = "default_true")]
    pub fast_router_enabled: bool,

    /// Run the self-QA pre-analysis stage when triggered
    #[serde(default = "default_true")]
    pub self_qa_enabled: bool,

    /// Questions up to this many words are answered by the fastest model
    #[serde(default = "default_quick_question_words")]
    pub quick_question_max_words: usize,

    /// Greetings up to this many words never escalate
    #[serde(default = "default_greeting_words")]
    pub greeting_max_words: usize,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_model: default_model(),
            general_model: default_general_model(),
            preferred_code_models: default_preferred_code_models(),
            max_model_size_b: default_max_model_size(),
            strong_min_size_b: default_strong_min_size(),
            fast_router_enabled: true,
            self_qa_enabled: true,
            quick_question_max_words: default_quick_question_words(),
            greeting_max_words: default_greeting_words(),
        }
    }
}

/// Conversation memory configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Maximum user/assistant pairs kept per branch
    #[serde(default = "default_max_pairs")]
    pub max_pairs: usize,

    /// Pairs of history sent to the backend with each request
    #[serde(default = "default_history_pairs")]
    pub history_pairs: usize,

    /// Maximum characters stored per turn
    #[serde(default = "default_max_turn_chars")]
    pub max_turn_chars: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_pairs: default_max_pairs(),
            history_pairs: default_history_pairs(),
            max_turn_chars: default_max_turn_chars(),
        }
    }
}

/// Progress tracking configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Finished records older than this are evicted (seconds)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
        }
    }
}

/// Keyword lists used by the classifier and the router
///
/// Terms are matched against the lowercased words of a request. A term of
/// several words matches a contiguous word sequence; a term ending in `*`
/// matches any word starting with the stem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    pub search_terms: Vec<String>,
    pub command_prefixes: Vec<String>,
    pub code_terms: Vec<String>,
    pub analysis_terms: Vec<String>,
    pub planning_terms: Vec<String>,
    pub creative_terms: Vec<String>,
    pub vision_terms: Vec<String>,
    pub complex_terms: Vec<String>,
    pub complex_min_words: usize,
    /// Substrings of model names that mark a code-specialised model
    pub coder_name_hints: Vec<String>,
    pub deep_analysis_terms: Vec<String>,
    pub greetings: Vec<String>,
    /// Words allowed after a greeting in a greeting-only message
    pub greeting_fillers: Vec<String>,
    pub self_reference_terms: Vec<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            search_terms: strings(&[
                "search", "google", "look up", "find out", "news", "latest", "weather", "who is",
                "suche", "such nach", "recherchiere", "nachrichten", "neuigkeiten", "wetter",
                "wer ist", "aktuelle",
            ]),
            command_prefixes: strings(&["/", "!"]),
            code_terms: strings(&[
                "code", "coding", "program*", "programm*", "function", "funktion", "bug",
                "debug*", "compile*", "kompil*", "refactor*", "rust", "python", "javascript",
                "typescript", "sql", "api", "rest", "endpoint", "database", "datenbank*", "db",
                "migration", "schema", "script", "skript", "regex", "docker", "git", "class",
                "klasse", "algorithm*", "algorithmus",
            ]),
            analysis_terms: strings(&[
                "analy*", "compare", "vergleich*", "explain", "erklär*", "why", "warum",
                "evaluate", "bewerte*", "calculate", "berechne*", "math*", "statisti*",
            ]),
            planning_terms: strings(&[
                "plan", "planning", "plane", "strategy", "strategie", "roadmap", "schedule",
                "zeitplan", "checklist", "checkliste",
            ]),
            creative_terms: strings(&[
                "story", "geschichte", "poem", "gedicht", "song", "lied", "lyrics", "creative",
                "kreativ*", "imagine", "stell dir vor", "fantasy", "novel", "roman", "joke",
                "witz",
            ]),
            vision_terms: strings(&[
                "image", "bild", "picture", "foto", "photo", "draw", "zeichne", "screenshot",
                "logo", "illustration",
            ]),
            complex_terms: strings(&[
                "architecture", "architektur", "design", "entwerfe", "entwirf", "implement*",
                "implementier*", "migration", "refactor*", "optimi*", "concurren*",
                "distributed", "verteilt*", "security", "sicherheit", "auth", "authentication",
                "authentifizierung", "scalab*", "skalier*", "step by step",
                "schritt für schritt", "in detail", "ausführlich", "detailliert",
            ]),
            complex_min_words: 60,
            coder_name_hints: strings(&[
                "coder", "codellama", "starcoder", "codestral", "devstral", "codegemma", "code",
            ]),
            deep_analysis_terms: strings(&[
                "thorough*", "gründlich*", "exact*", "genau*", "step", "steps", "schritt*",
                "plan", "planen", "strategy", "strategie", "analy*", "check", "prüf*",
                "überprüf*", "detailed", "detailliert", "in depth",
            ]),
            greetings: strings(&[
                "hi", "hello", "hey", "hallo", "moin", "servus", "howdy", "yo", "good morning",
                "good evening", "guten morgen", "guten tag", "guten abend", "thanks",
                "thank you", "danke",
            ]),
            greeting_fillers: strings(&[
                "there", "all", "everyone", "everybody", "folks", "friend", "team", "again",
                "so much", "very much", "a lot", "zusammen", "alle", "leute", "du", "ihr",
                "dir", "euch", "schön", "sehr", "vielmals",
            ]),
            self_reference_terms: strings(&[
                "who are you", "what are you", "what can you do", "which model are you",
                "wer bist du", "was bist du", "was kannst du", "welches modell bist du",
            ]),
        }
    }
}

/// Per-branch system prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptsConfig {
    /// System prompt for the analytical branch
    #[serde(default = "default_analytical_prompt")]
    pub analytical_system: String,

    /// System prompt for the creative branch
    #[serde(default = "default_creative_prompt")]
    pub creative_system: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            analytical_system: default_analytical_prompt(),
            creative_system: default_creative_prompt(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_request_timeout() -> u64 {
    300
}

fn default_aux_timeout() -> u64 {
    30
}

fn default_model() -> String {
    "qwen2.5:7b".to_string()
}

fn default_general_model() -> String {
    "llama3.1:8b".to_string()
}

fn default_preferred_code_models() -> Vec<String> {
    strings(&["qwen2.5-coder:14b", "qwen2.5-coder:7b", "deepseek-coder-v2:16b"])
}

fn default_max_model_size() -> f64 {
    34.0
}

fn default_strong_min_size() -> f64 {
    7.0
}

fn default_quick_question_words() -> usize {
    12
}

fn default_greeting_words() -> usize {
    4
}

fn default_max_pairs() -> usize {
    10
}

fn default_history_pairs() -> usize {
    6
}

fn default_max_turn_chars() -> usize {
    4000
}

fn default_retention_secs() -> u64 {
    600
}

fn default_analytical_prompt() -> String {
    "You are a precise assistant for research, code and analysis. Answer accurately, \
     show your reasoning when it matters and say so when you are unsure."
        .to_string()
}

fn default_creative_prompt() -> String {
    "You are a friendly, creative conversation partner. Keep answers natural and \
     match the user's language and tone."
        .to_string()
}

impl Config {
    /// Load configuration from the default location (~/.switchyard/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, EngineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    /// Create default configuration and save it to `path`
    pub fn create_default(path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let config = Self::default();
        config.validate()?;

        let toml_string = toml::to_string_pretty(&config)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.switchyard/config.toml)
    pub fn default_config_path() -> Result<PathBuf, EngineError> {
        let home = dirs::home_dir()
            .ok_or_else(|| EngineError::Config("Could not determine home directory".to_string()))?;

        Ok(home.join(".switchyard").join("config.toml"))
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Config` describing the first invalid value.
    pub fn validate(&self) -> Result<(), EngineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(EngineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if self.backend.base_url.trim().is_empty() {
            return Err(EngineError::Config("backend.base_url must not be empty".to_string()));
        }
        if self.backend.request_timeout_secs == 0 || self.backend.aux_timeout_secs == 0 {
            return Err(EngineError::Config(
                "backend timeouts must be greater than zero".to_string(),
            ));
        }

        if self.routing.default_model.trim().is_empty() {
            return Err(EngineError::Config(
                "routing.default_model must not be empty".to_string(),
            ));
        }
        if self.routing.strong_min_size_b <= 0.0
            || self.routing.strong_min_size_b > self.routing.max_model_size_b
        {
            return Err(EngineError::Config(
                "routing.strong_min_size_b must be positive and not exceed max_model_size_b"
                    .to_string(),
            ));
        }

        if self.memory.max_pairs == 0 {
            return Err(EngineError::Config(
                "memory.max_pairs must be at least 1".to_string(),
            ));
        }
        if self.memory.history_pairs > self.memory.max_pairs {
            return Err(EngineError::Config(
                "memory.history_pairs must not exceed memory.max_pairs".to_string(),
            ));
        }
        if self.memory.max_turn_chars == 0 {
            return Err(EngineError::Config(
                "memory.max_turn_chars must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.memory.max_pairs, 10);
        assert_eq!(config.routing.strong_min_size_b, 7.0);
        assert!(config.routing.fast_router_enabled);
        assert!(config.heuristics.command_prefixes.contains(&"/".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let config: Config = toml::from_str(
            r#"
[routing]
default_model = "mistral:7b"

[heuristics]
greetings = ["ahoy"]
"#,
        )
        .unwrap();

        assert_eq!(config.routing.default_model, "mistral:7b");
        assert_eq!(config.routing.general_model, "llama3.1:8b");
        assert_eq!(config.heuristics.greetings, vec!["ahoy".to_string()]);
        // Other lists in a partially specified section keep their defaults
        assert!(!config.heuristics.code_terms.is_empty());
        assert_eq!(config.memory.max_pairs, 10);
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = Config::default();
        config.core.log_level = "loud".to_string();
        assert!(matches!(config.validate(), Err(EngineError::Config(_))));
    }

    #[test]
    fn test_history_pairs_bounded_by_capacity() {
        let mut config = Config::default();
        config.memory.max_pairs = 2;
        config.memory.history_pairs = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_size_thresholds_validated() {
        let mut config = Config::default();
        config.routing.strong_min_size_b = 70.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_default_model_rejected() {
        let mut config = Config::default();
        config.routing.default_model = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_create_default_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let created = Config::create_default(&path).unwrap();
        assert!(path.exists());

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(created, loaded);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[memory\nmax_pairs = ").unwrap();

        let err = Config::load_from_path(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }
}
