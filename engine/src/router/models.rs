//! Model pool
//!
//! Size-aware view over the models the backend advertises. Sizes come from
//! the model name alone (`qwen2.5-coder:14b` is 14B, `mixtral:8x7b` is 56B).
//! A name without a size token has an unknown size, which sorts last when
//! looking for the fastest model and is left out of size-bounded searches.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::OnceLock;

use crate::llm::ModelInfo;

fn size_token_regex() -> &'static Regex {
    static SIZE_TOKEN: OnceLock<Regex> = OnceLock::new();
    SIZE_TOKEN.get_or_init(|| {
        Regex::new(r"^(?:(\d+)x)?(\d+(?:\.\d+)?)b$").expect("Invalid regex")
    })
}

/// Parse the parameter count in billions from a model name
///
/// The name is split on anything except letters, digits and `.`; the last
/// token shaped like `14b`, `3.8b` or `8x7b` wins.
pub fn extract_size_hint(name: &str) -> Option<f64> {
    let lowered = name.to_lowercase();
    let regex = size_token_regex();

    lowered
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
        .filter_map(|token| {
            let caps = regex.captures(token)?;
            let size: f64 = caps.get(2)?.as_str().parse().ok()?;
            let experts: f64 = match caps.get(1) {
                Some(m) => m.as_str().parse().ok()?,
                None => 1.0,
            };
            Some(size * experts)
        })
        .last()
}

/// One available model
#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub name: String,
    pub size_b: Option<f64>,
}

impl PoolEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let size_b = extract_size_hint(&name);
        Self { name, size_b }
    }
}

/// Inclusive size window, in billions of parameters
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SizeBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl SizeBounds {
    /// No bounds at all
    pub fn any() -> Self {
        Self::default()
    }

    /// At most `max`
    pub fn capped(max: f64) -> Self {
        Self {
            min: None,
            max: Some(max),
        }
    }

    /// Between `min` and `max`
    pub fn between(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    fn contains(&self, size: f64) -> bool {
        self.min.map_or(true, |min| size >= min) && self.max.map_or(true, |max| size <= max)
    }
}

/// Ordered set of available models
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelPool {
    entries: Vec<PoolEntry>,
}

impl ModelPool {
    /// Build a pool, keeping the given order and dropping blanks and duplicates
    pub fn new<S: AsRef<str>>(names: &[S]) -> Self {
        let mut entries: Vec<PoolEntry> = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() || entries.iter().any(|e| e.name == name) {
                continue;
            }
            entries.push(PoolEntry::new(name));
        }
        Self { entries }
    }

    pub fn from_infos(models: &[ModelInfo]) -> Self {
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        Self::new(names.as_slice())
    }

    pub fn entries(&self) -> &[PoolEntry] {
        &self.entries
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find a model by name
    ///
    /// Tries an exact match, then a case-insensitive one, then `name:latest`.
    pub fn resolve(&self, name: &str) -> Option<&PoolEntry> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|e| e.name == name)
            .or_else(|| self.entries.iter().find(|e| e.name.eq_ignore_ascii_case(name)))
            .or_else(|| {
                if name.contains(':') {
                    return None;
                }
                let tagged = format!("{}:latest", name);
                self.entries
                    .iter()
                    .find(|e| e.name.eq_ignore_ascii_case(&tagged))
            })
    }

    /// Parsed size of a pooled model
    pub fn size_of(&self, name: &str) -> Option<f64> {
        self.resolve(name).and_then(|e| e.size_b)
    }

    /// Smallest model; unknown sizes sort last, ties keep list order
    pub fn fastest(&self) -> Option<&PoolEntry> {
        self.entries.iter().min_by(|a, b| fastest_order(a.size_b, b.size_b))
    }

    /// Largest model inside `bounds`
    pub fn strongest(&self, bounds: SizeBounds) -> Option<&PoolEntry> {
        self.strongest_where(bounds, |_| true)
    }

    /// Largest model inside `bounds` that also satisfies `pred`
    ///
    /// Candidates are stably sorted by size, so equal sizes keep list order.
    /// Models of unknown size are only considered when no lower bound is set
    /// and no sized model qualifies.
    pub fn strongest_where<F>(&self, bounds: SizeBounds, pred: F) -> Option<&PoolEntry>
    where
        F: Fn(&PoolEntry) -> bool,
    {
        let mut sized: Vec<(&PoolEntry, f64)> = self
            .entries
            .iter()
            .filter(|e| pred(*e))
            .filter_map(|e| e.size_b.filter(|s| bounds.contains(*s)).map(|s| (e, s)))
            .collect();
        sized.sort_by(|a, b| b.1.total_cmp(&a.1));

        if let Some((entry, _)) = sized.first() {
            return Some(*entry);
        }

        if bounds.min.is_some() {
            return None;
        }
        self.entries
            .iter()
            .find(|e| e.size_b.is_none() && pred(*e))
    }

    /// First pooled model from a preference list
    ///
    /// An exact case-insensitive match anywhere in the list beats a substring
    /// match. Within each pass the list order decides.
    pub fn find_preferred<S: AsRef<str>>(&self, preferred: &[S]) -> Option<&PoolEntry> {
        let wanted: Vec<String> = preferred
            .iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        wanted
            .iter()
            .find_map(|p| self.entries.iter().find(|e| e.name.to_lowercase() == *p))
            .or_else(|| {
                wanted.iter().find_map(|p| {
                    self.entries
                        .iter()
                        .find(|e| e.name.to_lowercase().contains(p.as_str()))
                })
            })
    }
}

fn fastest_order(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_size_hint() {
        assert_eq!(extract_size_hint("tiny-1b"), Some(1.0));
        assert_eq!(extract_size_hint("qwen2.5-coder:14b"), Some(14.0));
        assert_eq!(extract_size_hint("phi3:3.8b"), Some(3.8));
        assert_eq!(extract_size_hint("qwen2.5:0.5B"), Some(0.5));
        assert_eq!(extract_size_hint("mixtral:8x7b"), Some(56.0));
        assert_eq!(extract_size_hint("llama3.1:8b-instruct-q4_0"), Some(8.0));
        assert_eq!(extract_size_hint("llama3:latest"), None);
        assert_eq!(extract_size_hint("llama3.1"), None);
        assert_eq!(extract_size_hint(""), None);
    }

    #[test]
    fn test_fastest_prefers_smallest_known_size() {
        let pool = ModelPool::new(&["mystery", "general-34b", "tiny-1b", "coder-14b"]);
        assert_eq!(pool.fastest().unwrap().name, "tiny-1b");
    }

    #[test]
    fn test_fastest_ties_keep_list_order() {
        let pool = ModelPool::new(&["b-7b", "a-7b"]);
        assert_eq!(pool.fastest().unwrap().name, "b-7b");
    }

    #[test]
    fn test_fastest_falls_back_to_first_unknown() {
        let pool = ModelPool::new(&["alpha", "beta"]);
        assert_eq!(pool.fastest().unwrap().name, "alpha");
        assert!(ModelPool::default().fastest().is_none());
    }

    #[test]
    fn test_strongest_respects_bounds() {
        let pool = ModelPool::new(&["tiny-1b", "coder-14b", "general-34b", "huge-70b"]);
        assert_eq!(pool.strongest(SizeBounds::capped(34.0)).unwrap().name, "general-34b");
        assert_eq!(pool.strongest(SizeBounds::between(7.0, 20.0)).unwrap().name, "coder-14b");
        assert_eq!(pool.strongest(SizeBounds::any()).unwrap().name, "huge-70b");
        assert!(pool.strongest(SizeBounds::between(80.0, 100.0)).is_none());
    }

    #[test]
    fn test_strongest_ties_keep_list_order() {
        let pool = ModelPool::new(&["first-14b", "second-14b", "small-3b"]);
        assert_eq!(pool.strongest(SizeBounds::any()).unwrap().name, "first-14b");
    }

    #[test]
    fn test_strongest_uses_unknown_sizes_only_without_lower_bound() {
        let pool = ModelPool::new(&["mystery", "tiny-1b"]);
        assert_eq!(pool.strongest(SizeBounds::capped(34.0)).unwrap().name, "tiny-1b");
        assert!(pool.strongest(SizeBounds::between(7.0, 34.0)).is_none());

        let unsized_pool = ModelPool::new(&["mystery"]);
        assert_eq!(unsized_pool.strongest(SizeBounds::capped(34.0)).unwrap().name, "mystery");
    }

    #[test]
    fn test_strongest_where_filters() {
        let pool = ModelPool::new(&["coder-3b", "general-34b", "coder-14b"]);
        let coder = pool
            .strongest_where(SizeBounds::any(), |e| e.name.contains("coder"))
            .unwrap();
        assert_eq!(coder.name, "coder-14b");
    }

    #[test]
    fn test_resolve() {
        let pool = ModelPool::new(&["Coder-14B", "llama3:latest"]);
        assert_eq!(pool.resolve("Coder-14B").unwrap().name, "Coder-14B");
        assert_eq!(pool.resolve("coder-14b").unwrap().name, "Coder-14B");
        assert_eq!(pool.resolve("llama3").unwrap().name, "llama3:latest");
        assert!(pool.resolve("missing").is_none());
        assert!(pool.resolve("  ").is_none());
        assert_eq!(pool.size_of("coder-14b"), Some(14.0));
    }

    #[test]
    fn test_find_preferred_exact_beats_substring() {
        let pool = ModelPool::new(&["qwen2.5-coder:14b-instruct", "qwen2.5-coder:7b"]);
        let preferred = ["qwen2.5-coder:14b", "qwen2.5-coder:7b"];
        // No exact match for the first entry, so the exact second entry wins
        assert_eq!(pool.find_preferred(&preferred).unwrap().name, "qwen2.5-coder:7b");

        let substring_only = ModelPool::new(&["qwen2.5-coder:14b-instruct"]);
        assert_eq!(
            substring_only.find_preferred(&preferred).unwrap().name,
            "qwen2.5-coder:14b-instruct"
        );
        assert!(ModelPool::new(&["llama3.1:8b"]).find_preferred(&preferred).is_none());
    }

    #[test]
    fn test_new_drops_blanks_and_duplicates() {
        let pool = ModelPool::new(&["a-1b", "", "a-1b", " b-2b "]);
        assert_eq!(pool.names(), vec!["a-1b", "b-2b"]);
        assert_eq!(pool.len(), 2);
    }
}
