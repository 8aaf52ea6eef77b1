use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

use super::wildcards::{WildcardError, WildcardSource};

const PLACEHOLDER_PATTERN: &str = r"__([A-Za-z0-9][A-Za-z0-9_\-/]*?)__";

/// Expands `__name__` placeholders in prompt templates.
///
/// The resolver holds no rotation state of its own; every value comes from the
/// wildcard source. Repeated occurrences of one placeholder within a single
/// prompt receive the same value.
pub struct PromptResolver {
    wildcards: Arc<dyn WildcardSource>,
    pattern: Regex,
}

impl PromptResolver {
    pub fn new(wildcards: Arc<dyn WildcardSource>) -> Self {
        Self {
            wildcards,
            pattern: placeholder_regex(),
        }
    }

    /// Distinct placeholder names in `template`, in order of first appearance.
    pub fn placeholders(&self, template: &str) -> Vec<String> {
        placeholders_with(&self.pattern, template)
    }

    /// Resolve `count` prompts, advancing wildcard rotation.
    pub fn resolve(&self, template: &str, count: usize) -> Result<Vec<String>, PromptError> {
        if count == 0 {
            return Err(PromptError::InvalidCount);
        }
        (0..count).map(|_| self.resolve_one(template)).collect()
    }

    /// Resolve a single prompt, advancing wildcard rotation.
    pub fn resolve_one(&self, template: &str) -> Result<String, PromptError> {
        let mut values = HashMap::new();
        for name in self.placeholders(template) {
            let value = self.wildcards.next_value(&name)?;
            values.insert(name, value);
        }
        Ok(self.substitute(template, &values))
    }

    /// Resolve `count` candidate prompts without touching rotation or usage.
    ///
    /// Calling this twice with no production resolution in between returns the
    /// same prompts, and they match what [`resolve`](Self::resolve) will
    /// produce next.
    pub fn preview(&self, template: &str, count: usize) -> Result<Vec<String>, PromptError> {
        if count == 0 {
            return Err(PromptError::InvalidCount);
        }

        let mut columns = HashMap::new();
        for name in self.placeholders(template) {
            let values = self.wildcards.preview_values(&name, count)?;
            columns.insert(name, values);
        }

        let prompts = (0..count)
            .map(|i| {
                let row: HashMap<String, String> = columns
                    .iter()
                    .map(|(name, values)| (name.clone(), values[i].clone()))
                    .collect();
                self.substitute(template, &row)
            })
            .collect();
        Ok(prompts)
    }

    fn substitute(&self, template: &str, values: &HashMap<String, String>) -> String {
        self.pattern
            .replace_all(template, |caps: &regex::Captures| {
                values
                    .get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

/// Distinct placeholder names in `template`, for callers without a resolver.
pub fn placeholders(template: &str) -> Vec<String> {
    placeholders_with(&placeholder_regex(), template)
}

fn placeholders_with(pattern: &Regex, template: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in pattern.captures_iter(template) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

fn placeholder_regex() -> Regex {
    Regex::new(PLACEHOLDER_PATTERN).expect("placeholder pattern is valid")
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt count must be at least 1")]
    InvalidCount,

    #[error(transparent)]
    Wildcard(#[from] WildcardError),
}
