use regex::Regex;

use launchlog_types::{ClassifiedLine, Severity};

/// Display-side filter for console lines
#[derive(Clone)]
pub struct LogFilter {
    /// Regex pattern (if any)
    regex: Option<Regex>,

    /// Original pattern string
    pattern: String,

    /// Lowest severity to show. Channel severities always pass.
    min_level: Option<Severity>,
}

impl LogFilter {
    /// Create a new filter from a pattern string
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, false)
    }

    /// Create a case-insensitive filter
    pub fn new_case_insensitive(pattern: &str) -> Result<Self, regex::Error> {
        Self::build(pattern, true)
    }

    fn build(pattern: &str, case_insensitive: bool) -> Result<Self, regex::Error> {
        let regex = match (pattern.is_empty(), case_insensitive) {
            (true, _) => None,
            (false, true) => Some(Regex::new(&format!("(?i){}", pattern))?),
            (false, false) => Some(Regex::new(pattern)?),
        };

        Ok(Self {
            regex,
            pattern: pattern.to_string(),
            min_level: None,
        })
    }

    /// Only show lines at or above `level`
    pub fn with_min_level(mut self, level: Severity) -> Self {
        self.min_level = Some(level);
        self
    }

    /// Check if a line passes this filter
    pub fn matches(&self, line: &ClassifiedLine) -> bool {
        if let Some(min) = self.min_level {
            if line.severity >= Severity::Trace && line.severity < min {
                return false;
            }
        }

        match &self.regex {
            Some(re) => re.is_match(&line.text),
            None => true,
        }
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.regex.is_none() && self.min_level.is_none()
    }
}

impl std::fmt::Debug for LogFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFilter")
            .field("pattern", &self.pattern)
            .field("min_level", &self.min_level)
            .finish()
    }
}
