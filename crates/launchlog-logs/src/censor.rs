//! Privacy filtering for console lines.

/// Ordered literal-substring redaction applied to console lines before they
/// are stored.
///
/// Rules run in insertion order and each one sees the output of the rules
/// before it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrivacyFilter {
    rules: Vec<(String, String)>,
}

impl PrivacyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Re-adding an existing original keeps its position and
    /// updates the replacement. Empty originals are ignored.
    pub fn add_rule(&mut self, original: impl Into<String>, replacement: impl Into<String>) {
        let original = original.into();
        if original.is_empty() {
            return;
        }
        let replacement = replacement.into();

        match self.rules.iter_mut().find(|(o, _)| *o == original) {
            Some(rule) => rule.1 = replacement,
            None => self.rules.push((original, replacement)),
        }
    }

    pub fn with_rule(mut self, original: impl Into<String>, replacement: impl Into<String>) -> Self {
        self.add_rule(original, replacement);
        self
    }

    /// Apply every rule to `text`
    pub fn censor(&self, text: &str) -> String {
        let mut out = text.to_string();
        for (original, replacement) in &self.rules {
            if out.contains(original.as_str()) {
                out = out.replace(original.as_str(), replacement);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules.iter().map(|(o, r)| (o.as_str(), r.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for PrivacyFilter
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut filter = Self::new();
        for (original, replacement) in iter {
            filter.add_rule(original, replacement);
        }
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_censor_replaces_all_occurrences() {
        let filter = PrivacyFilter::new().with_rule("Steve", "<PLAYER>");
        assert_eq!(
            filter.censor("Steve joined; welcome Steve"),
            "<PLAYER> joined; welcome <PLAYER>"
        );
    }

    #[test]
    fn test_rules_apply_in_insertion_order() {
        let filter: PrivacyFilter = [("token123", "<TOKEN>"), ("<TOKEN>", "[hidden]")]
            .into_iter()
            .collect();
        assert_eq!(filter.censor("auth token123"), "auth [hidden]");

        let reversed: PrivacyFilter = [("<TOKEN>", "[hidden]"), ("token123", "<TOKEN>")]
            .into_iter()
            .collect();
        assert_eq!(reversed.censor("auth token123"), "auth <TOKEN>");
    }

    #[test]
    fn test_replacement_is_non_overlapping_left_to_right() {
        let filter = PrivacyFilter::new().with_rule("aa", "b");
        assert_eq!(filter.censor("aaa"), "ba");
    }

    #[test]
    fn test_empty_original_is_ignored() {
        let filter = PrivacyFilter::new().with_rule("", "x");
        assert!(filter.is_empty());
        assert_eq!(filter.censor("abc"), "abc");
    }

    #[test]
    fn test_readding_rule_keeps_position() {
        let filter = PrivacyFilter::new()
            .with_rule("a", "1")
            .with_rule("b", "2")
            .with_rule("a", "3");
        let rules: Vec<_> = filter.rules().collect();
        assert_eq!(rules, vec![("a", "3"), ("b", "2")]);
    }
}
