//! Subject extraction from error messages.

use regex::Regex;

/// Extracts the subject of an error message shaped like a known example.
///
/// The example is taken literally except for the placeholder `SUBJECT`,
/// which matches the part to extract.
#[derive(Debug, Clone)]
pub struct SubjectPattern {
    regex: Regex,
}

impl SubjectPattern {
    pub const PLACEHOLDER: &'static str = "SUBJECT";

    /// Builds a pattern from an example message such as
    /// `"name 'SUBJECT' is not defined"`.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error for pathological examples.
    pub fn from_example(example: &str) -> Result<Self, regex::Error> {
        let escaped = regex::escape(example);
        let pattern = escaped.replacen(Self::PLACEHOLDER, "(?P<subject>.+?)", 1);
        Ok(Self {
            regex: Regex::new(&format!("^{pattern}$"))?,
        })
    }

    /// Builds every pattern in `examples`, skipping any that fail to compile.
    #[must_use]
    pub fn all(examples: &[&str]) -> Vec<Self> {
        examples
            .iter()
            .filter_map(|example| Self::from_example(example).ok())
            .collect()
    }

    #[must_use]
    pub fn extract(&self, message: &str) -> Option<String> {
        self.regex
            .captures(message)
            .and_then(|c| c.name("subject"))
            .map(|m| m.as_str().to_string())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn extracts_subject_from_matching_message() {
        let pattern = SubjectPattern::from_example("name 'SUBJECT' is not defined").unwrap();
        assert_eq!(pattern.extract("name 'foo' is not defined").as_deref(), Some("foo"));
        assert_eq!(pattern.extract("name 'foo' is defined"), None);
    }

    #[test]
    fn metacharacters_in_example_are_literal() {
        let pattern = SubjectPattern::from_example("missing (SUBJECT) [x]?").unwrap();
        assert_eq!(pattern.extract("missing (libfoo) [x]?").as_deref(), Some("libfoo"));
        assert_eq!(pattern.extract("missing libfoo x"), None);
    }

    #[test]
    fn example_without_placeholder_yields_no_subject() {
        let pattern = SubjectPattern::from_example("plain").unwrap();
        assert_eq!(pattern.extract("plain"), None);
        assert_eq!(pattern.extract("other"), None);
    }

    proptest! {
        #[test]
        fn any_subject_is_recovered(subject in "[A-Za-z0-9_.:-]{1,24}") {
            let pattern = SubjectPattern::from_example("No module named 'SUBJECT'").unwrap();
            let message = format!("No module named '{subject}'");
            prop_assert_eq!(pattern.extract(&message), Some(subject));
        }
    }
}
