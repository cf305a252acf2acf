use regex::{Regex, RegexBuilder};

/// Case-insensitive whole-word matcher over a keyword list.
/// Multi-word keywords match with any run of whitespace between words.
#[derive(Debug, Clone)]
pub struct KeywordSet {
    pattern: Option<Regex>,
}

impl KeywordSet {
    pub fn new(keywords: &[String]) -> Self {
        let alternatives: Vec<String> = keywords
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty())
            .map(|k| {
                k.split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect();

        if alternatives.is_empty() {
            return Self { pattern: None };
        }

        let source = format!(r"\b(?:{})\b", alternatives.join("|"));
        // Escaped input always forms a valid pattern.
        let pattern = RegexBuilder::new(&source)
            .case_insensitive(true)
            .build()
            .ok();
        Self { pattern }
    }

    pub fn matches(&self, text: &str) -> bool {
        self.pattern
            .as_ref()
            .map(|re| re.is_match(text))
            .unwrap_or(false)
    }
}

/// Directory key for a name: trimmed, lower-cased, inner whitespace collapsed.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
