use crate::config::HeaderConfig;
use crate::schema::StatementHeader;
use crate::text::KeywordSet;
use log::debug;
use regex::Regex;
use std::sync::OnceLock;

/// Labelled CPF (###.###.###-##) or CNPJ (##.###.###/####-##).
fn tax_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:CPF(?:/CNPJ)?\s*[:\-.]?\s*(?P<cpf>\d{3}\.?\d{3}\.?\d{3}-?\d{2})\b|CNPJ(?:/CPF)?\s*[:\-.]?\s*(?P<cnpj>\d{2}\.?\d{3}\.?\d{3}/?\d{4}-?\d{2})\b)",
        )
        .expect("tax id regex")
    })
}

fn date_shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{1,2}/\d{1,2}(?:/\d{2,4})?\b").expect("date shape regex"))
}

/// Best-effort owner identity from reconstructed statement text.
/// Misses fall back to sentinels or empty values, never to guesses.
pub struct HeaderExtractor {
    denylist: KeywordSet,
    bank_names: KeywordSet,
    known_banks: Vec<String>,
    owner_name_max_len: usize,
    unidentified_owner: String,
    unidentified_bank: String,
}

impl HeaderExtractor {
    pub fn new(config: &HeaderConfig) -> Self {
        Self {
            denylist: KeywordSet::new(&config.owner_denylist),
            bank_names: KeywordSet::new(&config.known_banks),
            known_banks: config.known_banks.clone(),
            owner_name_max_len: config.owner_name_max_len,
            unidentified_owner: config.unidentified_owner.clone(),
            unidentified_bank: config.unidentified_bank.clone(),
        }
    }

    pub fn extract(&self, lines: &[String]) -> StatementHeader {
        let text = lines.join("\n");
        let header = StatementHeader {
            owner_name: self.owner_name(lines),
            owner_tax_id: owner_tax_id(&text),
            owner_bank: self.owner_bank(&text),
        };
        debug!(
            "Header: owner='{}' tax_id='{}' bank='{}'",
            header.owner_name, header.owner_tax_id, header.owner_bank
        );
        header
    }

    pub fn owner_name(&self, lines: &[String]) -> String {
        for line in lines {
            let trimmed = line.trim();
            if trimmed.is_empty()
                || self.denylist.matches(trimmed)
                || self.bank_names.matches(trimmed)
                || date_shape_re().is_match(trimmed)
            {
                continue;
            }

            let bounded: String = trimmed.chars().take(self.owner_name_max_len).collect();
            let candidate = bounded.split("  ").next().unwrap_or("").trim();
            if !candidate.is_empty() {
                return candidate.to_string();
            }
        }
        self.unidentified_owner.clone()
    }

    pub fn owner_bank(&self, text: &str) -> String {
        let haystack = text.to_lowercase();
        self.known_banks
            .iter()
            .find(|bank| !bank.trim().is_empty() && haystack.contains(&bank.to_lowercase()))
            .cloned()
            .unwrap_or_else(|| self.unidentified_bank.clone())
    }
}

/// Digits of the first labelled tax id; empty when no label is present.
pub fn owner_tax_id(text: &str) -> String {
    tax_id_re()
        .captures(text)
        .and_then(|caps| caps.name("cpf").or_else(|| caps.name("cnpj")))
        .map(|m| m.as_str().chars().filter(|c| c.is_ascii_digit()).collect())
        .unwrap_or_default()
}
