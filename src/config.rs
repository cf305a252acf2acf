use crate::error::{Result, StatementImportError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which extraction path a document takes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Layout reconstruction plus heuristics; PDFs only.
    Local,
    /// Every document goes to the remote extractor.
    Remote,
    /// Remote when an extractor is attached, local otherwise.
    #[default]
    Auto,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ImporterConfig {
    pub extraction_mode: ExtractionMode,
    pub layout: LayoutConfig,
    pub header: HeaderConfig,
    pub classification: ClassificationConfig,
    pub retry: RetryConfig,
    pub gemini: GeminiSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Fragments whose vertical anchors differ by at most this much share a line.
    pub y_tolerance: f32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self { y_tolerance: 5.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderConfig {
    pub owner_name_max_len: usize,
    /// Lines containing any of these words, or any known bank name, are
    /// never taken as the owner name.
    pub owner_denylist: Vec<String>,
    /// Matched in order against the document text; first hit wins.
    pub known_banks: Vec<String>,
    pub unidentified_owner: String,
    pub unidentified_bank: String,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            owner_name_max_len: 60,
            owner_denylist: strings(&[
                "extrato",
                "statement",
                "período",
                "periodo",
                "period",
                "página",
                "pagina",
                "page",
                "saldo",
                "balance",
                "banco",
                "bank",
                "unibanco",
                "emitido",
                "emissão",
                "issued",
                "data",
                "date",
                "conta",
                "account",
                "agência",
                "agencia",
                "cpf",
                "cnpj",
                "lançamentos",
                "movimentação",
            ]),
            known_banks: strings(&[
                "Banco do Brasil",
                "Itaú",
                "Itau",
                "Bradesco",
                "Santander",
                "Caixa Econômica",
                "Caixa",
                "Nubank",
                "Banco Inter",
                "C6 Bank",
                "BTG Pactual",
                "Sicoob",
                "Sicredi",
                "Safra",
                "Banrisul",
                "PagBank",
                "Mercado Pago",
                "Banco Original",
                "Neon",
            ]),
            unidentified_owner: "Titular não identificado".to_string(),
            unidentified_bank: "Banco não identificado".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationConfig {
    /// Description vocabulary that marks a row as money leaving the account.
    pub outflow_keywords: Vec<String>,
    /// Descriptions that are always inflow, whatever the sign or other keywords say.
    pub forced_inflow_keywords: Vec<String>,
    pub pix_keywords: Vec<String>,
    pub wire_transfer_keywords: Vec<String>,
    pub boleto_keywords: Vec<String>,
    pub card_keywords: Vec<String>,
    pub counterparty_placeholder: String,
    pub payer_placeholder: String,
    pub origin_label: String,
}

impl Default for ClassificationConfig {
    fn default() -> Self {
        Self {
            outflow_keywords: strings(&[
                "pagamento",
                "pagto",
                "pgto",
                "débito",
                "debito",
                "tarifa",
                "taxa",
                "pix enviado",
                "transferência enviada",
                "transferencia enviada",
                "ted enviada",
                "saque",
                "compra",
            ]),
            forced_inflow_keywords: strings(&[
                "resgate automático",
                "resgate automatico",
                "res aplic aut",
                "rend pago aplic aut",
            ]),
            pix_keywords: strings(&["pix"]),
            wire_transfer_keywords: strings(&["ted", "doc", "transferência", "transferencia", "tef"]),
            boleto_keywords: strings(&["boleto", "título", "titulo", "cobrança", "cobranca"]),
            card_keywords: strings(&["cartão", "cartao", "card", "compra", "visa", "mastercard", "maestro"]),
            counterparty_placeholder: "Extraído via documento".to_string(),
            payer_placeholder: "Não informado".to_string(),
            origin_label: "Extrato bancário".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub quota_multiplier: f64,
    pub overload_multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 2_000,
            quota_multiplier: 5.0,
            overload_multiplier: 2.0,
            max_delay_ms: 120_000,
        }
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub model: String,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
        }
    }
}

impl ImporterConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.layout.y_tolerance > 0.0) {
            return Err(StatementImportError::InvalidConfig(format!(
                "layout.y_tolerance must be positive, got {}",
                self.layout.y_tolerance
            )));
        }
        if self.retry.max_attempts == 0 {
            return Err(StatementImportError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.quota_multiplier < 1.0 || self.retry.overload_multiplier < 1.0 {
            return Err(StatementImportError::InvalidConfig(format!(
                "retry multipliers must be >= 1.0 (quota {}, overload {})",
                self.retry.quota_multiplier, self.retry.overload_multiplier
            )));
        }
        if self.header.owner_name_max_len == 0 {
            return Err(StatementImportError::InvalidConfig(
                "header.owner_name_max_len must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = ImporterConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry.max_attempts, 4);
        assert!(config.retry.quota_multiplier > config.retry.overload_multiplier);
        assert_eq!(config.extraction_mode, ExtractionMode::Auto);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ImporterConfig::from_json_str(
            r#"{ "extraction_mode": "local", "retry": { "max_attempts": 2 } }"#,
        )
        .unwrap();

        assert_eq!(config.extraction_mode, ExtractionMode::Local);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.layout.y_tolerance, 5.0);
        assert!(!config.header.known_banks.is_empty());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = ImporterConfig::from_json_str(r#"{ "layout": { "y_tolerance": 0.0 } }"#);
        assert!(matches!(err, Err(StatementImportError::InvalidConfig(_))));

        let err = ImporterConfig::from_json_str(r#"{ "retry": { "max_attempts": 0 } }"#);
        assert!(matches!(err, Err(StatementImportError::InvalidConfig(_))));

        let err = ImporterConfig::from_json_str(r#"{ "retry": { "overload_multiplier": 0.5 } }"#);
        assert!(matches!(err, Err(StatementImportError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "classification": {{ "outflow_keywords": ["withdrawal"] }} }}"#
        )
        .unwrap();

        let config = ImporterConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.classification.outflow_keywords, vec!["withdrawal"]);
        assert!(!config.classification.pix_keywords.is_empty());
    }
}
