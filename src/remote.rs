//! Remote extraction path: a collaborator turns the raw document into compact
//! JSON, and the adapter expands that into canonical transactions.

use crate::config::{ClassificationConfig, HeaderConfig, ImporterConfig};
use crate::error::{Result, StatementImportError};
use crate::retry::{retry_with_policy, RetryPolicy};
use crate::schema::{
    ExtractedStatement, PaymentMethod, StatementHeader, Transaction, TransactionType,
};
use crate::transactions::{current_timestamp, normalize_date_text};
use async_trait::async_trait;
use chrono::{NaiveDateTime, SubsecRound};
use log::{debug, info};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// External service that reads a statement and answers with JSON matching
/// [`response_schema`]. Implementations classify their failures into
/// `QuotaExhausted`, `Overloaded` or anything else.
#[async_trait]
pub trait RemoteExtractor: Send + Sync {
    async fn extract(&self, payload: &[u8], mime_type: &str) -> Result<String>;
}

/// Compact response shape. Short keys keep the model's output small.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WireStatement {
    #[serde(default, rename = "h")]
    #[schemars(description = "Statement header: the account holder")]
    pub header: WireHeader,

    #[serde(default, rename = "tx")]
    #[schemars(description = "Every transaction row of the statement, in document order")]
    pub transactions: Vec<WireTransaction>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WireHeader {
    #[serde(default, rename = "n")]
    #[schemars(description = "Account holder name")]
    pub owner_name: String,

    #[serde(default, rename = "t")]
    #[schemars(description = "Account holder CPF or CNPJ, digits only. Empty if not printed")]
    pub owner_tax_id: String,

    #[serde(default, rename = "b")]
    #[schemars(description = "Bank that issued the statement")]
    pub owner_bank: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WireTransaction {
    #[serde(default, rename = "d")]
    #[schemars(description = "Date as YYYY-MM-DD, or YYYY-MM-DDTHH:MM:SS when a time is printed")]
    pub date: String,

    #[serde(default, rename = "ds")]
    #[schemars(description = "Row description exactly as printed")]
    pub description: String,

    #[serde(default, rename = "v")]
    #[schemars(description = "Amount as a number; negative for debits")]
    pub amount: f64,

    #[serde(default, rename = "tp")]
    #[schemars(description = "\"in\" for credits, \"out\" for debits")]
    pub direction: String,

    #[serde(default, rename = "cp")]
    #[schemars(description = "Counterparty name, empty if not printed")]
    pub counterparty_name: String,

    #[serde(default, rename = "ct")]
    #[schemars(description = "Counterparty CPF or CNPJ, digits only, empty if not printed")]
    pub counterparty_tax_id: String,

    #[serde(default, rename = "m")]
    #[schemars(description = "One of PIX, TED, DOC, BOLETO, CARD, OTHER")]
    pub payment_method: String,

    #[serde(default, rename = "pn")]
    #[schemars(description = "Payer name, empty if not printed")]
    pub payer_name: String,

    #[serde(default, rename = "o")]
    #[schemars(description = "Short category of the transaction, empty if unclear")]
    pub origin: String,

    #[serde(default, rename = "pb")]
    #[schemars(description = "Bank of the paying side, empty if not printed")]
    pub paying_bank: String,
}

/// Response schema with every `$ref` inlined and `$schema`, `definitions`,
/// `title` and `default` removed. Structured-output modes reject them.
pub fn response_schema() -> Result<Value> {
    let root = schemars::schema_for!(WireStatement);
    let mut value = serde_json::to_value(&root)?;
    let definitions = value
        .as_object_mut()
        .and_then(|o| o.remove("definitions"))
        .unwrap_or(Value::Null);
    flatten_schema(&mut value, &definitions);
    Ok(value)
}

fn flatten_schema(node: &mut Value, definitions: &Value) {
    let target = node
        .get("$ref")
        .and_then(Value::as_str)
        .and_then(|r| r.strip_prefix("#/definitions/"))
        .and_then(|name| definitions.get(name))
        .cloned();
    if let Some(mut inlined) = target {
        flatten_schema(&mut inlined, definitions);
        *node = inlined;
        return;
    }

    match node {
        Value::Object(map) => {
            for key in ["$schema", "definitions", "title", "default"] {
                map.remove(key);
            }

            // A defaulted struct field comes out as `allOf: [{$ref}]`.
            if let Some(Value::Array(mut parts)) = map.remove("allOf") {
                if parts.len() == 1 {
                    let mut part = parts.remove(0);
                    flatten_schema(&mut part, definitions);
                    if let Value::Object(fields) = part {
                        for (key, value) in fields {
                            map.entry(key).or_insert(value);
                        }
                    }
                } else {
                    map.insert("allOf".to_string(), Value::Array(parts));
                }
            }
            for (key, child) in map.iter_mut() {
                if key == "properties" {
                    if let Value::Object(props) = child {
                        for prop in props.values_mut() {
                            flatten_schema(prop, definitions);
                        }
                    }
                } else {
                    flatten_schema(child, definitions);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_schema(item, definitions);
            }
        }
        _ => {}
    }
}

/// Drops ``` fences and anything around the outermost JSON object.
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        text = rest.split_once('\n').map_or("", |(_, body)| body);
        text = text.trim_end().trim_end_matches("```").trim();
    }

    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text,
    }
}

/// Parses the collaborator's text. A body that is not valid JSON almost
/// always means the output was cut off, so it is reported as too complex.
pub fn parse_response(raw: &str) -> Result<WireStatement> {
    serde_json::from_str(strip_fences(raw)).map_err(|e| StatementImportError::ResponseTooComplex {
        details: e.to_string(),
    })
}

pub struct RemoteExtractionAdapter {
    extractor: Box<dyn RemoteExtractor>,
    policy: RetryPolicy,
    classification: ClassificationConfig,
    header: HeaderConfig,
    reference: Option<NaiveDateTime>,
}

impl RemoteExtractionAdapter {
    pub fn new(extractor: Box<dyn RemoteExtractor>, config: &ImporterConfig) -> Self {
        Self {
            extractor,
            policy: RetryPolicy::from(&config.retry),
            classification: config.classification.clone(),
            header: config.header.clone(),
            reference: None,
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Pins the fallback timestamp used for unreadable dates.
    pub fn with_reference(mut self, reference: NaiveDateTime) -> Self {
        self.reference = Some(reference.trunc_subsecs(0));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn extract(&self, payload: &[u8], mime_type: &str) -> Result<ExtractedStatement> {
        let extractor = self.extractor.as_ref();
        let raw = retry_with_policy(&self.policy, "remote extraction", move || {
            extractor.extract(payload, mime_type)
        })
        .await?;

        debug!("Remote response: {} bytes", raw.len());
        let wire = parse_response(&raw)?;
        let statement = self.expand(wire);
        info!(
            "Remote extraction produced {} transactions for '{}'",
            statement.transactions.len(),
            statement.header.owner_name
        );
        Ok(statement)
    }

    /// Compact shape to canonical records; missing optional fields get the
    /// same placeholders the local path uses.
    pub fn expand(&self, wire: WireStatement) -> ExtractedStatement {
        let reference = self.reference.unwrap_or_else(current_timestamp);
        let header = StatementHeader {
            owner_name: non_blank(wire.header.owner_name, &self.header.unidentified_owner),
            owner_tax_id: digits(&wire.header.owner_tax_id),
            owner_bank: non_blank(wire.header.owner_bank, &self.header.unidentified_bank),
        };

        let transactions = wire
            .transactions
            .into_iter()
            .filter(|row| row.amount.is_finite() && row.amount != 0.0)
            .map(|row| self.expand_row(row, &header, reference))
            .collect();

        ExtractedStatement {
            header,
            transactions,
        }
    }

    fn expand_row(
        &self,
        row: WireTransaction,
        header: &StatementHeader,
        reference: NaiveDateTime,
    ) -> Transaction {
        let transaction_type = direction(&row.direction, row.amount);
        let is_outflow = transaction_type == TransactionType::Outflow;
        let classification = &self.classification;

        Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            date: normalize_date_text(&row.date, reference),
            description: row.description.split_whitespace().collect::<Vec<_>>().join(" "),
            amount: row.amount.abs(),
            transaction_type,
            counterparty_name: non_blank(
                row.counterparty_name,
                &classification.counterparty_placeholder,
            ),
            counterparty_tax_id: digits(&row.counterparty_tax_id),
            payment_method: PaymentMethod::from_label(&row.payment_method),
            payer_name: if is_outflow {
                non_blank(row.payer_name, &header.owner_name)
            } else {
                non_blank(row.payer_name, &classification.payer_placeholder)
            },
            origin: non_blank(row.origin, &classification.origin_label),
            paying_bank: if is_outflow {
                non_blank(row.paying_bank, &header.owner_bank)
            } else {
                row.paying_bank.trim().to_string()
            },
            owner_name: header.owner_name.clone(),
            owner_tax_id: header.owner_tax_id.clone(),
            owner_bank: header.owner_bank.clone(),
            notes: String::new(),
        }
    }
}

fn direction(label: &str, amount: f64) -> TransactionType {
    match label.trim().to_lowercase().as_str() {
        "out" | "outflow" | "debit" | "debito" | "débito" | "d" | "saida" | "saída" => {
            TransactionType::Outflow
        }
        "in" | "inflow" | "credit" | "credito" | "crédito" | "c" | "entrada" => {
            TransactionType::Inflow
        }
        _ if amount < 0.0 => TransactionType::Outflow,
        _ => TransactionType::Inflow,
    }
}

fn non_blank(value: String, fallback: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

fn digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}
