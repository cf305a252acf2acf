use chrono::{NaiveDate, NaiveDateTime};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Direction of a transaction relative to the statement owner.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[schemars(description = "Money received by the account holder (credit)")]
    Inflow,

    #[schemars(description = "Money sent or paid by the account holder (debit)")]
    Outflow,

    #[schemars(description = "Balance entry typed in by hand, not extracted from a statement")]
    ManualBalance,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[schemars(description = "Instant transfer (PIX)")]
    Pix,

    #[schemars(description = "Wire or same-day transfer (TED/DOC)")]
    WireTransfer,

    #[schemars(description = "Bill payment slip (boleto)")]
    Boleto,

    #[schemars(description = "Debit or credit card purchase")]
    Card,

    #[schemars(description = "Anything that does not match the other methods")]
    Other,
}

impl Default for PaymentMethod {
    fn default() -> Self {
        Self::Other
    }
}

impl PaymentMethod {
    /// Lenient parse used for remote responses; unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect();

        match normalized.as_str() {
            "pix" => Self::Pix,
            "ted" | "doc" | "tef" | "wiretransfer" | "transferencia" | "transfer" => {
                Self::WireTransfer
            }
            "boleto" | "bill" | "billpayment" => Self::Boleto,
            "card" | "cartao" | "cartão" | "debito" | "credito" => Self::Card,
            _ => Self::Other,
        }
    }
}

/// Owner identity derived once per statement document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatementHeader {
    pub owner_name: String,
    /// Digits only; empty when no labelled tax id was found.
    pub owner_tax_id: String,
    pub owner_bank: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    /// Always carries hour, minute and second.
    pub date: NaiveDateTime,
    pub description: String,
    /// Non-negative magnitude; direction lives in `transaction_type`.
    pub amount: f64,
    #[serde(rename = "type")]
    pub transaction_type: TransactionType,
    pub counterparty_name: String,
    pub counterparty_tax_id: String,
    pub payment_method: PaymentMethod,
    pub payer_name: String,
    pub origin: String,
    pub paying_bank: String,
    pub owner_name: String,
    pub owner_tax_id: String,
    pub owner_bank: String,
    #[serde(default)]
    pub notes: String,
}

impl Transaction {
    /// Hand-entered balance line for an owner, outside any statement import.
    pub fn manual_balance(
        header: &StatementHeader,
        date: NaiveDateTime,
        amount: f64,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            date,
            description: description.into(),
            amount: amount.abs(),
            transaction_type: TransactionType::ManualBalance,
            counterparty_name: String::new(),
            counterparty_tax_id: String::new(),
            payment_method: PaymentMethod::Other,
            payer_name: header.owner_name.clone(),
            origin: "manual".to_string(),
            paying_bank: header.owner_bank.clone(),
            owner_name: header.owner_name.clone(),
            owner_tax_id: header.owner_tax_id.clone(),
            owner_bank: header.owner_bank.clone(),
            notes: String::new(),
        }
    }

    pub fn day(&self) -> NaiveDate {
        self.date.date()
    }

    /// ISO-8601 rendering, `YYYY-MM-DDTHH:mm:ss`.
    pub fn iso_date(&self) -> String {
        self.date.format("%Y-%m-%dT%H:%M:%S").to_string()
    }
}

/// Field-level overwrite coming from a user edit. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionPatch {
    pub date: Option<NaiveDateTime>,
    pub description: Option<String>,
    pub amount: Option<f64>,
    #[serde(rename = "type")]
    pub transaction_type: Option<TransactionType>,
    pub counterparty_name: Option<String>,
    pub counterparty_tax_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub payer_name: Option<String>,
    pub origin: Option<String>,
    pub paying_bank: Option<String>,
    pub notes: Option<String>,
}

impl TransactionPatch {
    pub fn apply(&self, tx: &mut Transaction) {
        if let Some(date) = self.date {
            tx.date = date;
        }
        if let Some(description) = &self.description {
            tx.description = description.clone();
        }
        if let Some(amount) = self.amount {
            tx.amount = amount.abs();
        }
        if let Some(kind) = self.transaction_type {
            tx.transaction_type = kind;
        }
        if let Some(name) = &self.counterparty_name {
            tx.counterparty_name = name.clone();
        }
        if let Some(tax_id) = &self.counterparty_tax_id {
            tx.counterparty_tax_id = tax_id.clone();
        }
        if let Some(method) = self.payment_method {
            tx.payment_method = method;
        }
        if let Some(payer) = &self.payer_name {
            tx.payer_name = payer.clone();
        }
        if let Some(origin) = &self.origin {
            tx.origin = origin.clone();
        }
        if let Some(bank) = &self.paying_bank {
            tx.paying_bank = bank.clone();
        }
        if let Some(notes) = &self.notes {
            tx.notes = notes.clone();
        }
    }
}

/// Entry in the directory of known counterparties and owners.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Company {
    #[serde(default)]
    pub id: String,
    pub canonical_name: String,
    /// Previous canonical name, kept when the entry is renamed.
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub tax_id: String,
    #[serde(default)]
    pub alternative_names: Vec<String>,
    #[serde(default)]
    pub hidden: bool,
}

impl Company {
    pub fn new(canonical_name: impl Into<String>, tax_id: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            canonical_name: canonical_name.into(),
            original_name: None,
            tax_id: tax_id.into(),
            alternative_names: Vec::new(),
            hidden: false,
        }
    }

    /// Canonical name followed by every alternate.
    pub fn known_names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.canonical_name.as_str())
            .chain(self.alternative_names.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    #[serde(default)]
    pub id: String,
    pub email: String,
    pub display_name: String,
}

/// Result of running one document through either extraction path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedStatement {
    pub header: StatementHeader,
    pub transactions: Vec<Transaction>,
}
