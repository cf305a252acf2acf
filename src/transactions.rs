//! Transaction rows out of reconstructed statement text.
//!
//! Rows are found by one pattern: a `dd/mm[/yyyy]` date, an optional time,
//! a lazily matched description and a Brazilian monetary token
//! (`1.234,56`, optionally signed with a leading or trailing minus). Direction,
//! payment method and the ISO timestamp are derived per row; rows with an
//! unparseable or zero amount are dropped without failing the document.

use crate::config::ClassificationConfig;
use crate::schema::{PaymentMethod, StatementHeader, Transaction, TransactionType};
use crate::text::KeywordSet;
use chrono::{Datelike, Local, NaiveDate, NaiveDateTime, NaiveTime, SubsecRound};
use log::{debug, warn};
use regex::{CaptureMatches, Regex};
use std::sync::OnceLock;

fn row_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?m)(?P<date>\b\d{2}/\d{2}(?:/(?:\d{4}|\d{2}))?)\b(?:[ \t]+(?P<time>\d{2}:\d{2}(?::\d{2})?))?[ \t]+(?P<desc>[^\n]*?)[ \t]*(?P<amount>(?:-[ \t]?)?(?:R\$[ \t]?)?(?:\d{1,3}(?:\.\d{3})+|\d+),\d{2}(?:[ \t]?-)?)(?:[ \t]|$)",
        )
        .expect("transaction row regex")
    })
}

/// Fixed time of day for rows that carry none.
pub fn midday() -> NaiveTime {
    NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()
}

/// One pattern hit, before any normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawRow<'t> {
    pub date: &'t str,
    pub time: Option<&'t str>,
    pub description: &'t str,
    pub amount: &'t str,
}

/// Lazy, non-overlapping scan over a document's text. Each match is consumed
/// before the search resumes, so a line is never counted twice.
pub struct RowScanner<'r, 't> {
    matches: CaptureMatches<'r, 't>,
}

impl<'t> Iterator for RowScanner<'_, 't> {
    type Item = RawRow<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = self.matches.next()?;
        Some(RawRow {
            date: caps.name("date").map_or("", |m| m.as_str()),
            time: caps.name("time").map(|m| m.as_str()),
            description: caps.name("desc").map_or("", |m| m.as_str()),
            amount: caps.name("amount").map_or("", |m| m.as_str()),
        })
    }
}

/// Scans statement text; starting a new scan restarts from the top.
pub fn scan_rows(text: &str) -> RowScanner<'static, '_> {
    RowScanner {
        matches: row_re().captures_iter(text),
    }
}

pub struct TransactionExtractor {
    outflow: KeywordSet,
    forced_inflow: KeywordSet,
    pix: KeywordSet,
    wire_transfer: KeywordSet,
    boleto: KeywordSet,
    card: KeywordSet,
    counterparty_placeholder: String,
    payer_placeholder: String,
    origin_label: String,
    reference: NaiveDateTime,
}

impl TransactionExtractor {
    pub fn new(config: &ClassificationConfig) -> Self {
        Self {
            outflow: KeywordSet::new(&config.outflow_keywords),
            forced_inflow: KeywordSet::new(&config.forced_inflow_keywords),
            pix: KeywordSet::new(&config.pix_keywords),
            wire_transfer: KeywordSet::new(&config.wire_transfer_keywords),
            boleto: KeywordSet::new(&config.boleto_keywords),
            card: KeywordSet::new(&config.card_keywords),
            counterparty_placeholder: config.counterparty_placeholder.clone(),
            payer_placeholder: config.payer_placeholder.clone(),
            origin_label: config.origin_label.clone(),
            reference: current_timestamp(),
        }
    }

    /// Pins "now": the year for `dd/mm` dates and the fallback timestamp.
    pub fn with_reference(mut self, reference: NaiveDateTime) -> Self {
        self.reference = reference.trunc_subsecs(0);
        self
    }

    pub fn reference(&self) -> NaiveDateTime {
        self.reference
    }

    pub fn extract(&self, text: &str, header: &StatementHeader) -> Vec<Transaction> {
        let mut transactions = Vec::new();
        let mut dropped = 0usize;

        for row in scan_rows(text) {
            match self.build(&row, header) {
                Some(tx) => transactions.push(tx),
                None => dropped += 1,
            }
        }

        debug!(
            "Extracted {} transactions, dropped {} zero or unparseable rows",
            transactions.len(),
            dropped
        );
        transactions
    }

    fn build(&self, row: &RawRow<'_>, header: &StatementHeader) -> Option<Transaction> {
        let amount = parse_amount(row.amount)?;
        let description = collapse_whitespace(row.description);
        let transaction_type = self.classify_direction(&description, has_negative_marker(row.amount));
        let is_outflow = transaction_type == TransactionType::Outflow;

        Some(Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            date: normalize_date(row.date, row.time, self.reference),
            payment_method: self.classify_payment_method(&description),
            description,
            amount,
            transaction_type,
            counterparty_name: self.counterparty_placeholder.clone(),
            counterparty_tax_id: String::new(),
            payer_name: if is_outflow {
                header.owner_name.clone()
            } else {
                self.payer_placeholder.clone()
            },
            origin: self.origin_label.clone(),
            paying_bank: if is_outflow {
                header.owner_bank.clone()
            } else {
                String::new()
            },
            owner_name: header.owner_name.clone(),
            owner_tax_id: header.owner_tax_id.clone(),
            owner_bank: header.owner_bank.clone(),
            notes: String::new(),
        })
    }

    /// Forced-inflow vocabulary overrides everything; otherwise a negative
    /// marker or outflow vocabulary means outflow.
    pub fn classify_direction(&self, description: &str, negative: bool) -> TransactionType {
        if self.forced_inflow.matches(description) {
            TransactionType::Inflow
        } else if negative || self.outflow.matches(description) {
            TransactionType::Outflow
        } else {
            TransactionType::Inflow
        }
    }

    /// Priority: instant transfer, wire transfer, bill payment, card.
    pub fn classify_payment_method(&self, description: &str) -> PaymentMethod {
        if self.pix.matches(description) {
            PaymentMethod::Pix
        } else if self.wire_transfer.matches(description) {
            PaymentMethod::WireTransfer
        } else if self.boleto.matches(description) {
            PaymentMethod::Boleto
        } else if self.card.matches(description) {
            PaymentMethod::Card
        } else {
            PaymentMethod::Other
        }
    }
}

pub fn has_negative_marker(token: &str) -> bool {
    token.contains('-')
}

/// Magnitude of a `1.234,56`-style token. `None` for unparseable or zero values.
pub fn parse_amount(token: &str) -> Option<f64> {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == ',')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    let value: f64 = cleaned.parse().ok()?;
    let magnitude = value.abs();
    if magnitude == 0.0 || !magnitude.is_finite() {
        return None;
    }
    Some(magnitude)
}

/// Local wall-clock time to whole seconds, matching the stored date shape.
pub fn current_timestamp() -> NaiveDateTime {
    Local::now().naive_local().trunc_subsecs(0)
}

/// `dd/mm`, `dd/mm/yy` or `dd/mm/yyyy` plus an optional `HH:MM[:SS]`.
/// Missing year takes the reference year, missing time is midday, and
/// anything invalid falls back to the reference timestamp.
pub fn normalize_date(date: &str, time: Option<&str>, reference: NaiveDateTime) -> NaiveDateTime {
    let parts: Vec<&str> = date.trim().split('/').collect();
    let parsed = match parts.as_slice() {
        [d, m] => ymd(reference.year(), m, d),
        [d, m, y] => {
            let year = match y.len() {
                2 => y.parse::<i32>().ok().map(|yy| 2000 + yy),
                4 => y.parse::<i32>().ok(),
                _ => None,
            };
            year.and_then(|year| ymd(year, m, d))
        }
        _ => None,
    };

    match parsed {
        Some(day) => day.and_time(time.and_then(parse_time).unwrap_or_else(midday)),
        None => {
            warn!("Malformed date '{}', using the current timestamp", date);
            reference
        }
    }
}

/// Dates as the remote extractor tends to return them: ISO date or
/// date-time, or the Brazilian `dd/mm[/yyyy]` form.
pub fn normalize_date_text(raw: &str, reference: NaiveDateTime) -> NaiveDateTime {
    let raw = raw.trim();
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return dt;
        }
    }
    if let Ok(day) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return day.and_time(midday());
    }

    let mut pieces = raw.split_whitespace();
    let date = pieces.next().unwrap_or("");
    normalize_date(date, pieces.next(), reference)
}

fn ymd(year: i32, month: &str, day: &str) -> Option<NaiveDate> {
    let month = month.parse().ok()?;
    let day = day.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .ok()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
