use crate::schema::{Transaction, TransactionType};
use crate::text::normalize_name;
use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Signature deciding whether two transactions are the same real-world event.
/// Amount is held in cents so the key stays hashable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub amount_cents: i64,
    pub owner_bank: String,
    pub transaction_type: TransactionType,
    pub day: NaiveDate,
    pub counterparty_name: String,
}

impl IdentityKey {
    pub fn of(tx: &Transaction) -> Self {
        Self {
            amount_cents: (tx.amount * 100.0).round() as i64,
            owner_bank: tx.owner_bank.clone(),
            transaction_type: tx.transaction_type,
            day: tx.day(),
            counterparty_name: tx.counterparty_name.clone(),
        }
    }
}

/// True when every transaction of a non-empty batch already has a same-key
/// match among the existing transactions, i.e. the file was imported before.
pub fn is_repeat_import(batch: &[Transaction], existing: &[Transaction]) -> bool {
    if batch.is_empty() || existing.is_empty() {
        return false;
    }

    let known: HashSet<IdentityKey> = existing.iter().map(IdentityKey::of).collect();
    let repeat = batch.iter().all(|tx| known.contains(&IdentityKey::of(tx)));
    debug!(
        "Repeat-import check: {} rows against {} existing -> {}",
        batch.len(),
        existing.len(),
        repeat
    );
    repeat
}

/// The "currently displayed" view that duplicate marking runs over.
/// Every criterion left as `None` matches everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionFilter {
    /// Owner name, compared case- and whitespace-insensitively.
    pub owner: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Substring searched in description, counterparty and notes.
    pub text: Option<String>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        if let Some(owner) = &self.owner {
            if normalize_name(owner) != normalize_name(&tx.owner_name) {
                return false;
            }
        }
        if self.transaction_type.is_some_and(|kind| kind != tx.transaction_type) {
            return false;
        }
        let day = tx.day();
        if self.from.is_some_and(|from| day < from) || self.to.is_some_and(|to| day > to) {
            return false;
        }
        match &self.text {
            Some(needle) if !needle.trim().is_empty() => {
                let needle = needle.trim().to_lowercase();
                [&tx.description, &tx.counterparty_name, &tx.notes]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

/// Transactions sharing one identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub key: IdentityKey,
    pub transaction_ids: Vec<String>,
}

/// Groups the given (already filtered) transactions by identity key and
/// returns every group with more than one member, in key order.
/// Nothing is removed; deciding which copy goes is left to the user.
pub fn find_duplicates<'a, I>(transactions: I) -> Vec<DuplicateGroup>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    let mut groups: BTreeMap<IdentityKey, Vec<String>> = BTreeMap::new();
    for tx in transactions {
        groups
            .entry(IdentityKey::of(tx))
            .or_default()
            .push(tx.id.clone());
    }

    groups
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(key, transaction_ids)| DuplicateGroup {
            key,
            transaction_ids,
        })
        .collect()
}

/// Flattened ids of every transaction flagged by [`find_duplicates`].
pub fn duplicate_ids<'a, I>(transactions: I) -> HashSet<String>
where
    I: IntoIterator<Item = &'a Transaction>,
{
    find_duplicates(transactions)
        .into_iter()
        .flat_map(|g| g.transaction_ids)
        .collect()
}
