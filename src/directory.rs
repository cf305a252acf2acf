use crate::error::{Result, StatementImportError};
use crate::schema::{Company, Transaction};
use crate::text::normalize_name;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Case-insensitive lookup from every known name (canonical and alternates)
/// to the directory entry that owns it. Hidden entries still count as known.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    index: HashMap<String, usize>,
}

impl CompanyDirectory {
    pub fn build(companies: &[Company]) -> Self {
        let mut index = HashMap::new();
        for (position, company) in companies.iter().enumerate() {
            for name in company.known_names() {
                let key = normalize_name(name);
                if !key.is_empty() {
                    index.entry(key).or_insert(position);
                }
            }
        }
        Self { index }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&normalize_name(name))
    }

    /// Position of the entry answering to `name`, if any.
    pub fn resolve(&self, name: &str) -> Option<usize> {
        self.index.get(&normalize_name(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// New directory entries for owners seen in `transactions` but unknown to
/// `companies`. Append-only: one entry per distinct new name, never a merge
/// or a deletion. Blank names and `skip_names` (sentinels) are ignored.
pub fn synchronize(
    companies: &[Company],
    transactions: &[Transaction],
    skip_names: &[String],
) -> Vec<Company> {
    let directory = CompanyDirectory::build(companies);
    let skipped: HashSet<String> = skip_names.iter().map(|n| normalize_name(n)).collect();
    let mut queued: HashSet<String> = HashSet::new();
    let mut created = Vec::new();

    for tx in transactions {
        let key = normalize_name(&tx.owner_name);
        if key.is_empty()
            || skipped.contains(&key)
            || directory.contains(&key)
            || !queued.insert(key)
        {
            continue;
        }

        created.push(Company::new(tx.owner_name.trim(), tx.owner_tax_id.trim()));
    }

    if !created.is_empty() {
        info!("Directory sync: {} new entries", created.len());
    }
    created
}

/// Manual maintenance of the directory. The synchronizer never issues these.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CompanyEdit {
    Register {
        canonical_name: String,
        #[serde(default)]
        tax_id: String,
        #[serde(default)]
        alternative_names: Vec<String>,
    },

    /// The old canonical name is kept in `original_name` and as an alternate.
    Rename { target: String, new_name: String },

    AddAlternative { target: String, name: String },

    /// Folds every source's names into the target and hides the sources.
    /// A missing target is created by renaming the first source.
    Merge {
        sources: Vec<String>,
        target_name: String,
    },

    Hide { target: String },

    Unhide { target: String },
}

/// Applies one edit in place and returns the positions of the entries it
/// created or changed, in ascending order.
pub fn apply_company_edit(companies: &mut Vec<Company>, edit: &CompanyEdit) -> Result<Vec<usize>> {
    let directory = CompanyDirectory::build(companies);
    let locate = |name: &str| {
        directory
            .resolve(name)
            .ok_or_else(|| StatementImportError::NotFound(format!("company '{}'", name)))
    };

    let touched = match edit {
        CompanyEdit::Register {
            canonical_name,
            tax_id,
            alternative_names,
        } => {
            if directory.contains(canonical_name) {
                return Err(StatementImportError::AlreadyExists(
                    canonical_name.trim().to_string(),
                ));
            }
            let mut company = Company::new(canonical_name.trim(), tax_id.trim());
            for name in alternative_names {
                add_alternative(&mut company, name);
            }
            companies.push(company);
            vec![companies.len() - 1]
        }

        CompanyEdit::Rename { target, new_name } => {
            let position = locate(target)?;
            rename(&mut companies[position], new_name);
            vec![position]
        }

        CompanyEdit::AddAlternative { target, name } => {
            let position = locate(target)?;
            add_alternative(&mut companies[position], name);
            vec![position]
        }

        CompanyEdit::Hide { target } => {
            let position = locate(target)?;
            companies[position].hidden = true;
            vec![position]
        }

        CompanyEdit::Unhide { target } => {
            let position = locate(target)?;
            companies[position].hidden = false;
            vec![position]
        }

        CompanyEdit::Merge {
            sources,
            target_name,
        } => merge(companies, &directory, sources, target_name)?,
    };

    debug!("Company edit {:?} touched entries {:?}", edit, touched);
    Ok(touched)
}

fn rename(company: &mut Company, new_name: &str) {
    let previous = std::mem::replace(&mut company.canonical_name, new_name.trim().to_string());
    add_alternative(company, &previous);
    company.original_name = Some(previous);
}

fn add_alternative(company: &mut Company, name: &str) {
    let key = normalize_name(name);
    if key.is_empty() || company.known_names().any(|n| normalize_name(n) == key) {
        return;
    }
    company.alternative_names.push(name.trim().to_string());
}

fn merge(
    companies: &mut [Company],
    directory: &CompanyDirectory,
    sources: &[String],
    target_name: &str,
) -> Result<Vec<usize>> {
    let mut source_positions = BTreeSet::new();
    for name in sources {
        let position = directory
            .resolve(name)
            .ok_or_else(|| StatementImportError::NotFound(format!("company '{}'", name)))?;
        source_positions.insert(position);
    }

    let target = match directory.resolve(target_name) {
        Some(position) => position,
        None => {
            let first = sources
                .first()
                .and_then(|name| directory.resolve(name))
                .ok_or_else(|| {
                    StatementImportError::NotFound(format!("merge sources for '{}'", target_name))
                })?;
            rename(&mut companies[first], target_name);
            first
        }
    };
    source_positions.remove(&target);

    for &position in &source_positions {
        let names: Vec<String> = companies[position].known_names().map(str::to_string).collect();
        for name in names {
            add_alternative(&mut companies[target], &name);
        }
        if companies[target].tax_id.is_empty() {
            companies[target].tax_id = companies[position].tax_id.clone();
        }
        companies[position].hidden = true;
    }

    source_positions.insert(target);
    Ok(source_positions.into_iter().collect())
}
