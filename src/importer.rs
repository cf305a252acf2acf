//! Batch import orchestration.
//!
//! Files are processed one at a time, in order: extract, guard against a
//! repeated file, persist each row, then register new owners in the
//! directory. The first failing file stops the batch. Files accepted before
//! it stay committed; there is no batch-wide rollback.

use crate::config::{ExtractionMode, ImporterConfig};
use crate::dedup::{duplicate_ids, find_duplicates, is_repeat_import, DuplicateGroup, TransactionFilter};
use crate::directory::{apply_company_edit, synchronize, CompanyEdit};
use crate::error::{Result, StatementImportError};
use crate::local::LocalExtractor;
use crate::remote::{RemoteExtractionAdapter, RemoteExtractor};
use crate::schema::{
    Company, ExtractedStatement, StatementHeader, Transaction, TransactionPatch,
};
use crate::store::Store;
use chrono::NaiveDateTime;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::mpsc::Sender;

/// Binary content of one statement plus what is needed to route it.
#[derive(Debug, Clone)]
pub struct StatementFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentKind {
    Pdf,
    Image,
    Unsupported,
}

impl DocumentKind {
    pub fn from_mime(mime_type: &str) -> Self {
        let mime = mime_type.trim().to_ascii_lowercase();
        if mime == "application/pdf" {
            Self::Pdf
        } else if mime.starts_with("image/") {
            Self::Image
        } else {
            Self::Unsupported
        }
    }
}

impl StatementFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Reads the file and guesses its mime type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let mime_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_mime(&self.mime_type)
    }

    fn unsupported(&self, reason: &str) -> StatementImportError {
        StatementImportError::UnsupportedDocument {
            name: self.name.clone(),
            mime_type: self.mime_type.clone(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtractionPath {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ImportEvent {
    Starting { files: usize },
    FileStarted { index: usize, name: String },
    Extracted { name: String, path: ExtractionPath, transactions: usize },
    DuplicateBatch { name: String },
    Accepted { name: String, transactions: usize },
    DirectoryUpdated { created: Vec<String> },
    Failed { name: String, reason: String },
    Finished { processed: usize, aborted: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Rows were stored; ids are the ones the store assigned.
    Accepted {
        transaction_ids: Vec<String>,
        new_companies: Vec<String>,
    },
    /// Every row already existed, so nothing was stored.
    DuplicateBatch,
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub name: String,
    pub path: ExtractionPath,
    pub header: StatementHeader,
    pub outcome: FileOutcome,
}

#[derive(Debug)]
pub struct FileFailure {
    pub name: String,
    pub error: StatementImportError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// Files that completed, in processing order.
    pub files: Vec<FileReport>,
    /// The file that stopped the batch, if one did.
    pub aborted: Option<FileFailure>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn accepted_transaction_ids(&self) -> Vec<String> {
        self.files
            .iter()
            .filter_map(|f| match &f.outcome {
                FileOutcome::Accepted {
                    transaction_ids, ..
                } => Some(transaction_ids.iter().cloned()),
                FileOutcome::DuplicateBatch => None,
            })
            .flatten()
            .collect()
    }

    pub fn rejected_files(&self) -> Vec<&str> {
        self.files
            .iter()
            .filter(|f| f.outcome == FileOutcome::DuplicateBatch)
            .map(|f| f.name.as_str())
            .collect()
    }
}

/// Owns the loaded transaction and company collections and keeps them in
/// step with the store. All mutation goes through `&mut self`.
pub struct StatementImporter<S: Store> {
    store: S,
    config: ImporterConfig,
    local: LocalExtractor,
    remote: Option<RemoteExtractionAdapter>,
    transactions: Vec<Transaction>,
    companies: Vec<Company>,
}

impl<S: Store> StatementImporter<S> {
    pub async fn new(store: S, config: ImporterConfig) -> Result<Self> {
        config.validate()?;
        let local = LocalExtractor::new(&config);
        let mut importer = Self {
            store,
            config,
            local,
            remote: None,
            transactions: Vec::new(),
            companies: Vec::new(),
        };
        importer.reload().await?;
        Ok(importer)
    }

    /// Attaches a remote collaborator with the configured retry policy.
    pub fn with_remote(self, extractor: Box<dyn RemoteExtractor>) -> Self {
        let adapter = RemoteExtractionAdapter::new(extractor, &self.config);
        self.with_remote_adapter(adapter)
    }

    pub fn with_remote_adapter(mut self, adapter: RemoteExtractionAdapter) -> Self {
        self.remote = Some(adapter);
        self
    }

    /// Pins the local path's "now" (year for `dd/mm` dates, fallback timestamp).
    pub fn with_reference(mut self, reference: NaiveDateTime) -> Self {
        self.local = LocalExtractor::new(&self.config).with_reference(reference);
        self
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.transactions = self.store.load_transactions().await?;
        self.companies = self.store.load_companies().await?;
        info!(
            "Loaded {} transactions and {} companies",
            self.transactions.len(),
            self.companies.len()
        );
        Ok(())
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.config
    }

    pub async fn import_batch(
        &mut self,
        files: &[StatementFile],
        progress: Option<Sender<ImportEvent>>,
    ) -> BatchReport {
        send_event(&progress, ImportEvent::Starting { files: files.len() }).await;
        let mut report = BatchReport::default();

        for (index, file) in files.iter().enumerate() {
            info!("Importing file {}/{}: {}", index + 1, files.len(), file.name);
            send_event(
                &progress,
                ImportEvent::FileStarted {
                    index,
                    name: file.name.clone(),
                },
            )
            .await;

            match self.import_file(file, &progress).await {
                Ok(file_report) => report.files.push(file_report),
                Err(error) => {
                    warn!(
                        "Aborting batch at '{}': {}. {} earlier file(s) stay committed",
                        file.name,
                        error,
                        report.files.len()
                    );
                    send_event(
                        &progress,
                        ImportEvent::Failed {
                            name: file.name.clone(),
                            reason: error.to_string(),
                        },
                    )
                    .await;
                    report.aborted = Some(FileFailure {
                        name: file.name.clone(),
                        error,
                    });
                    break;
                }
            }
        }

        send_event(
            &progress,
            ImportEvent::Finished {
                processed: report.files.len(),
                aborted: report.aborted.is_some(),
            },
        )
        .await;
        report
    }

    async fn import_file(
        &mut self,
        file: &StatementFile,
        progress: &Option<Sender<ImportEvent>>,
    ) -> Result<FileReport> {
        let (path, statement) = self.extract(file).await?;
        send_event(
            progress,
            ImportEvent::Extracted {
                name: file.name.clone(),
                path,
                transactions: statement.transactions.len(),
            },
        )
        .await;

        let ExtractedStatement {
            header,
            transactions,
        } = statement;

        if is_repeat_import(&transactions, &self.transactions) {
            info!(
                "'{}' repeats an earlier import ({} rows); nothing stored",
                file.name,
                transactions.len()
            );
            send_event(
                progress,
                ImportEvent::DuplicateBatch {
                    name: file.name.clone(),
                },
            )
            .await;
            return Ok(FileReport {
                name: file.name.clone(),
                path,
                header,
                outcome: FileOutcome::DuplicateBatch,
            });
        }

        let mut accepted = Vec::with_capacity(transactions.len());
        for mut tx in transactions {
            tx.id = self.store.append_transaction(&tx).await?;
            self.transactions.push(tx.clone());
            accepted.push(tx);
        }
        send_event(
            progress,
            ImportEvent::Accepted {
                name: file.name.clone(),
                transactions: accepted.len(),
            },
        )
        .await;

        let new_companies = self.sync_directory(&accepted).await?;
        if !new_companies.is_empty() {
            send_event(
                progress,
                ImportEvent::DirectoryUpdated {
                    created: new_companies.clone(),
                },
            )
            .await;
        }

        info!(
            "'{}' accepted: {} transactions, {} new companies",
            file.name,
            accepted.len(),
            new_companies.len()
        );
        Ok(FileReport {
            name: file.name.clone(),
            path,
            header,
            outcome: FileOutcome::Accepted {
                transaction_ids: accepted.into_iter().map(|t| t.id).collect(),
                new_companies,
            },
        })
    }

    async fn extract(&self, file: &StatementFile) -> Result<(ExtractionPath, ExtractedStatement)> {
        let kind = file.kind();
        if kind == DocumentKind::Unsupported {
            return Err(file.unsupported("only PDF and image statements can be imported"));
        }

        let use_remote = match self.config.extraction_mode {
            ExtractionMode::Local => false,
            ExtractionMode::Remote => true,
            ExtractionMode::Auto => self.remote.is_some(),
        };

        if use_remote {
            let adapter = self
                .remote
                .as_ref()
                .ok_or(StatementImportError::RemoteExtractorMissing)?;
            info!("'{}': remote extraction", file.name);
            let statement = adapter.extract(&file.bytes, &file.mime_type).await?;
            return Ok((ExtractionPath::Remote, statement));
        }

        if kind == DocumentKind::Image {
            return Err(file.unsupported("images need the remote extractor"));
        }
        info!("'{}': local extraction", file.name);
        let statement = self.local.extract_pdf(&file.bytes)?;
        Ok((ExtractionPath::Local, statement))
    }

    async fn sync_directory(&mut self, accepted: &[Transaction]) -> Result<Vec<String>> {
        let skip = [self.config.header.unidentified_owner.clone()];
        let mut created = Vec::new();

        for mut company in synchronize(&self.companies, accepted, &skip) {
            company.id = self.store.append_company(&company).await?;
            created.push(company.canonical_name.clone());
            self.companies.push(company);
        }
        Ok(created)
    }

    /// Duplicate groups inside the filtered view. Nothing is removed.
    pub fn duplicates(&self, filter: &TransactionFilter) -> Vec<DuplicateGroup> {
        find_duplicates(self.transactions.iter().filter(|t| filter.matches(t)))
    }

    /// Deletes one row, but only while it is flagged as a duplicate in the
    /// filtered view.
    pub async fn remove_duplicate(&mut self, id: &str, filter: &TransactionFilter) -> Result<()> {
        let flagged = duplicate_ids(self.transactions.iter().filter(|t| filter.matches(t)));
        if !flagged.contains(id) {
            return Err(StatementImportError::NotADuplicate(id.to_string()));
        }

        self.store.delete_transaction(id).await?;
        self.transactions.retain(|t| t.id != id);
        info!("Removed duplicate transaction {}", id);
        Ok(())
    }

    pub async fn edit_transaction(&mut self, id: &str, patch: &TransactionPatch) -> Result<()> {
        let position = self
            .transactions
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| StatementImportError::NotFound(format!("transaction {}", id)))?;

        self.store.patch_transaction(id, patch).await?;
        patch.apply(&mut self.transactions[position]);
        Ok(())
    }

    /// Hand-entered balance for an owner; stored like any other row.
    pub async fn record_manual_balance(
        &mut self,
        header: &StatementHeader,
        date: NaiveDateTime,
        amount: f64,
        description: &str,
    ) -> Result<String> {
        let mut tx = Transaction::manual_balance(header, date, amount, description);
        tx.id = self.store.append_transaction(&tx).await?;
        let id = tx.id.clone();
        self.transactions.push(tx);
        Ok(id)
    }

    /// Applies a manual directory edit and persists every entry it touched.
    pub async fn edit_company(&mut self, edit: &CompanyEdit) -> Result<()> {
        let mut working = self.companies.clone();
        let touched = apply_company_edit(&mut working, edit)?;

        for position in touched {
            let company = &mut working[position];
            if company.id.is_empty() {
                company.id = self.store.append_company(company).await?;
            } else {
                self.store.patch_company(company).await?;
            }
        }

        self.companies = working;
        Ok(())
    }
}

async fn send_event(sender: &Option<Sender<ImportEvent>>, event: ImportEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event).await;
    }
}
