//! # Bank Statement Importer
//!
//! A library for turning bank statement documents (PDFs or images) into a
//! normalized, deduplicated list of transactions attached to the account
//! holder, reconciled against a growing directory of known companies.
//!
//! ## Core Concepts
//!
//! - **Local path**: PDF text fragments are put back into reading order
//!   ([`LayoutReconstructor`]), then the header and transaction rows are pulled
//!   out of the text with heuristics ([`HeaderExtractor`], [`TransactionExtractor`])
//! - **Remote path**: the document goes to an external extractor
//!   ([`RemoteExtractor`]) and the compact JSON answer is expanded into the same
//!   shape, with retries on quota and overload failures
//! - **Deduplication**: an identity key per transaction rejects files imported
//!   twice and flags same-key rows for manual removal
//! - **Directory sync**: owners not yet known are appended to the company
//!   directory, matched case-insensitively on canonical and alternate names
//!
//! ## Example
//!
//! ```rust,ignore
//! use bank_statement_importer::*;
//!
//! let store = InMemoryStore::new();
//! let mut importer = StatementImporter::new(store, ImporterConfig::default()).await?;
//!
//! let file = StatementFile::from_path("extrato_janeiro.pdf".as_ref()).await?;
//! let report = importer.import_batch(&[file], None).await;
//!
//! for file in &report.files {
//!     println!("{}: {:?}", file.name, file.outcome);
//! }
//! if let Some(failure) = report.aborted {
//!     eprintln!("stopped at {}: {}", failure.name, failure.error);
//! }
//! ```

pub mod config;
pub mod dedup;
pub mod directory;
pub mod error;
pub mod header;
pub mod importer;
pub mod layout;
pub mod local;
pub mod pdf;
pub mod remote;
pub mod retry;
pub mod schema;
pub mod store;
pub mod text;
pub mod transactions;

#[cfg(feature = "gemini")]
pub mod llm;

pub use config::{
    ClassificationConfig, ExtractionMode, GeminiSettings, HeaderConfig, ImporterConfig,
    LayoutConfig, RetryConfig,
};
pub use dedup::{
    duplicate_ids, find_duplicates, is_repeat_import, DuplicateGroup, IdentityKey,
    TransactionFilter,
};
pub use directory::{apply_company_edit, synchronize, CompanyDirectory, CompanyEdit};
pub use error::{Result, RetryClass, StatementImportError};
pub use header::HeaderExtractor;
pub use importer::{
    BatchReport, DocumentKind, ExtractionPath, FileFailure, FileOutcome, FileReport,
    ImportEvent, StatementFile, StatementImporter,
};
pub use layout::{LayoutReconstructor, PositionedFragment, ReconstructedDocument, ReconstructedLine};
pub use local::LocalExtractor;
pub use remote::{response_schema, RemoteExtractionAdapter, RemoteExtractor, WireStatement};
pub use retry::{retry_with_policy, RetryPolicy};
pub use schema::*;
pub use store::{InMemoryStore, Store};
pub use transactions::{scan_rows, RawRow, TransactionExtractor};

/// Local-path extraction of one PDF with the given configuration.
pub fn extract_pdf_statement(bytes: &[u8], config: &ImporterConfig) -> Result<ExtractedStatement> {
    LocalExtractor::new(config).extract_pdf(bytes)
}
