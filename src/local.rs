use crate::config::ImporterConfig;
use crate::error::Result;
use crate::header::HeaderExtractor;
use crate::layout::{LayoutReconstructor, PositionedFragment};
use crate::pdf;
use crate::schema::ExtractedStatement;
use crate::transactions::TransactionExtractor;
use chrono::NaiveDateTime;
use log::{debug, info};

/// Heuristic path: layout reconstruction, then header and row extraction
/// over the reconstructed text.
pub struct LocalExtractor {
    layout: LayoutReconstructor,
    header: HeaderExtractor,
    transactions: TransactionExtractor,
}

impl LocalExtractor {
    pub fn new(config: &ImporterConfig) -> Self {
        Self {
            layout: LayoutReconstructor::new(config.layout.y_tolerance),
            header: HeaderExtractor::new(&config.header),
            transactions: TransactionExtractor::new(&config.classification),
        }
    }

    pub fn with_reference(mut self, reference: NaiveDateTime) -> Self {
        self.transactions = self.transactions.with_reference(reference);
        self
    }

    pub fn extract_pdf(&self, bytes: &[u8]) -> Result<ExtractedStatement> {
        let pages = pdf::extract_fragments(bytes)?;
        Ok(self.extract_pages(&pages))
    }

    /// Never fails: weak input only degrades the result.
    pub fn extract_pages(&self, pages: &[Vec<PositionedFragment>]) -> ExtractedStatement {
        let document = self.layout.reconstruct_document(pages);
        if document.is_empty() {
            info!("Document has no extractable text");
        }
        debug!("Reconstructed {} lines", document.lines.len());

        let header = self.header.extract(&document.lines);
        let transactions = self.transactions.extract(&document.text(), &header);
        ExtractedStatement {
            header,
            transactions,
        }
    }
}
