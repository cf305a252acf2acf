use crate::error::{Result, StatementImportError};
use crate::schema::{Company, Transaction, TransactionPatch, User};
use async_trait::async_trait;
use log::debug;

/// Persistence collaborator over the transactions, companies and users
/// collections. Appends return the identifier the store assigned.
#[async_trait]
pub trait Store: Send + Sync {
    async fn load_transactions(&self) -> Result<Vec<Transaction>>;

    async fn load_companies(&self) -> Result<Vec<Company>>;

    async fn load_users(&self) -> Result<Vec<User>>;

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<String>;

    async fn append_company(&mut self, company: &Company) -> Result<String>;

    async fn append_user(&mut self, user: &User) -> Result<String>;

    async fn patch_transaction(&mut self, id: &str, patch: &TransactionPatch) -> Result<()>;

    /// Overwrites the stored company carrying `company.id`.
    async fn patch_company(&mut self, company: &Company) -> Result<()>;

    async fn delete_transaction(&mut self, id: &str) -> Result<()>;
}

/// Vec-backed store with UUID identifiers.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    transactions: Vec<Transaction>,
    companies: Vec<Company>,
    users: Vec<User>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store as-is; records keep the ids they carry.
    pub fn with_records(transactions: Vec<Transaction>, companies: Vec<Company>) -> Self {
        Self {
            transactions,
            companies,
            users: Vec::new(),
        }
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn companies(&self) -> &[Company] {
        &self.companies
    }

    fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions.clone())
    }

    async fn load_companies(&self) -> Result<Vec<Company>> {
        Ok(self.companies.clone())
    }

    async fn load_users(&self) -> Result<Vec<User>> {
        Ok(self.users.clone())
    }

    async fn append_transaction(&mut self, transaction: &Transaction) -> Result<String> {
        let id = Self::next_id();
        self.transactions.push(Transaction {
            id: id.clone(),
            ..transaction.clone()
        });
        Ok(id)
    }

    async fn append_company(&mut self, company: &Company) -> Result<String> {
        let id = Self::next_id();
        self.companies.push(Company {
            id: id.clone(),
            ..company.clone()
        });
        debug!("Stored company '{}' as {}", company.canonical_name, id);
        Ok(id)
    }

    async fn append_user(&mut self, user: &User) -> Result<String> {
        let id = Self::next_id();
        self.users.push(User {
            id: id.clone(),
            ..user.clone()
        });
        Ok(id)
    }

    async fn patch_transaction(&mut self, id: &str, patch: &TransactionPatch) -> Result<()> {
        let stored = self
            .transactions
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| StatementImportError::NotFound(format!("transaction {}", id)))?;
        patch.apply(stored);
        Ok(())
    }

    async fn patch_company(&mut self, company: &Company) -> Result<()> {
        let stored = self
            .companies
            .iter_mut()
            .find(|c| c.id == company.id)
            .ok_or_else(|| StatementImportError::NotFound(format!("company {}", company.id)))?;
        *stored = company.clone();
        Ok(())
    }

    async fn delete_transaction(&mut self, id: &str) -> Result<()> {
        let before = self.transactions.len();
        self.transactions.retain(|t| t.id != id);
        if self.transactions.len() == before {
            return Err(StatementImportError::NotFound(format!("transaction {}", id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::StatementHeader;
    use chrono::NaiveDate;

    fn sample() -> Transaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Transaction::manual_balance(&StatementHeader::default(), date, 10.0, "Saldo")
    }

    #[tokio::test]
    async fn test_append_assigns_fresh_ids() {
        let mut store = InMemoryStore::new();
        let tx = sample();

        let first = store.append_transaction(&tx).await.unwrap();
        let second = store.append_transaction(&tx).await.unwrap();

        assert_ne!(first, second);
        assert_ne!(first, tx.id);
        let loaded = store.load_transactions().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, first);
    }

    #[tokio::test]
    async fn test_patch_and_delete() {
        let mut store = InMemoryStore::new();
        let id = store.append_transaction(&sample()).await.unwrap();

        let patch = TransactionPatch {
            description: Some("Saldo conferido".to_string()),
            ..Default::default()
        };
        store.patch_transaction(&id, &patch).await.unwrap();
        assert_eq!(store.transactions()[0].description, "Saldo conferido");

        store.delete_transaction(&id).await.unwrap();
        assert!(store.transactions().is_empty());
        assert!(matches!(
            store.delete_transaction(&id).await,
            Err(StatementImportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_company_and_user_round_trip() {
        let mut store = InMemoryStore::new();
        let id = store.append_company(&Company::new("Acme", "1")).await.unwrap();

        let mut company = store.load_companies().await.unwrap().remove(0);
        assert_eq!(company.id, id);
        company.hidden = true;
        store.patch_company(&company).await.unwrap();
        assert!(store.companies()[0].hidden);

        let user = User {
            id: String::new(),
            email: "ana@example.com".to_string(),
            display_name: "Ana".to_string(),
        };
        let user_id = store.append_user(&user).await.unwrap();
        assert_eq!(store.load_users().await.unwrap()[0].id, user_id);
    }
}
