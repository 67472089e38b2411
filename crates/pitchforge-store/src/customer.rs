use async_trait::async_trait;
use parking_lot::RwLock;
use pitchforge_core::{CustomerSeed, PitchError, PitchResult};
use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Lookup of customer seeds by id.
#[async_trait]
pub trait CustomerRepository: Send + Sync {
    /// Fails with `NotFound` when `id` does not resolve.
    async fn get(&self, id: Uuid) -> PitchResult<CustomerSeed>;
    /// Every known customer.
    async fn list(&self) -> PitchResult<Vec<CustomerSeed>>;
}

/// In-memory repository, for tests and demos.
#[derive(Default)]
pub struct MemoryCustomerRepository {
    customers: RwLock<HashMap<Uuid, CustomerSeed>>,
}

impl MemoryCustomerRepository {
    /// Repository holding `customers`.
    pub fn new(customers: impl IntoIterator<Item = CustomerSeed>) -> Self {
        Self {
            customers: RwLock::new(customers.into_iter().map(|c| (c.id, c)).collect()),
        }
    }

    /// Add or replace a customer.
    pub fn insert(&self, customer: CustomerSeed) {
        self.customers.write().insert(customer.id, customer);
    }
}

#[async_trait]
impl CustomerRepository for MemoryCustomerRepository {
    async fn get(&self, id: Uuid) -> PitchResult<CustomerSeed> {
        self.customers
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| PitchError::NotFound(format!("customer {id}")))
    }

    async fn list(&self) -> PitchResult<Vec<CustomerSeed>> {
        let mut all: Vec<CustomerSeed> = self.customers.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

/// Customers read from a JSON array file on every lookup, so edits to the
/// file are picked up without a restart. A missing file is an empty list.
pub struct FileCustomerRepository {
    path: PathBuf,
}

impl FileCustomerRepository {
    /// Repository over the JSON array at `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    async fn load(&self) -> PitchResult<Vec<CustomerSeed>> {
        if !tokio::fs::try_exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let data = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&data).map_err(|e| {
            PitchError::Storage(format!(
                "Failed to parse customers file {}: {e}",
                self.path.display()
            ))
        })
    }
}

#[async_trait]
impl CustomerRepository for FileCustomerRepository {
    async fn get(&self, id: Uuid) -> PitchResult<CustomerSeed> {
        self.load()
            .await?
            .into_iter()
            .find(|c| c.id == id)
            .ok_or_else(|| PitchError::NotFound(format!("customer {id}")))
    }

    async fn list(&self) -> PitchResult<Vec<CustomerSeed>> {
        self.load().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_memory_repository() {
        let ada = CustomerSeed::new("Ada", "Analytical Engines", "manufacturing");
        let repo = MemoryCustomerRepository::new([ada.clone()]);
        assert_eq!(repo.get(ada.id).await.unwrap().company, "Analytical Engines");
        assert!(matches!(
            repo.get(Uuid::new_v4()).await,
            Err(PitchError::NotFound(_))
        ));

        repo.insert(CustomerSeed::new("Grace", "Compilers Inc", "software"));
        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Ada", "Grace"]);
    }

    #[tokio::test]
    async fn test_file_repository() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("customers.json");
        let repo = FileCustomerRepository::new(path.clone());
        assert!(repo.list().await.unwrap().is_empty());

        let ada = CustomerSeed::new("Ada", "Analytical Engines", "manufacturing");
        tokio::fs::write(&path, serde_json::to_string(&vec![ada.clone()]).unwrap())
            .await
            .unwrap();
        assert_eq!(repo.get(ada.id).await.unwrap().name, "Ada");
        assert!(matches!(
            repo.get(Uuid::new_v4()).await,
            Err(PitchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_file_repository_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("customers.json");
        tokio::fs::write(&path, "not json").await.unwrap();
        let err = FileCustomerRepository::new(path).list().await.unwrap_err();
        assert!(matches!(err, PitchError::Storage(_)));
    }
}
