use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

use b24desk_core::domain::product::ProductQr;

use super::{ProductQrRepository, RepositoryError};

#[derive(Default)]
pub struct InMemoryProductQrRepository {
    records: RwLock<HashMap<Uuid, ProductQr>>,
}

#[async_trait::async_trait]
impl ProductQrRepository for InMemoryProductQrRepository {
    async fn save(&self, record: &ProductQr) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert(record.id, record.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ProductQr>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ProductQr>, RepositoryError> {
        let records = self.records.read().await;
        let mut listed: Vec<ProductQr> = records.values().cloned().collect();
        listed.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        listed.truncate(limit);
        Ok(listed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use b24desk_core::domain::product::{ProductId, ProductQr, ProductSnapshot};

    use super::InMemoryProductQrRepository;
    use crate::repositories::ProductQrRepository;

    #[tokio::test]
    async fn in_memory_repository_finds_saved_records() {
        let repo = InMemoryProductQrRepository::default();
        let record = ProductQr::new(
            ProductId("7".to_string()),
            None,
            ProductSnapshot(json!({"ID": "7", "NAME": "Лампа"})),
        );

        repo.save(&record).await.expect("save");

        let found = repo.find(record.id).await.expect("find").expect("present");
        assert_eq!(found, record);
        assert_eq!(repo.list_recent(5).await.expect("list"), vec![record]);
    }
}
