use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use b24desk_core::domain::product::{ProductId, ProductQr, ProductSnapshot};

use super::{ProductQrRepository, RepositoryError};
use crate::DbPool;

pub struct SqlProductQrRepository {
    pool: DbPool,
}

impl SqlProductQrRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(error: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ProductQr, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode)?;
    let product_id: String = row.try_get("product_id").map_err(decode)?;
    let member_id: Option<String> = row.try_get("member_id").map_err(decode)?;
    let product_json: String = row.try_get("product_json").map_err(decode)?;
    let created_at: String = row.try_get("created_at").map_err(decode)?;

    Ok(ProductQr {
        id: Uuid::parse_str(&id).map_err(decode)?,
        product_id: ProductId(product_id),
        member_id,
        product: ProductSnapshot(serde_json::from_str(&product_json).map_err(decode)?),
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(decode)?,
    })
}

#[async_trait::async_trait]
impl ProductQrRepository for SqlProductQrRepository {
    async fn save(&self, record: &ProductQr) -> Result<(), RepositoryError> {
        let product_json = serde_json::to_string(&record.product.0).map_err(decode)?;

        sqlx::query(
            "INSERT INTO product_qr (id, product_id, member_id, product_json, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(record.id.to_string())
        .bind(&record.product_id.0)
        .bind(record.member_id.as_deref())
        .bind(product_json)
        .bind(record.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: Uuid) -> Result<Option<ProductQr>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, product_id, member_id, product_json, created_at
             FROM product_qr WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<ProductQr>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, product_id, member_id, product_json, created_at
             FROM product_qr ORDER BY created_at DESC LIMIT ?",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::json;
    use uuid::Uuid;

    use b24desk_core::domain::product::{ProductId, ProductQr, ProductSnapshot};

    use super::SqlProductQrRepository;
    use crate::migrations::run_pending;
    use crate::repositories::{ProductQrRepository, RepositoryError};
    use crate::{connect_with_settings, DbPool};

    async fn pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrate");
        pool
    }

    fn record(product_id: &str, name: &str) -> ProductQr {
        ProductQr::new(
            ProductId(product_id.to_string()),
            Some("member-1".to_string()),
            ProductSnapshot(json!({"ID": product_id, "NAME": name, "PRICE": "990.00"})),
        )
    }

    #[tokio::test]
    async fn saved_record_round_trips_snapshot() {
        let repo = SqlProductQrRepository::new(pool().await);
        let saved = record("42", "Чайник");

        repo.save(&saved).await.expect("save");
        let found = repo.find(saved.id).await.expect("find").expect("present");

        assert_eq!(found.product.name(), Some("Чайник"));
        assert_eq!(found.member_id.as_deref(), Some("member-1"));
        assert_eq!(found.created_at.timestamp(), saved.created_at.timestamp());
        assert!(repo.find(Uuid::new_v4()).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let repo = SqlProductQrRepository::new(pool().await);
        let saved = record("1", "A");

        repo.save(&saved).await.expect("first save");
        let error = repo.save(&saved).await.expect_err("primary key");

        assert!(matches!(error, RepositoryError::Database(_)));
    }

    #[tokio::test]
    async fn recent_list_is_newest_first() {
        let repo = SqlProductQrRepository::new(pool().await);
        let mut older = record("1", "Old");
        older.created_at = Utc::now() - Duration::hours(2);
        let newer = record("2", "New");

        repo.save(&older).await.expect("save");
        repo.save(&newer).await.expect("save");

        let listed = repo.list_recent(10).await.expect("list");
        let names: Vec<_> = listed.iter().filter_map(|qr| qr.product.name()).collect();
        assert_eq!(names, vec!["New", "Old"]);
        assert_eq!(repo.list_recent(1).await.expect("list").len(), 1);
    }
}
