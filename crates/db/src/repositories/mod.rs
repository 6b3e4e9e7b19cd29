use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use b24desk_core::domain::product::ProductQr;

pub mod memory;
pub mod product_qr;

pub use memory::InMemoryProductQrRepository;
pub use product_qr::SqlProductQrRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Stored QR codes; records are written once and never updated.
#[async_trait]
pub trait ProductQrRepository: Send + Sync {
    async fn save(&self, record: &ProductQr) -> Result<(), RepositoryError>;
    async fn find(&self, id: Uuid) -> Result<Option<ProductQr>, RepositoryError>;
    /// Newest first.
    async fn list_recent(&self, limit: usize) -> Result<Vec<ProductQr>, RepositoryError>;
}
