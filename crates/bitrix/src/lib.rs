//! Bitrix24 REST integration for b24desk.
//!
//! - **Client** (`client`) - `BitrixApi` trait plus the reqwest implementation
//!   used for both OAuth access tokens and incoming webhooks
//! - **Batch** (`batch`) - `batch` method command encoding, chunked at 50
//! - **Records** (`records`) - raw portal JSON into typed core records
//! - **Fetch** (`fetch`) - the calls each page needs, typed end to end
//! - **Directory** (`directory`) - employee directory assembled from users,
//!   departments and call statistics
//! - **Geocoder** (`geocoder`) - Yandex geocoding for the companies map

pub mod batch;
pub mod client;
pub mod directory;
pub mod error;
pub mod fetch;
pub mod geocoder;
pub mod records;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use batch::{BatchCommand, BatchResponse, BATCH_LIMIT};
pub use client::{ApiResponse, BitrixApi, BitrixClient};
pub use directory::employee_directory;
pub use error::BitrixError;
pub use geocoder::{GeocodeError, Geocoder, YandexGeocoder};
