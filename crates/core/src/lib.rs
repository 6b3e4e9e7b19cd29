pub mod auth;
pub mod calls;
pub mod config;
pub mod contacts;
pub mod deals;
pub mod domain;
pub mod errors;
pub mod geo;
pub mod org;
pub mod qr;

pub use auth::{AuthStrategy, PortalCredentials, SessionSigner};
pub use calls::{aggregate_calls, CallStats, CallStatsPolicy, CallWindow};
pub use domain::call::{CallDirection, CallRecord};
pub use domain::customer::{Company, CompanyAddress, Contact};
pub use domain::deal::{Deal, LeadSourceOption};
pub use domain::employee::{Department, DepartmentId, User, UserId};
pub use domain::product::{ProductId, ProductQr, ProductSnapshot};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use org::{build_directory, EmployeeRow, HierarchyResolver};
