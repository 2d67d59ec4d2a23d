//! dog-core: tenant identity, structured errors and configuration shared by
//! every DogRS tenancy crate.

pub mod config;
pub mod errors;
pub mod tenant;

pub use config::{DogConfig, DogConfigSnapshot};
pub use errors::{DogError, DogResult, ErrorKind};
pub use tenant::{TenantContext, TenantId};
