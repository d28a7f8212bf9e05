//! Read-only access to committed ledger data and the tenant registry.

pub mod reader;
pub mod snapshot;

pub use reader::{AccountSnapshot, LedgerReader, TenantRegistry};
pub use snapshot::LedgerSnapshot;
