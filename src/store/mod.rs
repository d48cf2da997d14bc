//! Local JSON-lines store
//!
//! A file-backed [`StoreClient`](crate::snapshot::StoreClient) used by the
//! CLI and by tests that need a real backing store.

mod access;
mod local;
mod sql;

pub use access::{hash_token, ACCESS_TOKEN_FILE};
pub use local::{LocalStore, DEFAULT_PARTITION_SIZE_BYTES};
pub use sql::{parse as parse_select, SelectStatement};
