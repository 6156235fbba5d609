//! Domain model (keys, entries, claim results, errors).

pub mod claim;
pub mod entry;
pub mod errors;
pub mod key;
pub mod response;

pub use self::claim::ClaimResult;
pub use self::entry::{ClaimId, Entry};
pub use self::errors::StoreError;
pub use self::key::{IdempotencyKey, KeyError};
pub use self::response::StoredResponse;
