//! # Data structures for the ACME protocol
//!
//! Serde types for the resources this crate exchanges with an ACME
//! service. Only the members an HTTP-01, single domain flow reads are
//! modelled; unknown members are ignored.

pub mod account;
pub mod authorizations;
pub mod challenges;
pub mod directory;
pub mod identifier;
pub mod orders;

pub use self::account::Account;
pub use self::authorizations::Authorization;
pub use self::challenges::Challenge;
pub use self::directory::Directory;
pub use self::identifier::Identifier;
pub use self::orders::Order;
