//! BoothPay Common Types
//!
//! Shared identifiers, fixed-point money, error and time types used by the
//! wallet ledger and its callers.

pub mod identifiers;
pub mod monetary;
pub mod error;
pub mod time;

pub use identifiers::*;
pub use monetary::*;
pub use error::*;
pub use time::*;
