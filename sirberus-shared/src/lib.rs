//! Types shared by the Sirberus server crates.

pub mod constants;
pub mod errors;

pub use errors::{SirberusError, SirberusResult};
