#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod error;
mod store;

pub use error::FeOxDbError;
pub use store::{FeOxDbStore, FeOxDbStoreBuilder};
