#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod metrics;
mod store;

pub use store::{MokaObjectStore, MokaObjectStoreBuilder};
