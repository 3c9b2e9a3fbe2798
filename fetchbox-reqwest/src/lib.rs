#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod error;
mod transport;

pub use error::TransportBuildError;
pub use transport::ReqwestTransport;

/// Re-export of the underlying client for building custom instances.
pub use reqwest::Client as ReqwestClient;
