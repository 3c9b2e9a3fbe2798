#![doc = include_str!("../README.md")]

pub mod mock_transport;
pub mod reporter;
pub mod tracing;

pub use mock_transport::{MockTransport, TransportCounters};
pub use reporter::{RecordingReporter, Report};
