pub mod client;
pub mod connectors;
pub mod error;

pub use crate::client::{Body, Client, ClientBuilder, Completion, Outcome};
pub use crate::error::ClientError;
pub use hyper::body::Bytes;
