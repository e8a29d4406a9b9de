//! Ghost Core - addressing, messages, configuration and error handling

pub mod config;
pub mod error;
pub mod message;
pub mod url;

pub use config::GhostConfig;
pub use error::{Error, ErrorKind, Result};
pub use message::*;
pub use url::Url;
