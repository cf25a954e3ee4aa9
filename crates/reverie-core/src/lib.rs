//! Reverie core - shared identifiers, error taxonomy and configuration

pub mod config;
pub mod error;
pub mod types;

pub use config::ReverieConfig;
pub use error::{Error, Result};
pub use types::{Role, SessionKey, UserId};
