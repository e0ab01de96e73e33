//! Types
//!
//! Tokens, endpoints, environments, device codes and configuration.

pub mod config;
pub mod device;
pub mod endpoints;
pub mod environment;
pub mod serde_helpers;
pub mod token;

pub use config::*;
pub use device::*;
pub use endpoints::*;
pub use environment::*;
pub use token::*;
