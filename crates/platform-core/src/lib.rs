pub mod channel;
pub mod config;
pub mod critical_path;
pub mod decision;
pub mod digest;
pub mod error;
pub mod executor;
pub mod infra;
pub mod io;
pub mod paths;
pub mod process;
pub mod proposal;
pub mod registry;
pub mod rules;
pub mod token;
pub mod validator;

#[cfg(test)]
mod testing;

pub use error::{ErrorKind, PlatformError, Result};
