//! # Air Alert Core
//!
//! Shared foundation for the Air Alert workspace: the error taxonomy, the
//! configuration model, the data model passed between components and the
//! collaborator traits the scheduler jobs, forecast engine and dispatcher
//! are written against.

pub mod aqi;
pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::AirAlertConfig;
pub use error::{AirAlertError, Result};
pub use traits::*;
pub use types::*;
