pub mod types;
pub mod error;
pub mod time;
pub mod source;
pub mod data;
pub mod archive;
pub mod query;
pub mod control;
pub mod config;
pub mod logging;
pub mod worker;

pub use types::*;
pub use error::{PipelineError, Result};
