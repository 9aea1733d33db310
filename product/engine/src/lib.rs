pub mod accumulate;
pub mod archive;
pub mod bing;
pub mod config;
pub mod crawler;
mod error;
pub mod harvest;
pub mod names;
pub mod paths;
pub mod scan;
pub mod source;

pub use error::{EngineError, Result};
