#![forbid(unsafe_code)]

pub mod errors;
pub mod list;
pub mod metrics;
pub mod schema;
pub mod spec;
pub mod state;
pub mod templates;
pub mod types;
