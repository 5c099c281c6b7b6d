#![forbid(unsafe_code)]

pub mod config;
pub mod gates;
pub mod report;
pub mod state;
