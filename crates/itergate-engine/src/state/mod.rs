pub mod atomic;
pub mod audit_log;
pub mod session;
pub mod store;
pub mod writer;
