pub mod backend;
pub mod config;
pub mod error;
pub mod lock;
pub mod prompt;
pub mod router;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;
