pub mod clock;
pub mod config;
pub mod directory;
pub mod error;
pub mod guard;
pub mod lifecycle;
pub mod limits;
pub mod model;
pub mod observability;
pub mod payment;
pub mod policy;
pub mod pricing;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod wal;
