pub mod ai;
pub mod auth;
pub mod clock;
pub mod compress;
pub mod config;
pub mod credentials;
pub mod dashboard;
pub mod format;
pub mod ingest;
pub mod models;
pub mod notice;
pub mod session;
pub mod storage;
