//! freelance-feed - ingests freelance listings from fl.ru and announces them
//! to Telegram subscribers.
//!
//! The pipeline has two independent loops that only share the database:
//! - ingestion: polls the listing source and stores new listings, each with
//!   a delivery task
//! - delivery: works off the delivery queue, matching every listing against
//!   subscriber filters

pub mod callback;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod logging;
pub mod messenger;
pub mod repository;
pub mod service;
pub mod source;
pub mod task;
