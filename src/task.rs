//! Background loops for ingestion and delivery.

pub mod delivery_worker;
pub mod ingestion_loop;
