//! Deployment records and their status machine

pub mod status;
pub mod store;
