//! Reqwest based transport for the API client.
pub mod client;
pub mod config;
