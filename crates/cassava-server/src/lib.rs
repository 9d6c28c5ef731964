//! Cassava Server - configuration, logging and event replay around the quota engine

pub mod config;
pub mod metrics;
pub mod startup;
