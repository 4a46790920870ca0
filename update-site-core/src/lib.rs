//! Update site generator library exports

pub mod catalog;
pub mod config;
pub mod coordinates;
pub mod manifest;
pub mod pipeline;
pub mod repository;
pub mod signing;
pub mod tiers;
pub mod version;
