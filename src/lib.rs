//! Townsfolk: a people-by-town directory served from a tiered read-through cache.
//!
//! Page reads flow through [`cache::CacheManager`], which consults an in-process
//! memory tier, then a shared Redis tier, and finally the Postgres aggregates in
//! [`application`].

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
