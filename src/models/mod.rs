//! Data models for the storage proxy.
//!
//! `raw` holds what backends report, `entry` holds the canonical listing
//! shape serialized to clients, and `grant` holds generated access URLs.

pub mod entry;
pub mod grant;
pub mod raw;
