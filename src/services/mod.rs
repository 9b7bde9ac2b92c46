//! Storage backends and the services built on top of them.

pub mod backend;
pub mod filesystem;
pub mod listing;
pub mod media;
pub mod migration;
pub mod object_store;
pub mod proxy;
pub mod storage_service;
pub mod url_resolver;
