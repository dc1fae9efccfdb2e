pub mod clock;
pub mod config;
pub mod crossref;
pub mod domain;
pub mod engine;
pub mod error;
pub mod extract;
pub mod fetcher;
pub mod identity;
pub mod jobs;
pub mod metrics;
pub mod orcid;
pub mod output;
pub mod reconcile;
pub mod resolver;
pub mod store;
pub mod timeline;
