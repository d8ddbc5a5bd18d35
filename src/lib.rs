/*! # mtdata

Acquisition of parallel and monolingual corpora for machine translation.

A [catalog::Catalog] describes where corpora live. The [cache::Cache] downloads each resource
once and locates members inside archives, [formats] parses the many wire formats into aligned
segments, and [processing] assembles normalized per-language train/dev/test files.
!*/
pub mod cache;
pub mod catalog;
pub mod config;
pub mod error;
pub mod formats;
pub mod io;
pub mod lang;
pub mod processing;

pub use error::Error;
