/*! Dataset processing

Turns catalog entries into normalized, aligned per-language files:

- [task]: fetch, parse and write a single entry,
- [merge]: merge train parts with deduplication and dev/test leakage filtering,
- [dataset]: plan a whole request and run its entries on a worker pool.
!*/
pub mod dataset;
pub mod merge;
pub mod task;

pub use dataset::{AssembleOptions, AssembleReport, Assembler, Request};
pub use merge::{MergeStats, PartStats};
pub use task::{process_entry, EntryReport, EntryTask};
