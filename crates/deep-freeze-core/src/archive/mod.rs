pub mod batcher;
pub mod naming;

pub use batcher::{BatchSettings, BatchSummary, Batcher, FlushOutcome};
pub use naming::{safe_filename, ArchiveNamer};
