mod file;
mod memory;

pub use file::{FileJob, FileQueue};
pub use memory::{MemoryJob, MemoryQueue};
pub use test::{TestJob, TestQueue};
