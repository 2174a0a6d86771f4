//! Disk I/O for the output file shared by every worker of a task.
//!
//! The file is written in place at its final name. Workers write disjoint
//! offsets concurrently (pwrite-style); pre-sizing uses fallocate on Unix
//! when available, else set_len.

mod writer;

pub use writer::StorageWriter;
