//! Resumable multi-path range downloader.
//!
//! A worker per upstream path leases byte ranges of the current resource from
//! a shared [`ledger::RangeLedger`], fetches them with open-ended ranged
//! requests, and writes them in place. Pending ranges are checkpointed to a
//! sidecar file so an interrupted download resumes where it stopped.

pub mod checkpoint;
pub mod checksum;
pub mod config;
pub mod fetch_head;
pub mod ledger;
pub mod logging;
pub mod resolver;
pub mod retry;
pub mod scheduler;
pub mod storage;
pub mod task;
pub mod transfer;
pub mod upstream;
pub mod url_model;
pub mod wire;
