//! Inter-process communication for mathpdf worker processes.
//!
//! This module provides the protocol and the process-backed execution unit
//! used to run documents through isolated `mathpdf-worker` processes.

pub mod protocol;
mod worker;

pub use protocol::{WorkerCommand, WorkerResponse, read_message, write_message};
pub use worker::{ProcessSpawner, ProcessUnit, WORKER_PATH_ENV, find_worker_binary};
