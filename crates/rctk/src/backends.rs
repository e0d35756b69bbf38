//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Listings pour the pages, Sinks slurp them up.
//! And in between, the paginator keeps everyone honest (one page at a time, please).
//!
//! 🎭 This module is the casting agency. Need to scan a DynamoDB table?
//! Follow a CloudWatch stream from the dawn of time? Write NDJSON to a file,
//! or to stdout for the pipe-to-`jq` crowd? We've got a backend for that.
//!
//! - [`listing`] / [`sink`]: the two traits the paginator speaks.
//! - [`file`]: the line-per-record sink, for files and stdout.
//! - [`in_mem`]: scripted listings and hoarding sinks, for tests and benches.
//! - [`aws`]: the thin adapters over the AWS SDK clients.
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

mod listing;
mod sink;

pub mod aws;
pub mod file;
pub mod in_mem;

pub use file::{Destination, FileSink, Record};
pub use listing::Listing;
pub use sink::Sink;
