//! End-to-end tests for flagsheet-xlsx.
//!
//! Each test writes a small fixture package to a temp directory, runs it
//! through `XlsxReader`/`XlsxWriter` and the package helpers, and inspects
//! the resulting archive.

mod common;
mod repair;
mod round_trip;

pub use common::*;
