//! End-to-end tests for the flagsheet engine.
//!
//! Each test writes a small inspection workbook to a temp directory, runs
//! an [`flagsheet::Engine`] over it and reads the saved package back.

mod common;
mod generate;
mod marking;
mod persistence;

pub use common::*;
