//! unitrun - run and report a test library
//!
//! The binary ships a small demonstration library. Real test binaries link
//! the `unitrun` crate and call [`unitrun::cli::run`] with their own library.
//!
//! ## Usage
//!
//! ```bash
//! # Run everything, showing failures and exceptions
//! unitrun run
//!
//! # Run the network tests on four workers with a JUnit report
//! unitrun run -r net/ -j 4 --xml results.xml
//!
//! # Everything except one test, with successes and timings
//! unitrun run -x strings/upper -st
//!
//! # List the runs a selection expands to
//! unitrun list -p '{"math/add": [[1, 2], 0]}'
//! ```

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;

mod demo;

use unitrun::cli::{self, Args};
use unitrun::utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(LogLevel::from_verbosity(args.verbose));

    cli::run(Arc::new(demo::library()), args).await
}
