//! unitrun - test harness for compiled test libraries
//!
//! Selects tests from a [`library::TestLibrary`], expands them into
//! (test, parameters) pairs, runs them sequentially or on a worker pool and
//! fans the raised events out to console, JUnit XML, TeamCity and JSON reports.

pub mod cli;
pub mod config;
pub mod executor;
pub mod library;
pub mod models;
pub mod report;
pub mod selection;
pub mod utils;
