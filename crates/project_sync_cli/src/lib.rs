//! Library half of the `project-sync` command line tool.
//!
//! The binary only parses arguments and installs logging; the commands, the
//! configuration file handling and the error type live here so they can be
//! tested.

pub mod commands;
pub mod config;
pub mod errors;

#[cfg(test)]
mod testing;
