//! # strata-cli
//!
//! Command-line interface for the Strata agent.
//!
//! ## Commands
//!
//! - `strata serve`: Start the agent and its HTTP API
//! - `strata chat`: Interactive chat in the terminal
//! - `strata ask <query>`: Answer one query and exit
//! - `strata config`: Show the effective configuration

pub mod commands;

pub use commands::Cli;
