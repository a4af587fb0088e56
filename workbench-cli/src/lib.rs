//! IDL-driven workbench for on-chain programs.
//!
//! Provides:
//! - Type-aware form handling and argument processing
//! - Borsh serialization of instruction data
//! - PDA derivation from typed seeds and IDL seed declarations
//! - Transaction assembly, submission and confirmation
//! - Saved test suites and a sequential suite runner
//!
//! Use this as a library to drive programs from Rust, or use the
//! `workbench` binary for a fully generic IDL-driven experience.

pub mod app;
pub mod cli;
pub mod client;
pub mod config;
pub mod hex;
pub mod parse;
pub mod pda;
pub mod serialize;
pub mod suite;
pub mod tx;

pub use app::run;
