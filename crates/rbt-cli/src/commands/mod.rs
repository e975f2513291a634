//! Command handler modules for rbt-cli.
//!
//! Command-specific logic lives in the submodules.

pub mod run;
