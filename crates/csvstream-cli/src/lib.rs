//! Command-line front end for `csvstream-core`.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod render;
