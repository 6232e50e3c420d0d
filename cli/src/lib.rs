//! Layerforge CLI - multi-stage image builds from the command line.

pub mod commands;
pub mod output;
