//! Command-line interface of the listener

mod args;

pub use args::Args;
