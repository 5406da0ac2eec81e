pub mod cli;
pub mod flags;
