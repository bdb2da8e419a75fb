pub mod cli;
pub mod config;
pub mod pattern;
pub mod script;
pub mod sink;
