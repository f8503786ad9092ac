pub(crate) mod bootstrap;
pub(crate) mod config;
mod gameplay;
pub(crate) mod loop_runner;
