#![forbid(unsafe_code)]

pub mod autosave;
pub mod cli;
pub mod commands;
pub mod config;
pub mod draft_store;
pub mod error;
pub mod export;
pub mod generator;
pub mod logging;
pub mod model;
pub mod openai;
pub mod repl;
pub mod workflow;
