#![warn(rust_2024_compatibility)]
#![deny(
    clippy::explicit_iter_loop,
    clippy::manual_let_else,
    clippy::semicolon_if_nothing_returned,
    clippy::inconsistent_struct_constructor
)]
#![allow(
    clippy::cast_possible_truncation, // Sizes and millisecond durations stay far below u64/usize limits
    clippy::missing_errors_doc,       // Internal API
    clippy::module_name_repetitions,  // e.g. ReceiverError in collector module
    clippy::must_use_candidate,
    clippy::doc_markdown
)]

pub mod app;
pub mod buffer;
pub mod collector;
pub mod domain;
pub mod metadata;
pub mod parser;
pub mod sender;

pub use app::{AgentConfig, App, Cli};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
