//! pakflow - streaming task execution for package-manager front ends
//!
//! pakflow drives an external command-line package manager (winget-style)
//! through asynchronous start/stop calls and push-event streams. Raw process
//! output is folded through a terminal-faithful buffer so carriage-return
//! progress redraws and ANSI escape sequences render the way a real terminal
//! shows them, while per-kind execution sessions and a sequential batch
//! runner handle task lifecycle, cooperative cancellation, and
//! partial-failure accounting.

pub mod backend;
pub mod config;
pub mod domain;
pub mod exec;
pub mod flags;
pub mod terminal;

pub use domain::*;
