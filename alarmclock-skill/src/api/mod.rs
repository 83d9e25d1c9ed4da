//! Local HTTP API for status and control.

pub mod commands;
pub mod server;
mod v0;

pub use server::{SharedState, serve};
