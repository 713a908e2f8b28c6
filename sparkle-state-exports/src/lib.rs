// Copyright (c) 2022 MASSA LABS <info@massa.net>

//! # General description
//!
//! Types, traits, configuration and errors of the sparkle state store.
//! The implementation lives in `sparkle_state_worker`.

mod config;
mod constants;
mod controller;
mod error;
mod strategy;
mod types;

pub use config::*;
pub use constants::*;
pub use controller::*;
pub use error::*;
pub use strategy::*;
pub use types::*;
