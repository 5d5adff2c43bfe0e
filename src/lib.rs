#![deny(warnings, clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub(crate) mod clients;
pub(crate) mod community;
pub mod config;
pub mod feed;
pub mod observability;
pub mod pipeline;
pub(crate) mod reputation;
pub(crate) mod store;
pub(crate) mod util;

pub use pipeline::{RunSummary, run};
