#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod collaborators;
pub mod config;
pub mod entities;
pub mod events;
pub mod framework;
pub mod matching;
pub mod processors;
pub mod store;
pub mod utils;
