pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod pipeline;
pub mod project;
