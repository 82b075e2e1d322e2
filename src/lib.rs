pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod study;
