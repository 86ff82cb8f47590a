pub mod client;
pub mod health;
pub mod parse;
pub mod pipeline;
pub mod probe;
pub mod request;
pub mod runtime;

pub use client::{BackendClient, ConnectivityDetails, ConnectivityReport};
pub use health::HealthCache;
