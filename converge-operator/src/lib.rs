pub mod clients;
pub mod config;
pub mod controller;
pub mod queue;
pub mod rest;

pub use config::Args;
pub use controller::{Controller, ControllerConfig};
pub use queue::WorkQueue;
