//! Provider clients.

pub mod http;

pub use http::HttpProviderClient;
