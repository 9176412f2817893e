//! REST surface over the admission boundaries.

mod handlers;
mod routes;

pub use handlers::{Admits, ApiError, AppState, DeleteResponse, VersionInfo};
pub use routes::create_router;
