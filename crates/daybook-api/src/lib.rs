pub mod analyses;
pub mod conversation;
pub mod entries;
pub mod error;
pub mod middleware;
pub mod questions;
pub mod routes;
pub mod state;

pub use routes::router;
pub use state::{AppState, AppStateInner};
