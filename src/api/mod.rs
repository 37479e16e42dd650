// HTTP route layer over the credential broker

pub mod auth;
mod state_manager;

pub use auth::{create_auth_router, AppError, AuthAppState};
pub use state_manager::{run_state_cleanup, StateEntry, StateManager};
