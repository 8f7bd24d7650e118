//! Plain data types shared by every component: service definitions and runtime state.

pub mod service;
pub mod state;

pub use service::*;
pub use state::*;
