//! # DialDesk Gateway
//!
//! JSON HTTP surface over the worklist engine: the ordered worklist, the
//! reminder history, and one endpoint per operator action.

pub mod routes;
pub mod server;

pub use server::{AppState, build_router, start};
