//! Decision logic for staging E2E checks: credential resolution and header
//! building on the way out, event validation on the way back.

pub mod auth;
pub mod close;
pub mod config;
pub mod error;
pub mod events;
pub mod headers;
pub mod report;
pub mod secret;
pub mod stall;
pub mod users;
pub mod validator;

pub use error::Error;
