//! HTTP request handlers.

pub mod admin;
pub mod health;
pub mod update_check;

pub use admin::*;
pub use health::*;
pub use update_check::*;
