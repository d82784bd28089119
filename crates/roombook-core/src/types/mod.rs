//! Core types for Roombook

mod user;

pub use user::*;
