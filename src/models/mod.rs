pub mod attendance;
pub mod auth;
pub mod convert;
pub mod group;
pub mod milestone;
pub mod progress;
pub mod user;
