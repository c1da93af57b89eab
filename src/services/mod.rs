pub mod attendance;
pub mod audit;
pub mod auth;
pub mod converts;
pub mod export;
pub mod groups;
pub mod milestones;
pub mod progress;
pub mod users;
