pub mod auth;
pub mod content;
pub mod email;
pub mod media;
pub mod metrics;
pub mod storage;
pub mod users;
