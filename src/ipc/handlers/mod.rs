pub mod auth;
pub mod core;
pub mod enrollment_requests;
pub mod records;
pub mod reports;
