pub mod config;
pub mod dashboard;
pub mod enroll;
pub mod error;
pub mod marking;
pub mod metadata;
pub mod overview;
pub mod recognition;
pub mod reports;
pub mod roster;
pub mod sheet;
pub mod store;
