//! Helpers shared by the backend's unit and integration tests: quiet logging,
//! throw-away SQLite locations, unique names and problem-details assertions.

pub mod logging;
pub mod problem_details;
pub mod sqlite;
pub mod unique_helpers;
