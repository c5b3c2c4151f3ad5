pub mod articles;
pub mod maintenance;
pub mod members;
pub mod reservations;
