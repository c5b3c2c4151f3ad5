//! Repository functions, generic over `ConnectionTrait` so they run on a pool
//! or inside a transaction. Database errors leave as `DomainError`.

pub mod articles;
pub mod members;
pub mod reservations;
pub mod sessions;
