pub mod auth_token;
pub mod current_member;

pub use auth_token::{AuthToken, SESSION_COOKIE};
pub use current_member::{AdminMember, CurrentMember};
