use actix_web::{web, HttpResponse, Result};
use serde::Serialize;
use time::OffsetDateTime;

use crate::entities::members::{MemberStatus, Model as Member};
use crate::error::AppError;
use crate::extractors::CurrentMember;

/// Member as shown over the API; never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct MemberView {
    pub id: i64,
    pub username: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: MemberStatus,
    pub is_admin: bool,
    pub is_trainer: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl From<&Member> for MemberView {
    fn from(m: &Member) -> Self {
        Self {
            id: m.id,
            username: m.username.clone(),
            full_name: m.full_name.clone(),
            email: m.email.clone(),
            phone: m.phone.clone(),
            status: m.status,
            is_admin: m.is_admin,
            is_trainer: m.is_trainer,
            created_at: m.created_at,
        }
    }
}

async fn me(current: CurrentMember) -> Result<HttpResponse, AppError> {
    Ok(HttpResponse::Ok().json(MemberView::from(&current.member)))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/me").route(web::get().to(me)));
}
