use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use tracing::debug;

use super::auth_token::AuthToken;
use crate::auth::verify_session_token;
use crate::db::require_db;
use crate::entities::members::{MemberStatus, Model as Member};
use crate::error::AppError;
use crate::errors::ErrorCode;
use crate::repos::{members, sessions};
use crate::state::app_state::AppState;

/// An approved member with a live session.
#[derive(Debug, Clone)]
pub struct CurrentMember {
    pub member: Member,
    pub session_id: String,
}

/// A [`CurrentMember`] whose account carries the admin flag.
#[derive(Debug, Clone)]
pub struct AdminMember(pub CurrentMember);

impl AdminMember {
    pub fn id(&self) -> i64 {
        self.0.member.id
    }
}

fn app_state(req: &HttpRequest) -> Result<web::Data<AppState>, AppError> {
    req.app_data::<web::Data<AppState>>()
        .cloned()
        .ok_or_else(|| AppError::internal("AppState not available"))
}

async fn resolve(req: HttpRequest) -> Result<CurrentMember, AppError> {
    let token = AuthToken::from_http(&req)?;
    let state = app_state(&req)?;
    let claims = verify_session_token(&token.token, &state.security)?;
    let member_id = claims.member_id()?;

    let db = require_db(&state)?;
    let session = sessions::find_live(db, &claims.sid)
        .await?
        .filter(|s| s.member_id == member_id)
        .ok_or_else(|| {
            debug!(session_id = %claims.sid, "token refers to a closed session");
            AppError::unauthorized_with(ErrorCode::SessionRevoked, "Session has ended")
        })?;

    let member = members::find_by_id(db, member_id)
        .await?
        .ok_or_else(AppError::unauthorized_invalid_token)?;
    if member.status != MemberStatus::Approved {
        return Err(AppError::forbidden(
            ErrorCode::MemberNotApproved,
            "Membership has not been approved",
        ));
    }

    Ok(CurrentMember {
        member,
        session_id: session.id,
    })
}

impl FromRequest for CurrentMember {
    type Error = AppError;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        Box::pin(resolve(req.clone()))
    }
}

impl FromRequest for AdminMember {
    type Error = AppError;
    type Future = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let current = resolve(req).await?;
            if !current.member.is_admin {
                return Err(AppError::admin_required());
            }
            Ok(AdminMember(current))
        })
    }
}
