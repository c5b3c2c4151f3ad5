use sea_orm::DatabaseConnection;

use crate::error::AppError;
use crate::state::app_state::AppState;
use crate::storage::Storage;

/// Centralized helper to access the database connection from AppState.
///
/// Returns `AppError::DbUnavailable` when the process runs without storage.
pub fn require_db(state: &AppState) -> Result<&DatabaseConnection, AppError> {
    state.db().ok_or_else(AppError::db_unavailable)
}

/// Like [`require_db`], for operations that need the backend as well.
pub fn require_storage(state: &AppState) -> Result<&Storage, AppError> {
    state.storage().ok_or_else(AppError::db_unavailable)
}

#[cfg(test)]
mod tests {
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;

    use super::*;
    use crate::infra::state::build_state;

    #[test]
    fn require_db_without_storage() {
        let app_state = build_state().build();

        let err = require_db(&app_state).unwrap_err();
        assert!(matches!(err, AppError::DbUnavailable));
        assert_eq!(err.error_response().status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(require_storage(&app_state).is_err());
    }
}
