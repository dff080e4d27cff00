use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

/// Role of a verified caller, as attested by the platform's auth
/// service. Opaque to the messaging core; carried for logging and for
/// downstream collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Mentor,
    Mentee,
}

/// The verified `(user_id, user_type)` pair every operation trusts.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
    pub id: Uuid,
    pub role: UserRole,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    role: UserRole,
    #[allow(dead_code)]
    exp: i64,
}

/// Validate a bearer token issued by the platform auth service and
/// extract the verified caller. HS256 only; expiry enforced by the
/// validation defaults.
pub fn verify_token(secret: &str, token: &str) -> Result<AuthenticatedUser, AppError> {
    let validation = Validation::new(Algorithm::HS256);
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|_| AppError::Unauthorized)?;

    let id = Uuid::parse_str(&data.claims.sub).map_err(|_| AppError::Unauthorized)?;
    if id.is_nil() {
        return Err(AppError::Unauthorized);
    }
    Ok(AuthenticatedUser {
        id,
        role: data.claims.role,
    })
}

/// Middleware for the HTTP surface: refuse unverified callers before
/// any core logic runs, and stash the verified caller in extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Result<axum::response::Response, AppError> {
    let auth_header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AppError::Unauthorized)?;

    let user = verify_token(&state.config.jwt_secret, token)?;
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    fn issue(secret: &str, sub: &str, role: &str, exp: i64) -> String {
        let claims = json!({ "sub": sub, "role": role, "exp": exp });
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3600
    }

    #[test]
    fn valid_token_yields_the_caller() {
        let id = Uuid::new_v4();
        let token = issue("s3cret", &id.to_string(), "mentor", far_future());
        let user = verify_token("s3cret", &token).unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.role, UserRole::Mentor);
    }

    #[test]
    fn wrong_secret_is_refused() {
        let token = issue("s3cret", &Uuid::new_v4().to_string(), "mentee", far_future());
        assert!(matches!(
            verify_token("other", &token),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn expired_token_is_refused() {
        let token = issue(
            "s3cret",
            &Uuid::new_v4().to_string(),
            "mentee",
            chrono::Utc::now().timestamp() - 3600,
        );
        assert!(verify_token("s3cret", &token).is_err());
    }

    #[test]
    fn malformed_subject_is_refused() {
        let token = issue("s3cret", "not-a-uuid", "mentor", far_future());
        assert!(verify_token("s3cret", &token).is_err());
        let token = issue("s3cret", &Uuid::nil().to_string(), "mentor", far_future());
        assert!(verify_token("s3cret", &token).is_err());
    }
}
