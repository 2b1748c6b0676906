// Bearer-token and origin validation, applied to every endpoint except
// `/health` and `/events` (spec §6). Auth and origin failures return
// immediately without touching any other state (spec §7).

use super::{error::ApiError, AppState};
use crate::constants::SHELL_ORIGIN;
use crate::error::EngineError;
use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

pub async fn auth_middleware(State(state): State<AppState>, req: Request, next: Next) -> Response {
    if let Some(origin) = req.headers().get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        let allowed = origin == SHELL_ORIGIN || state.dev_origin.as_deref() == Some(origin);
        if !allowed {
            return ApiError::from(EngineError::OriginRejected(origin.to_string())).into_response();
        }
    }

    let token_ok = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|presented| constant_time_eq(presented.as_bytes(), state.token.as_bytes()))
        .unwrap_or(false);

    if !token_ok {
        return ApiError::from(EngineError::AuthInvalid).into_response();
    }

    next.run(req).await
}

/// Compares two byte strings in time independent of where they first
/// differ, so a failed auth attempt can't be used to brute-force the token
/// one byte at a time via response timing.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_eq_matches_equal_strings() {
        assert!(constant_time_eq(b"abc123", b"abc123"));
    }

    #[test]
    fn constant_time_eq_rejects_mismatch() {
        assert!(!constant_time_eq(b"abc123", b"abc124"));
        assert!(!constant_time_eq(b"short", b"longer-string"));
    }
}
