/// Secure delivery handlers - entitlement-gated playback URLs and viewing
/// credentials
use actix_web::{web, HttpResponse};
use uuid::Uuid;

use crate::error::Result;
use crate::middleware::AuthedUser;
use crate::models::{PlaybackUrlResponse, TokenResponse, VerifyResponse};
use crate::services::AccessTokenService;

/// Signed playback URL for an entitled viewer
/// GET /api/v1/secure-video/lesson/{lesson_id}/stream
pub async fn secure_stream(
    tokens: web::Data<AccessTokenService>,
    user: AuthedUser,
    lesson_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let playback = tokens
        .signed_playback_url(user.id, lesson_id.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(PlaybackUrlResponse {
        url: playback.url,
        expires_in: playback.expires_in,
    }))
}

/// Mint a lesson-scoped viewing credential
/// GET /api/v1/secure-video/lesson/{lesson_id}/token
pub async fn issue_token(
    tokens: web::Data<AccessTokenService>,
    user: AuthedUser,
    lesson_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let issued = tokens.issue_token(user.id, lesson_id.into_inner()).await?;

    Ok(HttpResponse::Ok().json(TokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

/// Verify a viewing credential against a lesson, re-checking entitlement
/// GET /api/v1/secure-video/verify/{lesson_id}/{token}
pub async fn verify_token(
    tokens: web::Data<AccessTokenService>,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse> {
    let (lesson_id, token) = path.into_inner();
    let verified = tokens.verify_token(&token, lesson_id).await?;

    Ok(HttpResponse::Ok().json(VerifyResponse {
        user_id: verified.user_id,
        lesson_id: verified.lesson_id,
        exp: verified.exp,
    }))
}

/// Signed thumbnail URL for an entitled viewer
/// GET /api/v1/secure-video/lesson/{lesson_id}/thumbnail
pub async fn thumbnail(
    tokens: web::Data<AccessTokenService>,
    user: AuthedUser,
    lesson_id: web::Path<Uuid>,
) -> Result<HttpResponse> {
    let playback = tokens
        .signed_thumbnail_url(user.id, lesson_id.into_inner())
        .await?;

    Ok(HttpResponse::Ok().json(PlaybackUrlResponse {
        url: playback.url,
        expires_in: playback.expires_in,
    }))
}
