/// Access token service
///
/// The only component allowed to mint a viewing credential. Credentials are
/// compact HS256 JWTs binding one user to one lesson for a bounded window,
/// and they are never sufficient on their own: verification re-checks the
/// entitlement gate, because a grant can be revoked between issuance and use.
///
/// The signing key is dedicated to this purpose. When no dedicated secret is
/// configured, a scoped key is derived from the general auth secret with
/// HKDF-SHA256 so the two credential domains never share raw key material.
use chrono::{DateTime, TimeZone, Utc};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::warn;
use url::Url;
use uuid::Uuid;

use crate::config::{AuthConfig, VideoConfig};
use crate::db::LessonCatalog;
use crate::error::{AppError, Result};
use crate::services::entitlement::EntitlementGate;
use crate::services::storage::ObjectStorage;

type HmacSha256 = Hmac<Sha256>;

/// Claim value marking a credential as a lesson viewing credential
pub const VIDEO_ACCESS_PURPOSE: &str = "video-access";

const HKDF_INFO: &[u8] = b"coursa-video-access";

/// Signing key for viewing credentials, resolved once at startup
#[derive(Clone)]
pub struct VideoTokenKey(Vec<u8>);

impl VideoTokenKey {
    pub fn from_config(video: &VideoConfig, auth: &AuthConfig) -> Result<Self> {
        match &video.token_secret {
            Some(secret) => Ok(Self(secret.as_bytes().to_vec())),
            None => {
                warn!(
                    "VIDEO_TOKEN_SECRET not set; deriving a purpose-scoped key \
                     from the auth secret"
                );
                Self::derive_from(&auth.jwt_secret)
            }
        }
    }

    /// HKDF-SHA256 expansion of the auth secret under a fixed info string
    pub fn derive_from(auth_secret: &str) -> Result<Self> {
        let hk = Hkdf::<Sha256>::new(None, auth_secret.as_bytes());
        let mut key = [0u8; 32];
        hk.expand(HKDF_INFO, &mut key)
            .map_err(|e| AppError::Internal(format!("HKDF expand failed: {}", e)))?;
        Ok(Self(key.to_vec()))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Claims carried by a viewing credential
#[derive(Debug, Serialize, Deserialize)]
pub struct ViewingClaims {
    /// User id
    pub sub: String,
    /// Lesson id: exactly one lesson per credential
    pub lesson: String,
    pub purpose: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issued credential plus its expiry
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Decoded, fully re-authorized credential
#[derive(Debug, Clone)]
pub struct VerifiedToken {
    pub user_id: Uuid,
    pub lesson_id: Uuid,
    pub exp: i64,
}

/// Signed playback URL with its lifetime
#[derive(Debug, Clone)]
pub struct PlaybackUrl {
    pub url: String,
    pub expires_in: u64,
}

pub struct AccessTokenService {
    gate: EntitlementGate,
    catalog: Arc<dyn LessonCatalog>,
    storage: Arc<dyn ObjectStorage>,
    key: VideoTokenKey,
    ttl_secs: u64,
}

impl AccessTokenService {
    pub fn new(
        gate: EntitlementGate,
        catalog: Arc<dyn LessonCatalog>,
        storage: Arc<dyn ObjectStorage>,
        key: VideoTokenKey,
        ttl_secs: u64,
    ) -> Self {
        Self {
            gate,
            catalog,
            storage,
            key,
            ttl_secs,
        }
    }

    /// Mint a credential for `(user, lesson)`; refuses without entitlement
    pub async fn issue_token(&self, user_id: Uuid, lesson_id: Uuid) -> Result<IssuedToken> {
        if !self.gate.has_access(user_id, lesson_id).await {
            return Err(AppError::Forbidden(
                "no active entitlement for this lesson".to_string(),
            ));
        }

        let now = Utc::now().timestamp();
        let exp = now + self.ttl_secs as i64;
        let claims = ViewingClaims {
            sub: user_id.to_string(),
            lesson: lesson_id.to_string(),
            purpose: VIDEO_ACCESS_PURPOSE.to_string(),
            iat: now,
            exp,
        };

        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.key.as_bytes()),
        )
        .map_err(|e| AppError::Internal(format!("token encoding failed: {}", e)))?;

        Ok(IssuedToken {
            token,
            expires_at: Utc
                .timestamp_opt(exp, 0)
                .single()
                .unwrap_or_else(Utc::now),
        })
    }

    /// Validate a credential against the expected lesson and re-check the
    /// entitlement: `Issued → Valid → Expired | Revoked`, never back.
    pub async fn verify_token(
        &self,
        token: &str,
        expected_lesson_id: Uuid,
    ) -> Result<VerifiedToken> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let data = decode::<ViewingClaims>(
            token,
            &DecodingKey::from_secret(self.key.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::TokenInvalid("viewing credential expired".to_string())
            }
            _ => AppError::TokenInvalid("invalid credential signature".to_string()),
        })?;

        let claims = data.claims;
        if claims.purpose != VIDEO_ACCESS_PURPOSE {
            return Err(AppError::TokenInvalid(
                "credential has wrong purpose".to_string(),
            ));
        }

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::TokenInvalid("malformed user claim".to_string()))?;
        let lesson_id = Uuid::parse_str(&claims.lesson)
            .map_err(|_| AppError::TokenInvalid("malformed lesson claim".to_string()))?;

        if lesson_id != expected_lesson_id {
            return Err(AppError::LessonMismatch(format!(
                "credential was issued for lesson {}",
                lesson_id
            )));
        }

        // A valid signature proves issuance, not authorization
        if !self.gate.has_access(user_id, lesson_id).await {
            return Err(AppError::AccessRevoked(
                "entitlement no longer active".to_string(),
            ));
        }

        Ok(VerifiedToken {
            user_id,
            lesson_id,
            exp: claims.exp,
        })
    }

    /// Presigned playback URL with an integrity tag binding user, lesson,
    /// and issue time together
    pub async fn signed_playback_url(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<PlaybackUrl> {
        if !self.gate.has_access(user_id, lesson_id).await {
            return Err(AppError::Forbidden(
                "no active entitlement for this lesson".to_string(),
            ));
        }

        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;
        let video_key = lesson
            .video_key
            .ok_or_else(|| AppError::NotFound("no video published for this lesson".to_string()))?;

        let base = self.storage.signed_url(&video_key, self.ttl_secs).await?;
        let ts = Utc::now().timestamp();
        let tag = self.playback_tag(user_id, lesson_id, ts)?;

        let separator = if base.contains('?') { '&' } else { '?' };
        Ok(PlaybackUrl {
            url: format!(
                "{}{}user={}&lesson={}&ts={}&tag={}",
                base, separator, user_id, lesson_id, ts, tag
            ),
            expires_in: self.ttl_secs,
        })
    }

    /// Presigned thumbnail URL for an entitled viewer
    pub async fn signed_thumbnail_url(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
    ) -> Result<PlaybackUrl> {
        if !self.gate.has_access(user_id, lesson_id).await {
            return Err(AppError::Forbidden(
                "no active entitlement for this lesson".to_string(),
            ));
        }

        let lesson = self
            .catalog
            .get_lesson(lesson_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Lesson not found".to_string()))?;
        let thumbnail_url = lesson.thumbnail_url.ok_or_else(|| {
            AppError::NotFound("no thumbnail published for this lesson".to_string())
        })?;

        let key = object_key_from_url(&thumbnail_url)?;
        let url = self.storage.signed_url(&key, self.ttl_secs).await?;
        Ok(PlaybackUrl {
            url,
            expires_in: self.ttl_secs,
        })
    }

    /// HMAC-SHA256 over `user:lesson:ts`, hex-encoded
    pub fn playback_tag(&self, user_id: Uuid, lesson_id: Uuid, ts: i64) -> Result<String> {
        let mut mac = self.tag_mac()?;
        mac.update(format!("{}:{}:{}", user_id, lesson_id, ts).as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Constant-time check of a playback tag
    pub fn verify_playback_tag(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        ts: i64,
        tag: &str,
    ) -> bool {
        let bytes = match hex::decode(tag) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let Ok(mut mac) = self.tag_mac() else {
            return false;
        };
        mac.update(format!("{}:{}:{}", user_id, lesson_id, ts).as_bytes());
        mac.verify_slice(&bytes).is_ok()
    }

    fn tag_mac(&self) -> Result<HmacSha256> {
        HmacSha256::new_from_slice(self.key.as_bytes())
            .map_err(|e| AppError::Internal(format!("HMAC error: {}", e)))
    }
}

/// Recover the object key from a public artifact URL: the key is the URL
/// path for both CDN-fronted and raw object-store forms.
fn object_key_from_url(url: &str) -> Result<String> {
    let parsed = Url::parse(url)
        .map_err(|e| AppError::Internal(format!("stored artifact URL is invalid: {}", e)))?;
    let key = parsed.path().trim_start_matches('/');
    if key.is_empty() {
        return Err(AppError::Internal(
            "stored artifact URL has no object key".to_string(),
        ));
    }
    Ok(key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{MemoryCatalog, MemoryGrantStore};
    use crate::models::Lesson;
    use crate::services::storage::MemoryStorage;

    struct Fixture {
        service: AccessTokenService,
        grants: Arc<MemoryGrantStore>,
        user: Uuid,
        lesson: Uuid,
        course: Uuid,
    }

    async fn fixture(published: bool) -> Fixture {
        let catalog = Arc::new(MemoryCatalog::new());
        let grants = Arc::new(MemoryGrantStore::new());
        let storage = Arc::new(MemoryStorage::new());

        let course = Uuid::new_v4();
        let lesson = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (video_url, video_key, thumbnail_url) = if published {
            let key = format!("videos/lessons/{}/clip.mp4", lesson);
            storage.upload_bytes(b"video".to_vec(), &key).await.unwrap();
            let thumb_key = format!("videos/lessons/{}/thumbs/clip.jpg", lesson);
            storage
                .upload_bytes(b"jpeg".to_vec(), &thumb_key)
                .await
                .unwrap();
            (
                Some(storage.public_url(&key)),
                Some(key),
                Some(storage.public_url(&thumb_key)),
            )
        } else {
            (None, None, None)
        };

        catalog
            .insert_lesson(Lesson {
                id: lesson,
                course_id: course,
                video_url,
                video_key,
                thumbnail_url,
                duration_seconds: published.then_some(30),
            })
            .await;

        let gate = EntitlementGate::new(catalog.clone(), grants.clone());
        let key = VideoTokenKey::derive_from("test-auth-secret").unwrap();
        let service = AccessTokenService::new(gate, catalog, storage, key, 3600);

        Fixture {
            service,
            grants,
            user,
            lesson,
            course,
        }
    }

    #[tokio::test]
    async fn test_issue_refused_without_grant() {
        let fx = fixture(true).await;
        let err = fx.service.issue_token(fx.user, fx.lesson).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_issue_then_verify_round_trip() {
        let fx = fixture(true).await;
        fx.grants.set_grant(fx.user, fx.course, true).await;

        let issued = fx.service.issue_token(fx.user, fx.lesson).await.unwrap();
        let verified = fx
            .service
            .verify_token(&issued.token, fx.lesson)
            .await
            .unwrap();
        assert_eq!(verified.user_id, fx.user);
        assert_eq!(verified.lesson_id, fx.lesson);
    }

    #[tokio::test]
    async fn test_verify_rejects_other_lesson() {
        let fx = fixture(true).await;
        fx.grants.set_grant(fx.user, fx.course, true).await;

        let issued = fx.service.issue_token(fx.user, fx.lesson).await.unwrap();
        let err = fx
            .service
            .verify_token(&issued.token, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::LessonMismatch(_)));
    }

    #[tokio::test]
    async fn test_verify_rejects_expired_credential() {
        let fx = fixture(true).await;
        fx.grants.set_grant(fx.user, fx.course, true).await;

        let key = VideoTokenKey::derive_from("test-auth-secret").unwrap();
        let now = Utc::now().timestamp();
        let stale = encode(
            &Header::new(Algorithm::HS256),
            &ViewingClaims {
                sub: fx.user.to_string(),
                lesson: fx.lesson.to_string(),
                purpose: VIDEO_ACCESS_PURPOSE.to_string(),
                iat: now - 7200,
                exp: now - 3600,
            },
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap();

        let err = fx.service.verify_token(&stale, fx.lesson).await.unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn test_verify_rejects_revoked_grant() {
        let fx = fixture(true).await;
        fx.grants.set_grant(fx.user, fx.course, true).await;

        let issued = fx.service.issue_token(fx.user, fx.lesson).await.unwrap();
        fx.grants.set_grant(fx.user, fx.course, false).await;

        let err = fx
            .service
            .verify_token(&issued.token, fx.lesson)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::AccessRevoked(_)));
    }

    #[tokio::test]
    async fn test_verify_rejects_foreign_purpose() {
        let fx = fixture(true).await;
        fx.grants.set_grant(fx.user, fx.course, true).await;

        let key = VideoTokenKey::derive_from("test-auth-secret").unwrap();
        let now = Utc::now().timestamp();
        let foreign = encode(
            &Header::new(Algorithm::HS256),
            &ViewingClaims {
                sub: fx.user.to_string(),
                lesson: fx.lesson.to_string(),
                purpose: "session".to_string(),
                iat: now,
                exp: now + 3600,
            },
            &EncodingKey::from_secret(key.as_bytes()),
        )
        .unwrap();

        let err = fx
            .service
            .verify_token(&foreign, fx.lesson)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn test_playback_url_forbidden_without_grant() {
        let fx = fixture(true).await;
        let err = fx
            .service
            .signed_playback_url(fx.user, fx.lesson)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_playback_url_binds_user_lesson_and_time() {
        let fx = fixture(true).await;
        fx.grants.set_grant(fx.user, fx.course, true).await;

        let playback = fx
            .service
            .signed_playback_url(fx.user, fx.lesson)
            .await
            .unwrap();
        assert!(playback.url.contains(&format!("user={}", fx.user)));
        assert!(playback.url.contains(&format!("lesson={}", fx.lesson)));
        assert!(playback.url.contains("tag="));

        let ts = 1_700_000_000;
        let tag = fx.service.playback_tag(fx.user, fx.lesson, ts).unwrap();
        assert!(fx.service.verify_playback_tag(fx.user, fx.lesson, ts, &tag));
        assert!(!fx
            .service
            .verify_playback_tag(fx.user, Uuid::new_v4(), ts, &tag));
    }

    #[tokio::test]
    async fn test_derived_keys_are_scoped_per_purpose() {
        let derived = VideoTokenKey::derive_from("shared-secret").unwrap();
        assert_ne!(derived.as_bytes(), b"shared-secret");
    }

    #[test]
    fn test_object_key_recovery() {
        assert_eq!(
            object_key_from_url("https://cdn.coursa.dev/videos/lessons/a/t.jpg").unwrap(),
            "videos/lessons/a/t.jpg"
        );
        assert_eq!(
            object_key_from_url("https://bucket.s3.us-east-1.amazonaws.com/videos/a.jpg").unwrap(),
            "videos/a.jpg"
        );
        assert!(object_key_from_url("not a url").is_err());
    }
}
