/// Video Service - HTTP Server
///
/// Wires configuration, the catalog and entitlement adapters, the object
/// store gateway, and the encoder into the ingest pipeline and the secure
/// delivery endpoints. All dependencies are built once here and injected;
/// request handling holds no global state.
use actix_web::{middleware as actix_middleware, web, App, HttpResponse, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use video_service::db::{GrantStore, LessonCatalog, PgGrantStore, PgLessonCatalog};
use video_service::handlers;
use video_service::middleware;
use video_service::services::{
    AccessTokenService, EntitlementGate, FfmpegTranscoder, ObjectStorage, S3Storage, Transcoder,
    VideoPipeline, VideoTokenKey,
};
use video_service::Config;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env().expect("Failed to load configuration");

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Video service starting HTTP server on {}", bind_address);

    // Database connection pool for the catalog and entitlement adapters
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    let catalog: Arc<dyn LessonCatalog> = Arc::new(PgLessonCatalog::new(db_pool.clone()));
    let grants: Arc<dyn GrantStore> = Arc::new(PgGrantStore::new(db_pool));

    // Publishing depends entirely on the object store: refuse to start when
    // the bucket is unreachable
    let s3 = S3Storage::from_config(&config.s3, config.cdn.domain.clone())
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    s3.health_check()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    let storage: Arc<dyn ObjectStorage> = Arc::new(s3);

    let transcoder: Arc<dyn Transcoder> = Arc::new(FfmpegTranscoder::new(
        config.video.ffmpeg_path.clone(),
        config.video.ffprobe_path.clone(),
        Duration::from_secs(config.video.encode_timeout_secs),
    ));

    let gate = EntitlementGate::new(catalog.clone(), grants.clone());
    let token_key = VideoTokenKey::from_config(&config.video, &config.auth)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let pipeline = web::Data::new(VideoPipeline::new(
        catalog.clone(),
        storage.clone(),
        transcoder,
        config.video.work_dir.clone(),
        config.video.default_preset,
        config.video.delete_replaced,
    ));
    let tokens = web::Data::new(AccessTokenService::new(
        gate,
        catalog.clone(),
        storage.clone(),
        token_key,
        config.video.token_ttl_secs,
    ));
    let catalog_data = web::Data::new(catalog);
    let config_data = web::Data::new(config.clone());
    let auth = middleware::JwtAuthMiddleware::new(&config.auth.jwt_secret);

    HttpServer::new(move || {
        App::new()
            .app_data(config_data.clone())
            .app_data(catalog_data.clone())
            .app_data(pipeline.clone())
            .app_data(tokens.clone())
            .wrap(actix_middleware::Logger::default())
            .route(
                "/api/v1/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route(
                "/api/v1/health/ready",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/api/v1/health/live",
                web::get().to(|| async { HttpResponse::Ok().finish() }),
            )
            .route(
                "/api/v1/openapi.json",
                web::get().to(|| async {
                    use utoipa::OpenApi;
                    HttpResponse::Ok()
                        .content_type("application/json")
                        .json(video_service::openapi::ApiDoc::openapi())
                }),
            )
            .service(
                web::scope("/api/v1")
                    .wrap(middleware::MetricsMiddleware)
                    // Unauthenticated surface: the legacy stream lookup and
                    // out-of-band credential verification
                    .route(
                        "/videos/stream/{lesson_id}",
                        web::get().to(handlers::stream_video),
                    )
                    .route(
                        "/secure-video/verify/{lesson_id}/{token}",
                        web::get().to(handlers::verify_token),
                    )
                    .service(
                        web::scope("")
                            .wrap(auth.clone())
                            .route(
                                "/videos/upload/{lesson_id}",
                                web::post().to(handlers::upload_video),
                            )
                            .route(
                                "/videos/{lesson_id}/info",
                                web::get().to(handlers::video_info),
                            )
                            .route(
                                "/videos/{lesson_id}/watermark",
                                web::post().to(handlers::watermark_video),
                            )
                            .route(
                                "/videos/{lesson_id}",
                                web::delete().to(handlers::delete_video),
                            )
                            .route(
                                "/secure-video/lesson/{lesson_id}/stream",
                                web::get().to(handlers::secure_stream),
                            )
                            .route(
                                "/secure-video/lesson/{lesson_id}/token",
                                web::get().to(handlers::issue_token),
                            )
                            .route(
                                "/secure-video/lesson/{lesson_id}/thumbnail",
                                web::get().to(handlers::thumbnail),
                            ),
                    ),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
