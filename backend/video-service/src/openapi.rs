use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
/// OpenAPI documentation for the Coursa Video Service
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Coursa Video Service API",
        version = "1.0.0",
        description = "Secure video processing and delivery for course lessons. Handles source upload, adaptive-bitrate transcoding, thumbnail extraction, watermarking, and entitlement-gated playback with short-lived viewing credentials.",
        contact(
            name = "Coursa Team",
            email = "team@coursa.dev"
        ),
        license(
            name = "MIT"
        )
    ),
    servers(
        (url = "http://localhost:8085", description = "Development server"),
        (url = "https://video-api.coursa.dev", description = "Production server"),
    ),
    tags(
        (name = "health", description = "Service health checks"),
        (name = "videos", description = "Lesson video upload, deletion, and watermarking"),
        (name = "secure-video", description = "Entitlement-gated playback URLs and viewing credentials"),
    ),
    modifiers(&SecurityAddon),
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("JWT Bearer token"))
                        .build(),
                ),
            )
        }
    }
}

impl ApiDoc {
    pub fn title() -> &'static str {
        "Coursa Video Service"
    }

    pub fn version() -> &'static str {
        "1.0.0"
    }

    pub fn openapi_json_path() -> &'static str {
        "/api/v1/openapi.json"
    }
}
