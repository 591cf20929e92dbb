pub mod auth;
pub mod content;
pub mod emails;
pub mod health;
pub mod images;
pub mod metrics;
pub mod tenants;
pub mod users;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::models::content::{
    Carousel, Category, Company, Contact, Header, Manager, ManagerCategory, News, Product,
    Publication, PublicationCategory, Review, SiteEntity,
};
use crate::AppState;

/// `/api/<path>` and `/api/<path>/{id}` for one site entity.
fn entity_routes<E: SiteEntity>(router: Router<AppState>, path: &str) -> Router<AppState> {
    router
        .route(
            &format!("/api/{path}"),
            get(content::list::<E>).post(content::create::<E>),
        )
        .route(
            &format!("/api/{path}/{{id}}"),
            get(content::get::<E>)
                .patch(content::update::<E>)
                .delete(content::remove::<E>),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    // An empty list keeps the API open to any origin.
    let allow_origin = if origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };
    CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_origin(allow_origin)
}

pub fn router(state: AppState) -> Router {
    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics_handler))
        // Auth
        .route("/api/auth/sign-in", post(auth::sign_in))
        .route("/api/auth/me", get(auth::me))
        // Dashboard users
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route(
            "/api/users/{id}",
            patch(users::update_user).delete(users::delete_user),
        )
        // Tenant administration
        .route("/api/admin/tenants/{client}", get(tenants::tenant_status))
        .route("/api/admin/tenants/{client}/reconcile", post(tenants::reconcile_tenant))
        .route("/api/admin/tenants/{client}/website-token", post(tenants::issue_website_token))
        // Files and mail
        .route("/api/images/{filename}", get(images::serve_image))
        .route("/api/emails", post(emails::send_contact_email));

    let app = entity_routes::<Header>(app, "header");
    let app = entity_routes::<Contact>(app, "contact");
    let app = entity_routes::<Company>(app, "company");
    let app = entity_routes::<Carousel>(app, "carrousel");
    let app = entity_routes::<News>(app, "news");
    let app = entity_routes::<Review>(app, "reviews");
    let app = entity_routes::<Category>(app, "category");
    let app = entity_routes::<Product>(app, "product");
    let app = entity_routes::<ManagerCategory>(app, "manager-category");
    let app = entity_routes::<Manager>(app, "manager");
    let app = entity_routes::<PublicationCategory>(app, "publication-category");
    let app = entity_routes::<Publication>(app, "publications");

    let body_limit = state.config.max_upload_mb * 1024 * 1024;
    app.layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_allowed_origins))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
