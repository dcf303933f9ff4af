//! HTTP surface for the catalog.
//!
//! Handlers are thin: they parse the request, call the entity kind's cache
//! coordinator, and shape the response. Each kind's paths come from an
//! [`EntityRoutes`] table so the handlers stay generic over the kind.

use crate::backend::CacheBackend;
use crate::coordinator::CacheCoordinator;
use crate::entity::CacheEntity;
use crate::error::Error;
use crate::observability::CounterMetrics;
use crate::repository::DataRepository;
use crate::service::{CatalogService, HealthReport};
use crate::store::StoreClient;
use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;

/// Paths served for one entity kind, relative to `base`.
#[derive(Clone, Copy, Debug)]
pub struct EntityRoutes {
    pub base: &'static str,
    /// Every alias of the list endpoint.
    pub list: &'static [&'static str],
    pub get: &'static str,
    pub delete: &'static str,
    pub upsert: &'static str,
}

pub const BOOK_ROUTES: EntityRoutes = EntityRoutes {
    base: "/book",
    list: &["/getBooks"],
    get: "/getBookByName",
    delete: "/deleteBookByName",
    upsert: "/createOrUpdate",
};

pub const USER_ROUTES: EntityRoutes = EntityRoutes {
    base: "/user",
    list: &["/getUsers", "/getAllUsers"],
    get: "/getUserByUsername",
    delete: "/deleteUserByUsername",
    upsert: "/createOrUpdate",
};

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::ValidationError(_) => StatusCode::BAD_REQUEST,
            Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// Build the full application router.
pub fn router<S, B>(catalog: Arc<CatalogService<S, B>>, metrics: Arc<CounterMetrics>) -> Router
where
    S: StoreClient,
    B: CacheBackend,
{
    let health_routes = Router::new()
        .route("/health", get(health::<S, B>))
        .with_state(Arc::clone(&catalog));
    let metrics_routes = Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics);

    Router::new()
        .nest(
            BOOK_ROUTES.base,
            entity_router(Arc::clone(catalog.books()), &BOOK_ROUTES),
        )
        .nest(
            USER_ROUTES.base,
            entity_router(Arc::clone(catalog.users()), &USER_ROUTES),
        )
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(middleware::from_fn(log_requests))
        .layer(CorsLayer::permissive())
}

/// Routes for one entity kind, relative to `routes.base`.
pub fn entity_router<T, R, B>(
    coordinator: Arc<CacheCoordinator<T, R, B>>,
    routes: &EntityRoutes,
) -> Router
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    let mut router = Router::new();
    for path in routes.list {
        router = router.route(path, get(list_entities::<T, R, B>));
    }
    router
        .route(routes.get, get(get_entity::<T, R, B>))
        .route(routes.delete, post(delete_entity::<T, R, B>))
        .route(routes.upsert, post(upsert_entity::<T, R, B>))
        .with_state(coordinator)
}

/// Secondary key from the query string, under the entity's key field name.
fn key_param<T: CacheEntity>(params: &HashMap<String, String>) -> Result<T::Key, Error> {
    let field = T::key_field();
    let raw = params
        .get(field)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| Error::ValidationError(format!("missing query parameter `{}`", field)))?;
    T::Key::from_str(raw)
        .map_err(|_| Error::ValidationError(format!("invalid value for `{}`: {}", field, raw)))
}

async fn list_entities<T, R, B>(
    State(coordinator): State<Arc<CacheCoordinator<T, R, B>>>,
) -> Result<Json<Vec<T>>, Error>
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    let entities = coordinator.get_all().await?;
    info!("Retrieved {} {} records", entities.len(), T::cache_prefix());
    Ok(Json(entities))
}

async fn get_entity<T, R, B>(
    State(coordinator): State<Arc<CacheCoordinator<T, R, B>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response, Error>
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    let key = key_param::<T>(&params)?;
    match coordinator.get_by_key(&key).await? {
        Some(entity) => Ok(Json(entity).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("{} not found", T::cache_prefix()) })),
        )
            .into_response()),
    }
}

async fn delete_entity<T, R, B>(
    State(coordinator): State<Arc<CacheCoordinator<T, R, B>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<StatusCode, Error>
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    let key = key_param::<T>(&params)?;
    coordinator.delete_by_key(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn upsert_entity<T, R, B>(
    State(coordinator): State<Arc<CacheCoordinator<T, R, B>>>,
    payload: Result<Json<T>, JsonRejection>,
) -> Result<Json<T>, Error>
where
    T: CacheEntity,
    R: DataRepository<T>,
    B: CacheBackend,
{
    let Json(entity) = payload.map_err(|rejection| {
        Error::ValidationError(format!("invalid {}: {}", T::cache_prefix(), rejection.body_text()))
    })?;
    let stored = coordinator.upsert(entity).await?;
    Ok(Json(stored))
}

async fn health<S, B>(
    State(catalog): State<Arc<CatalogService<S, B>>>,
) -> (StatusCode, Json<HealthReport>)
where
    S: StoreClient,
    B: CacheBackend,
{
    let report = catalog.health_check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn render_metrics(State(metrics): State<Arc<CounterMetrics>>) -> String {
    metrics.render_prometheus()
}

async fn log_requests(request: Request, next: Next) -> Response {
    let timer = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    info!(
        "{} {} -> {} in {:?}",
        method,
        path,
        response.status().as_u16(),
        timer.elapsed()
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Book;

    #[test]
    fn test_key_param() {
        let mut params = HashMap::new();
        assert!(matches!(
            key_param::<Book>(&params),
            Err(Error::ValidationError(_))
        ));

        params.insert("name".to_string(), "   ".to_string());
        assert!(matches!(
            key_param::<Book>(&params),
            Err(Error::ValidationError(_))
        ));

        params.insert("name".to_string(), "Dune".to_string());
        assert_eq!(key_param::<Book>(&params).expect("Failed to parse"), "Dune");
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: Error| e.into_response().status();
        assert_eq!(
            status(Error::ValidationError("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(Error::StoreUnavailable("x".into())),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(Error::RepositoryError("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
