use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpResponse, HttpServer, Result as ActixResult};
use nearspot_core::{
    Error, Fee, GeoPoint, NearestOutcome, ProximityResult, QueryCoordinator, Wheelchair,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Deserialize)]
struct NearestQuery {
    lat: f64,
    lon: f64,
}

#[derive(Deserialize)]
struct SuggestQuery {
    #[serde(default)]
    q: String,
}

#[derive(Serialize)]
struct PointResponse {
    id: u64,
    lat: f64,
    lon: f64,
    distance_km: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    fee: Option<Fee>,
    #[serde(skip_serializing_if = "Option::is_none")]
    wheelchair: Option<Wheelchair>,
}

impl From<&ProximityResult> for PointResponse {
    fn from(r: &ProximityResult) -> Self {
        Self {
            id: r.poi.id,
            lat: r.poi.coordinate.lat(),
            lon: r.poi.coordinate.lon(),
            distance_km: r.distance_km,
            fee: r.poi.attributes.fee,
            wheelchair: r.poi.attributes.wheelchair,
        }
    }
}

#[derive(Serialize)]
struct SuggestionResponse {
    label: String,
    lat: f64,
    lon: f64,
}

pub struct RestApi;

impl RestApi {
    pub async fn start(coordinator: Arc<QueryCoordinator>, port: u16) -> std::io::Result<()> {
        HttpServer::new(move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .wrap(cors)
                .wrap(middleware::Logger::default())
                .app_data(web::Data::new(coordinator.clone()))
                .configure(RestApi::routes)
        })
        .bind(("0.0.0.0", port))?
        .run()
        .await
    }

    /// Register the endpoints; the app must provide `web::Data<Arc<QueryCoordinator>>`
    pub fn routes(cfg: &mut web::ServiceConfig) {
        cfg.route("/", web::get().to(root))
            .route("/nearest", web::get().to(nearest))
            .route("/suggest", web::get().to(suggest));
    }
}

/// Map a core error to an HTTP response
/// Map a failure to a response. Validation errors are the caller's fault only
/// when they come from checking request input; from the query path they mean
/// the server's indexes, embedder or settings disagree.
fn error_response(err: &Error, from_request: bool) -> HttpResponse {
    let body = serde_json::json!({ "error": err.to_string() });
    if from_request && err.is_validation() {
        return HttpResponse::BadRequest().json(body);
    }
    match err {
        Error::EmptyIndex => HttpResponse::ServiceUnavailable().json(body),
        Error::EmbeddingFailure(_) => HttpResponse::BadGateway().json(body),
        _ => {
            error!(error = %err, "request failed");
            HttpResponse::InternalServerError().json(body)
        }
    }
}

async fn root() -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "name": "nearspot",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

async fn nearest(
    coordinator: web::Data<Arc<QueryCoordinator>>,
    query: web::Query<NearestQuery>,
) -> ActixResult<HttpResponse> {
    let position = match GeoPoint::new(query.lat, query.lon) {
        Ok(p) => p,
        Err(e) => return Ok(error_response(&e, true)),
    };

    match coordinator.nearest_poi(&position) {
        Ok(NearestOutcome::Found { results, viewport }) => {
            let points: Vec<PointResponse> = results.iter().map(PointResponse::from).collect();
            Ok(HttpResponse::Ok().json(serde_json::json!({
                "status": "ok",
                "points": points,
                "zoom": viewport.zoom,
                "center": viewport.center,
            })))
        }
        Ok(NearestOutcome::NoResults) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "no_results",
            "points": [],
        }))),
        Err(e) => Ok(error_response(&e, false)),
    }
}

async fn suggest(
    coordinator: web::Data<Arc<QueryCoordinator>>,
    query: web::Query<SuggestQuery>,
) -> ActixResult<HttpResponse> {
    let coordinator = coordinator.get_ref().clone();
    let text = query.into_inner().q;
    debug!(len = text.len(), "suggest request");

    // Embedding may block on a model, keep it off the async workers
    let suggestions = web::block(move || coordinator.suggest_addresses(&text)).await?;

    match suggestions {
        Ok(suggestions) => {
            let body: Vec<SuggestionResponse> = suggestions
                .into_iter()
                .map(|s| SuggestionResponse {
                    label: s.label,
                    lat: s.coordinate.lat(),
                    lon: s.coordinate.lon(),
                })
                .collect();
            Ok(HttpResponse::Ok().json(body))
        }
        Err(e) => Ok(error_response(&e, false)),
    }
}
