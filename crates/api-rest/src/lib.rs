//! # API REST
//!
//! REST facade over the CDS Hooks client.
//!
//! Handles:
//! - HTTP endpoints with axum
//! - OpenAPI/Swagger documentation
//! - REST-specific concerns (JSON serialization, CORS, status codes)
//!
//! Every request builds its own [`cds_core::PatientView`]; the server keeps no per-patient state.

#![warn(rust_2018_idioms)]

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use cds_core::{
    CdsClient, CdsError, EncounterContext, PatientCards, ServiceDescriptor, ServicePanel,
};
use fhir::{PatientResource, PractitionerResource};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

/// Application state shared across REST API handlers
#[derive(Clone)]
pub struct AppState {
    client: CdsClient,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServicesRes {
    #[schema(value_type = Vec<Object>)]
    pub services: Vec<ServiceDescriptor>,
}

/// Prefetch resources for a patient-view activation.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CardsReq {
    /// FHIR Patient resource (JSON)
    #[schema(value_type = Object)]
    pub patient: Value,
    /// FHIR Practitioner resource (JSON)
    #[schema(value_type = Option<Object>)]
    #[serde(default)]
    pub practitioner: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CardsRes {
    #[schema(value_type = Object)]
    pub cards: PatientCards,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DismissReq {
    pub service_id: String,
    pub encounter_id: String,
    #[serde(default)]
    pub assessment_type: String,
    #[schema(value_type = Object)]
    pub patient: Value,
    #[schema(value_type = Option<Object>)]
    #[serde(default)]
    pub practitioner: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DismissRes {
    /// Panels of the re-invoked service
    #[schema(value_type = Vec<Object>)]
    pub refreshed: Vec<ServicePanel>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorRes {
    pub error: String,
    #[schema(value_type = Object)]
    pub diagnostic: Value,
}

type ApiError = (StatusCode, Json<ErrorRes>);

#[derive(OpenApi)]
#[openapi(
    paths(health, list_services, patient_cards, dismiss_card),
    components(schemas(
        HealthRes,
        ServicesRes,
        CardsReq,
        CardsRes,
        DismissReq,
        DismissRes,
        ErrorRes,
    ))
)]
struct ApiDoc;

/// Build the REST router around a configured client.
pub fn router(client: CdsClient) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/cds/services", get(list_services))
        .route("/cds/cards", post(patient_cards))
        .route("/cds/dismiss", post(dismiss_card))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(CorsLayer::permissive())
        .with_state(AppState { client })
}

/// Bind `addr` and serve the REST API until the server fails.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server stops with an error.
pub async fn serve(addr: &str, client: CdsClient) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("++ Serving CDS REST on {}", listener.local_addr()?);
    axum::serve(listener, router(client)).await?;
    Ok(())
}

fn status_for(err: &CdsError) -> StatusCode {
    match err {
        CdsError::CatalogFetch(_)
        | CdsError::CatalogShape(_)
        | CdsError::Invocation { .. }
        | CdsError::InvocationShape { .. }
        | CdsError::Dismissal(_) => StatusCode::BAD_GATEWAY,
        CdsError::Fhir(_) | CdsError::DismissalUnavailable => StatusCode::BAD_REQUEST,
        CdsError::UnknownService(_) => StatusCode::NOT_FOUND,
        CdsError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        CdsError::LinkResolution { .. } | CdsError::Registry(_) | CdsError::InvalidConfig(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn api_error(context: &str, err: CdsError) -> ApiError {
    tracing::error!("{context} error: {err:?}");
    (
        status_for(&err),
        Json(ErrorRes {
            error: err.to_string(),
            diagnostic: err.diagnostic(),
        }),
    )
}

fn resources(
    patient: Value,
    practitioner: Option<Value>,
) -> Result<(PatientResource, Option<PractitionerResource>), ApiError> {
    let patient = PatientResource::from_json(patient)
        .map_err(|e| api_error("Invalid patient", CdsError::from(e)))?;
    let practitioner = practitioner
        .filter(|v| !v.is_null())
        .map(PractitionerResource::from_json)
        .transpose()
        .map_err(|e| api_error("Invalid practitioner", CdsError::from(e)))?;
    Ok((patient, practitioner))
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Health check response", body = HealthRes)
    )
)]
/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "CDS REST API is alive".into(),
    })
}

#[utoipa::path(
    get,
    path = "/cds/services",
    responses(
        (status = 200, description = "Service catalog", body = ServicesRes),
        (status = 502, description = "Catalog unavailable", body = ErrorRes)
    )
)]
/// List the decision-support services the backend advertises
#[axum::debug_handler]
async fn list_services(State(state): State<AppState>) -> Result<Json<ServicesRes>, ApiError> {
    let services = state
        .client
        .catalog()
        .fetch_catalog()
        .await
        .map_err(|e| api_error("Fetch catalog", e))?;
    Ok(Json(ServicesRes { services }))
}

#[utoipa::path(
    post,
    path = "/cds/cards",
    request_body = CardsReq,
    responses(
        (status = 200, description = "Render set for the patient", body = CardsRes),
        (status = 400, description = "Invalid FHIR resource", body = ErrorRes),
        (status = 502, description = "Catalog unavailable", body = ErrorRes)
    )
)]
/// Run the patient-view hook against every service
///
/// Individual service failures are reported inside the render set, next to the healthy panels.
/// Only a catalog failure fails the request.
#[axum::debug_handler]
async fn patient_cards(
    State(state): State<AppState>,
    Json(req): Json<CardsReq>,
) -> Result<Json<CardsRes>, ApiError> {
    let (patient, practitioner) = resources(req.patient, req.practitioner)?;
    let view = state.client.patient_view(patient, practitioner);
    let cards = view
        .load()
        .await
        .map_err(|e| api_error("Load patient cards", e))?;
    Ok(Json(CardsRes { cards }))
}

#[utoipa::path(
    post,
    path = "/cds/dismiss",
    request_body = DismissReq,
    responses(
        (status = 200, description = "Card hidden; refreshed panel of the owning service", body = DismissRes),
        (status = 400, description = "Invalid request", body = ErrorRes),
        (status = 502, description = "Hide request or refresh failed", body = ErrorRes)
    )
)]
/// Hide an assessment card and re-invoke the service that produced it
#[axum::debug_handler]
async fn dismiss_card(
    State(state): State<AppState>,
    Json(req): Json<DismissReq>,
) -> Result<Json<DismissRes>, ApiError> {
    let (patient, practitioner) = resources(req.patient, req.practitioner)?;
    let context = EncounterContext::new(req.encounter_id, req.assessment_type)
        .ok_or_else(|| api_error("Dismiss card", CdsError::DismissalUnavailable))?;

    let view = state.client.patient_view(patient, practitioner);
    view.dismiss(&req.service_id, &context)
        .await
        .map_err(|e| api_error("Dismiss card", e))?;

    let refreshed = view
        .process_pending_refreshes()
        .await
        .into_iter()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| api_error("Refresh service", e))?;
    Ok(Json(DismissRes { refreshed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use cds_core::testing::FakeTransport;
    use cds_core::transport::TransportError;
    use cds_core::{CdsConfig, StaticAppRegistry};
    use cds_uuid::SequentialIdGenerator;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tower::ServiceExt;

    const CATALOG: &str = "http://cds.test/cds-services";
    const FALLS: &str = "http://cds.test/cds-services/falls";
    const HIDE: &str = "http://cds.test/cds-services/hide-assessment-card";

    fn app(transport: Arc<FakeTransport>) -> Router {
        let cfg = CdsConfig::new("http://cds.test", Duration::from_secs(5)).unwrap();
        router(CdsClient::new(
            Arc::new(cfg),
            transport,
            Arc::new(SequentialIdGenerator::new(3)),
            Arc::new(StaticAppRegistry::default()),
        ))
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn falls_catalog(transport: &FakeTransport) {
        transport.on_get(
            CATALOG,
            Ok(json!([{"id": "falls", "hook": "patient-view", "title": "Falls"}])),
        );
    }

    #[tokio::test]
    async fn test_health_is_ok() {
        let (status, body) = call(app(Arc::new(FakeTransport::new())), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_lists_services() {
        let transport = Arc::new(FakeTransport::new());
        falls_catalog(&transport);

        let (status, body) = call(app(transport), "GET", "/cds/services", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["services"][0]["id"], "falls");
        assert_eq!(body["services"][0]["prefetch"], json!({}));
    }

    #[tokio::test]
    async fn test_catalog_failure_is_bad_gateway_with_diagnostic() {
        let transport = Arc::new(FakeTransport::new());
        transport.on_get(
            CATALOG,
            Err(TransportError::Status {
                status: 503,
                body: "maintenance".into(),
            }),
        );

        let (status, body) = call(
            app(transport.clone()),
            "POST",
            "/cds/cards",
            Some(json!({"patient": {"resourceType": "Patient", "id": "p1"}})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["diagnostic"]["kind"], "catalog_fetch");
        assert_eq!(body["diagnostic"]["status"], 503);
        assert_eq!(transport.post_count("http://cds.test/"), 0);
    }

    #[tokio::test]
    async fn test_returns_render_set() {
        let transport = Arc::new(FakeTransport::new());
        falls_catalog(&transport);
        transport.on_post(
            FALLS,
            Ok(json!({"cards": [{"uuid": "c1", "summary": "Assess falls", "indicator": "critical"}]})),
        );

        let (status, body) = call(
            app(transport.clone()),
            "POST",
            "/cds/cards",
            Some(json!({
                "patient": {"resourceType": "Patient", "id": "p1"},
                "practitioner": {"resourceType": "Practitioner", "id": "dr1"},
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let panel = &body["cards"]["panels"][0];
        assert_eq!(panel["status"], "cards");
        assert_eq!(panel["cards"][0]["colour"], "red");
        assert_eq!(body["cards"]["patient"], "Patient/p1");

        let sent = &transport.posts_to(FALLS)[0];
        assert_eq!(sent["prefetch"]["practitioner"]["id"], "dr1");
    }

    #[tokio::test]
    async fn test_rejects_wrong_resource_type() {
        let transport = Arc::new(FakeTransport::new());
        let (status, body) = call(
            app(transport.clone()),
            "POST",
            "/cds/cards",
            Some(json!({"patient": {"resourceType": "Practitioner", "id": "p1"}})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["diagnostic"]["kind"], "fhir");
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_dismiss_hides_and_returns_refreshed_panel() {
        let transport = Arc::new(FakeTransport::new());
        falls_catalog(&transport);
        transport.on_post(HIDE, Ok(Value::Null));
        transport.on_post(
            FALLS,
            Ok(json!({"cards": [{
                "uuid": "c1",
                "summary": "Assess falls",
                "source": {"url": "Encounter/42", "assessmentType": "fall-risk"},
            }]})),
        );

        let (status, body) = call(
            app(transport.clone()),
            "POST",
            "/cds/dismiss",
            Some(json!({
                "serviceId": "falls",
                "encounterId": "42",
                "assessmentType": "fall-risk",
                "patient": {"resourceType": "Patient", "id": "p1"},
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            transport.posts_to(HIDE),
            vec![json!({"encounterId": "42", "assessmentType": "fall-risk"})]
        );
        assert_eq!(transport.posts_to(FALLS).len(), 1);
        assert_eq!(body["refreshed"][0]["service"]["id"], "falls");
        assert_eq!(body["refreshed"][0]["cards"], json!([]));
    }

    #[tokio::test]
    async fn test_dismiss_with_blank_encounter_is_bad_request() {
        let transport = Arc::new(FakeTransport::new());
        let (status, _) = call(
            app(transport.clone()),
            "POST",
            "/cds/dismiss",
            Some(json!({
                "serviceId": "falls",
                "encounterId": " ",
                "patient": {"resourceType": "Patient", "id": "p1"},
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(transport.requests().is_empty());
    }
}
