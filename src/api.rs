//! REST API for the carton selection service.
//!
//! Uses Axum as the web framework and supports CORS. The editable catalog
//! lives behind a lock; every run works on a snapshot taken under the read
//! lock.

use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, OnceLock};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use tokio::sync::{RwLock, mpsc};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use utoipa::{OpenApi, ToSchema};

use crate::catalog::{Catalog, CatalogError};
use crate::config::{ApiConfig, CatalogConfig, OptimizerConfig};
use crate::geometry::{
    FitConfiguration, GridFit, OrientationPolicy, OrientationVariant, allowed_orientations,
};
use crate::model::{AxisCaps, ContainerRecord, ExclusionReason, MarginSpec, ProductSpec};
use crate::optimizer::{
    Exclusion, OptimizationOutcome, OptimizationRequest, OptimizeError, RankingFilters, RunStatus,
    ScoredFit, evaluate_container, optimize, optimize_with_progress,
};
use crate::pallet::{PalletOutcome, PalletPlan, PalletSpec, plan_pallet};
use crate::report::{ResultRow, ResultTable, UnitCell, unit_cells};
use crate::scoring::ScoringStrategy;
use crate::types::Dims;

/// Shared state of all handlers.
#[derive(Clone)]
pub struct ApiState {
    optimizer_config: OptimizerConfig,
    catalog: Arc<RwLock<Catalog>>,
    persist_path: Option<PathBuf>,
}

impl ApiState {
    /// Edits are written back only to `.json` catalog files.
    pub fn new(
        optimizer_config: OptimizerConfig,
        catalog: Catalog,
        catalog_config: &CatalogConfig,
    ) -> Self {
        let persist_path = catalog_config.path().and_then(|path| {
            if is_json_path(path) {
                Some(path.clone())
            } else {
                warn!(
                    "⚠️ Catalog file {} is not JSON; catalog edits are kept in memory only.",
                    path.display()
                );
                None
            }
        });

        Self {
            optimizer_config,
            catalog: Arc::new(RwLock::new(catalog)),
            persist_path,
        }
    }

    async fn snapshot(&self) -> Catalog {
        self.catalog.read().await.clone()
    }
}

fn is_json_path(path: &FsPath) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

// SRI hashes verified against https://unpkg.com/swagger-ui-dist@5.17.14/ on 2025-10-29.
const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>carton-fit API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

/// Pallet dimensions for one request; missing fields come from the
/// configured default pallet.
#[derive(Deserialize, Clone, Copy, Debug, Default, ToSchema)]
pub struct PalletRequest {
    pub length: Option<f64>,
    pub width: Option<f64>,
    pub max_height: Option<f64>,
    pub base_height: Option<f64>,
    pub allow_footprint_rotation: Option<bool>,
}

impl PalletRequest {
    fn resolve(&self, defaults: PalletSpec) -> PalletSpec {
        PalletSpec {
            length: self.length.unwrap_or(defaults.length),
            width: self.width.unwrap_or(defaults.width),
            max_height: self.max_height.unwrap_or(defaults.max_height),
            base_height: self.base_height.unwrap_or(defaults.base_height),
            allow_footprint_rotation: self
                .allow_footprint_rotation
                .unwrap_or(defaults.allow_footprint_rotation),
        }
    }
}

/// Request structure for the optimization endpoints.
///
/// Without `containers` the service catalog is used.
#[derive(Deserialize, Clone, ToSchema)]
#[schema(
    example = json!({
        "product": { "reference": "PRD-001", "dims": [100.0, 80.0, 60.0] },
        "margins": { "length": 5.0, "width": 5.0, "height": 10.0 },
        "scoring": "unit_count",
        "pallet": { "max_height": 1800.0 },
        "top_k": 5
    })
)]
pub struct OptimizeRequest {
    pub product: ProductSpec,
    #[serde(default)]
    pub margins: Option<MarginSpec>,
    #[serde(default)]
    pub caps: Option<AxisCaps>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub scoring: Option<ScoringStrategy>,
    #[serde(default)]
    pub filters: Option<RankingFilters>,
    #[serde(default)]
    pub pallet: Option<PalletRequest>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub orientation: Option<OrientationPolicy>,
    #[serde(default)]
    pub alternatives: Option<usize>,
    #[serde(default)]
    pub containers: Option<Vec<ContainerRecord>>,
}

#[derive(Debug)]
struct ValidatedOptimizeRequest {
    request: OptimizationRequest,
    containers: Option<Catalog>,
}

#[derive(Debug)]
enum OptimizeRequestError {
    MissingContainers,
    InvalidContainer(CatalogError),
    InvalidRequest(OptimizeError),
}

impl OptimizeRequest {
    fn into_validated(
        self,
        config: &OptimizerConfig,
    ) -> Result<ValidatedOptimizeRequest, OptimizeRequestError> {
        let containers = match self.containers {
            Some(records) if records.is_empty() => {
                return Err(OptimizeRequestError::MissingContainers);
            }
            Some(records) => Some(
                Catalog::try_from_records(records)
                    .map_err(OptimizeRequestError::InvalidContainer)?,
            ),
            None => None,
        };

        let mut request = OptimizationRequest::new(self.product)
            .with_margins(self.margins.unwrap_or_default())
            .with_caps(self.caps.unwrap_or_default())
            .with_scoring(self.scoring.unwrap_or(config.scoring()))
            .with_filters(self.filters.unwrap_or_default());
        if let Some(pallet) = self.pallet {
            request = request.with_pallet(pallet.resolve(config.pallet()));
        }
        if let Some(top_k) = self.top_k {
            request = request.with_top_k(top_k);
        }
        if let Some(policy) = self.orientation {
            request = request.with_orientation_policy(policy);
        }
        if let Some(alternatives) = self.alternatives {
            request = request.with_alternatives(alternatives);
        }

        request
            .validate()
            .map_err(OptimizeRequestError::InvalidRequest)?;

        Ok(ValidatedOptimizeRequest {
            request,
            containers,
        })
    }
}

/// Response structure of `POST /optimize`.
#[derive(Serialize, ToSchema)]
pub struct OptimizeResponse {
    pub status: RunStatus,
    pub scoring: String,
    /// Containers that passed all filters, before `top_k`.
    pub matched: usize,
    pub results: Vec<RankedContainer>,
    pub excluded: Vec<ExcludedContainer>,
}

/// One ranked container with its best and alternative configurations.
#[derive(Serialize, ToSchema)]
pub struct RankedContainer {
    pub summary: ResultRow,
    pub wall_thickness: f64,
    pub configuration: FitConfiguration,
    pub alternatives: Vec<ScoredFit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pallet: Option<PalletOutcome>,
}

#[derive(Serialize, ToSchema)]
pub struct ExcludedContainer {
    pub container_id: String,
    pub reason_code: String,
    pub reason: String,
}

impl From<&Exclusion> for ExcludedContainer {
    fn from(exclusion: &Exclusion) -> Self {
        Self {
            container_id: exclusion.container_id.clone(),
            reason_code: exclusion.reason.code().to_string(),
            reason: exclusion.reason.to_string(),
        }
    }
}

impl OptimizeResponse {
    pub fn from_outcome(outcome: OptimizationOutcome) -> Self {
        let status = outcome.status();
        let excluded = outcome.exclusions.iter().map(ExcludedContainer::from).collect();

        Self {
            status,
            scoring: outcome.scoring,
            matched: outcome.matched,
            results: outcome
                .results
                .into_iter()
                .map(|result| RankedContainer {
                    summary: ResultRow::from_result(&result),
                    wall_thickness: result.wall_thickness,
                    configuration: result.best,
                    alternatives: result.alternatives,
                    pallet: result.pallet,
                })
                .collect(),
            excluded,
        }
    }
}

/// Request structure for `POST /pallet`.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "container": [300.0, 200.0, 150.0],
        "units_per_container": 12,
        "pallet": { "length": 1200.0, "width": 800.0, "max_height": 1800.0, "base_height": 150.0 }
    })
)]
pub struct PalletPlanRequest {
    #[schema(value_type = [f64; 3])]
    pub container: Dims,
    #[serde(default = "default_units_per_container")]
    pub units_per_container: u64,
    #[serde(default)]
    pub pallet: Option<PalletRequest>,
}

fn default_units_per_container() -> u64 {
    1
}

/// Request structure for `POST /layout`.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "container": [600.0, 400.0, 300.0],
        "product": [100.0, 80.0, 60.0],
        "margins": { "length": 0.0, "width": 0.0, "height": 0.0, "wall_thickness": 3.0 }
    })
)]
pub struct LayoutRequest {
    #[schema(value_type = [f64; 3])]
    pub container: Dims,
    #[schema(value_type = [f64; 3])]
    pub product: Dims,
    #[serde(default)]
    pub margins: Option<MarginSpec>,
    #[serde(default)]
    pub caps: Option<AxisCaps>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub orientation: Option<OrientationPolicy>,
    /// Evaluate only this orientation (index in enumeration order).
    #[serde(default)]
    pub orientation_index: Option<usize>,
}

/// Unit layout of the best (or requested) configuration.
#[derive(Serialize, ToSchema)]
pub struct LayoutResponse {
    #[schema(value_type = [f64; 3])]
    pub usable: Dims,
    pub configuration: FitConfiguration,
    pub unit_count: u64,
    pub cells: Vec<UnitCell>,
}

#[derive(Serialize, ToSchema)]
pub struct CatalogSummary {
    pub containers: usize,
    /// Whether the change was written to the catalog file.
    pub persisted: bool,
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn validation_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid input data",
        details,
    )
}

fn container_config_error(details: impl Into<String>) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid container configuration",
        details,
    )
}

fn catalog_error(err: CatalogError) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid catalog",
        err.to_string(),
    )
}

fn parse_optimize_request(
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
    config: &OptimizerConfig,
) -> Result<ValidatedOptimizeRequest, Response> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(err) => return Err(json_deserialize_error(err)),
    };

    match payload.into_validated(config) {
        Ok(validated) => Ok(validated),
        Err(OptimizeRequestError::MissingContainers) => Err(validation_error(
            "At least one container must be specified",
        )),
        Err(OptimizeRequestError::InvalidContainer(err)) => {
            Err(container_config_error(err.to_string()))
        }
        Err(OptimizeRequestError::InvalidRequest(err)) => Err(validation_error(err.to_string())),
    }
}

/// Runs a validated request on its own containers or a catalog snapshot.
async fn run_optimization(
    state: &ApiState,
    validated: ValidatedOptimizeRequest,
) -> Result<(OptimizationRequest, OptimizationOutcome), Response> {
    let ValidatedOptimizeRequest {
        request,
        containers,
    } = validated;
    let catalog = match containers {
        Some(catalog) => catalog,
        None => state.snapshot().await,
    };

    info!(
        "📥 New optimize request: product {}, {} containers, scoring {}",
        request.product.dims,
        catalog.len(),
        request.scoring
    );
    let outcome = optimize(&catalog, &request, &state.optimizer_config.engine_config())
        .map_err(|err| validation_error(err.to_string()))?;
    info!(
        "📦 Result: {} ranked, {} excluded",
        outcome.result_count(),
        outcome.exclusion_count()
    );

    Ok((request, outcome))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handle_optimize,
        handle_optimize_csv,
        handle_optimize_stream,
        handle_pallet,
        handle_layout,
        handle_get_catalog,
        handle_put_catalog,
        handle_import_catalog,
        handle_add_record,
        handle_delete_record
    ),
    components(
        schemas(
            OptimizeRequest,
            OptimizeResponse,
            RankedContainer,
            ExcludedContainer,
            PalletRequest,
            PalletPlanRequest,
            LayoutRequest,
            LayoutResponse,
            CatalogSummary,
            ErrorResponse,
            ProductSpec,
            ContainerRecord,
            MarginSpec,
            AxisCaps,
            RankingFilters,
            ScoringStrategy,
            OrientationPolicy,
            OrientationVariant,
            GridFit,
            FitConfiguration,
            ScoredFit,
            PalletOutcome,
            PalletPlan,
            ExclusionReason,
            RunStatus,
            ResultRow,
            UnitCell
        )
    ),
    tags(
        (name = "optimization", description = "Carton selection and layouts"),
        (name = "catalog", description = "Maintenance of the container catalog")
    )
)]
struct ApiDoc;

/// Builds the router with all endpoints.
pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    Router::new()
        .route("/optimize", post(handle_optimize))
        .route("/optimize/csv", post(handle_optimize_csv))
        .route("/optimize_stream", post(handle_optimize_stream))
        .route("/pallet", post(handle_pallet))
        .route("/layout", post(handle_layout))
        .route("/catalog", get(handle_get_catalog).put(handle_put_catalog))
        .route("/catalog/import", post(handle_import_catalog))
        .route("/catalog/records", post(handle_add_record))
        .route("/catalog/records/{id}", delete(handle_delete_record))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state)
}

/// Starts the API server and blocks until it terminates.
pub async fn start_api_server(config: ApiConfig, state: ApiState) {
    let app = router(state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("❌ Could not bind API server to {}: {}", addr, err);
            return;
        }
    };

    let display_host = config.display_host().to_string();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /optimize, /optimize/csv, /optimize_stream, /pallet, /layout");
    info!(
        "🗂️ Catalog: GET/PUT /catalog, POST /catalog/import, POST /catalog/records, DELETE /catalog/records/{{id}}"
    );
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    if let Err(err) = axum::serve(listener, app).await {
        error!("❌ API server terminated with an error: {err}");
    }
}

/// Handler for POST /optimize.
///
/// Ranks all containers for the product and lists the excluded ones.
#[utoipa::path(
    post,
    path = "/optimize",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Ranked containers and exclusions", body = OptimizeResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "optimization"
)]
async fn handle_optimize(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let validated = match parse_optimize_request(payload, &state.optimizer_config) {
        Ok(validated) => validated,
        Err(response) => return response,
    };

    match run_optimization(&state, validated).await {
        Ok((_, outcome)) => {
            (StatusCode::OK, Json(OptimizeResponse::from_outcome(outcome))).into_response()
        }
        Err(response) => response,
    }
}

/// Handler for POST /optimize/csv.
///
/// Same ranking as `/optimize`, returned as a CSV download.
#[utoipa::path(
    post,
    path = "/optimize/csv",
    request_body = OptimizeRequest,
    responses(
        (status = 200, description = "Ranking as CSV", content_type = "text/csv", body = String),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "optimization"
)]
async fn handle_optimize_csv(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let validated = match parse_optimize_request(payload, &state.optimizer_config) {
        Ok(validated) => validated,
        Err(response) => return response,
    };

    match run_optimization(&state, validated).await {
        Ok((request, outcome)) => {
            let table = ResultTable::from_outcome(&outcome, &request.product);
            let disposition = format!("attachment; filename=\"{}\"", table.csv_file_name());
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                table.to_csv(),
            )
                .into_response()
        }
        Err(response) => response,
    }
}

/// Handler for POST /optimize_stream endpoint (SSE).
///
/// Streams one event per evaluated or excluded container as Server-Sent
/// Events (text/event-stream).
#[utoipa::path(
    post,
    path = "/optimize_stream",
    request_body = OptimizeRequest,
    responses(
        (
            status = 200,
            description = "Streams optimization events in real-time",
            content_type = "text/event-stream",
            body = String
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or container configuration",
            body = ErrorResponse
        )
    ),
    tag = "optimization"
)]
async fn handle_optimize_stream(
    State(state): State<ApiState>,
    payload: Result<Json<OptimizeRequest>, JsonRejection>,
) -> impl IntoResponse {
    let ValidatedOptimizeRequest {
        request,
        containers,
    } = match parse_optimize_request(payload, &state.optimizer_config) {
        Ok(validated) => validated,
        Err(response) => return response,
    };

    let catalog = match containers {
        Some(catalog) => catalog,
        None => state.snapshot().await,
    };
    let engine_config = state.optimizer_config.engine_config();
    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let scorer = request.scoring;
        let result =
            optimize_with_progress(&catalog, &request, &scorer, &engine_config, |evt| {
                if let Ok(json) = serde_json::to_string(evt) {
                    // A closed receiver only means the client went away.
                    let _ = tx.blocking_send(json);
                }
            });
        if let Err(err) = result {
            warn!("⚠️ Streaming optimization failed: {}", err);
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /pallet.
///
/// Plans how many containers (and units) fit on one pallet.
#[utoipa::path(
    post,
    path = "/pallet",
    request_body = PalletPlanRequest,
    responses(
        (status = 200, description = "Pallet plan or exclusion reason", body = PalletOutcome),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid dimensions", body = ErrorResponse)
    ),
    tag = "optimization"
)]
async fn handle_pallet(
    State(state): State<ApiState>,
    payload: Result<Json<PalletPlanRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };

    if let Err(err) = ContainerRecord::new("pallet-load", request.container) {
        return container_config_error(err.to_string());
    }
    let pallet = request
        .pallet
        .unwrap_or_default()
        .resolve(state.optimizer_config.pallet());
    if let Err(err) = pallet.validate() {
        return validation_error(err.to_string());
    }

    let outcome = plan_pallet(
        request.container,
        request.units_per_container,
        &pallet,
        state.optimizer_config.engine_config().general_epsilon,
    );
    (StatusCode::OK, Json(outcome)).into_response()
}

/// Handler for POST /layout.
///
/// Returns every unit cuboid of the best configuration, for diagrams.
#[utoipa::path(
    post,
    path = "/layout",
    request_body = LayoutRequest,
    responses(
        (status = 200, description = "Unit layout", body = LayoutResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid input, the product does not fit or the layout is too large",
            body = ErrorResponse
        )
    ),
    tag = "optimization"
)]
async fn handle_layout(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };

    let record = match ContainerRecord::new("layout", request.container) {
        Ok(record) => record,
        Err(err) => return container_config_error(err.to_string()),
    };
    let product = match ProductSpec::new(None, request.product) {
        Ok(product) => product,
        Err(err) => return validation_error(err.to_string()),
    };
    let margins = request.margins.unwrap_or_default();
    if let Err(err) = margins.validate() {
        return validation_error(err.to_string());
    }

    let engine_config = state.optimizer_config.engine_config();
    let policy = request
        .orientation
        .unwrap_or(engine_config.orientation_policy);
    let mut variants = allowed_orientations(product.dims, policy);
    if let Some(index) = request.orientation_index {
        variants.retain(|variant| variant.index == index);
        if variants.is_empty() {
            return validation_error(format!("Unknown orientation index {index}"));
        }
    }

    let scoring = state.optimizer_config.scoring();
    let evaluation = match evaluate_container(
        &record,
        &variants,
        &margins,
        &request.caps.unwrap_or_default(),
        &scoring,
        &engine_config,
        0,
    ) {
        Ok(evaluation) => evaluation,
        Err(reason) => {
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Product does not fit",
                reason.to_string(),
            );
        }
    };

    let configuration = evaluation.best.fit;
    let cells = match unit_cells(&configuration, state.optimizer_config.max_layout_cells()) {
        Ok(cells) => cells,
        Err(err) => {
            warn!("⚠️ Layout request rejected: {}", err);
            return error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Layout too large",
                err.to_string(),
            );
        }
    };
    let response = LayoutResponse {
        usable: evaluation.usable,
        configuration,
        unit_count: configuration.unit_count(),
        cells,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Handler for GET /catalog.
#[utoipa::path(
    get,
    path = "/catalog",
    responses((status = 200, description = "Current catalog", body = [ContainerRecord])),
    tag = "catalog"
)]
async fn handle_get_catalog(State(state): State<ApiState>) -> impl IntoResponse {
    let catalog = state.snapshot().await;
    Json(catalog.into_records())
}

/// Handler for PUT /catalog.
///
/// Replaces the whole catalog.
#[utoipa::path(
    put,
    path = "/catalog",
    request_body = [ContainerRecord],
    responses(
        (status = 200, description = "Catalog replaced", body = CatalogSummary),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid records", body = ErrorResponse)
    ),
    tag = "catalog"
)]
async fn handle_put_catalog(
    State(state): State<ApiState>,
    payload: Result<Json<Vec<ContainerRecord>>, JsonRejection>,
) -> impl IntoResponse {
    let Json(records) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };
    match Catalog::try_from_records(records) {
        Ok(catalog) => replace_catalog(&state, catalog).await,
        Err(err) => catalog_error(err),
    }
}

/// Handler for POST /catalog/import.
///
/// Replaces the catalog with a CSV table (header row required).
#[utoipa::path(
    post,
    path = "/catalog/import",
    request_body(content = String, content_type = "text/csv"),
    responses(
        (status = 200, description = "Catalog imported", body = CatalogSummary),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid table", body = ErrorResponse)
    ),
    tag = "catalog"
)]
async fn handle_import_catalog(State(state): State<ApiState>, body: String) -> impl IntoResponse {
    match Catalog::from_csv_str(&body) {
        Ok(catalog) => {
            info!("📂 Imported {} containers from CSV", catalog.len());
            replace_catalog(&state, catalog).await
        }
        Err(err) => catalog_error(err),
    }
}

/// Handler for POST /catalog/records.
#[utoipa::path(
    post,
    path = "/catalog/records",
    request_body = ContainerRecord,
    responses(
        (status = 201, description = "Record added", body = CatalogSummary),
        (status = UNPROCESSABLE_ENTITY, description = "Invalid record", body = ErrorResponse)
    ),
    tag = "catalog"
)]
async fn handle_add_record(
    State(state): State<ApiState>,
    payload: Result<Json<ContainerRecord>, JsonRejection>,
) -> impl IntoResponse {
    let Json(record) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };

    let snapshot = {
        let mut catalog = state.catalog.write().await;
        if let Err(err) = catalog.add(record) {
            return catalog_error(err);
        }
        catalog.clone()
    };
    catalog_changed(&state, snapshot, StatusCode::CREATED)
}

/// Handler for DELETE /catalog/records/{id}.
///
/// Removes every record with this id.
#[utoipa::path(
    delete,
    path = "/catalog/records/{id}",
    params(("id" = String, Path, description = "Container id")),
    responses(
        (status = 200, description = "Record removed", body = CatalogSummary),
        (status = 404, description = "No record with this id", body = ErrorResponse)
    ),
    tag = "catalog"
)]
async fn handle_delete_record(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let snapshot = {
        let mut catalog = state.catalog.write().await;
        if catalog.remove(&id) == 0 {
            return error_response(
                StatusCode::NOT_FOUND,
                "Unknown container",
                format!("No container with id '{id}'"),
            );
        }
        catalog.clone()
    };
    catalog_changed(&state, snapshot, StatusCode::OK)
}

async fn replace_catalog(state: &ApiState, catalog: Catalog) -> Response {
    let snapshot = {
        let mut current = state.catalog.write().await;
        *current = catalog;
        current.clone()
    };
    catalog_changed(state, snapshot, StatusCode::OK)
}

fn catalog_changed(state: &ApiState, snapshot: Catalog, status: StatusCode) -> Response {
    let persisted = match &state.persist_path {
        Some(path) => match snapshot.save_json(path) {
            Ok(()) => true,
            Err(err) => {
                error!("❌ {}", err);
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Catalog could not be saved",
                    err.to_string(),
                );
            }
        },
        None => false,
    };

    info!("🗂️ Catalog now holds {} containers", snapshot.len());
    (
        status,
        Json(CatalogSummary {
            containers: snapshot.len(),
            persisted,
        }),
    )
        .into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    fn test_state(records: Vec<ContainerRecord>) -> ApiState {
        ApiState::new(
            OptimizerConfig::default(),
            Catalog::from_records(records),
            &CatalogConfig::default(),
        )
    }

    fn carton(id: &str, l: f64, w: f64, h: f64) -> ContainerRecord {
        ContainerRecord::new(id, Dims::new(l, w, h)).unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn parse(json: &str) -> OptimizeRequest {
        serde_json::from_str(json).expect("Should parse valid JSON")
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in [
            "/optimize",
            "/optimize/csv",
            "/optimize_stream",
            "/pallet",
            "/layout",
            "/catalog",
            "/catalog/import",
            "/catalog/records",
            "/catalog/records/{id}",
        ] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in [
            "OptimizeRequest",
            "OptimizeResponse",
            "ErrorResponse",
            "PalletOutcome",
            "ResultRow",
        ] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn optimize_request_optional_fields_default_to_none() {
        let request = parse(r#"{ "product": { "dims": [100.0, 80.0, 60.0] } }"#);
        assert!(request.scoring.is_none());
        assert!(request.orientation.is_none());
        assert!(request.containers.is_none());

        let request = parse(
            r#"{ "product": { "dims": [100.0, 80.0, 60.0] }, "scoring": null, "orientation": "upright" }"#,
        );
        assert!(request.scoring.is_none());
        assert_eq!(request.orientation, Some(OrientationPolicy::Upright));
    }

    #[test]
    fn request_level_settings_override_config() {
        let config = OptimizerConfig::default();
        let request = parse(
            r#"{
                "product": { "dims": [100.0, 80.0, 60.0] },
                "scoring": "space_efficiency",
                "orientation": "fixed",
                "alternatives": 2,
                "pallet": { "max_height": 1800.0 }
            }"#,
        );
        let validated = request.into_validated(&config).unwrap();
        assert_eq!(validated.request.scoring, ScoringStrategy::SpaceEfficiency);
        assert_eq!(
            validated.request.orientation_policy,
            Some(OrientationPolicy::Fixed)
        );
        assert_eq!(validated.request.alternatives, Some(2));

        let pallet = validated.request.pallet.unwrap();
        assert_eq!(pallet.max_height, 1800.0);
        assert_eq!(pallet.length, PalletSpec::DEFAULT_LENGTH);
        assert_eq!(pallet.base_height, PalletSpec::DEFAULT_BASE_HEIGHT);
    }

    #[test]
    fn absent_settings_keep_config_defaults() {
        let config = OptimizerConfig::default();
        let validated = parse(r#"{ "product": { "dims": [100.0, 80.0, 60.0] } }"#)
            .into_validated(&config)
            .unwrap();
        assert_eq!(validated.request.scoring, config.scoring());
        assert!(validated.request.orientation_policy.is_none());
        assert!(validated.request.pallet.is_none());
        assert!(validated.containers.is_none());
    }

    #[test]
    fn empty_or_invalid_containers_are_rejected() {
        let config = OptimizerConfig::default();
        let err = parse(r#"{ "product": { "dims": [1.0, 1.0, 1.0] }, "containers": [] }"#)
            .into_validated(&config)
            .unwrap_err();
        assert!(matches!(err, OptimizeRequestError::MissingContainers));

        let err = parse(
            r#"{ "product": { "dims": [1.0, 1.0, 1.0] }, "containers": [{ "id": "A", "outer": [0.0, 1.0, 1.0] }] }"#,
        )
        .into_validated(&config)
        .unwrap_err();
        assert!(matches!(err, OptimizeRequestError::InvalidContainer(_)));

        let err = parse(r#"{ "product": { "dims": [-1.0, 1.0, 1.0] } }"#)
            .into_validated(&config)
            .unwrap_err();
        assert!(matches!(err, OptimizeRequestError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn optimize_uses_catalog_snapshot() {
        let state = test_state(vec![
            carton("A", 600.0, 400.0, 300.0),
            carton("B", 50.0, 50.0, 50.0),
        ]);
        let payload = Ok(Json(parse(r#"{ "product": { "dims": [100.0, 80.0, 60.0] } }"#)));
        let response = handle_optimize(State(state), payload).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["status"], "matched");
        assert_eq!(body["results"][0]["summary"]["container_id"], "A");
        assert_eq!(body["results"][0]["summary"]["unit_count"], 150);
        assert_eq!(body["excluded"][0]["container_id"], "B");
        assert_eq!(body["excluded"][0]["reason_code"], "no_fitting_orientation");
    }

    #[tokio::test]
    async fn optimize_rejects_invalid_product() {
        let state = test_state(vec![carton("A", 600.0, 400.0, 300.0)]);
        let payload = Ok(Json(parse(r#"{ "product": { "dims": [0.0, 80.0, 60.0] } }"#)));
        let response = handle_optimize(State(state), payload).await.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid input data");
    }

    #[tokio::test]
    async fn catalog_records_can_be_added_and_removed() {
        let state = test_state(vec![carton("A", 600.0, 400.0, 300.0)]);

        let response = handle_add_record(
            State(state.clone()),
            Ok(Json(carton("B", 300.0, 200.0, 150.0))),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["containers"], 2);
        assert_eq!(body["persisted"], false);

        let response = handle_delete_record(State(state.clone()), Path("A".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let response = handle_delete_record(State(state.clone()), Path("A".to_string()))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        assert_eq!(state.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn csv_import_replaces_and_persists_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let state = ApiState::new(
            OptimizerConfig::default(),
            Catalog::new(),
            &CatalogConfig::new(Some(path.clone())),
        );

        let csv = "Referentie;Lengte;Breedte;Hoogte\nOD-1;300;200;150\nOD-2;400;300;200\n";
        let response = handle_import_catalog(State(state.clone()), csv.to_string())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["containers"], 2);
        assert_eq!(body["persisted"], true);
        assert_eq!(Catalog::load(&path).unwrap(), state.snapshot().await);

        let response = handle_import_catalog(State(state), "Ref;Gewicht\nA;3\n".to_string())
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn layout_lists_every_unit() {
        let state = test_state(vec![]);
        let request: LayoutRequest = serde_json::from_str(
            r#"{ "container": [200.0, 160.0, 130.0], "product": [100.0, 80.0, 60.0] }"#,
        )
        .unwrap();
        let response = handle_layout(State(state), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["unit_count"], 8);
        assert_eq!(body["cells"].as_array().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn layout_above_cell_limit_is_rejected() {
        let state = ApiState::new(
            OptimizerConfig::default().with_max_layout_cells(7),
            Catalog::default(),
            &CatalogConfig::default(),
        );
        let request: LayoutRequest = serde_json::from_str(
            r#"{ "container": [200.0, 160.0, 130.0], "product": [100.0, 80.0, 60.0] }"#,
        )
        .unwrap();
        let response = handle_layout(State(state), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Layout too large");
    }

    #[tokio::test]
    async fn layout_of_tiny_product_in_large_container_is_rejected() {
        let state = test_state(vec![]);
        let request: LayoutRequest = serde_json::from_str(
            r#"{ "container": [10000.0, 10000.0, 1000.0], "product": [0.1, 0.1, 0.1] }"#,
        )
        .unwrap();
        let response = handle_layout(State(state), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Layout too large");
    }

    #[tokio::test]
    async fn optimize_stream_rejects_invalid_product_before_streaming() {
        let state = test_state(vec![carton("A", 600.0, 400.0, 300.0)]);
        let payload = Ok(Json(parse(r#"{ "product": { "dims": [0.0, 80.0, 60.0] } }"#)));
        let response = handle_optimize_stream(State(state), payload)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Invalid input data");
    }

    #[tokio::test]
    async fn optimize_stream_emits_events_in_order() {
        let state = test_state(vec![
            carton("A", 600.0, 400.0, 300.0),
            carton("B", 50.0, 50.0, 50.0),
        ]);
        let payload = Ok(Json(parse(r#"{ "product": { "dims": [100.0, 80.0, 60.0] } }"#)));
        let response = handle_optimize_stream(State(state), payload)
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        let events: Vec<serde_json::Value> = text
            .lines()
            .filter_map(|line| line.strip_prefix("data:"))
            .map(|data| serde_json::from_str(data.trim_start()).unwrap())
            .collect();
        let types: Vec<&str> = events
            .iter()
            .map(|event| event["type"].as_str().unwrap())
            .collect();
        assert_eq!(
            types,
            vec![
                "RunStarted",
                "ContainerEvaluated",
                "ContainerExcluded",
                "Finished"
            ]
        );
        assert_eq!(events[0]["containers"], 2);
        assert_eq!(events[1]["container_id"], "A");
        assert_eq!(events[1]["unit_count"], 150);
        assert_eq!(events[2]["reason_code"], "no_fitting_orientation");
        assert_eq!(events[3]["ranked"], 1);
        assert_eq!(events[3]["excluded"], 1);
    }

    #[tokio::test]
    async fn pallet_endpoint_applies_default_pallet() {
        let state = test_state(vec![]);
        let request: PalletPlanRequest = serde_json::from_str(
            r#"{ "container": [300.0, 200.0, 150.0], "units_per_container": 12, "pallet": { "max_height": 1800.0 } }"#,
        )
        .unwrap();
        let response = handle_pallet(State(state), Ok(Json(request)))
            .await
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "planned");
        assert_eq!(body["plan"]["containers_per_pallet"], 176);
        assert_eq!(body["plan"]["units_per_pallet"], 2112);
    }
}
