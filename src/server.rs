//! HTTP interface over the analysis pipeline.
//!
//! Each request builds its own pipeline from the shared configuration, so
//! concurrent requests never share run state. Reports use the same JSON and
//! Markdown renderings as the CLI.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use crate::analysis::pipeline::{AnalysisPipeline, Directives, ExtractionDirective};
use crate::config::{Config, PipelineConfig};
use crate::error::{Error, Result};
use crate::llm::gateway::{LlmGateway, ProviderRegistry};
use crate::llm::prompts::PromptSet;
use crate::models::document::Document;
use crate::models::item::{ExtractedItem, ItemBatch, ItemKind, ValidationError};
use crate::report::{OutputFormat, Report};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub config: Arc<Config>,
    pub prompts: Arc<PromptSet>,
}

impl AppState {
    pub fn new(registry: ProviderRegistry, config: Config, prompts: PromptSet) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
            prompts: Arc::new(prompts),
        }
    }

    fn pipeline(&self, llm: Option<&str>) -> Result<AnalysisPipeline> {
        let name = llm.unwrap_or(&self.config.default_llm);
        let gateway = LlmGateway::from_config(&self.registry, &self.config, name)?;
        let config = PipelineConfig {
            show_progress: false,
            ..PipelineConfig::from(self.config.as_ref())
        };
        Ok(AnalysisPipeline::new(gateway, &self.prompts, config))
    }
}

/// How one side is resolved when no stored items are supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideMode {
    #[default]
    Auto,
    Skip,
    Force,
}

#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub source_text: String,
    pub target_text: String,
    #[serde(default = "default_source_name")]
    pub source_name: String,
    #[serde(default = "default_target_name")]
    pub target_name: String,
    #[serde(default)]
    pub llm: Option<String>,
    #[serde(default)]
    pub conditions: SideMode,
    #[serde(default)]
    pub facts: SideMode,
    /// Replaces condition extraction when present.
    #[serde(default)]
    pub existing_conditions: Option<Vec<ExtractedItem>>,
    /// Replaces fact extraction when present.
    #[serde(default)]
    pub existing_facts: Option<Vec<ExtractedItem>>,
}

fn default_source_name() -> String {
    "source".to_string()
}

fn default_target_name() -> String {
    "target".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
    pub kind: ItemKind,
    #[serde(default = "default_target_name")]
    pub name: String,
    #[serde(default)]
    pub llm: Option<String>,
    /// Conditions offered to fact extraction.
    #[serde(default)]
    pub conditions: Option<Vec<ExtractedItem>>,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub kind: ItemKind,
    pub items: Vec<ExtractedItem>,
}

#[derive(Debug, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ProcessorsResponse {
    pub processors: Vec<String>,
    pub default: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// Items supplied by the caller do not form a valid batch.
    InvalidItems(ValidationError),
    Analysis(Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidItems(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Analysis(Error::UnknownProvider(_)) => StatusCode::BAD_REQUEST,
            ApiError::Analysis(Error::LLMTimeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Analysis(
                Error::LLMUnavailable(_) | Error::ExtractionValidation { .. },
            ) => StatusCode::BAD_GATEWAY,
            ApiError::Analysis(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let message = match self {
            ApiError::InvalidItems(e) => format!("Invalid items: {}", e),
            ApiError::Analysis(e) => e.to_string(),
        };
        tracing::warn!("Request failed ({}): {}", status, message);

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Analysis(e)
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::InvalidItems(e)
    }
}

fn directive(
    mode: SideMode,
    existing: Option<Vec<ExtractedItem>>,
    kind: ItemKind,
) -> std::result::Result<ExtractionDirective, ValidationError> {
    if let Some(items) = existing {
        return Ok(ExtractionDirective::UseExisting(ItemBatch::new(kind, items)?));
    }
    Ok(match mode {
        SideMode::Auto => ExtractionDirective::Auto,
        SideMode::Skip => ExtractionDirective::Skip,
        SideMode::Force => ExtractionDirective::Force,
    })
}

/// GET / - Service description
async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "/health",
            "/api/processors",
            "/api/check",
            "/api/check/report",
            "/api/extract",
        ],
    })
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// GET /api/processors - Registered LLM providers
async fn processors(State(state): State<AppState>) -> Json<ProcessorsResponse> {
    Json(ProcessorsResponse {
        processors: state.registry.names(),
        default: state.config.default_llm.clone(),
    })
}

/// POST /api/check - JSON report
async fn check(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> std::result::Result<Response, ApiError> {
    run_check(&state, request, OutputFormat::Json).await
}

/// POST /api/check/report - Markdown report
async fn check_report(
    State(state): State<AppState>,
    Json(request): Json<CheckRequest>,
) -> std::result::Result<Response, ApiError> {
    run_check(&state, request, OutputFormat::Markdown).await
}

async fn run_check(
    state: &AppState,
    request: CheckRequest,
    format: OutputFormat,
) -> std::result::Result<Response, ApiError> {
    let directives = Directives {
        conditions: directive(
            request.conditions,
            request.existing_conditions,
            ItemKind::Condition,
        )?,
        facts: directive(request.facts, request.existing_facts, ItemKind::Fact)?,
    };
    let source = Document::from_text(request.source_name, request.source_text);
    let target = Document::from_text(request.target_name, request.target_text);

    tracing::info!(
        "Check request: {} against {}",
        target.display_path(),
        source.display_path()
    );
    let pipeline = state.pipeline(request.llm.as_deref())?;
    let run = pipeline.run(&source, &target, &directives).await?;
    tracing::info!("Check finished: {}", run.result.verdict);

    let body = Report::new(&run, &source, &target).render(format)?;
    let content_type = match format {
        OutputFormat::Json => "application/json",
        OutputFormat::Markdown => "text/markdown; charset=utf-8",
        OutputFormat::Text => "text/plain; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// POST /api/extract - Conditions or facts of one text
async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> std::result::Result<Json<ExtractResponse>, ApiError> {
    let conditions = request
        .conditions
        .map(|items| ItemBatch::new(ItemKind::Condition, items))
        .transpose()?;
    let document = Document::from_text(request.name, request.text);

    let pipeline = state.pipeline(request.llm.as_deref())?;
    let batch = match request.kind {
        ItemKind::Condition => pipeline.extract_conditions(&document).await?,
        ItemKind::Fact => pipeline.extract_facts(&document, conditions.as_ref()).await?,
    };

    Ok(Json(ExtractResponse {
        kind: batch.kind(),
        items: batch.into_items(),
    }))
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/processors", get(processors))
        .route("/api/check", post(check))
        .route("/api/check/report", post(check_report))
        .route("/api/extract", post(extract))
        .with_state(state)
}

/// Binds `addr` and serves until the process is stopped.
pub async fn serve(state: AppState, addr: &str) -> Result<()> {
    let app = create_router(state);
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockProvider;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt; // for oneshot

    const EXTRACTION_NO: &str = "## Extraction Required\nno";
    const NON_COMPLIANT: &str =
        "## Compliance Status\nNON_COMPLIANT\n## Confidence\n0.8\n## Summary\nNo owner\n## Recommendations\n- Name an owner";

    fn create_test_state(provider: &MockProvider) -> AppState {
        let mut registry = ProviderRegistry::new();
        registry.register("mock", provider.clone());
        let config = Config {
            default_llm: "mock".to_string(),
            show_progress: false,
            ..Default::default()
        };
        AppState::new(registry, config, PromptSet::default())
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_router(create_test_state(&MockProvider::default()));

        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_processors_lists_registered_providers() {
        let app = create_router(create_test_state(&MockProvider::default()));

        let request = Request::builder()
            .uri("/api/processors")
            .body(Body::empty())
            .unwrap();

        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["processors"], serde_json::json!(["mock"]));
        assert_eq!(body["default"], "mock");
    }

    #[tokio::test]
    async fn test_check_returns_json_report() {
        let provider = MockProvider::new(NON_COMPLIANT);
        provider.respond_when("# Extraction Necessity", EXTRACTION_NO);
        let app = create_router(create_test_state(&provider));

        let request = post_json(
            "/api/check",
            serde_json::json!({
                "source_text": "Reports must name an owner.",
                "target_text": "Weekly report.",
                "target_name": "week.txt"
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["strategy"], "full_text");
        assert_eq!(body["target"], "week.txt");
        assert_eq!(body["result"]["verdict"], "NON_COMPLIANT");
        assert_eq!(body["conditions"]["directive"], "auto");
    }

    #[tokio::test]
    async fn test_check_report_is_markdown() {
        let provider = MockProvider::new("## Compliance Status\nCOMPLIANT\n## Confidence\n1.0");
        let app = create_router(create_test_state(&provider));

        let request = post_json(
            "/api/check/report",
            serde_json::json!({
                "source_text": "Rules.",
                "target_text": "Report.",
                "conditions": "skip",
                "facts": "skip"
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/markdown; charset=utf-8"
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("## Compliance Status\nCOMPLIANT"));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_existing_conditions_replace_extraction() {
        let provider = MockProvider::new("## Compliance Status\nCOMPLIANT\n## Confidence\n0.9");
        let app = create_router(create_test_state(&provider));

        let request = post_json(
            "/api/check",
            serde_json::json!({
                "source_text": "Rules.",
                "target_text": "Report.",
                "facts": "skip",
                "existing_conditions": [{"id": 4, "text": "Names an owner"}]
            }),
        );

        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["strategy"], "conditions_vs_target_text");
        assert_eq!(body["conditions"]["directive"], "use_existing");
        assert_eq!(body["result"]["sub_results"][0]["item"]["id"], 4);
        assert_eq!(provider.calls_containing("# Condition Extraction"), 0);
    }

    #[tokio::test]
    async fn test_invalid_existing_items_are_rejected() {
        let provider = MockProvider::default();
        let app = create_router(create_test_state(&provider));

        let request = post_json(
            "/api/check",
            serde_json::json!({
                "source_text": "Rules.",
                "target_text": "Report.",
                "existing_conditions": [{"id": 1, "text": "a", "parent_id": 3}]
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_llm_is_bad_request() {
        let app = create_router(create_test_state(&MockProvider::default()));

        let request = post_json(
            "/api/check",
            serde_json::json!({
                "source_text": "Rules.",
                "target_text": "Report.",
                "llm": "nope"
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap().contains("nope"));
    }

    #[tokio::test]
    async fn test_llm_outage_is_bad_gateway() {
        let provider = MockProvider::default();
        provider.fail_next(Error::LLMUnavailable("down".into()));
        provider.fail_next(Error::LLMUnavailable("still down".into()));
        let app = create_router(create_test_state(&provider));

        let request = post_json(
            "/api/check",
            serde_json::json!({
                "source_text": "Rules.",
                "target_text": "Report.",
                "conditions": "skip",
                "facts": "skip"
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_extract_facts_sees_supplied_conditions() {
        let provider = MockProvider::new(r#"[{"id": 1, "text": "Owner is Ana"}]"#);
        let app = create_router(create_test_state(&provider));

        let request = post_json(
            "/api/extract",
            serde_json::json!({
                "text": "Owner: Ana",
                "kind": "fact",
                "conditions": [{"id": 1, "text": "Names an owner"}]
            }),
        );

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body["kind"], "fact");
        assert_eq!(body["items"][0]["text"], "Owner is Ana");
        assert_eq!(body["items"][0]["source"], "target");
        assert!(provider.prompts()[0].contains("- [1] Names an owner"));
    }
}
