//! HTTP route handlers.

use adem::core::types::ResultPayload;
use adem::pipeline::{reject_malformed, run_query};
use axum::Form;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Html;
use axum::routing::get;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

use crate::state::AppState;

const HOME_PAGE: &str = "home.page.html";
const ARTICLES_PAGE: &str = "articles.page.html";
const ADEM_PAGE: &str = "adem.page.html";

/// Query shown in the form before anything is submitted.
pub const DEFAULT_QUERY: &str = "6 4 2 + 2 10";

/// Article slugs; each is rendered from `<slug>.page.html`.
const ARTICLES: &[&str] = &["go-talking-to-java", "graphs-in-go"];

/// Build the site router.
pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(state.static_dir());

    Router::new()
        .route("/", get(home))
        .route("/articles", get(articles_index))
        .route("/articles/", get(articles_index))
        .route("/articles/{slug}", get(article))
        .route("/adem", get(adem_form).post(adem_query))
        .route("/adem/", get(adem_form).post(adem_query))
        .nest_service("/static", static_files)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET / - home page.
async fn home(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let payload = ResultPayload::page(&state.build_time);
    render_page(&state, HOME_PAGE, &payload)
}

/// GET /articles/ - article index.
async fn articles_index(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let payload = ResultPayload::page(&state.build_time);
    render_page(&state, ARTICLES_PAGE, &payload)
}

/// GET /articles/:slug - a single article.
async fn article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Html<String>, StatusCode> {
    if !ARTICLES.contains(&slug.as_str()) {
        return Err(StatusCode::NOT_FOUND);
    }
    let page = format!("{slug}.page.html");
    let payload = ResultPayload::page(&state.build_time);
    render_page(&state, &page, &payload)
}

/// GET /adem/ - query form with an example query.
async fn adem_form(State(state): State<AppState>) -> Result<Html<String>, StatusCode> {
    let payload = ResultPayload::form(&state.build_time, DEFAULT_QUERY);
    render_page(&state, ADEM_PAGE, &payload)
}

/// POST /adem/ - run the submitted query and re-render the form with results.
async fn adem_query(
    State(state): State<AppState>,
    Form(fields): Form<Vec<(String, String)>>,
) -> Result<Html<String>, StatusCode> {
    let payload = compute(&state, first_query(fields)).await;
    render_page(&state, ADEM_PAGE, &payload)
}

/// First `query` value in the form body. A missing field is the empty query.
fn first_query(fields: Vec<(String, String)>) -> String {
    fields
        .into_iter()
        .find(|(key, _)| key == "query")
        .map(|(_, value)| value)
        .unwrap_or_default()
}

/// Run the pipeline on the blocking pool, holding a compute slot for the duration.
async fn compute(state: &AppState, query: String) -> ResultPayload {
    if let Some(rejected) = reject_malformed(&state.config.compute, &query, &state.build_time) {
        return rejected;
    }

    let permit = match state.compute_slots.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(err) => {
            error!(err = %err, "compute slots closed");
            return ResultPayload::backend_error(&state.build_time);
        }
    };
    debug!(
        available = state.compute_slots.available_permits(),
        "acquired compute slot"
    );

    let task_state = state.clone();
    let joined = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        run_query(
            task_state.runner.as_ref(),
            &task_state.config.compute,
            &query,
            &task_state.build_time,
        )
    })
    .await;

    match joined {
        Ok(payload) => payload,
        Err(err) => {
            error!(err = %err, "compute task failed");
            ResultPayload::backend_error(&state.build_time)
        }
    }
}

fn render_page(
    state: &AppState,
    name: &str,
    payload: &ResultPayload,
) -> Result<Html<String>, StatusCode> {
    match state.templates.render(name, payload) {
        Ok(body) => Ok(Html(body)),
        Err(err) => {
            error!(err = %err, template = name, "failed to render page");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
