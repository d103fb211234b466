pub mod types;

use crate::application::use_cases::dataset_reader;
use crate::application::use_cases::ingestion::IngestionCoordinator;
use crate::application::use_cases::project_service;
use crate::application::use_cases::query_executor::QueryExecutor;
use crate::domain::dataset::IngestionResult;
use crate::domain::error::{AppError, Result};
use crate::domain::tabular::TabularSource;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::db::Store;
use crate::infrastructure::tabular::parse_source;
use actix_cors::Cors;
use actix_web::http::StatusCode;
use actix_web::{delete, dev::Server, get, post, web, App, HttpResponse, HttpServer, Responder};
use serde::Serialize;
use tracing::{error, info, warn};
use types::{
    validated, CandidateQueryRequest, CreateProjectRequest, DataRequest, DeletedResponse,
    ErrorBody, HealthResponse, IngestRequest, OwnerQuery,
};

/// JSON bodies carry whole files
const MAX_JSON_PAYLOAD: usize = 64 * 1024 * 1024;

pub struct HttpState {
    pub store: Store,
    pub config: AppConfig,
    pub ingestion: IngestionCoordinator,
    pub executor: QueryExecutor,
}

impl HttpState {
    pub fn new(store: Store, config: AppConfig) -> Self {
        Self {
            ingestion: IngestionCoordinator::new(config.bulk_load_timeout()),
            executor: QueryExecutor::new(config.query_timeout()),
            store,
            config,
        }
    }
}

pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::ValidationError(_)
        | AppError::SourceParseError(_)
        | AppError::TypeInferenceError(_) => StatusCode::BAD_REQUEST,
        AppError::ConstraintViolation(_) => StatusCode::CONFLICT,
        AppError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        AppError::Internal(_)
        | AppError::DatabaseError(_)
        | AppError::QueryExecution(_)
        | AppError::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: &AppError) -> HttpResponse {
    let status = status_for(err);
    if status.is_server_error() {
        error!(kind = err.kind(), "{}", err);
    } else {
        warn!(kind = err.kind(), "{}", err);
    }
    HttpResponse::build(status).json(ErrorBody::from(err))
}

fn respond<T: Serialize>(result: Result<T>) -> HttpResponse {
    match result {
        Ok(body) => HttpResponse::Ok().json(body),
        Err(e) => error_response(&e),
    }
}

fn parse_upload(req: &IngestRequest) -> Result<TabularSource> {
    let bytes = req.payload()?;
    parse_source(&req.file_name, &bytes)
}

#[get("/health")]
async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[post("/datasets")]
async fn ingest_dataset(data: web::Data<HttpState>, req: web::Json<IngestRequest>) -> impl Responder {
    let req = match validated(req.into_inner()) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };
    info!(file = %req.file_name, owner_user_id = req.owner_user_id, "Dataset upload received");

    let source = match parse_upload(&req) {
        Ok(source) => source,
        Err(e) => {
            let status = status_for(&e);
            warn!(file = %req.file_name, "Upload could not be parsed: {}", e);
            return HttpResponse::build(status).json(IngestionResult::failed(e));
        }
    };

    let result = data
        .ingestion
        .ingest(&data.store, &source, req.owner_user_id)
        .await;
    match &result.error {
        None => HttpResponse::Created().json(result),
        Some(e) => HttpResponse::build(status_for(e)).json(result),
    }
}

#[get("/datasets/{id}")]
async fn dataset_metadata(data: web::Data<HttpState>, path: web::Path<i64>) -> impl Responder {
    respond(dataset_reader::get_dataset_metadata(&data.store, path.into_inner()).await)
}

#[get("/datasets/{id}/columns")]
async fn dataset_columns(data: web::Data<HttpState>, path: web::Path<i64>) -> impl Responder {
    respond(dataset_reader::get_column_details(&data.store, path.into_inner()).await)
}

/// Trusted read: `columns` and `where_clause` reach SQL after quote
/// normalization only. Callers build them; model output goes to `/query`.
#[post("/datasets/{id}/data")]
async fn dataset_rows(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    req: web::Json<DataRequest>,
) -> impl Responder {
    let req = match validated(req.into_inner()) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };
    let limit = req.limit.unwrap_or(data.config.default_read_limit);
    respond(
        dataset_reader::get_owned_dataframe(
            &data.store,
            &data.executor,
            path.into_inner(),
            req.owner_user_id,
            limit,
            req.columns.as_deref(),
            req.where_clause.as_deref(),
        )
        .await,
    )
}

#[post("/datasets/{id}/query")]
async fn dataset_query(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    req: web::Json<CandidateQueryRequest>,
) -> impl Responder {
    let req = match validated(req.into_inner()) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };
    respond(
        dataset_reader::run_candidate_query(&data.store, &data.executor, path.into_inner(), &req.sql)
            .await,
    )
}

#[delete("/datasets/{id}")]
async fn remove_dataset(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    query: web::Query<OwnerQuery>,
) -> impl Responder {
    let dataset_id = path.into_inner();
    respond(
        dataset_reader::delete_dataset(&data.store, dataset_id, query.owner_user_id)
            .await
            .map(|_| DeletedResponse {
                deleted: true,
                dataset_id,
            }),
    )
}

#[post("/projects")]
async fn create_project(
    data: web::Data<HttpState>,
    req: web::Json<CreateProjectRequest>,
) -> impl Responder {
    let req = match validated(req.into_inner()) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };
    match project_service::create_project(
        &data.store,
        req.owner_user_id,
        &req.project_name,
        req.description.as_deref(),
    )
    .await
    {
        Ok(project) => HttpResponse::Created().json(project),
        Err(e) => error_response(&e),
    }
}

#[get("/projects")]
async fn list_projects(data: web::Data<HttpState>, query: web::Query<OwnerQuery>) -> impl Responder {
    respond(project_service::list_projects(&data.store, query.owner_user_id).await)
}

#[get("/projects/{id}")]
async fn project_metadata(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    query: web::Query<OwnerQuery>,
) -> impl Responder {
    respond(
        project_service::get_project_metadata(&data.store, path.into_inner(), query.owner_user_id)
            .await,
    )
}

#[get("/projects/{id}/stats")]
async fn project_stats(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    query: web::Query<OwnerQuery>,
) -> impl Responder {
    respond(
        project_service::get_project_stats(&data.store, path.into_inner(), query.owner_user_id)
            .await,
    )
}

#[post("/projects/{id}/data")]
async fn project_rows(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    req: web::Json<DataRequest>,
) -> impl Responder {
    let req = match validated(req.into_inner()) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };
    let limit = req.limit.unwrap_or(data.config.default_read_limit);
    respond(
        project_service::get_project_data(
            &data.store,
            &data.executor,
            path.into_inner(),
            req.owner_user_id,
            limit,
            req.columns.as_deref(),
            req.where_clause.as_deref(),
        )
        .await,
    )
}

#[post("/projects/{id}/dataset")]
async fn upload_project_dataset(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    req: web::Json<IngestRequest>,
) -> impl Responder {
    let req = match validated(req.into_inner()) {
        Ok(req) => req,
        Err(e) => return error_response(&e),
    };
    let source = match parse_upload(&req) {
        Ok(source) => source,
        Err(e) => return error_response(&e),
    };

    match project_service::upload_dataset_to_project(
        &data.store,
        &data.ingestion,
        path.into_inner(),
        req.owner_user_id,
        &source,
    )
    .await
    {
        Ok(upload) => HttpResponse::Created().json(upload),
        Err(e) => error_response(&e),
    }
}

#[delete("/projects/{id}/dataset")]
async fn unlink_project_dataset(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    query: web::Query<OwnerQuery>,
) -> impl Responder {
    respond(
        project_service::unlink_dataset_from_project(
            &data.store,
            path.into_inner(),
            query.owner_user_id,
        )
        .await
        .map(|dataset_id| DeletedResponse {
            deleted: true,
            dataset_id,
        }),
    )
}

#[delete("/projects/{id}")]
async fn remove_project(
    data: web::Data<HttpState>,
    path: web::Path<i64>,
    query: web::Query<OwnerQuery>,
) -> impl Responder {
    respond(project_service::delete_project(&data.store, path.into_inner(), query.owner_user_id).await)
}

/// Register every route under `/api`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(MAX_JSON_PAYLOAD))
        .service(
            web::scope("/api")
                .service(health)
                .service(ingest_dataset)
                .service(dataset_metadata)
                .service(dataset_columns)
                .service(dataset_rows)
                .service(dataset_query)
                .service(remove_dataset)
                .service(create_project)
                .service(list_projects)
                .service(project_metadata)
                .service(project_stats)
                .service(project_rows)
                .service(upload_project_dataset)
                .service(unlink_project_dataset)
                .service(remove_project),
        );
}

pub fn start_server(state: HttpState) -> std::io::Result<Server> {
    let bind = (state.config.http_host.clone(), state.config.http_port);
    let state = web::Data::new(state);

    let server = HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .app_data(state.clone())
            .configure(configure)
    })
    .bind(bind)?
    .run();

    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::init_schema;
    use actix_web::test;
    use serde_json::{json, Value};

    async fn state() -> web::Data<HttpState> {
        let store = Store::in_memory().await.unwrap();
        init_schema(&store).await.unwrap();
        web::Data::new(HttpState::new(store, AppConfig::default()))
    }

    macro_rules! app {
        ($state:expr) => {
            test::init_service(App::new().app_data($state.clone()).configure(configure)).await
        };
    }

    const PEOPLE_CSV: &str = "name,age,city\nAnn,31,Oslo\nBen,42,Rome\nCid,25,Oslo\n";

    #[actix_web::test]
    async fn test_health() {
        let state = state().await;
        let app = app!(state);
        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body.status, "ok");
    }

    #[actix_web::test]
    async fn test_ingest_then_read_and_query() {
        let state = state().await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/datasets")
            .set_json(json!({"file_name": "people.csv", "owner_user_id": 7, "content": PEOPLE_CSV}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], json!(true));
        let id = body["dataset_id"].as_i64().unwrap();

        let req = test::TestRequest::get()
            .uri(&format!("/api/datasets/{}", id))
            .to_request();
        let meta: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(meta["num_rows"], json!(3));
        assert_eq!(meta["dataset_name"], json!("people"));

        let req = test::TestRequest::get()
            .uri(&format!("/api/datasets/{}/columns", id))
            .to_request();
        let columns: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(columns.as_array().unwrap().len(), 3);

        let req = test::TestRequest::post()
            .uri(&format!("/api/datasets/{}/data", id))
            .set_json(json!({"owner_user_id": 7, "columns": ["\"name\""], "where_clause": "city = \"Oslo\""}))
            .to_request();
        let rows: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(rows["row_count"], json!(2));

        let req = test::TestRequest::post()
            .uri(&format!("/api/datasets/{}/data", id))
            .set_json(json!({"owner_user_id": 8}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::post()
            .uri(&format!("/api/datasets/{}/query", id))
            .set_json(json!({"sql": "DROP TABLE datasets_metadata"}))
            .to_request();
        let outcome: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(outcome["used_fallback"], json!(true));
        assert_eq!(outcome["result"]["row_count"], json!(3));
    }

    #[actix_web::test]
    async fn test_error_statuses() {
        let state = state().await;
        let app = app!(state);

        let req = test::TestRequest::get().uri("/api/datasets/999").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert_eq!(body.error, "not_found");

        let req = test::TestRequest::post()
            .uri("/api/datasets")
            .set_json(json!({"file_name": "notes.pdf", "owner_user_id": 1, "content": "a"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], json!(false));

        let req = test::TestRequest::post()
            .uri("/api/projects")
            .set_json(json!({"owner_user_id": 1, "project_name": ""}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_project_workflow() {
        let state = state().await;
        let app = app!(state);

        let req = test::TestRequest::post()
            .uri("/api/projects")
            .set_json(json!({"owner_user_id": 3, "project_name": "Survey"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let project: Value = test::read_body_json(resp).await;
        let pid = project["project_id"].as_i64().unwrap();

        let upload = json!({"file_name": "people.csv", "owner_user_id": 3, "content": PEOPLE_CSV});
        let req = test::TestRequest::post()
            .uri(&format!("/api/projects/{}/dataset", pid))
            .set_json(&upload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let req = test::TestRequest::post()
            .uri(&format!("/api/projects/{}/dataset", pid))
            .set_json(&upload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        let req = test::TestRequest::get()
            .uri(&format!("/api/projects/{}/stats?owner_user_id=3", pid))
            .to_request();
        let stats: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(stats.as_array().unwrap().len(), 3);

        // Someone else's project looks absent
        let req = test::TestRequest::get()
            .uri(&format!("/api/projects/{}?owner_user_id=4", pid))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let req = test::TestRequest::delete()
            .uri(&format!("/api/projects/{}?owner_user_id=3", pid))
            .to_request();
        let deletion: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(deletion["dataset_deleted"], json!(true));

        let req = test::TestRequest::get()
            .uri("/api/projects?owner_user_id=3")
            .to_request();
        let projects: Value = test::call_and_read_body_json(&app, req).await;
        assert!(projects.as_array().unwrap().is_empty());
    }
}
