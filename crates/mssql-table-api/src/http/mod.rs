//! HTTP surface over [`TableService`].
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | GET | `/api/tables` | table names |
//! | GET | `/api/tables/:table/schema` | column descriptions |
//! | GET | `/api/tables/:table/data?limit&offset` | rows |
//! | POST | `/api/tables/:table/query` | `{data, count}` |
//! | GET | `/api/tables/:table/odata?$top&$skip&$filter` | rows |
//! | POST / PUT / DELETE | `/api/tables/:table/data` | status |
//! | GET | `/api/tables/:table/count` | `{count}` |
//! | GET | `/api/foreign-keys/:name/data` | `[{id, name}]` |
//! | GET | `/health` | `{status}` |

pub mod errors;
mod server;

pub use server::serve;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::core::{GenericRecord, TableSchema};
use crate::error::{ApiError, Result};
use crate::executor::{ForeignKeyOption, Page, TableService};
use crate::filter::FilterCondition;
use crate::typemap::SemanticType;

type AppState = Arc<TableService>;

/// Build the router.
pub fn router(service: Arc<TableService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/tables", get(list_tables))
        .route("/api/tables/:table/schema", get(table_schema))
        .route(
            "/api/tables/:table/data",
            get(list_rows)
                .post(save_row)
                .put(update_row)
                .delete(delete_row),
        )
        .route("/api/tables/:table/query", post(query_rows))
        .route("/api/tables/:table/odata", get(odata_rows))
        .route("/api/tables/:table/count", get(count_rows))
        .route("/api/foreign-keys/:name/data", get(foreign_key_rows))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}

/// Schema endpoint body.
#[derive(Debug, Serialize)]
pub struct SchemaResponse {
    pub columns: Vec<ColumnResponse>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnResponse {
    pub name: String,
    /// `number` / `text`, or the native type for anything else.
    #[serde(rename = "type")]
    pub kind: String,
    pub key: bool,
    pub filterable: bool,
    pub foreign_key_name: Option<String>,
}

impl From<&TableSchema> for SchemaResponse {
    fn from(schema: &TableSchema) -> Self {
        let columns = schema
            .columns
            .iter()
            .map(|c| ColumnResponse {
                name: c.name.clone(),
                kind: match c.semantic_type {
                    SemanticType::Opaque => c.native_type.clone(),
                    other => other.to_string(),
                },
                key: c.is_primary_key,
                filterable: c.filterable,
                foreign_key_name: c.foreign_key.clone(),
            })
            .collect();
        Self { columns }
    }
}

/// `POST /query` body.
#[derive(Debug, Default, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub filters: Vec<FilterCondition>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: i64,
}

type Params = std::result::Result<Query<HashMap<String, String>>, QueryRejection>;
type Body<T> = std::result::Result<Json<T>, JsonRejection>;

/// Parse an optional integer query parameter.
fn int_param(params: &HashMap<String, String>, name: &str) -> Result<Option<i64>> {
    match params.get(name).map(|v| v.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::validation(format!("Invalid {}: {}", name, raw))),
    }
}

async fn health() -> Json<StatusResponse> {
    Json(StatusResponse { status: "ok" })
}

async fn list_tables(State(service): State<AppState>) -> Result<Json<Vec<String>>> {
    Ok(Json(service.list_tables().await?))
}

async fn table_schema(
    State(service): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<SchemaResponse>> {
    let schema = service.describe(&table).await?;
    Ok(Json(SchemaResponse::from(schema.as_ref())))
}

async fn list_rows(
    State(service): State<AppState>,
    Path(table): Path<String>,
    params: Params,
) -> Result<Json<Vec<GenericRecord>>> {
    let Query(params) = params?;
    let limit = int_param(&params, "limit")?;
    let offset = int_param(&params, "offset")?;

    let rows = service
        .fetch_page(&table, limit, offset, &Default::default())
        .await?;
    Ok(Json(rows))
}

async fn query_rows(
    State(service): State<AppState>,
    Path(table): Path<String>,
    body: Body<QueryRequest>,
) -> Result<Json<Page>> {
    let Json(request) = body?;
    let page = service
        .query_structured(&table, &request.filters, request.limit, request.offset)
        .await?;
    Ok(Json(page))
}

async fn odata_rows(
    State(service): State<AppState>,
    Path(table): Path<String>,
    params: Params,
) -> Result<Json<Vec<GenericRecord>>> {
    let Query(params) = params?;
    let top = int_param(&params, "$top")?;
    let skip = int_param(&params, "$skip")?;
    let expression = params.get("$filter").map(String::as_str);

    let rows = service.query_expression(&table, expression, top, skip).await?;
    Ok(Json(rows))
}

async fn save_row(
    State(service): State<AppState>,
    Path(table): Path<String>,
    body: Body<GenericRecord>,
) -> Result<Json<StatusResponse>> {
    let Json(record) = body?;
    service.save(&table, record).await?;
    Ok(Json(StatusResponse { status: "success" }))
}

async fn update_row(
    State(service): State<AppState>,
    Path(table): Path<String>,
    body: Body<GenericRecord>,
) -> Result<Json<StatusResponse>> {
    let Json(record) = body?;
    service.update(&table, record).await?;
    Ok(Json(StatusResponse { status: "success" }))
}

async fn delete_row(
    State(service): State<AppState>,
    Path(table): Path<String>,
    body: Body<GenericRecord>,
) -> Result<Json<StatusResponse>> {
    let Json(record) = body?;
    service.delete(&table, record).await?;
    Ok(Json(StatusResponse { status: "deleted" }))
}

async fn count_rows(
    State(service): State<AppState>,
    Path(table): Path<String>,
) -> Result<Json<CountResponse>> {
    let count = service.count(&table).await?;
    Ok(Json(CountResponse { count }))
}

async fn foreign_key_rows(
    State(service): State<AppState>,
    Path(name): Path<String>,
    params: Params,
) -> Result<Json<Vec<ForeignKeyOption>>> {
    let Query(params) = params?;
    let limit = int_param(&params, "limit")?;
    Ok(Json(service.foreign_key_options(&name, limit).await?))
}
