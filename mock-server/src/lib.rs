use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub login: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct CreateUser {
    pub login: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
pub struct UpdateUser {
    pub name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
}

pub type Db = Arc<RwLock<HashMap<Uuid, User>>>;

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(HashMap::new()));
    Router::new()
        .route("/v1/users", get(list_users).post(create_user))
        .route("/v1/users/{id}", get(get_user).put(update_user).delete(delete_user))
        .route("/v1/users/{id}/avatar", get(get_avatar))
        .route("/v1/cached", get(not_modified))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

/// Serialize as XML when the client accepts it, JSON otherwise.
fn render<T: Serialize>(headers: &HeaderMap, status: StatusCode, value: &T) -> Response {
    if !header_str(headers, header::ACCEPT).contains("xml") {
        return (status, Json(value)).into_response();
    }
    match quick_xml::se::to_string(value) {
        Ok(body) => (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "xml serialization failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ApiError {
            message: message.into(),
        }),
    )
        .into_response()
}

fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "user not found")
}

/// Parse a request body according to its `Content-Type`.
fn parse_body<T: DeserializeOwned>(headers: &HeaderMap, body: &[u8]) -> Result<T, Response> {
    let content_type = header_str(headers, header::CONTENT_TYPE);
    let parsed = if content_type.contains("xml") {
        std::str::from_utf8(body)
            .map_err(|e| e.to_string())
            .and_then(|text| quick_xml::de::from_str(text).map_err(|e| e.to_string()))
    } else if content_type.contains("json") {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    } else {
        return Err(error(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!("unsupported content type {content_type:?}"),
        ));
    };
    parsed.map_err(|message| error(StatusCode::UNPROCESSABLE_ENTITY, message))
}

async fn list_users(State(db): State<Db>) -> Json<Vec<User>> {
    let mut users: Vec<User> = db.read().await.values().cloned().collect();
    users.sort_by(|a, b| a.login.cmp(&b.login));
    Json(users)
}

async fn create_user(State(db): State<Db>, headers: HeaderMap, body: Bytes) -> Response {
    let input: CreateUser = match parse_body(&headers, &body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let user = User {
        id: Uuid::new_v4(),
        login: input.login,
        name: input.name,
    };
    db.write().await.insert(user.id, user.clone());
    render(&headers, StatusCode::CREATED, &user)
}

async fn get_user(State(db): State<Db>, Path(id): Path<Uuid>, headers: HeaderMap) -> Response {
    match db.read().await.get(&id) {
        Some(user) => render(&headers, StatusCode::OK, user),
        None => not_found(),
    }
}

async fn update_user(
    State(db): State<Db>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let input: UpdateUser = match parse_body(&headers, &body) {
        Ok(input) => input,
        Err(response) => return response,
    };
    let mut users = db.write().await;
    let Some(user) = users.get_mut(&id) else {
        return not_found();
    };
    if let Some(name) = input.name {
        user.name = name;
    }
    render(&headers, StatusCode::OK, user)
}

async fn delete_user(State(db): State<Db>, Path(id): Path<Uuid>) -> Response {
    match db.write().await.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => not_found(),
    }
}

async fn get_avatar(State(db): State<Db>, Path(id): Path<Uuid>) -> Response {
    match db.read().await.get(&id) {
        Some(user) => (
            [(header::CONTENT_TYPE, "application/octet-stream")],
            avatar_bytes(&user.login),
        )
            .into_response(),
        None => not_found(),
    }
}

/// Deterministic stand-in for an image.
pub fn avatar_bytes(login: &str) -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G'];
    bytes.extend_from_slice(login.as_bytes());
    bytes
}

async fn not_modified() -> StatusCode {
    StatusCode::NOT_MODIFIED
}
