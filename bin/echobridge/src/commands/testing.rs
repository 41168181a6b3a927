use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Backend stand-in: polls drain `commands` then answer 204; every POST is
/// recorded as `(path, body)` and acknowledged with `{"received": true}`.
#[derive(Clone)]
pub struct FakeBackend {
    pub posts: Arc<Mutex<Vec<(String, Value)>>>,
    pub polls: Arc<Mutex<usize>>,
    commands: Arc<Mutex<VecDeque<Value>>>,
}

impl FakeBackend {
    pub fn posts(&self) -> Vec<(String, Value)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn polls(&self) -> usize {
        *self.polls.lock().unwrap()
    }
}

async fn answer(
    State(backend): State<FakeBackend>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    if method == Method::GET {
        *backend.polls.lock().unwrap() += 1;
        return match backend.commands.lock().unwrap().pop_front() {
            Some(command) => Json(command).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        };
    }
    let body = serde_json::from_slice(&body).unwrap_or(Value::Null);
    backend
        .posts
        .lock()
        .unwrap()
        .push((uri.path().to_string(), body));
    Json(json!({"received": true})).into_response()
}

pub async fn spawn_backend(commands: Vec<Value>) -> (String, FakeBackend) {
    let backend = FakeBackend {
        posts: Arc::new(Mutex::new(Vec::new())),
        polls: Arc::new(Mutex::new(0)),
        commands: Arc::new(Mutex::new(commands.into())),
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().fallback(answer).with_state(backend.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    (format!("http://{}", addr), backend)
}
