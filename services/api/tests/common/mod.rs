#![allow(dead_code)]

use adaptive_quiz_core::{InMemoryStore, QuizConfig};
use api_lib::web::{api_router, state::AppState};
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub user_id: Uuid,
}

impl TestApp {
    /// A router over an empty in-memory store with a fixed random seed.
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let config = QuizConfig { rng_seed: Some(11), ..QuizConfig::default() };
        let state = Arc::new(AppState::new(store, config));
        Self { router: api_router(state.clone()), state, user_id: Uuid::new_v4() }
    }

    /// Same as `new`, with the learner set to Italian B1.
    pub async fn with_profile() -> Self {
        let app = Self::new();
        let (status, _) = app
            .send(
                Method::PUT,
                "/settings",
                Some(json!({ "preferred_language": "italian", "current_level": "B1" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        app
    }

    pub async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send_as(Some(&self.user_id.to_string()), method, uri, body).await
    }

    pub async fn send_as(
        &self,
        user_header: Option<&str>,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user_header {
            builder = builder.header("x-user-id", user);
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, value)
    }

    /// Stores `n` Italian B1 vocabulary questions whose correct answer is option 0.
    pub async fn seed_questions(&self, n: usize) -> Vec<Uuid> {
        let mut ids = Vec::with_capacity(n);
        for i in 0..n {
            let (status, body) = self
                .send(
                    Method::POST,
                    "/questions",
                    Some(json!({
                        "question_type": "vocabulary",
                        "language": "Italian",
                        "level": "B1",
                        "prompt": format!("Parola numero {}", i),
                        "options": ["uno", "due", "tre"],
                        "correct_answer": 0,
                        "explanation": "uno comes first",
                        "topic": "numbers"
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED, "{}", body);
            ids.push(body["id"].as_str().unwrap().parse().unwrap());
        }
        ids
    }
}
