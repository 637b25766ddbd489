use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use interview_core::{
    AnswerSubmission, FeedbackGenerator, InterviewSessionStore, SessionStatus, StoreError,
};
use interview_session_client::{Config, HttpSessionStore};
use serde_json::{Value, json};

#[derive(Clone, Default)]
struct Seen {
    bodies: Arc<Mutex<Vec<Value>>>,
    auth: Arc<Mutex<Vec<Option<String>>>>,
}

impl Seen {
    fn record_auth(&self, headers: &HeaderMap) {
        let value = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.auth.lock().unwrap().push(value);
    }
}

fn snapshot(id: &str, status: &str, index: usize) -> Value {
    let mut body = json!({
        "id": id,
        "status": status,
        "currentIndex": index,
        "totalQuestions": 2,
    });
    if status == "in-progress" {
        body["currentQuestion"] = json!({ "prompt": format!("Question {}", index + 1) });
    }
    body
}

async fn get_session(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    seen.record_auth(&headers);
    match id.as_str() {
        "missing" => StatusCode::NOT_FOUND.into_response(),
        "locked" => (
            StatusCode::FORBIDDEN,
            Json(json!({ "message": "Interview belongs to another student" })),
        )
            .into_response(),
        "garbled" => (StatusCode::OK, "not json").into_response(),
        _ => Json(snapshot(&id, "draft", 0)).into_response(),
    }
}

async fn start(State(seen): State<Seen>, headers: HeaderMap, Path(id): Path<String>) -> Json<Value> {
    seen.record_auth(&headers);
    Json(snapshot(&id, "in-progress", 0))
}

async fn answers(
    State(seen): State<Seen>,
    Path(id): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.bodies.lock().unwrap().push(body);
    Json(snapshot(&id, "in-progress", 1))
}

async fn end(Path(id): Path<String>) -> Response {
    if id == "flaky" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "database unavailable").into_response();
    }
    Json(snapshot(&id, "completed", 2)).into_response()
}

async fn feedback() -> Json<Value> {
    Json(json!({
        "overallScore": 7.5,
        "categories": [
            { "category": "communication", "score": 8.0, "comment": "Clear and structured." }
        ],
        "strengths": ["Concrete examples"],
        "improvements": ["Quantify impact"],
    }))
}

async fn serve() -> (String, Seen) {
    let seen = Seen::default();
    let app = Router::new()
        .route("/api/interviews/{id}", get(get_session))
        .route("/api/interviews/{id}/start", post(start))
        .route("/api/interviews/{id}/answers", post(answers))
        .route("/api/interviews/{id}/end", post(end))
        .route("/api/interviews/{id}/feedback", post(feedback))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}/api", addr), seen)
}

fn store(base_url: &str, token: Option<&str>) -> HttpSessionStore {
    let builder = Config::builder().with_base_url(base_url);
    let builder = match token {
        Some(token) => builder.with_api_token(token),
        None => builder.without_api_token(),
    };
    HttpSessionStore::new(builder.build()).unwrap()
}

#[tokio::test]
async fn test_session_lifecycle_round_trip() {
    // Arrange
    let (base_url, seen) = serve().await;
    let store = store(&base_url, None);

    // Act
    let loaded = store.get_session("iv-42").await.unwrap();
    let started = store.start_session("iv-42").await.unwrap();
    let submission = AnswerSubmission::from_transcript("I built  a compiler. ", 12);
    let advanced = store.submit_answer("iv-42", &submission).await.unwrap();
    let ended = store.end_session("iv-42").await.unwrap();

    // Assert
    assert_eq!(loaded.status, SessionStatus::Draft);
    assert_eq!(started.status, SessionStatus::InProgress);
    assert_eq!(
        started.current_question.map(|q| q.prompt),
        Some("Question 1".to_string())
    );
    assert_eq!(advanced.current_index, 1);
    assert!(ended.is_completed());
    assert!(ended.current_question.is_none());

    let bodies = seen.bodies.lock().unwrap();
    assert_eq!(
        bodies.as_slice(),
        &[json!({
            "answer": "I built a compiler.",
            "transcript": "I built  a compiler. ",
            "timeSpent": 12,
        })]
    );
}

#[tokio::test]
async fn test_bearer_token_is_sent_when_configured() {
    let (base_url, seen) = serve().await;

    store(&base_url, Some("campus-token"))
        .get_session("iv-1")
        .await
        .unwrap();
    store(&base_url, None).start_session("iv-1").await.unwrap();

    let auth = seen.auth.lock().unwrap();
    assert_eq!(
        auth.as_slice(),
        &[Some("Bearer campus-token".to_string()), None]
    );
}

#[tokio::test]
async fn test_missing_session_maps_to_not_found() {
    let (base_url, _) = serve().await;

    let err = store(&base_url, None).get_session("missing").await.unwrap_err();

    assert_eq!(err, StoreError::NotFound("missing".to_string()));
}

#[tokio::test]
async fn test_rejection_carries_the_server_message() {
    let (base_url, _) = serve().await;
    let store = store(&base_url, None);

    let forbidden = store.get_session("locked").await.unwrap_err();
    let failed = store.end_session("flaky").await.unwrap_err();

    assert_eq!(
        forbidden,
        StoreError::Rejected {
            status: 403,
            message: "Interview belongs to another student".to_string(),
        }
    );
    assert_eq!(
        failed,
        StoreError::Rejected {
            status: 500,
            message: "database unavailable".to_string(),
        }
    );
}

#[tokio::test]
async fn test_session_id_is_sent_as_one_path_segment() {
    let (base_url, seen) = serve().await;
    let id = "x/../../admin/users?all=1#";

    let loaded = store(&base_url, Some("campus-token"))
        .get_session(id)
        .await
        .unwrap();

    // Only the session route answers with the id it was given.
    assert_eq!(loaded.id, id);
    assert_eq!(seen.auth.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_undecodable_body_is_a_decode_error() {
    let (base_url, _) = serve().await;

    let err = store(&base_url, None).get_session("garbled").await.unwrap_err();

    assert!(matches!(err, StoreError::Decode(_)));
}

#[tokio::test]
async fn test_unreachable_api_is_a_transport_error() {
    // Bind then drop so nothing listens on the port.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = store(&format!("http://{}/api", addr), None)
        .get_session("iv-1")
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Transport(_)));
}

#[tokio::test]
async fn test_feedback_is_decoded() {
    let (base_url, _) = serve().await;

    let feedback = store(&base_url, None)
        .generate_feedback("iv-42")
        .await
        .unwrap();

    assert_eq!(feedback.overall_score, 7.5);
    assert_eq!(feedback.categories.len(), 1);
    assert_eq!(feedback.categories[0].category, "communication");
    assert_eq!(feedback.strengths, vec!["Concrete examples".to_string()]);
    assert!(feedback.summary.is_none());
}
