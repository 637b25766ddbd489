//! Websocket gateway hosting one turn controller per connected page.

use crate::ports::{CaptureTracker, Outbound, WsSpeechInput, WsSpeechOutput};
use crate::protocol::{ClientMessage, ServerMessage};
use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
    routing::get,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use interview_core::{
    FeedbackGenerator, InterviewSessionStore, SpeechError, SpeechInputEvent, SpeechOutputEvent,
    TurnConfig, TurnController, TurnEvents, TurnPhase, TurnUpdate, TurnUpdates, UserAction,
    turn_channel,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const OUTBOUND_CAPACITY: usize = 64;
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared by every connection.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn InterviewSessionStore>,
    pub feedback: Arc<dyn FeedbackGenerator>,
    pub turn: TurnConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn InterviewSessionStore>,
        feedback: Arc<dyn FeedbackGenerator>,
        turn: TurnConfig,
    ) -> Self {
        Self {
            store,
            feedback,
            turn,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws/interviews/{session_id}", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Handles WebSocket upgrade requests for one interview session.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    info!("WebSocket upgrade request received for session {}", session_id);
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

#[derive(Debug, Clone, Copy)]
struct Capabilities {
    speech_capture: bool,
    speech_synthesis: bool,
}

/// Manages an individual WebSocket connection.
///
/// The page announces its capabilities with `hello`; the gateway then builds
/// the speech ports on top of the socket, starts a [`TurnController`] and
/// loads the session. The controller is relinquished when the page goes away,
/// and the socket is closed when the session could not be loaded.
async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    info!("WebSocket connection established for session {}", session_id);
    let (sink, mut stream) = socket.split();
    let (outbound, outbound_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_CAPACITY);
    let writer = tokio::spawn(write_messages(sink, outbound_rx));

    let Some(capabilities) = wait_for_hello(&mut stream, &outbound).await else {
        info!("Session {} closed before the handshake finished", session_id);
        drop(outbound);
        if let Err(e) = writer.await {
            warn!("WebSocket writer task failed: {}", e);
        }
        return;
    };
    debug!("Session {} capabilities: {:?}", session_id, capabilities);

    let (events, events_rx) = turn_channel();
    let captures = CaptureTracker::new();
    let input = WsSpeechInput::new(
        outbound.clone(),
        capabilities.speech_capture,
        captures.clone(),
    );
    let output = WsSpeechOutput::new(outbound.clone(), capabilities.speech_synthesis);
    let (controller, updates) = TurnController::new(
        session_id.clone(),
        state.turn.clone(),
        state.store.clone(),
        Box::new(input),
        Box::new(output),
        events.clone(),
    );
    let controller = tokio::spawn(controller.run(events_rx));
    let mut relay = tokio::spawn(relay_updates(
        updates,
        outbound.clone(),
        state.feedback.clone(),
        session_id.clone(),
    ));

    if let Err(e) = events.action(UserAction::Load) {
        warn!("Could not load session {}: {}", session_id, e);
    }

    // The relay finishes once the controller stopped and every update went out,
    // or early when the session failed to load.
    let mut relay_finished = false;
    loop {
        tokio::select! {
            incoming = stream.next() => {
                let text = match incoming {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        info!("WebSocket error: {}", e);
                        break;
                    }
                };
                match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(message) => dispatch(message, &events, &captures),
                    Err(e) => {
                        warn!("Unreadable message from the page: {}", e);
                        let reply = ServerMessage::Error {
                            message: format!("unreadable message: {}", e),
                        };
                        if outbound.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
            }
            _ = &mut relay => {
                relay_finished = true;
                break;
            }
        }
    }

    if events.action(UserAction::Relinquish).is_err() {
        debug!("Turn controller for session {} had already stopped", session_id);
    }
    match controller.await {
        Ok(phase) => debug!("Session {} ended in {:?}", session_id, phase),
        Err(e) => warn!("Turn controller task failed: {}", e),
    }
    if !relay_finished {
        if let Err(e) = relay.await {
            warn!("Turn update relay failed: {}", e);
        }
    }
    drop(outbound);
    if let Err(e) = writer.await {
        warn!("WebSocket writer task failed: {}", e);
    }
    info!("WebSocket connection closed for session {}", session_id);
}

async fn write_messages(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode {:?}: {}", message, e);
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            // Client disconnected.
            break;
        }
    }
    if let Err(e) = sink.close().await {
        debug!("WebSocket close failed: {}", e);
    }
}

async fn wait_for_hello(
    stream: &mut SplitStream<WebSocket>,
    outbound: &Outbound,
) -> Option<Capabilities> {
    let handshake = async {
        while let Some(incoming) = stream.next().await {
            let text = match incoming {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            };
            match serde_json::from_str::<ClientMessage>(text.as_str()) {
                Ok(ClientMessage::Hello {
                    speech_capture,
                    speech_synthesis,
                }) => {
                    return Some(Capabilities {
                        speech_capture,
                        speech_synthesis,
                    });
                }
                _ => {
                    let reply = ServerMessage::Error {
                        message: "expected hello".to_string(),
                    };
                    if outbound.send(reply).await.is_err() {
                        return None;
                    }
                }
            }
        }
        None
    };
    match tokio::time::timeout(HELLO_TIMEOUT, handshake).await {
        Ok(capabilities) => capabilities,
        Err(_) => {
            warn!("No hello within {:?}; closing", HELLO_TIMEOUT);
            None
        }
    }
}

fn dispatch(message: ClientMessage, events: &TurnEvents, captures: &CaptureTracker) {
    if let Some(capture) = message.capture() {
        if !captures.is_live(capture) {
            debug!("Dropping event from stale capture {}", capture);
            return;
        }
    }
    let delivered = match message {
        ClientMessage::Hello { .. } => {
            debug!("Ignoring repeated hello");
            true
        }
        ClientMessage::InputStarted { .. } => events.speech_input(SpeechInputEvent::Started),
        ClientMessage::InputInterim { text, .. } => {
            events.speech_input(SpeechInputEvent::Interim(text))
        }
        ClientMessage::InputFinal { text, .. } => {
            events.speech_input(SpeechInputEvent::Final(text))
        }
        ClientMessage::InputEnded { capture } => {
            captures.report_end(capture);
            events.speech_input(SpeechInputEvent::Ended)
        }
        ClientMessage::InputError {
            capture,
            message,
            unavailable,
        } => {
            captures.report_end(capture);
            let error = if unavailable {
                SpeechError::Unavailable(message)
            } else {
                SpeechError::Failed(message)
            };
            events.speech_input(SpeechInputEvent::Error(error))
        }
        ClientMessage::OutputStarted { utterance } => {
            events.speech_output(SpeechOutputEvent::Started(utterance))
        }
        ClientMessage::OutputEnded { utterance } => {
            events.speech_output(SpeechOutputEvent::Ended(utterance))
        }
        ClientMessage::Begin => events.action(UserAction::Begin).is_ok(),
        ClientMessage::Replay => events.action(UserAction::Replay).is_ok(),
        ClientMessage::Submit => events.action(UserAction::Submit).is_ok(),
        ClientMessage::RetrySubmit => events.action(UserAction::RetrySubmission).is_ok(),
        ClientMessage::RetryListening => events.action(UserAction::RetryListening).is_ok(),
        ClientMessage::End => events.action(UserAction::EndEarly).is_ok(),
    };
    if !delivered {
        debug!("Turn controller stopped; dropping page message");
    }
}

// Forwards controller updates to the page and fetches feedback once the
// interview completes. Returns early after a load failure: nothing on the
// connection can load the session again.
async fn relay_updates(
    mut updates: TurnUpdates,
    outbound: Outbound,
    feedback: Arc<dyn FeedbackGenerator>,
    session_id: String,
) {
    let mut feedback_sent = false;
    let mut loaded = false;
    while let Some(update) = updates.recv().await {
        let completed = matches!(update, TurnUpdate::Completed { .. });
        let load_failed = !loaded && matches!(update, TurnUpdate::Failed { .. });
        loaded |= !matches!(
            update,
            TurnUpdate::Phase(TurnPhase::Error) | TurnUpdate::Failed { .. }
        );
        if outbound.send(ServerMessage::from(update)).await.is_err() {
            break;
        }
        if load_failed {
            info!("Session {} could not be loaded; closing the connection", session_id);
            break;
        }
        if !completed || feedback_sent {
            continue;
        }
        feedback_sent = true;
        let message = match feedback.generate_feedback(&session_id).await {
            Ok(feedback) => {
                info!(
                    "Feedback for session {}: overall {:.1}",
                    session_id, feedback.overall_score
                );
                ServerMessage::Feedback { feedback }
            }
            Err(e) => {
                warn!("Feedback generation failed for session {}: {}", session_id, e);
                ServerMessage::Error {
                    message: format!("feedback unavailable: {}", e),
                }
            }
        };
        if outbound.send(message).await.is_err() {
            break;
        }
    }
}
