//! Chat with the AI backend.
//!
//! One `ChatSession` drives one conversation view. Its log lives exactly as
//! long as the value; nothing is persisted.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::session::{ClearOnDrop, SessionManager};
use crate::errors::DrPilotError;

const CHAT_FALLBACK: &str = "Erro ao processar sua solicitação";
const EMPTY_ANSWER: &str = "Desculpe, não consegui processar sua pergunta.";

/// Backend AI capability a message is sent to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Query,
    AnalyzeSymptoms,
    StudyTopic,
    ExamReview,
    Pharmacology,
    Osce,
    History,
    VitalSigns,
}

impl Capability {
    pub const ALL: [Capability; 8] = [
        Capability::Query,
        Capability::AnalyzeSymptoms,
        Capability::StudyTopic,
        Capability::ExamReview,
        Capability::Pharmacology,
        Capability::Osce,
        Capability::History,
        Capability::VitalSigns,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::Query => "query",
            Capability::AnalyzeSymptoms => "analyze-symptoms",
            Capability::StudyTopic => "study-topic",
            Capability::ExamReview => "exam-review",
            Capability::Pharmacology => "pharmacology",
            Capability::Osce => "osce",
            Capability::History => "history",
            Capability::VitalSigns => "vital-signs",
        }
    }

    /// Accepts both `analyze-symptoms` and `/analyze-symptoms`.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim_start_matches('/');
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// API path the capability is posted to.
    pub fn path(&self) -> String {
        format!("/api/ai/{}", self.name())
    }

    /// Request body for `input`. `extra` is merged after the capability's own
    /// key, so it may override it. Plain queries ignore `extra`.
    pub fn payload(&self, input: &str, extra: Option<&Map<String, Value>>) -> Value {
        let (key, value) = match self {
            Capability::AnalyzeSymptoms => ("symptoms", split_list(input)),
            Capability::StudyTopic => ("topic", Value::from(input)),
            Capability::ExamReview => ("subjects", split_list(input)),
            Capability::Pharmacology => ("query", Value::from(input)),
            Capability::Osce => ("station", Value::from(input)),
            Capability::Query | Capability::History | Capability::VitalSigns => {
                let mut body = Map::new();
                body.insert("query".to_string(), Value::from(input));
                return Value::Object(body);
            }
        };

        let mut body = Map::new();
        body.insert(key.to_string(), value);
        if let Some(extra) = extra {
            for (k, v) in extra {
                body.insert(k.clone(), v.clone());
            }
        }

        Value::Object(body)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn split_list(input: &str) -> Value {
    Value::Array(
        input
            .split(',')
            .map(|item| Value::from(item.trim()))
            .collect(),
    )
}

/// Shortcut shown above the chat input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub label: &'static str,
    pub capability: Capability,
}

impl QuickAction {
    /// Text the input is pre-filled with when the action is picked.
    pub fn prompt(&self) -> String {
        format!(
            "Quero usar a funcionalidade de {}: ",
            self.label.to_lowercase()
        )
    }
}

pub const QUICK_ACTIONS: [QuickAction; 8] = [
    QuickAction { label: "Análise de Sintomas", capability: Capability::AnalyzeSymptoms },
    QuickAction { label: "Estudo de Tópico", capability: Capability::StudyTopic },
    QuickAction { label: "Revisão de Prova", capability: Capability::ExamReview },
    QuickAction { label: "Farmacologia", capability: Capability::Pharmacology },
    QuickAction { label: "OSCE", capability: Capability::Osce },
    QuickAction { label: "Consulta IA", capability: Capability::Query },
    QuickAction { label: "Histórico", capability: Capability::History },
    QuickAction { label: "Sinais Vitais", capability: Capability::VitalSigns },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    /// Capability that produced or consumed the message.
    #[serde(rename = "type")]
    pub capability: Option<Capability>,
}

impl Message {
    pub fn new(text: impl Into<String>, sender: Sender, capability: Option<Capability>) -> Self {
        let timestamp = Utc::now();

        Self {
            id: next_message_id(timestamp).to_string(),
            text: text.into(),
            sender,
            timestamp,
            capability,
        }
    }
}

static LAST_MESSAGE_ID: AtomicU64 = AtomicU64::new(0);

// Millisecond timestamp, bumped past the previous id when two land in the same millisecond.
fn next_message_id(now: DateTime<Utc>) -> u64 {
    let millis = now.timestamp_millis().max(0) as u64;
    let mut id = millis;

    let _ = LAST_MESSAGE_ID.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
        id = millis.max(last + 1);
        Some(id)
    });

    id
}

/// Text shown for a successful answer body `{ "data": { "response": ... } }`.
pub fn response_text(body: &Value) -> String {
    let response = body.get("data").and_then(|data| data.get("response"));

    match response {
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| match part {
                Value::String(s) => s.clone(),
                Value::Null => String::new(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n\n"),
        Some(object @ Value::Object(_)) => {
            serde_json::to_string_pretty(object).unwrap_or_else(|_| object.to_string())
        }
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => n.to_string(),
        Some(Value::Bool(true)) => "true".to_string(),
        _ => EMPTY_ANSWER.to_string(),
    }
}

#[derive(Debug, Default)]
struct ChatState {
    messages: Vec<Message>,
    input: String,
    active: Option<Capability>,
}

/// Controller for one conversation.
pub struct ChatSession {
    session: Arc<SessionManager>,
    state: Mutex<ChatState>,
    in_flight: AtomicBool,
}

impl ChatSession {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            state: Mutex::new(ChatState::default()),
            in_flight: AtomicBool::new(false),
        }
    }

    pub async fn messages(&self) -> Vec<Message> {
        self.state.lock().await.messages.clone()
    }

    pub async fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub async fn input(&self) -> String {
        self.state.lock().await.input.clone()
    }

    pub async fn set_input(&self, text: impl Into<String>) {
        self.state.lock().await.input = text.into();
    }

    /// Capability picked through a quick action, used by the next `send_input`.
    pub async fn active_capability(&self) -> Option<Capability> {
        self.state.lock().await.active
    }

    pub async fn select_quick_action(&self, action: &QuickAction) {
        let mut state = self.state.lock().await;
        state.active = Some(action.capability);
        state.input = action.prompt();
    }

    /// Sends the input buffer with the selected quick action (plain query otherwise).
    pub async fn send_input(
        &self,
        extra: Option<Map<String, Value>>,
    ) -> Result<Option<Message>, DrPilotError> {
        let (input, capability) = {
            let state = self.state.lock().await;
            (state.input.clone(), state.active.unwrap_or(Capability::Query))
        };

        self.send_message(&input, capability, extra).await
    }

    /// Sends one message and waits for the answer.
    ///
    /// Returns `Ok(None)` for blank input, and `Err(RequestInFlight)` while a
    /// previous message is still waiting. Otherwise returns the AI message that
    /// was appended, which carries the error text when the request failed.
    ///
    /// If the returned future is dropped before it finishes, the user message
    /// stays in the log without an answer and the session accepts new sends.
    pub async fn send_message(
        &self,
        input: &str,
        capability: Capability,
        extra: Option<Map<String, Value>>,
    ) -> Result<Option<Message>, DrPilotError> {
        if input.trim().is_empty() {
            return Ok(None);
        }

        let _in_flight = {
            let mut state = self.state.lock().await;
            if self.in_flight.swap(true, Ordering::SeqCst) {
                return Err(DrPilotError::RequestInFlight);
            }

            state
                .messages
                .push(Message::new(input, Sender::User, Some(capability)));
            state.input.clear();
            ClearOnDrop(&self.in_flight)
        };

        info!(%capability, "chat message sent");
        self.session.client().debug_progress("[CHAT] Waiting for answer...");

        let payload = capability.payload(input, extra.as_ref());
        let text = match self.request(capability, &payload).await {
            Ok(body) => {
                debug!(%capability, "chat answer received");
                self.session.client().debug_line("[CHAT] Answer received.");
                response_text(&body)
            }
            Err(e) => {
                warn!(%capability, error = %e, "chat request failed");
                self.session.client().debug_failure("[CHAT]", &e);
                e.to_string()
            }
        };

        let reply = Message::new(text, Sender::Ai, Some(capability));

        let mut state = self.state.lock().await;
        state.messages.push(reply.clone());
        state.active = None;

        Ok(Some(reply))
    }

    async fn request(&self, capability: Capability, payload: &Value) -> Result<Value, DrPilotError> {
        let token = self.session.token().ok_or(DrPilotError::NotAuthenticated)?;

        self.session
            .client()
            .api_call(
                Method::POST,
                &capability.path(),
                Some(&token),
                Some(payload),
                Some(CHAT_FALLBACK),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payload_per_capability() {
        let mut extra = Map::new();
        extra.insert("level".to_string(), json!("avançado"));

        assert_eq!(
            Capability::Query.payload("o que é sepse?", Some(&extra)),
            json!({ "query": "o que é sepse?" })
        );
        assert_eq!(
            Capability::AnalyzeSymptoms.payload("febre, tosse, dor de cabeça", None),
            json!({ "symptoms": ["febre", "tosse", "dor de cabeça"] })
        );
        assert_eq!(
            Capability::StudyTopic.payload("Insuficiência cardíaca", Some(&extra)),
            json!({ "topic": "Insuficiência cardíaca", "level": "avançado" })
        );
        assert_eq!(
            Capability::ExamReview.payload("cardio ,nefro", None),
            json!({ "subjects": ["cardio", "nefro"] })
        );
        assert_eq!(
            Capability::Pharmacology.payload("amoxicilina", None),
            json!({ "query": "amoxicilina" })
        );
        assert_eq!(
            Capability::Osce.payload("anamnese pediátrica", None),
            json!({ "station": "anamnese pediátrica" })
        );
        assert_eq!(
            Capability::VitalSigns.payload("PA 120x80", Some(&extra)),
            json!({ "query": "PA 120x80" })
        );
    }

    #[test]
    fn extra_params_override_base_key() {
        let mut extra = Map::new();
        extra.insert("topic".to_string(), json!("override"));
        assert_eq!(
            Capability::StudyTopic.payload("cardiologia", Some(&extra)),
            json!({ "topic": "override" })
        );
    }

    #[test]
    fn capability_names_and_paths() {
        assert_eq!(Capability::AnalyzeSymptoms.path(), "/api/ai/analyze-symptoms");
        assert_eq!(Capability::from_name("/osce"), Some(Capability::Osce));
        assert_eq!(Capability::from_name("vital-signs"), Some(Capability::VitalSigns));
        assert_eq!(Capability::from_name("unknown"), None);
        assert_eq!(
            serde_json::to_value(Capability::ExamReview).unwrap(),
            json!("exam-review")
        );
    }

    #[test]
    fn response_shapes() {
        assert_eq!(
            response_text(&json!({ "data": { "response": ["a", "b"] } })),
            "a\n\nb"
        );
        assert_eq!(
            response_text(&json!({ "data": { "response": { "dose": "500mg" } } })),
            "{\n  \"dose\": \"500mg\"\n}"
        );
        assert_eq!(response_text(&json!({ "data": { "response": "ok" } })), "ok");
        assert_eq!(response_text(&json!({ "data": { "response": 42 } })), "42");
        assert_eq!(response_text(&json!({ "data": { "response": "" } })), EMPTY_ANSWER);
        assert_eq!(response_text(&json!({ "data": {} })), EMPTY_ANSWER);
        assert_eq!(response_text(&json!({})), EMPTY_ANSWER);
    }

    #[test]
    fn message_ids_increase() {
        let now = Utc::now();
        let first = next_message_id(now);
        let second = next_message_id(now);
        assert!(second > first);

        let a = Message::new("oi", Sender::User, None);
        let b = Message::new("olá", Sender::Ai, None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn message_serializes_capability_as_type() {
        let message = Message::new("oi", Sender::User, Some(Capability::Query));
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["type"], json!("query"));
        assert_eq!(value["sender"], json!("user"));
    }

    #[test]
    fn quick_action_prompt() {
        assert_eq!(
            QUICK_ACTIONS[0].prompt(),
            "Quero usar a funcionalidade de análise de sintomas: "
        );
        assert_eq!(QUICK_ACTIONS.len(), Capability::ALL.len());
    }
}
