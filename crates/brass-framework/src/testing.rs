//! Test doubles shared by the unit tests.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use brass_core::{ApiError, ApiResult, Bot, BoxedEvent, Event, EventType, Message};
use parking_lot::Mutex;
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct TestEvent {
    name: &'static str,
    event_type: EventType,
    session: Option<String>,
    user: Option<String>,
    message: Option<Message>,
    tome: bool,
}

impl TestEvent {
    pub(crate) fn message(text: &str) -> Self {
        Self::message_from(Message::from(text))
    }

    pub(crate) fn message_from(message: Message) -> Self {
        Self {
            name: "message.test",
            event_type: EventType::Message,
            session: Some("s1".to_string()),
            user: Some("u1".to_string()),
            message: Some(message),
            tome: false,
        }
    }

    pub(crate) fn notice() -> Self {
        Self {
            name: "notice.test",
            event_type: EventType::Notice,
            session: Some("s1".to_string()),
            user: Some("u1".to_string()),
            message: None,
            tome: false,
        }
    }

    pub(crate) fn session(mut self, session: &str) -> Self {
        self.session = Some(session.to_string());
        self
    }

    pub(crate) fn sessionless(mut self) -> Self {
        self.session = None;
        self
    }

    pub(crate) fn user(mut self, user: &str) -> Self {
        self.user = Some(user.to_string());
        self
    }

    pub(crate) fn tome(mut self) -> Self {
        self.tome = true;
        self
    }

    pub(crate) fn boxed(self) -> BoxedEvent {
        BoxedEvent::new(self)
    }
}

impl Event for TestEvent {
    fn event_name(&self) -> &str {
        self.name
    }

    fn event_type(&self) -> EventType {
        self.event_type
    }

    fn session_id(&self) -> Option<String> {
        self.session.clone()
    }

    fn user_id(&self) -> Option<String> {
        self.user.clone()
    }

    fn message(&self) -> Option<&Message> {
        self.message.as_ref()
    }

    fn is_tome(&self) -> bool {
        self.tome
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone)]
pub(crate) struct OtherEvent;

impl Event for OtherEvent {
    fn event_name(&self) -> &str {
        "other.test"
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Bot that records what it sends.
#[derive(Default)]
pub(crate) struct MockBot {
    sent: Mutex<Vec<String>>,
    fail_sends: bool,
}

impl MockBot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: true,
        })
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Bot for MockBot {
    fn id(&self) -> &str {
        "mock"
    }

    async fn call_api(&self, _action: &str, _params: Value) -> ApiResult<Value> {
        Ok(Value::Null)
    }

    async fn send(&self, _event: &dyn Event, message: Message) -> ApiResult<String> {
        if self.fail_sends {
            return Err(ApiError::NotConnected);
        }
        let mut sent = self.sent.lock();
        sent.push(message.to_string());
        Ok(sent.len().to_string())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
