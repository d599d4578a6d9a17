use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::pairing::UserId;

#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalKind {
    #[serde(rename = "offer")]
    Offer,
    #[serde(rename = "answer")]
    Answer,
    #[serde(rename = "ice")]
    Ice,
}

/// Events pushed to a single user. Serialized as
/// `{"event": "<kind>", "data": {...}}`.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(tag = "event", content = "data")]
pub enum Event {
    #[serde(rename = "waiting")]
    Waiting,
    #[serde(rename = "partnerFound")]
    PartnerFound {
        #[serde(rename = "partnerId")]
        partner_id: UserId,
        initiator: UserId,
    },
    #[serde(rename = "partnerLeft")]
    PartnerLeft,
    #[serde(rename = "partnerSkipped")]
    PartnerSkipped,
    #[serde(rename = "chatMessage")]
    ChatMessage { text: String },
    #[serde(rename = "typing")]
    Typing,
    #[serde(rename = "stopped")]
    Stopped,
    #[serde(rename = "signal")]
    Signal {
        kind: SignalKind,
        from: UserId,
        body: Value,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActionKind {
    FindPartner,
    SendMessage,
    Typing,
    Stop,
    Next,
    Signal(SignalKind),
}

impl FromStr for ActionKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "findPartner" => Self::FindPartner,
            "sendMessage" => Self::SendMessage,
            "typing" => Self::Typing,
            "stop" | "stopFinding" => Self::Stop,
            "next" => Self::Next,
            "signal-offer" | "webrtc-offer" => Self::Signal(SignalKind::Offer),
            "signal-answer" | "webrtc-answer" => Self::Signal(SignalKind::Answer),
            "signal-ice" | "webrtc-ice" => Self::Signal(SignalKind::Ice),
            _ => return Err(Error::InvalidArgument("Invalid action")),
        })
    }
}

/// One inbound client action, as posted over HTTP or sent as a socket frame.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionRequest {
    #[serde(default)]
    pub action: String,
    pub user_id: Option<String>,
    pub payload: Option<Value>,
    pub message: Option<String>,
    pub offer: Option<Value>,
    pub answer: Option<Value>,
    pub candidate: Option<Value>,
}

/// A validated action. Empty chat text and missing signal bodies resolve
/// to `None` and are dropped by the dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    FindPartner,
    SendMessage(Option<String>),
    Typing,
    Stop,
    Next,
    Signal(SignalKind, Option<Value>),
}

impl ActionRequest {
    pub fn user(&self) -> Result<UserId> {
        match &self.user_id {
            Some(id) => UserId::new(id.as_str()),
            None => Err(Error::InvalidArgument("userId required")),
        }
    }

    pub fn into_action(self) -> Result<Action> {
        let kind: ActionKind = self.action.parse()?;
        Ok(match kind {
            ActionKind::FindPartner => Action::FindPartner,
            ActionKind::Typing => Action::Typing,
            ActionKind::Stop => Action::Stop,
            ActionKind::Next => Action::Next,
            ActionKind::SendMessage => Action::SendMessage(self.text()),
            ActionKind::Signal(kind) => {
                let body = match kind {
                    SignalKind::Offer => self.offer,
                    SignalKind::Answer => self.answer,
                    SignalKind::Ice => self.candidate,
                };
                Action::Signal(kind, body.or(self.payload).filter(|v| !v.is_null()))
            }
        })
    }

    fn text(&self) -> Option<String> {
        let text = match (&self.message, &self.payload) {
            (Some(message), _) => Some(message.clone()),
            (None, Some(Value::String(s))) => Some(s.clone()),
            (None, Some(payload)) => payload
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_owned),
            (None, None) => None,
        };
        text.filter(|t| !t.is_empty())
    }
}
