//! OneBot wire types.
//! Outbound: `{action, params, echo}`. Inbound: correlated responses
//! (`{echo, status, retcode, data}`) or events (`{post_type, ...}`).

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use steward_core::error::{Result, StewardError};

pub const SEND_GROUP_MSG: &str = "send_group_msg";
pub const SEND_PRIVATE_MSG: &str = "send_private_msg";
pub const SET_GROUP_WHOLE_BAN: &str = "set_group_whole_ban";
pub const SET_GROUP_BAN: &str = "set_group_ban";
pub const SET_GROUP_ADD_REQUEST: &str = "set_group_add_request";
pub const GET_STRANGER_INFO: &str = "get_stranger_info";

/// An outbound gateway command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<String>,
}

impl ActionRequest {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
            echo: None,
        }
    }

    pub fn send_group_msg(group_id: i64, message: &str) -> Self {
        Self::new(SEND_GROUP_MSG, json!({ "group_id": group_id, "message": message }))
    }

    pub fn send_private_msg(user_id: i64, message: &str) -> Self {
        Self::new(SEND_PRIVATE_MSG, json!({ "user_id": user_id, "message": message }))
    }

    /// Send to a group or a user depending on `is_group`.
    pub fn send_msg(target_id: i64, is_group: bool, message: &str) -> Self {
        if is_group {
            Self::send_group_msg(target_id, message)
        } else {
            Self::send_private_msg(target_id, message)
        }
    }

    pub fn set_group_whole_ban(group_id: i64, enable: bool) -> Self {
        Self::new(SET_GROUP_WHOLE_BAN, json!({ "group_id": group_id, "enable": enable }))
    }

    pub fn set_group_ban(group_id: i64, user_id: i64, duration_secs: i64) -> Self {
        Self::new(
            SET_GROUP_BAN,
            json!({ "group_id": group_id, "user_id": user_id, "duration": duration_secs }),
        )
    }

    pub fn set_group_add_request(flag: &str, approve: bool, reason: &str) -> Self {
        Self::new(
            SET_GROUP_ADD_REQUEST,
            json!({ "flag": flag, "sub_type": "add", "approve": approve, "reason": reason }),
        )
    }

    pub fn get_stranger_info(user_id: i64) -> Self {
        Self::new(GET_STRANGER_INFO, json!({ "user_id": user_id, "no_cache": true }))
    }

    pub fn with_echo(mut self, echo: impl Into<String>) -> Self {
        self.echo = Some(echo.into());
        self
    }

    /// `(target_id, is_group)` when this command sends a chat message.
    pub fn message_target(&self) -> Option<(i64, bool)> {
        match self.action.as_str() {
            SEND_GROUP_MSG => as_id(&self.params["group_id"]).map(|id| (id, true)),
            SEND_PRIVATE_MSG => as_id(&self.params["user_id"]).map(|id| (id, false)),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.params["message"].as_str()
    }
}

/// A correlated reply to an [`ActionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub retcode: i64,
    #[serde(default)]
    pub data: Value,
    #[serde(default)]
    pub echo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wording: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            status: "ok".into(),
            retcode: 0,
            data,
            echo: None,
            message: None,
            wording: None,
        }
    }

    pub fn failed(retcode: i64, wording: &str) -> Self {
        Self {
            status: "failed".into(),
            retcode,
            data: Value::Null,
            echo: None,
            message: None,
            wording: Some(wording.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.retcode == 0 && (self.status.is_empty() || self.status == "ok" || self.status == "async")
    }

    /// Human-readable failure text.
    pub fn error_text(&self) -> String {
        self.wording
            .as_deref()
            .or(self.message.as_deref())
            .map(String::from)
            .unwrap_or_else(|| format!("status={} retcode={}", self.status, self.retcode))
    }

    /// Account-level level from `get_stranger_info`.
    pub fn level(&self) -> Option<i64> {
        as_id(&self.data["level"]).or_else(|| as_id(&self.data["qqLevel"]))
    }
}

/// A join request for a group (`request.group.add`).
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequestEvent {
    pub group_id: i64,
    pub user_id: i64,
    pub flag: String,
    pub comment: String,
}

/// Typed inbound events, each tagged with a flat name such as `message.group`.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Message {
        name: String,
        group_id: Option<i64>,
        user_id: i64,
        text: String,
    },
    JoinRequest(JoinRequestEvent),
    Request { name: String, raw: Value },
    Notice { name: String, raw: Value },
    Meta { name: String, raw: Value },
    Heartbeat,
}

impl GatewayEvent {
    pub fn name(&self) -> &str {
        match self {
            GatewayEvent::Message { name, .. }
            | GatewayEvent::Request { name, .. }
            | GatewayEvent::Notice { name, .. }
            | GatewayEvent::Meta { name, .. } => name,
            GatewayEvent::JoinRequest(_) => "request.group.add",
            GatewayEvent::Heartbeat => "meta_event.heartbeat",
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone)]
pub enum Inbound {
    Response(ActionResponse),
    Event(GatewayEvent),
}

/// Classify a raw text frame.
pub fn classify(text: &str) -> Result<Inbound> {
    let json: Value = serde_json::from_str(text)
        .map_err(|e| StewardError::Protocol(format!("Invalid JSON: {e}")))?;

    if json.get("echo").is_some_and(|e| !e.is_null())
        && (json.get("retcode").is_some() || json.get("status").is_some())
    {
        let response: ActionResponse = serde_json::from_value(json)
            .map_err(|e| StewardError::Protocol(format!("Invalid response: {e}")))?;
        return Ok(Inbound::Response(response));
    }

    let post_type = json["post_type"]
        .as_str()
        .ok_or_else(|| StewardError::Protocol("frame has neither echo nor post_type".into()))?
        .to_string();

    let event = match post_type.as_str() {
        "message" | "message_sent" => {
            let detail = json["message_type"].as_str().unwrap_or("unknown");
            GatewayEvent::Message {
                name: format!("{post_type}.{detail}"),
                group_id: as_id(&json["group_id"]),
                user_id: as_id(&json["user_id"]).unwrap_or(0),
                text: json["raw_message"]
                    .as_str()
                    .or(json["message"].as_str())
                    .unwrap_or("")
                    .to_string(),
            }
        }
        "request" => {
            let request_type = json["request_type"].as_str().unwrap_or("unknown");
            let sub_type = json["sub_type"].as_str().unwrap_or("");
            if request_type == "group" && sub_type == "add" {
                GatewayEvent::JoinRequest(JoinRequestEvent {
                    group_id: as_id(&json["group_id"]).unwrap_or(0),
                    user_id: as_id(&json["user_id"]).unwrap_or(0),
                    flag: match &json["flag"] {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    },
                    comment: json["comment"].as_str().unwrap_or("").to_string(),
                })
            } else {
                let name = if sub_type.is_empty() {
                    format!("request.{request_type}")
                } else {
                    format!("request.{request_type}.{sub_type}")
                };
                GatewayEvent::Request { name, raw: json }
            }
        }
        "notice" => {
            let detail = json["notice_type"].as_str().unwrap_or("unknown");
            GatewayEvent::Notice {
                name: format!("notice.{detail}"),
                raw: json,
            }
        }
        "meta_event" => {
            let detail = json["meta_event_type"].as_str().unwrap_or("unknown");
            if detail == "heartbeat" {
                GatewayEvent::Heartbeat
            } else {
                GatewayEvent::Meta {
                    name: format!("meta_event.{detail}"),
                    raw: json,
                }
            }
        }
        other => GatewayEvent::Meta {
            name: other.to_string(),
            raw: json,
        },
    };
    Ok(Inbound::Event(event))
}

/// Ids arrive as numbers from most implementations and as strings from some.
fn as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = ActionRequest::send_group_msg(100, "hi").with_echo("e1");
        let json: Value = serde_json::to_value(&req).unwrap();
        assert_eq!(json["action"], "send_group_msg");
        assert_eq!(json["params"]["group_id"], 100);
        assert_eq!(json["params"]["message"], "hi");
        assert_eq!(json["echo"], "e1");
        assert_eq!(req.message_target(), Some((100, true)));
        assert_eq!(ActionRequest::send_private_msg(7, "x").message_target(), Some((7, false)));
        assert_eq!(ActionRequest::set_group_whole_ban(1, true).message_target(), None);
    }

    #[test]
    fn test_classify_response() {
        let text = r#"{"status":"ok","retcode":0,"data":{"level":23},"echo":"abc"}"#;
        match classify(text).unwrap() {
            Inbound::Response(resp) => {
                assert_eq!(resp.echo.as_deref(), Some("abc"));
                assert!(resp.is_ok());
                assert_eq!(resp.level(), Some(23));
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn test_level_fallback_field() {
        let resp = ActionResponse::ok(json!({ "qqLevel": "12" }));
        assert_eq!(resp.level(), Some(12));
        assert_eq!(ActionResponse::ok(Value::Null).level(), None);
    }

    #[test]
    fn test_classify_join_request() {
        let text = r#"{"post_type":"request","request_type":"group","sub_type":"add",
            "group_id":100,"user_id":42,"flag":"f-1","comment":"answer: 2"}"#;
        match classify(text).unwrap() {
            Inbound::Event(GatewayEvent::JoinRequest(req)) => {
                assert_eq!(req.group_id, 100);
                assert_eq!(req.user_id, 42);
                assert_eq!(req.flag, "f-1");
                assert_eq!(req.comment, "answer: 2");
            }
            other => panic!("expected join request, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_event_names() {
        let cases = [
            (r#"{"post_type":"message","message_type":"group","group_id":1,"user_id":2,"raw_message":"x"}"#, "message.group"),
            (r#"{"post_type":"request","request_type":"group","sub_type":"invite"}"#, "request.group.invite"),
            (r#"{"post_type":"notice","notice_type":"group_increase"}"#, "notice.group_increase"),
            (r#"{"post_type":"meta_event","meta_event_type":"lifecycle"}"#, "meta_event.lifecycle"),
            (r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#, "meta_event.heartbeat"),
        ];
        for (text, expected) in cases {
            match classify(text).unwrap() {
                Inbound::Event(event) => assert_eq!(event.name(), expected),
                other => panic!("expected event, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_classify_rejects_garbage() {
        assert!(classify("not json").is_err());
        assert!(classify(r#"{"foo":1}"#).is_err());
    }
}
