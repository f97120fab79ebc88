use serde::{Deserialize, Serialize};

/// Session code typed in (or scanned) by a participant to join a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCode {
    pub code: String,
}

/// Credential issued by the backend when a session code is redeemed. Opaque
/// to the poll core, which only threads it through requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub token: String,
}

/// Poll session descriptor returned by the backend. Identifiers are sent as
/// strings on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id_moderator: String,
    pub id_poll: String,
    pub id_session: String,
    pub code: String,
    pub status: String,
}
