use serde::{Deserialize, Serialize};

/// Body for the gateway's chat endpoint. One prompt per call; the gateway
/// resolves `model` to an upstream provider and relays the reply shape
/// unchanged.
#[derive(Serialize, Clone)]
pub struct ChatCallBody {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Identity behind a gateway credential, as returned by the whoami endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}
