//! JSON error envelopes exchanged over HTTP: the discharge-required body a
//! protected server sends back, and the interaction-required body a
//! discharger sends when it cannot decide without user action.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_DISCHARGE_REQUIRED: &str = "macaroon discharge required";
pub const CODE_INTERACTION_REQUIRED: &str = "interaction required";

/// `Info` payload of a discharge-required error response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DischargeRequiredInfo {
    #[serde(rename = "Macaroon")]
    pub macaroon: serde_json::Value,
    #[serde(rename = "MacaroonPath", skip_serializing_if = "Option::is_none")]
    pub macaroon_path: Option<String>,
    #[serde(rename = "CookieNameSuffix", skip_serializing_if = "Option::is_none")]
    pub cookie_name_suffix: Option<String>,
}

/// `Info` payload of an interaction-required error response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct InteractionRequiredInfo {
    #[serde(
        rename = "InteractionMethods",
        default,
        skip_serializing_if = "HashMap::is_empty"
    )]
    pub interaction_methods: HashMap<String, serde_json::Value>,
    #[serde(rename = "VisitURL", skip_serializing_if = "Option::is_none")]
    pub visit_url: Option<String>,
    #[serde(rename = "WaitURL", skip_serializing_if = "Option::is_none")]
    pub wait_url: Option<String>,
}

/// The common `{Code, Message, Info}` shape both error kinds share.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorResponse<I> {
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Info", skip_serializing_if = "Option::is_none")]
    pub info: Option<I>,
}

pub type DischargeRequiredResponse = ErrorResponse<DischargeRequiredInfo>;
pub type InteractionRequiredResponse = ErrorResponse<InteractionRequiredInfo>;

/// Raised client-side when a discharger cannot decide a caveat without user
/// interaction; carries the methods and URLs it advertised.
#[derive(Error, Clone, Debug)]
#[error("interaction required: {message}")]
pub struct InteractionRequiredError {
    pub message: String,
    pub info: InteractionRequiredInfo,
}

/// Builds the JSON body a bakery-protected server writes back for a
/// [`crate::authchecker::DischargeRequiredError`].
pub fn discharge_required_response(
    err: &crate::authchecker::DischargeRequiredError,
    macaroon_path: Option<&str>,
    cookie_name_suffix: Option<&str>,
) -> crate::error::BakeryResult<DischargeRequiredResponse> {
    let macaroon_json = crate::wrapper::serialize(&err.macaroon)?;
    let macaroon_value: serde_json::Value =
        serde_json::from_str(&macaroon_json).map_err(crate::MacaroonError::from)?;
    Ok(ErrorResponse {
        code: CODE_DISCHARGE_REQUIRED.to_string(),
        message: String::from("macaroon discharge required"),
        info: Some(DischargeRequiredInfo {
            macaroon: macaroon_value,
            macaroon_path: macaroon_path.map(String::from),
            cookie_name_suffix: cookie_name_suffix.map(String::from),
        }),
    })
}

/// HTTP status for a discharge-required response: 401 (with
/// `WWW-Authenticate: Macaroon`) for clients advertising protocol version
/// ≥ 1, 407 for legacy (version 0) clients.
pub fn discharge_required_status(client_protocol_version: u8) -> u16 {
    if client_protocol_version >= 1 {
        401
    } else {
        407
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_depends_on_protocol_version() {
        assert_eq!(407, discharge_required_status(0));
        assert_eq!(401, discharge_required_status(1));
        assert_eq!(401, discharge_required_status(3));
    }

    #[test]
    fn discharge_required_response_round_trips_through_json() {
        let oven = crate::oven::Oven::new(
            "https://bakerytest.example",
            crate::crypto::bakery_key::PrivateKey::generate(),
            std::sync::Arc::new(crate::store::MemoryKeyStore::new()),
            None,
            std::sync::Arc::new(crate::store::MemoryThirdPartyLocator::new()),
        );
        let macaroon = oven
            .mint(
                time::macros::datetime!(2030-01-01 0:00 UTC),
                vec![crate::ops::Operation::login()],
                Vec::new(),
            )
            .unwrap();
        let err = crate::authchecker::DischargeRequiredError {
            macaroon,
            ops: vec![crate::ops::Operation::login()],
        };
        let response = discharge_required_response(&err, Some("/"), Some("auth")).unwrap();
        let json = serde_json::to_string(&response).unwrap();
        let parsed: DischargeRequiredResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(CODE_DISCHARGE_REQUIRED, parsed.code);
        assert_eq!(Some("auth".to_string()), parsed.info.unwrap().cookie_name_suffix);
    }
}
