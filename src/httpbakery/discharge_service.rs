//! Server-side handler logic for a discharger's `POST /discharge` endpoint.
//! Framework-agnostic: a caller wires this into whatever HTTP server it runs.

use serde::Deserialize;

use crate::checkers::{AuthContext, Checker};
use crate::crypto::bakery_key::PrivateKey;
use crate::discharge;
use crate::error::{BakeryError, BakeryResult};
use crate::store::ThirdPartyLocator;
use crate::wrapper::Macaroon;

/// The form fields a discharge client posts.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DischargeRequest {
    pub id: Option<String>,
    pub id64: Option<String>,
    pub caveat64: Option<String>,
}

/// Handles a discharge request: decodes the caveat id, resolves its
/// encrypted payload, and mints the discharge macaroon.
///
/// Most of this crate's own caveat encodings embed the ciphertext directly
/// in the id, so `caveat64` is only consulted when present.
pub fn handle_discharge(
    request: &DischargeRequest,
    key: &PrivateKey,
    checker: &Checker,
    ctx: &AuthContext,
    locator: &dyn ThirdPartyLocator,
) -> BakeryResult<Macaroon> {
    let id_bytes: Vec<u8> = if let Some(id64) = &request.id64 {
        base64::decode_config(id64, base64::URL_SAFE_NO_PAD)
            .map_err(|e| BakeryError::CaveatNotRecognized(format!("bad id64: {}", e)))?
    } else if let Some(id) = &request.id {
        id.as_bytes().to_vec()
    } else {
        return Err(BakeryError::CaveatNotRecognized(String::from(
            "discharge request missing id",
        )));
    };

    let encrypted = match &request.caveat64 {
        Some(caveat64) => base64::decode_config(caveat64, base64::URL_SAFE_NO_PAD)
            .map_err(|e| BakeryError::CaveatNotRecognized(format!("bad caveat64: {}", e)))?,
        None => id_bytes.clone(),
    };

    discharge::discharge(id_bytes.into(), &encrypted, key, checker, ctx, locator)
}
