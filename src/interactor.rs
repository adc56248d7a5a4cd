//! Pluggable user-interaction methods for discharging a caveat a discharger
//! couldn't decide on its own (third-party login flows, consent screens).

use serde::Deserialize;

use crate::error::{BakeryError, BakeryResult};
use crate::httpbakery::error::InteractionRequiredError;

pub const KIND_BROWSER_WINDOW: &str = "browser-window";

/// What an [`Interactor`] produces: an opaque token the discharger can
/// exchange for a discharge macaroon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DischargeToken {
    pub kind: String,
    pub value: Vec<u8>,
}

/// A method of satisfying an interaction-required challenge.
pub trait Interactor: Send + Sync {
    /// The `InteractionMethods` key this interactor handles.
    fn kind(&self) -> &str;

    fn interact(
        &self,
        location: &str,
        err: &InteractionRequiredError,
    ) -> BakeryResult<DischargeToken>;
}

/// Pre-protocol-version-3 dischargers only understand the `visit`/`wait`
/// URL pair carried at the top level of the error, not keyed interaction
/// methods; implementing this trait lets an [`Interactor`] also serve them.
pub trait LegacyInteractor: Interactor {
    fn legacy_interact(&self, location: &str, visit_url: &str) -> BakeryResult<()>;
}

#[derive(Deserialize)]
struct BrowserWindowInfo {
    #[serde(rename = "VisitURL")]
    visit_url: String,
    #[serde(rename = "WaitURL")]
    wait_url: String,
}

#[derive(Deserialize)]
struct WaitResponse {
    #[serde(rename = "Kind")]
    kind: String,
    #[serde(rename = "Token", default)]
    token: Option<String>,
    #[serde(rename = "Token64", default)]
    token64: Option<String>,
}

/// Opens a browser window for the user to complete an interactive login,
/// then polls the discharger's wait URL for the resulting token.
pub struct BrowserWindowInteractor<F> {
    http: reqwest::blocking::Client,
    open: F,
}

impl<F> BrowserWindowInteractor<F>
where
    F: Fn(&str) -> BakeryResult<()> + Send + Sync,
{
    pub fn new(open: F) -> BrowserWindowInteractor<F> {
        BrowserWindowInteractor {
            http: reqwest::blocking::Client::new(),
            open,
        }
    }
}

impl<F> Interactor for BrowserWindowInteractor<F>
where
    F: Fn(&str) -> BakeryResult<()> + Send + Sync,
{
    fn kind(&self) -> &str {
        KIND_BROWSER_WINDOW
    }

    fn interact(
        &self,
        _location: &str,
        err: &InteractionRequiredError,
    ) -> BakeryResult<DischargeToken> {
        let method = err
            .info
            .interaction_methods
            .get(KIND_BROWSER_WINDOW)
            .ok_or_else(|| {
                BakeryError::InteractionRequired(Box::new(err.clone()))
            })?;
        let info: BrowserWindowInfo = serde_json::from_value(method.clone())
            .map_err(|e| BakeryError::Verification(e.to_string()))?;

        (self.open)(&info.visit_url)?;

        let response = self
            .http
            .get(&info.wait_url)
            .send()
            .map_err(|e| BakeryError::Verification(e.to_string()))?;
        let body: WaitResponse = response
            .json()
            .map_err(|e| BakeryError::Verification(e.to_string()))?;
        let value = match (body.token, body.token64) {
            (Some(token), _) => token.into_bytes(),
            (None, Some(token64)) => base64::decode_config(token64, base64::URL_SAFE_NO_PAD)
                .map_err(|e| BakeryError::Verification(e.to_string()))?,
            (None, None) => Vec::new(),
        };
        Ok(DischargeToken {
            kind: body.kind,
            value,
        })
    }
}
