//! Client-side retry loop: sends a request, and on a discharge-required
//! challenge runs the discharge engine and retries with a macaroon-bundle
//! cookie attached, up to a bounded number of attempts per URL.

use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::cookie::Jar;
use reqwest::header::WWW_AUTHENTICATE;
use url::Url;

use crate::checkers::{AuthContext, Checker};
use crate::crypto::bakery_key::PrivateKey;
use crate::discharge::{discharge_all, DischargeAcquirer};
use crate::error::{BakeryError, BakeryResult};
use crate::httpbakery::error::{
    DischargeRequiredResponse, InteractionRequiredError, InteractionRequiredResponse,
    CODE_DISCHARGE_REQUIRED, CODE_INTERACTION_REQUIRED,
};
use crate::interactor::{DischargeToken, Interactor};
use crate::store::ThirdPartyLocator;
use crate::wrapper::Macaroon;
use crate::ByteString;

pub const BAKERY_PROTOCOL_HEADER: &str = "Bakery-Protocol-Version";
pub const LATEST_BAKERY_PROTOCOL_VERSION: &str = "3";

/// Per-URL retry bound (S8: "too many discharge requests").
const MAX_DISCHARGE_RETRIES: usize = 3;

/// Open Question (c): 30 seconds, matching the legacy code paths the
/// reference implementation carries this value over from.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(serde::Deserialize)]
struct DischargeResponse {
    #[serde(rename = "Macaroon")]
    macaroon: serde_json::Value,
}

/// Tries every configured interactor in order against an interaction-required
/// challenge, skipping any that signal "method not found" (an `Interactor`
/// does so by returning `BakeryError::InteractionRequired` itself when its
/// kind isn't among `err.info.interaction_methods`). The first interactor
/// that produces a token wins; if none do, the original error is returned.
fn dispatch_interactors(
    interactors: &[Box<dyn Interactor>],
    location: &str,
    err: &InteractionRequiredError,
) -> BakeryResult<DischargeToken> {
    if interactors.is_empty() {
        return Err(BakeryError::InteractionRequired(Box::new(err.clone())));
    }
    for interactor in interactors {
        match interactor.interact(location, err) {
            Ok(token) => return Ok(token),
            Err(BakeryError::InteractionRequired(_)) => continue,
            Err(other) => return Err(other),
        }
    }
    Err(BakeryError::InteractionRequired(Box::new(err.clone())))
}

/// Acquires a discharge by POSTing to `<location>/discharge`, following up
/// an interaction-required response by dispatching through `interactors` and
/// retrying with the resulting [`DischargeToken`] attached.
pub struct HttpDischargeAcquirer<'a> {
    pub http: &'a HttpClient,
    pub interactors: &'a [Box<dyn Interactor>],
}

impl<'a> HttpDischargeAcquirer<'a> {
    fn post_discharge(
        &self,
        location: &str,
        id: &ByteString,
        encrypted_caveat: &[u8],
        token: Option<&DischargeToken>,
    ) -> BakeryResult<Response> {
        let url = format!("{}/discharge", location.trim_end_matches('/'));
        let mut form: Vec<(&str, String)> = Vec::new();
        match String::from_utf8(id.as_bytes().to_vec()) {
            Ok(text) => form.push(("id", text)),
            Err(_) => form.push((
                "id64",
                base64::encode_config(id.as_bytes(), base64::URL_SAFE_NO_PAD),
            )),
        }
        if encrypted_caveat != id.as_bytes() {
            form.push((
                "caveat64",
                base64::encode_config(encrypted_caveat, base64::URL_SAFE_NO_PAD),
            ));
        }
        if let Some(token) = token {
            form.push((
                "token64",
                base64::encode_config(&token.value, base64::URL_SAFE_NO_PAD),
            ));
            form.push(("token-kind", token.kind.clone()));
        }
        self.http
            .post(&url)
            .form(&form)
            .send()
            .map_err(|e| BakeryError::Verification(format!("discharge request to {} failed: {}", url, e)))
    }
}

impl<'a> DischargeAcquirer for HttpDischargeAcquirer<'a> {
    fn acquire(
        &self,
        location: &str,
        id: &ByteString,
        encrypted_caveat: &[u8],
    ) -> BakeryResult<Macaroon> {
        let response = self.post_discharge(location, id, encrypted_caveat, None)?;
        if response.status().is_success() {
            let body: DischargeResponse = response
                .json()
                .map_err(|e| BakeryError::Verification(e.to_string()))?;
            return crate::wrapper::deserialize(&body.macaroon.to_string());
        }

        let status = response.status();
        let body: InteractionRequiredResponse = response
            .json()
            .map_err(|e| BakeryError::Verification(format!(
                "discharge request to {} failed with status {}: {}",
                location, status, e
            )))?;
        if body.code != CODE_INTERACTION_REQUIRED {
            return Err(BakeryError::Verification(format!(
                "discharge request to {} failed: {}",
                location, body.message
            )));
        }
        let info = body
            .info
            .ok_or_else(|| BakeryError::Verification(String::from("missing interaction info")))?;
        let err = InteractionRequiredError {
            message: body.message,
            info,
        };
        let token = dispatch_interactors(self.interactors, location, &err)?;

        let response = self.post_discharge(location, id, encrypted_caveat, Some(&token))?;
        if !response.status().is_success() {
            return Err(BakeryError::Verification(format!(
                "discharge request to {} failed with status {} after interaction",
                location,
                response.status()
            )));
        }
        let body: DischargeResponse = response
            .json()
            .map_err(|e| BakeryError::Verification(e.to_string()))?;
        crate::wrapper::deserialize(&body.macaroon.to_string())
    }
}

/// A bakery-protocol-aware HTTP client: transparently retries a request that
/// comes back with a discharge-required challenge.
pub struct BakeryHttpClient {
    pub http: HttpClient,
    jar: Arc<Jar>,
    pub local_key: Option<PrivateKey>,
    pub checker: Checker,
    pub locator: Arc<dyn ThirdPartyLocator>,
    pub interactors: Vec<Box<dyn Interactor>>,
}

impl BakeryHttpClient {
    pub fn new(locator: Arc<dyn ThirdPartyLocator>) -> BakeryResult<BakeryHttpClient> {
        let jar = Arc::new(Jar::default());
        let http = HttpClient::builder()
            .cookie_provider(jar.clone())
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| BakeryError::Verification(e.to_string()))?;
        Ok(BakeryHttpClient {
            http,
            jar,
            local_key: None,
            checker: Checker::new(),
            locator,
            interactors: Vec::new(),
        })
    }

    pub fn with_local_key(mut self, key: PrivateKey) -> BakeryHttpClient {
        self.local_key = Some(key);
        self
    }

    /// Registers an interaction method, tried in registration order when a
    /// discharger responds with an interaction-required challenge.
    pub fn with_interactor(mut self, interactor: Box<dyn Interactor>) -> BakeryHttpClient {
        self.interactors.push(interactor);
        self
    }

    /// Sends a GET to `url`, transparently discharging and retrying if the
    /// response is a macaroon discharge challenge (407, or 401 with
    /// `WWW-Authenticate: Macaroon`).
    pub fn get(&self, url: &str) -> BakeryResult<Response> {
        let parsed = Url::parse(url).map_err(|e| BakeryError::Verification(e.to_string()))?;
        let mut attempts = 0usize;
        loop {
            let response = self
                .http
                .get(url)
                .header(BAKERY_PROTOCOL_HEADER, LATEST_BAKERY_PROTOCOL_VERSION)
                .send()
                .map_err(|e| BakeryError::Verification(e.to_string()))?;

            if !is_macaroon_challenge(&response) {
                return Ok(response);
            }
            attempts += 1;
            if attempts > MAX_DISCHARGE_RETRIES {
                return Err(BakeryError::Verification(String::from(
                    "too many discharge requests",
                )));
            }

            let raw: serde_json::Value = response
                .json()
                .map_err(|e| BakeryError::Verification(e.to_string()))?;
            let code = raw.get("Code").and_then(|c| c.as_str()).unwrap_or_default();
            if code == CODE_INTERACTION_REQUIRED {
                let body: InteractionRequiredResponse =
                    serde_json::from_value(raw).map_err(|e| BakeryError::Verification(e.to_string()))?;
                let info = body.info.unwrap_or_default();
                return Err(BakeryError::InteractionRequired(Box::new(
                    InteractionRequiredError {
                        message: body.message,
                        info,
                    },
                )));
            }
            let body: DischargeRequiredResponse =
                serde_json::from_value(raw).map_err(|e| BakeryError::Verification(e.to_string()))?;
            if body.code != CODE_DISCHARGE_REQUIRED {
                return Err(BakeryError::Verification(format!(
                    "unexpected error code {:?}",
                    body.code
                )));
            }
            let info = body
                .info
                .ok_or_else(|| BakeryError::Verification(String::from("missing discharge info")))?;
            let primary = crate::wrapper::deserialize(&info.macaroon.to_string())?;

            let ctx = AuthContext::new();
            let acquirer = HttpDischargeAcquirer {
                http: &self.http,
                interactors: &self.interactors,
            };
            let discharges = discharge_all(
                &primary,
                self.local_key.as_ref(),
                &self.checker,
                &ctx,
                &*self.locator,
                &acquirer,
            )?;

            self.set_bundle_cookie(&parsed, &primary, &discharges, &info)?;
        }
    }

    fn set_bundle_cookie(
        &self,
        request_url: &Url,
        primary: &Macaroon,
        discharges: &[Macaroon],
        info: &crate::httpbakery::error::DischargeRequiredInfo,
    ) -> BakeryResult<()> {
        let mut bundle = Vec::with_capacity(1 + discharges.len());
        bundle.push(primary.clone());
        bundle.extend(discharges.iter().cloned());

        let mut values = Vec::with_capacity(bundle.len());
        for macaroon in &bundle {
            let serialized = crate::wrapper::serialize(macaroon)?;
            values.push(
                serde_json::from_str::<serde_json::Value>(&serialized)
                    .unwrap_or(serde_json::Value::String(serialized)),
            );
        }
        let encoded = base64::encode_config(
            serde_json::to_vec(&values).map_err(crate::MacaroonError::from)?,
            base64::URL_SAFE_NO_PAD,
        );

        let cookie_name = info
            .cookie_name_suffix
            .as_deref()
            .map(|suffix| format!("macaroon-{}", suffix))
            .unwrap_or_else(|| String::from("macaroon-auth"));
        let cookie_path = info.macaroon_path.as_deref().unwrap_or("/");
        let cookie_url = request_url.join(cookie_path).unwrap_or_else(|_| request_url.clone());
        let secure = cookie_url.scheme() == "https";

        let mut cookie_value = format!("{}={}; Path={}", cookie_name, encoded, cookie_path);
        if secure {
            cookie_value.push_str("; Secure");
        }
        self.jar.add_cookie_str(&cookie_value, &cookie_url);
        Ok(())
    }
}

fn is_macaroon_challenge(response: &Response) -> bool {
    let status = response.status().as_u16();
    status == 407
        || (status == 401
            && response
                .headers()
                .get(WWW_AUTHENTICATE)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.eq_ignore_ascii_case("Macaroon"))
                .unwrap_or(false))
}
