//! Non-interactive login for service accounts: a pre-shared keypair logs in
//! at a discharger's `/login` endpoint instead of a browser flow.

use serde::{Deserialize, Serialize};

use crate::crypto::bakery_key::PrivateKey;
use crate::discharge::{discharge_all, DischargeAcquirer};
use crate::error::{BakeryError, BakeryResult};
use crate::httpbakery::error::InteractionRequiredError;
use crate::interactor::{DischargeToken, Interactor, LegacyInteractor};
use crate::store::ThirdPartyLocator;
use crate::wrapper::Macaroon;

pub const KIND_AGENT: &str = "agent";

/// One agent account: the discharger location it's registered with and the
/// username it logs in as there.
#[derive(Clone, Debug)]
pub struct Agent {
    pub url: String,
    pub username: String,
}

/// An agent's keypair plus the accounts it's registered to use it with.
pub struct AgentAuthInfo {
    pub key: PrivateKey,
    pub agents: Vec<Agent>,
}

impl AgentAuthInfo {
    pub fn agent_for(&self, location: &str) -> Option<&Agent> {
        let trimmed = location.trim_end_matches('/');
        self.agents
            .iter()
            .find(|a| a.url.trim_end_matches('/') == trimmed)
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    public_key: crate::crypto::bakery_key::PublicKey,
}

#[derive(Deserialize)]
struct LoginResponse {
    #[serde(rename = "Macaroon")]
    macaroon: serde_json::Value,
}

/// Always fails: an agent discharges its own third-party caveats locally and
/// has no remote discharge location to fall back on.
struct NoRemoteDischarges;

impl DischargeAcquirer for NoRemoteDischarges {
    fn acquire(
        &self,
        location: &str,
        _id: &crate::ByteString,
        _encrypted_caveat: &[u8],
    ) -> BakeryResult<Macaroon> {
        Err(BakeryError::ThirdPartyInfoNotFound(location.to_string()))
    }
}

/// Logs an agent in at a discharger and discharges the resulting macaroon
/// locally with the agent's own key.
pub struct AgentInteractor<'a> {
    pub info: &'a AgentAuthInfo,
    pub http: reqwest::blocking::Client,
    pub checker: crate::checkers::Checker,
    pub locator: &'a dyn ThirdPartyLocator,
}

impl<'a> AgentInteractor<'a> {
    fn login(&self, location: &str) -> BakeryResult<Macaroon> {
        let agent = self
            .info
            .agent_for(location)
            .ok_or_else(|| BakeryError::ThirdPartyInfoNotFound(location.to_string()))?;
        let response = self
            .http
            .post(format!("{}/login", location.trim_end_matches('/')))
            .json(&LoginRequest {
                username: &agent.username,
                public_key: self.info.key.public_key(),
            })
            .send()
            .map_err(|e| BakeryError::Verification(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BakeryError::Verification(format!(
                "agent login at {} failed with status {}",
                location,
                response.status()
            )));
        }
        let body: LoginResponse = response
            .json()
            .map_err(|e| BakeryError::Verification(e.to_string()))?;
        crate::wrapper::deserialize(&body.macaroon.to_string())
    }
}

impl<'a> Interactor for AgentInteractor<'a> {
    fn kind(&self) -> &str {
        KIND_AGENT
    }

    fn interact(
        &self,
        location: &str,
        err: &InteractionRequiredError,
    ) -> BakeryResult<DischargeToken> {
        if !err.info.interaction_methods.contains_key(KIND_AGENT) {
            return Err(BakeryError::InteractionRequired(Box::new(err.clone())));
        }
        let macaroon = self.login(location)?;
        let ctx = crate::checkers::AuthContext::new();
        let acquirer = NoRemoteDischarges;
        let discharges = discharge_all(
            &macaroon,
            Some(&self.info.key),
            &self.checker,
            &ctx,
            self.locator,
            &acquirer,
        )?;
        let mut bundle = Vec::with_capacity(1 + discharges.len());
        bundle.push(macaroon);
        bundle.extend(discharges);
        let serialized: Vec<String> = bundle
            .iter()
            .map(crate::wrapper::serialize)
            .collect::<BakeryResult<_>>()?;
        let value = serde_json::to_vec(&serialized).map_err(crate::MacaroonError::from)?;
        Ok(DischargeToken {
            kind: String::from(KIND_AGENT),
            value,
        })
    }
}

impl<'a> LegacyInteractor for AgentInteractor<'a> {
    fn legacy_interact(&self, location: &str, _visit_url: &str) -> BakeryResult<()> {
        self.login(location).map(|_| ())
    }
}
