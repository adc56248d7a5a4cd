//! Resolves a discharger's published public key over HTTP, with an
//! in-process cache since the key doesn't change within a process lifetime.

use std::collections::HashMap;
use std::sync::Mutex;

use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;

use crate::crypto::bakery_key::PublicKey;
use crate::error::{BakeryError, BakeryResult};
use crate::store::{ThirdPartyInfo, ThirdPartyLocator};

#[derive(Deserialize)]
struct PublicKeyResponse {
    #[serde(rename = "Version")]
    version: u8,
    #[serde(rename = "PublicKey")]
    public_key: PublicKey,
}

/// An HTTP-backed [`ThirdPartyLocator`]: GETs `<location>/discharge/info`
/// (falling back to the legacy `<location>/publickey` path) and caches the
/// result for the lifetime of this locator.
pub struct HttpThirdPartyLocator {
    http: HttpClient,
    allow_insecure: bool,
    cache: Mutex<HashMap<String, ThirdPartyInfo>>,
}

impl HttpThirdPartyLocator {
    pub fn new(http: HttpClient) -> HttpThirdPartyLocator {
        HttpThirdPartyLocator {
            http,
            allow_insecure: false,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Allows `http://` locations. Only ever set in tests.
    pub fn allow_insecure(mut self, allow: bool) -> HttpThirdPartyLocator {
        self.allow_insecure = allow;
        self
    }

    fn fetch(&self, location: &str) -> BakeryResult<ThirdPartyInfo> {
        let base = location.trim_end_matches('/');
        let mut response = self
            .http
            .get(format!("{}/discharge/info", base))
            .send()
            .map_err(|e| BakeryError::ThirdPartyInfoNotFound(format!("{}: {}", location, e)))?;
        if !response.status().is_success() {
            response = self
                .http
                .get(format!("{}/publickey", base))
                .send()
                .map_err(|e| BakeryError::ThirdPartyInfoNotFound(format!("{}: {}", location, e)))?;
        }
        if !response.status().is_success() {
            return Err(BakeryError::ThirdPartyInfoNotFound(location.to_string()));
        }
        let body: PublicKeyResponse = response
            .json()
            .map_err(|e| BakeryError::ThirdPartyInfoNotFound(format!("{}: {}", location, e)))?;
        Ok(ThirdPartyInfo {
            version: body.version,
            public_key: body.public_key,
        })
    }
}

impl ThirdPartyLocator for HttpThirdPartyLocator {
    fn third_party_info(&self, location: &str) -> BakeryResult<ThirdPartyInfo> {
        if !self.allow_insecure && !location.starts_with("https://") {
            return Err(BakeryError::ThirdPartyInfoNotFound(format!(
                "insecure location {:?} rejected",
                location
            )));
        }

        if let Some(info) = self
            .cache
            .lock()
            .map_err(|_| BakeryError::AuthInitError(String::from("locator cache poisoned")))?
            .get(location)
        {
            return Ok(*info);
        }

        let info = self.fetch(location)?;
        self.cache
            .lock()
            .map_err(|_| BakeryError::AuthInitError(String::from("locator cache poisoned")))?
            .insert(location.to_string(), info);
        Ok(info)
    }
}
