//! The HTTP bakery protocol: how a client discovers and satisfies a
//! discharge-required challenge, and how a discharger serves one.

pub mod client;
pub mod discharge_service;
pub mod error;
pub mod locator;

pub use client::{BakeryHttpClient, HttpDischargeAcquirer};
pub use error::{DischargeRequiredResponse, InteractionRequiredError, InteractionRequiredResponse};
pub use locator::HttpThirdPartyLocator;
