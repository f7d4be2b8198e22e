//! Zerodha Kite Connect (v3) REST adapter.
//!
//! Only what the desk needs: net positions and MARKET orders on one
//! exchange/product. Credentials are resolved by the caller; the access
//! token lives in a shared [`SessionToken`] so [`EnvFileRefresher`] can swap
//! it after the operator regenerates it.
//!
//! Session expiry is reported by Kite as HTTP 403 with
//! `error_type = "TokenException"` (message usually "Invalid access token"
//! or "Invalid `api_key` or `access_token`"). Both map to
//! [`BrokerError::SessionExpired`].

mod client;
mod refresh;

pub use client::{KiteBroker, SessionToken};
pub use refresh::EnvFileRefresher;

pub use itd_execution::BrokerError;
