//! Authentication boundary.
//!
//! Registration, password flows and JWT issuance live in an external
//! subsystem; the core only needs `validate(token) -> UserIdentity`. Stream
//! upgrades carry the token in a `access_token|<jwt>` subprotocol, REST
//! calls in a bearer header.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{DuelError, Result};

/// Stable identity snapshot for a player. Opaque to the match core beyond
/// id/username equality and the rating number.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UserIdentity {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub rating: f64,
}

/// Token validation collaborator.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, token: &str) -> Result<UserIdentity>;
}

/// Subprotocol name prefix clients must negotiate on stream upgrade.
pub const SUBPROTOCOL_PREFIX: &str = "access_token|";

/// Extract the token from a `Sec-WebSocket-Protocol` offer.
pub fn token_from_subprotocol(offered: &str) -> Result<&str> {
    offered
        .split(',')
        .map(str::trim)
        .find_map(|candidate| candidate.strip_prefix(SUBPROTOCOL_PREFIX))
        .filter(|token| !token.is_empty())
        .ok_or(DuelError::Auth)
}

/// Development validator accepting `user:<id>:<username>[:<rating>]` tokens.
/// Lets the server run stand-alone; production wires the real auth
/// subsystem behind the same trait.
#[derive(Debug, Default)]
pub struct StaticTokenValidator;

#[async_trait]
impl TokenValidator for StaticTokenValidator {
    async fn validate(&self, token: &str) -> Result<UserIdentity> {
        let mut parts = token.split(':');
        let (Some("user"), Some(id), Some(username)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(DuelError::Auth);
        };
        let id: i64 = id.parse().map_err(|_| DuelError::Auth)?;
        if username.is_empty() {
            return Err(DuelError::Auth);
        }
        let rating = match parts.next() {
            Some(raw) => raw.parse().map_err(|_| DuelError::Auth)?,
            None => 1000.0,
        };
        Ok(UserIdentity {
            id,
            username: username.to_string(),
            display_name: username.to_string(),
            rating,
        })
    }
}
