//! Implements AuthPort against a fixed set of accepted tokens.
//!
//! The login flow lives outside this crate; it hands out tokens, we only check membership.

use crate::domain::{DomainError, Identity};
use crate::ports::AuthPort;
use async_trait::async_trait;
use std::collections::HashSet;

pub struct StaticTokenAuth {
    tokens: HashSet<String>,
}

impl StaticTokenAuth {
    /// Blank tokens are ignored, so an empty config accepts no one.
    pub fn new(tokens: impl IntoIterator<Item = String>) -> Self {
        Self {
            tokens: tokens
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

#[async_trait]
impl AuthPort for StaticTokenAuth {
    async fn authorize(&self, identity: &Identity) -> Result<(), DomainError> {
        if self.tokens.contains(identity.token()) {
            Ok(())
        } else {
            Err(DomainError::Unauthorized("unknown identity token".into()))
        }
    }
}
