//! Tenant context resolution.
//!
//! The tenant is taken from trusted authentication/session state only.
//! Nothing in an operation's filter or payload is ever consulted here, so a
//! caller cannot pick another tenant by writing its id into a request body.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dog_core::{TenantContext, TenantId};

use crate::{TenancyError, TenancyResult};

/// Authenticated session state produced by the auth layer.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub principal: Option<String>,
    pub request_id: Option<String>,
    claims: HashMap<String, Vec<String>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Append a claim value. Repeating a claim key keeps every value.
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.entry(key.into()).or_default().push(value.into());
        self
    }

    pub fn claim_values(&self, key: &str) -> &[String] {
        self.claims.get(key).map(|v| v.as_slice()).unwrap_or(&[])
    }
}

/// Resolves the tenant an inbound request acts for.
#[async_trait]
pub trait TenantResolver: Send + Sync {
    async fn resolve(&self, session: &Session) -> TenancyResult<TenantContext>;
}

/// Reads the tenant from a single session claim.
///
/// Fails with `MissingTenantContext` when the claim is absent or blank, or
/// when it carries more than one distinct tenant.
#[derive(Debug, Clone)]
pub struct ClaimResolver {
    claim: String,
}

impl ClaimResolver {
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
        }
    }

    pub fn claim(&self) -> &str {
        &self.claim
    }
}

impl Default for ClaimResolver {
    fn default() -> Self {
        Self::new("tenant_id")
    }
}

#[async_trait]
impl TenantResolver for ClaimResolver {
    async fn resolve(&self, session: &Session) -> TenancyResult<TenantContext> {
        let values = session.claim_values(&self.claim);

        let distinct: BTreeSet<&str> = values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .collect();

        let tenant = match distinct.len() {
            0 if values.is_empty() => {
                return Err(TenancyError::missing_context(format!(
                    "session has no `{}` claim",
                    self.claim
                )))
            }
            0 => {
                return Err(TenancyError::missing_context(format!(
                    "`{}` claim is blank",
                    self.claim
                )))
            }
            1 => distinct.into_iter().next().unwrap_or_default(),
            n => {
                return Err(TenancyError::missing_context(format!(
                    "ambiguous tenant: `{}` claim carries {n} tenants",
                    self.claim
                )))
            }
        };

        Ok(TenantContext {
            tenant_id: TenantId::new(tenant),
            request_id: session.request_id.clone(),
        })
    }
}
