//! Query guard: the only way to build something a store driver accepts.
//!
//! [`ScopedFilter`] and [`ScopedDocument`] have crate-private constructors,
//! so every value reaching a [`StoreDriver`](crate::driver::StoreDriver)
//! went through [`QueryGuard`] and carries the resolved tenant predicate.

use dog_core::TenantId;
use serde_json::Value;

use crate::types::{Document, Filter, OpKind, Operation};
use crate::{TenancyError, TenancyResult};

/// Filter bound to one tenant. Always contains `tenant_field == tenant`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedFilter {
    tenant: TenantId,
    tenant_field: String,
    predicates: Document,
}

impl ScopedFilter {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn tenant_field(&self) -> &str {
        &self.tenant_field
    }

    /// Effective predicates, tenant predicate included.
    pub fn predicates(&self) -> &Document {
        &self.predicates
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.predicates
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// Document stamped with its owning tenant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedDocument {
    tenant: TenantId,
    doc: Document,
}

impl ScopedDocument {
    pub fn tenant(&self) -> &TenantId {
        &self.tenant
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn into_document(self) -> Document {
        self.doc
    }
}

/// An operation that passed the guard.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardedOperation {
    Find(ScopedFilter),
    Create(ScopedDocument),
    Update {
        filter: ScopedFilter,
        patch: ScopedDocument,
    },
    Delete(ScopedFilter),
}

impl GuardedOperation {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Find(_) => OpKind::Find,
            Self::Create(_) => OpKind::Create,
            Self::Update { .. } => OpKind::Update,
            Self::Delete(_) => OpKind::Delete,
        }
    }

    pub fn tenant(&self) -> &TenantId {
        match self {
            Self::Find(filter) | Self::Delete(filter) => filter.tenant(),
            Self::Update { filter, .. } => filter.tenant(),
            Self::Create(doc) => doc.tenant(),
        }
    }

    pub fn is_write(&self) -> bool {
        self.kind().is_write()
    }
}

/// Injects and enforces the tenant predicate on every operation.
#[derive(Debug, Clone)]
pub struct QueryGuard {
    tenant_field: String,
}

impl QueryGuard {
    pub fn new(tenant_field: impl Into<String>) -> Self {
        Self {
            tenant_field: tenant_field.into(),
        }
    }

    pub fn tenant_field(&self) -> &str {
        &self.tenant_field
    }

    pub fn guard(&self, op: Operation, tenant: &TenantId) -> TenancyResult<GuardedOperation> {
        if tenant.is_blank() {
            return Err(TenancyError::missing_context("resolved tenant id is blank"));
        }

        match op.kind {
            OpKind::Find => Ok(GuardedOperation::Find(self.scope_filter(op.filter, tenant)?)),
            OpKind::Delete => Ok(GuardedOperation::Delete(
                self.scope_filter(op.filter, tenant)?,
            )),
            OpKind::Create => {
                if !op.filter.is_empty() {
                    return Err(TenancyError::InvalidOperation(
                        "create does not take a filter".to_string(),
                    ));
                }
                let doc = self.stamp(op.payload, tenant, OpKind::Create)?;
                Ok(GuardedOperation::Create(doc))
            }
            OpKind::Update => {
                // Validate the filter first so a mismatch there wins over
                // payload shape errors.
                let filter = self.scope_filter(op.filter, tenant)?;
                let patch = self.stamp(op.payload, tenant, OpKind::Update)?;
                Ok(GuardedOperation::Update { filter, patch })
            }
        }
    }

    /// Filter matching every record of `tenant`.
    pub(crate) fn tenant_filter(&self, tenant: &TenantId) -> ScopedFilter {
        let mut predicates = Document::new();
        predicates.insert(
            self.tenant_field.clone(),
            Value::String(tenant.as_str().to_string()),
        );
        ScopedFilter {
            tenant: tenant.clone(),
            tenant_field: self.tenant_field.clone(),
            predicates,
        }
    }

    /// Filter matching one record of `tenant` by id.
    pub(crate) fn record_filter(&self, tenant: &TenantId, id: &str) -> ScopedFilter {
        let mut filter = self.tenant_filter(tenant);
        filter
            .predicates
            .insert(crate::types::ID_FIELD.to_string(), Value::String(id.to_string()));
        filter
    }

    /// Re-scope an already stored document, e.g. while copying between
    /// targets. The document must already belong to `tenant`.
    pub(crate) fn scope_document(
        &self,
        doc: Document,
        tenant: &TenantId,
    ) -> TenancyResult<ScopedDocument> {
        match doc.get(&self.tenant_field) {
            Some(Value::String(owner)) if owner == tenant.as_str() => Ok(ScopedDocument {
                tenant: tenant.clone(),
                doc,
            }),
            Some(other) => Err(TenancyError::mismatch(tenant, describe(other))),
            None => Err(TenancyError::Store(format!(
                "stored record is missing the `{}` field",
                self.tenant_field
            ))),
        }
    }

    fn scope_filter(&self, filter: Filter, tenant: &TenantId) -> TenancyResult<ScopedFilter> {
        let mut predicates = filter.0;

        match predicates.get(&self.tenant_field) {
            Some(Value::String(supplied)) if supplied == tenant.as_str() => {}
            Some(other) => return Err(TenancyError::mismatch(tenant, describe(other))),
            None => {
                predicates.insert(
                    self.tenant_field.clone(),
                    Value::String(tenant.as_str().to_string()),
                );
            }
        }

        Ok(ScopedFilter {
            tenant: tenant.clone(),
            tenant_field: self.tenant_field.clone(),
            predicates,
        })
    }

    fn stamp(
        &self,
        payload: Option<Value>,
        tenant: &TenantId,
        kind: OpKind,
    ) -> TenancyResult<ScopedDocument> {
        let mut doc = match payload {
            Some(Value::Object(map)) => map,
            Some(_) => {
                return Err(TenancyError::InvalidOperation(format!(
                    "{kind} payload must be a JSON object"
                )))
            }
            None => {
                return Err(TenancyError::InvalidOperation(format!(
                    "{kind} requires a payload"
                )))
            }
        };

        match doc.get(&self.tenant_field) {
            Some(Value::String(supplied)) if supplied == tenant.as_str() => {}
            Some(other) => return Err(TenancyError::mismatch(tenant, describe(other))),
            None => {
                doc.insert(
                    self.tenant_field.clone(),
                    Value::String(tenant.as_str().to_string()),
                );
            }
        }

        Ok(ScopedDocument {
            tenant: tenant.clone(),
            doc,
        })
    }
}

impl Default for QueryGuard {
    fn default() -> Self {
        Self::new("tenantId")
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
