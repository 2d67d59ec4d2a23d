use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A stored record: a JSON object carrying the tenant field and an id.
pub type Document = Map<String, Value>;

/// Field holding a record's primary key.
pub const ID_FIELD: &str = "id";

/// Kind of store operation entering the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpKind {
    Find,
    Create,
    Update,
    Delete,
}

impl OpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Find => "find",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Find)
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Equality predicates, all of which must hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(pub Map<String, Value>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self::new().eq(ID_FIELD, id.into())
    }

    /// Add a `field == value` predicate.
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Inbound store operation. The tenant is never part of it: it comes from
/// the session through the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub kind: OpKind,
    pub filter: Filter,
    pub payload: Option<Value>,
}

impl Operation {
    pub fn find(filter: Filter) -> Self {
        Self {
            kind: OpKind::Find,
            filter,
            payload: None,
        }
    }

    pub fn create(data: Value) -> Self {
        Self {
            kind: OpKind::Create,
            filter: Filter::new(),
            payload: Some(data),
        }
    }

    pub fn update(filter: Filter, patch: Value) -> Self {
        Self {
            kind: OpKind::Update,
            filter,
            payload: Some(patch),
        }
    }

    pub fn delete(filter: Filter) -> Self {
        Self {
            kind: OpKind::Delete,
            filter,
            payload: None,
        }
    }
}

/// What a gated operation produced
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutcome {
    Found(Vec<Document>),
    Created(Document),
    Updated(Vec<Document>),
    Deleted(Vec<Document>),
}

impl OpOutcome {
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Found(_) => OpKind::Find,
            Self::Created(_) => OpKind::Create,
            Self::Updated(_) => OpKind::Update,
            Self::Deleted(_) => OpKind::Delete,
        }
    }

    /// Number of records returned or touched.
    pub fn affected(&self) -> usize {
        match self {
            Self::Created(_) => 1,
            Self::Found(docs) | Self::Updated(docs) | Self::Deleted(docs) => docs.len(),
        }
    }

    pub fn into_documents(self) -> Vec<Document> {
        match self {
            Self::Created(doc) => vec![doc],
            Self::Found(docs) | Self::Updated(docs) | Self::Deleted(docs) => docs,
        }
    }
}
