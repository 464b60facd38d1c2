use serde_json::{Map, Value};

use crate::authz::errors::AuthzError;
use crate::authz::types::ResourceType;

/// Discriminator key stamped on materialized objects by the persistence layer.
pub const TYPE_FIELD: &str = "__typename";

/// An already-fetched domain object. Attributes are plain JSON scalars,
/// to-one relations are objects (or `null`), to-many relations are arrays.
/// A missing key means "not loaded".
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    resource_type: ResourceType,
    record: Map<String, Value>,
}

impl Instance {
    pub fn new(resource_type: ResourceType, record: Map<String, Value>) -> Self {
        Self {
            resource_type,
            record,
        }
    }

    /// Convert an untyped object coming from generic persistence code,
    /// failing fast on a missing or unknown discriminator.
    pub fn from_json(value: Value) -> Result<Self, AuthzError> {
        let Value::Object(record) = value else {
            return Err(AuthzError::InvalidInstance(
                "instance must be a JSON object".into(),
            ));
        };
        let tag = record
            .get(TYPE_FIELD)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AuthzError::InvalidInstance(format!("instance is missing the `{TYPE_FIELD}` tag"))
            })?;
        let resource_type = tag.parse()?;
        Ok(Self {
            resource_type,
            record,
        })
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn record(&self) -> &Map<String, Value> {
        &self.record
    }

    pub fn id(&self) -> Option<&str> {
        self.record.get("id").and_then(Value::as_str)
    }

    pub fn into_json(self) -> Value {
        let mut record = self.record;
        record.insert(
            TYPE_FIELD.to_string(),
            Value::String(self.resource_type.as_str().to_string()),
        );
        Value::Object(record)
    }
}
