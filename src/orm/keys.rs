//! Cache Key Naming
//!
//! Every key an entity owns starts with `{entity}:` so a whole entity type
//! can be cleared by prefix.
//!
//! - records: `{entity}:object:{pk}`
//! - last written record, kept past its TTL: `{entity}:shadow:{pk}`
//! - unique keys: `{entity}:unique:{name}:{value}`
//! - equality indexes: `{entity}:index:{name}:{value}`
//! - range indexes: `{entity}:range:{name}`

use serde_json::Value;

/// Prefix shared by every key of an entity type.
pub fn entity_prefix(entity: &str) -> String {
    format!("{}:", entity)
}

/// Key holding the serialized record.
pub fn object_key(entity: &str, pk: &str) -> String {
    format!("{}:object:{}", entity, pk)
}

/// Non-expiring copy of the last record written under `pk`, read back to
/// retract memberships once the record itself has expired.
pub fn shadow_key(entity: &str, pk: &str) -> String {
    format!("{}:shadow:{}", entity, pk)
}

/// Key mapping a unique-key value to its PK.
pub fn unique_key(entity: &str, name: &str, value: &str) -> String {
    format!("{}:unique:{}:{}", entity, name, value)
}

/// Sorted set of PKs sharing an equality-index value.
pub fn index_key(entity: &str, name: &str, value: &str) -> String {
    format!("{}:index:{}:{}", entity, name, value)
}

/// Sorted set of PKs scored by a range field.
pub fn range_key(entity: &str, name: &str) -> String {
    format!("{}:range:{}", entity, name)
}

/// Encodes field values as a compact JSON array.
///
/// Strings containing `:` or `,` cannot collide with a neighbouring field.
pub fn encode_fields(fields: Vec<Value>) -> String {
    Value::Array(fields).to_string()
}
