//! Collection schema, index parameters, and the row type inserted per frame.

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value as JsonValue};
use strum::{AsRefStr, Display, EnumString};

/// Float vector field holding the normalized histogram hash.
pub const VECTOR_FIELD: &str = "cl_ha";
/// `<collectionID>/<fileName>/<time>` identity of a frame.
pub const ID_FIELD: &str = "id";
/// Int64 key derived from the structural hash.
pub const PRIMARY_KEY_FIELD: &str = "primary_key";

const ID_MAX_LENGTH: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize)]
pub enum DataType {
    FloatVector,
    VarChar,
    Int64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    pub is_primary: bool,
    /// Vector dimension, only meaningful for [`DataType::FloatVector`].
    pub dim: Option<usize>,
    /// Maximum byte length, only meaningful for [`DataType::VarChar`].
    pub max_length: Option<usize>,
}

impl FieldSchema {
    pub fn float_vector(name: impl Into<String>, dim: usize) -> Self {
        debug_assert!(dim > 0);
        Self {
            name: name.into(),
            description: String::new(),
            data_type: DataType::FloatVector,
            is_primary: false,
            dim: Some(dim),
            max_length: None,
        }
    }

    pub fn varchar(name: impl Into<String>, max_length: usize) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_type: DataType::VarChar,
            is_primary: false,
            dim: None,
            max_length: Some(max_length),
        }
    }

    pub fn int64_primary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_type: DataType::Int64,
            is_primary: true,
            dim: None,
            max_length: None,
        }
    }

    #[must_use]
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldSchema>,
}

impl CollectionSchema {
    /// Schema of the frame index: one vector field of `dim`, the string
    /// identity, and the int64 primary key.
    pub fn frame_index(name: impl Into<String>, dim: usize) -> Self {
        Self {
            name: name.into(),
            description: "shotit frame hash index".to_string(),
            fields: vec![
                FieldSchema::float_vector(VECTOR_FIELD, dim)
                    .describe("normalized histogram hash"),
                FieldSchema::varchar(ID_FIELD, ID_MAX_LENGTH)
                    .describe("${collectionID}/${fileName}/${time}"),
                FieldSchema::int64_primary(PRIMARY_KEY_FIELD).describe("structural hash key"),
            ],
        }
    }

    pub fn primary_field(&self) -> Option<&FieldSchema> {
        self.fields.iter().find(|field| field.is_primary)
    }

    pub fn vector_dim(&self) -> Option<usize> {
        self.fields
            .iter()
            .find(|field| field.data_type == DataType::FloatVector)
            .and_then(|field| field.dim)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize)]
pub enum MetricType {
    #[strum(serialize = "IP")]
    #[serde(rename = "IP")]
    InnerProduct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize, Deserialize)]
pub enum IndexType {
    #[strum(serialize = "IVF_SQ8")]
    #[serde(rename = "IVF_SQ8")]
    IvfSq8,
}

/// Approximate nearest-neighbour index rebuilt after every load.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub field: String,
    pub metric: MetricType,
    pub index_type: IndexType,
    pub params: JsonMap<String, JsonValue>,
}

impl IndexSpec {
    /// IVF_SQ8 over the vector field with inner-product metric.
    pub fn ivf_sq8_inner_product(nlist: u32) -> Self {
        debug_assert!(nlist > 0);
        let mut params = JsonMap::new();
        params.insert("nlist".to_string(), JsonValue::from(nlist));
        Self {
            field: VECTOR_FIELD.to_string(),
            metric: MetricType::InnerProduct,
            index_type: IndexType::IvfSq8,
            params,
        }
    }

    pub fn index_name(&self) -> String {
        format!("{}_{}", self.field, self.index_type.as_ref().to_ascii_lowercase())
    }
}

/// One frame row as stored in the collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    #[serde(rename = "id")]
    pub id: String,
    #[serde(rename = "cl_ha")]
    pub vector: Vec<f32>,
    #[serde(rename = "primary_key")]
    pub primary_key: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_declares_three_fields() {
        let schema = CollectionSchema::frame_index("shotit", 100);
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(schema.vector_dim(), Some(100));
        let primary = schema.primary_field().expect("primary key declared");
        assert_eq!(primary.name, PRIMARY_KEY_FIELD);
        assert_eq!(primary.data_type, DataType::Int64);
    }

    #[test]
    fn record_serializes_with_collection_field_names() {
        let record = IndexRecord {
            id: "1/a.mp4/0.00".to_string(),
            vector: vec![1.0, 0.0],
            primary_key: 42,
        };
        let value = serde_json::to_value(&record).expect("serialize record");
        assert!(value.get(ID_FIELD).is_some());
        assert!(value.get(VECTOR_FIELD).is_some());
        assert_eq!(value.get(PRIMARY_KEY_FIELD), Some(&JsonValue::from(42)));
    }

    #[test]
    fn metric_and_index_wire_names() {
        assert_eq!(MetricType::InnerProduct.as_ref(), "IP");
        assert_eq!(IndexType::IvfSq8.to_string(), "IVF_SQ8");
        let spec = IndexSpec::ivf_sq8_inner_product(128);
        assert_eq!(spec.params.get("nlist"), Some(&JsonValue::from(128)));
        assert_eq!(spec.index_name(), "cl_ha_ivf_sq8");
    }
}
