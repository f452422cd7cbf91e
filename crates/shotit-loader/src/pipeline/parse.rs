//! Hash document parser.
//!
//! The document is a Solr update payload: `<add>` holding one `<doc>` per
//! frame, each with `<field name="...">value</field>` children. Three fields
//! are read, everything else is ignored.

use serde::Deserialize;
use thiserror::Error;

use crate::pipeline::FrameHashRecord;

const TIME_FIELD: &str = "id";
const STRUCTURAL_FIELD: &str = "cl_hi";
const HISTOGRAM_FIELD: &str = "cl_ha";

#[derive(Debug, Error)]
pub enum HashParseError {
    #[error("hash document is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("hash document is not valid XML: {0}")]
    Xml(#[from] quick_xml::DeError),
    #[error("doc #{doc} is missing field `{field}`")]
    MissingField { doc: usize, field: &'static str },
    #[error("doc #{doc} has invalid time `{value}`")]
    InvalidTime { doc: usize, value: String },
}

#[derive(Debug, Deserialize)]
struct HashDocument {
    #[serde(rename = "doc", default)]
    docs: Vec<DocElement>,
}

#[derive(Debug, Deserialize)]
struct DocElement {
    #[serde(rename = "field", default)]
    fields: Vec<FieldElement>,
}

#[derive(Debug, Deserialize)]
struct FieldElement {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "$text", default)]
    value: String,
}

/// Parses a decompressed hash document into frame records sorted by time.
///
/// A single malformed `doc` fails the whole document.
pub fn parse_hash_document(document: &[u8]) -> Result<Vec<FrameHashRecord>, HashParseError> {
    let text = std::str::from_utf8(document)?;
    let parsed: HashDocument = quick_xml::de::from_str(text)?;

    let mut records = parsed
        .docs
        .into_iter()
        .enumerate()
        .map(|(index, doc)| into_record(index, doc))
        .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| a.time.total_cmp(&b.time));
    Ok(records)
}

fn into_record(index: usize, doc: DocElement) -> Result<FrameHashRecord, HashParseError> {
    let mut time = None;
    let mut structural = None;
    let mut histogram = None;

    // First occurrence of a name wins.
    for field in doc.fields {
        let slot = match field.name.as_str() {
            TIME_FIELD => &mut time,
            STRUCTURAL_FIELD => &mut structural,
            HISTOGRAM_FIELD => &mut histogram,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(field.value);
        }
    }

    let missing = |field| HashParseError::MissingField { doc: index, field };
    let raw_time = time.ok_or_else(|| missing(TIME_FIELD))?;
    let structural_hash = structural.ok_or_else(|| missing(STRUCTURAL_FIELD))?;
    let histogram_hash = histogram.ok_or_else(|| missing(HISTOGRAM_FIELD))?;

    let time = raw_time
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| HashParseError::InvalidTime {
            doc: index,
            value: raw_time.clone(),
        })?;

    Ok(FrameHashRecord {
        time,
        structural_hash: structural_hash.trim().to_string(),
        histogram_hash: histogram_hash.trim().to_string(),
    })
}
