use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    label::{DocumentType, Method},
};

/// A labeled, confidence-scored classification.
///
/// Fields are private so that every value in circulation went through
/// [`ClassificationResult::new`]: the confidence is always in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    document_type: DocumentType,
    confidence: f32,
    method: Method,
    extracted_info: BTreeMap<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    raw_response: Option<String>,
}

impl ClassificationResult {
    pub fn new(
        document_type: DocumentType,
        confidence: f32,
        method: Method,
    ) -> Result<Self> {
        check_confidence(confidence)?;
        Ok(Self {
            document_type,
            confidence,
            method,
            extracted_info: BTreeMap::new(),
            raw_response: None,
        })
    }

    /// `other` with zero confidence, used when nothing could be classified.
    pub fn unclassified() -> Self {
        Self {
            document_type: DocumentType::Other,
            confidence: 0.0,
            method: Method::Fallback,
            extracted_info: BTreeMap::new(),
            raw_response: None,
        }
    }

    /// Build from label and method strings, as read from an external
    /// source. Unknown strings are rejected.
    pub fn from_parts(
        document_type: &str,
        confidence: f32,
        method: &str,
    ) -> Result<Self> {
        Self::new(document_type.parse()?, confidence, method.parse()?)
    }

    pub fn with_info(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extracted_info.insert(key.to_string(), value.into());
        self
    }

    pub fn with_raw_response(mut self, raw: impl Into<String>) -> Self {
        self.raw_response = Some(raw.into());
        self
    }

    /// Replace the confidence, keeping label, method and diagnostics.
    pub fn with_confidence(mut self, confidence: f32) -> Result<Self> {
        check_confidence(confidence)?;
        self.confidence = confidence;
        Ok(self)
    }

    pub fn document_type(&self) -> DocumentType {
        self.document_type
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn extracted_info(&self) -> &BTreeMap<String, Value> {
        &self.extracted_info
    }

    pub fn raw_response(&self) -> Option<&str> {
        self.raw_response.as_deref()
    }
}

fn check_confidence(confidence: f32) -> Result<()> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(())
    } else {
        Err(Error::InvalidConfidence(confidence))
    }
}

#[derive(Deserialize)]
struct RawClassification {
    document_type: String,
    confidence: f32,
    method: String,
    #[serde(default)]
    extracted_info: BTreeMap<String, Value>,
    raw_response: Option<String>,
}

impl<'de> Deserialize<'de> for ClassificationResult {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawClassification::deserialize(deserializer)?;
        let mut result =
            Self::from_parts(&raw.document_type, raw.confidence, &raw.method)
                .map_err(serde::de::Error::custom)?;
        result.extracted_info = raw.extracted_info;
        result.raw_response = raw.raw_response;
        Ok(result)
    }
}
