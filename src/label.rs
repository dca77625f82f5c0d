//! Closed label sets shared by classification and feedback.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Document types a segment can be classified as.
///
/// [`DocumentType::ALL`] fixes the iteration order used everywhere a
/// "first match wins" tie-break is needed. That is the declaration order
/// below, independent of the order of any pattern table.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Email,
    Letter,
    PaymentApplication,
    EvidenceOfPayment,
    ChangeOrder,
    ChangeOrderResponse,
    Rfi,
    RfiResponse,
    InspectionReport,
    ContractDocument,
    PlansSpecifications,
    Other,
}

impl DocumentType {
    pub const ALL: [DocumentType; 12] = [
        DocumentType::Email,
        DocumentType::Letter,
        DocumentType::PaymentApplication,
        DocumentType::EvidenceOfPayment,
        DocumentType::ChangeOrder,
        DocumentType::ChangeOrderResponse,
        DocumentType::Rfi,
        DocumentType::RfiResponse,
        DocumentType::InspectionReport,
        DocumentType::ContractDocument,
        DocumentType::PlansSpecifications,
        DocumentType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DocumentType::Email => "email",
            DocumentType::Letter => "letter",
            DocumentType::PaymentApplication => "payment_application",
            DocumentType::EvidenceOfPayment => "evidence_of_payment",
            DocumentType::ChangeOrder => "change_order",
            DocumentType::ChangeOrderResponse => "change_order_response",
            DocumentType::Rfi => "rfi",
            DocumentType::RfiResponse => "rfi_response",
            DocumentType::InspectionReport => "inspection_report",
            DocumentType::ContractDocument => "contract_document",
            DocumentType::PlansSpecifications => "plans_specifications",
            DocumentType::Other => "other",
        }
    }

    /// Parse a label as returned by an external service: surrounding
    /// whitespace is ignored and matching is case-insensitive.
    pub fn parse_loose(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == normalized)
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| Error::UnknownLabel(s.to_string()))
    }
}

/// How a classification was reached.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    RuleBased,
    Api,
    Fallback,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::RuleBased => "rule_based",
            Method::Api => "api",
            Method::Fallback => "fallback",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rule_based" => Ok(Method::RuleBased),
            "api" => Ok(Method::Api),
            "fallback" => Ok(Method::Fallback),
            other => Err(Error::UnknownMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_roundtrip_through_strings() {
        for label in DocumentType::ALL {
            assert_eq!(label.as_str().parse::<DocumentType>().unwrap(), label);
        }
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&DocumentType::ChangeOrder).unwrap();
        assert_eq!(json, "\"change_order\"");
        let json = serde_json::to_string(&Method::RuleBased).unwrap();
        assert_eq!(json, "\"rule_based\"");
    }

    #[test]
    fn unknown_label_is_rejected() {
        assert!(matches!(
            "memo".parse::<DocumentType>(),
            Err(Error::UnknownLabel(s)) if s == "memo"
        ));
    }

    #[test]
    fn strict_parse_is_case_sensitive() {
        assert!("EMAIL".parse::<DocumentType>().is_err());
    }

    #[test]
    fn loose_parse_normalizes() {
        assert_eq!(
            DocumentType::parse_loose("  RFI_Response\n"),
            Some(DocumentType::RfiResponse)
        );
        assert_eq!(DocumentType::parse_loose("invoice"), None);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert!("manual".parse::<Method>().is_err());
        assert_eq!("api".parse::<Method>().unwrap(), Method::Api);
    }
}
