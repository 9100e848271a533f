//! Threat report validation
//!
//! Incoming `POST /threat` bodies are checked here, before anything reaches
//! the chain. Only the known threat kinds are accepted and `details` must be a
//! JSON object.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThreatKind {
    SuspiciousLogin,
    MalwareDetected,
    UnauthorizedAccess,
    DataBreach,
}

impl ThreatKind {
    pub const ALL: [ThreatKind; 4] = [
        ThreatKind::SuspiciousLogin,
        ThreatKind::MalwareDetected,
        ThreatKind::UnauthorizedAccess,
        ThreatKind::DataBreach,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatKind::SuspiciousLogin => "suspicious_login",
            ThreatKind::MalwareDetected => "malware_detected",
            ThreatKind::UnauthorizedAccess => "unauthorized_access",
            ThreatKind::DataBreach => "data_breach",
        }
    }
}

impl fmt::Display for ThreatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatKind {
    type Err = ThreatValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ThreatKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or(ThreatValidationError::UnknownKind)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThreatValidationError {
    #[error("Threat data must be a JSON object")]
    NotAnObject,

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid threat type. Must be one of: {}", valid_kinds())]
    UnknownKind,

    #[error("Details must be a JSON object")]
    DetailsNotObject,
}

fn valid_kinds() -> String {
    ThreatKind::ALL
        .iter()
        .map(ThreatKind::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A validated threat report
#[derive(Debug, Clone, PartialEq)]
pub struct ThreatReport {
    pub kind: ThreatKind,
    pub details: Map<String, Value>,
}

impl ThreatReport {
    pub fn from_value(value: &Value) -> Result<Self, ThreatValidationError> {
        let fields = value.as_object().ok_or(ThreatValidationError::NotAnObject)?;

        let kind = fields
            .get("type")
            .ok_or(ThreatValidationError::MissingField("type"))?;
        let details = fields
            .get("details")
            .ok_or(ThreatValidationError::MissingField("details"))?;

        let kind = kind
            .as_str()
            .ok_or(ThreatValidationError::UnknownKind)?
            .parse::<ThreatKind>()?;
        let details = details
            .as_object()
            .ok_or(ThreatValidationError::DetailsNotObject)?
            .clone();

        Ok(Self { kind, details })
    }

    /// Payload stored in the chain
    pub fn into_payload(self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "details": Value::Object(self.details),
        })
    }
}
