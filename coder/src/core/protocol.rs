//! Tagged-result parsers for verifier and reviewer responses.
//!
//! The controller never inspects model text itself; it asks a
//! [`VerdictProtocol`] to turn the raw response into a [`Verdict`] or an
//! [`Approval`]. Swapping the protocol changes the grammar without touching
//! the state machine.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::types::{Approval, Verdict};

/// Token whose presence in the upper-cased verifier response means "valid".
pub const VALID_TOKEN: &str = "VALID";
/// Token whose presence in the upper-cased reviewer response means "approved".
pub const APPROVE_TOKEN: &str = "APPROVE";

pub trait VerdictProtocol: Send + Sync {
    fn parse_verification(&self, response: &str) -> Verdict;
    fn parse_review(&self, response: &str) -> Approval;
}

/// Which protocol a configuration selects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolKind {
    #[default]
    Keyword,
    Json,
}

impl ProtocolKind {
    pub fn build(self) -> Box<dyn VerdictProtocol> {
        match self {
            ProtocolKind::Keyword => Box::new(KeywordProtocol),
            ProtocolKind::Json => Box::new(JsonProtocol),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolKind::Keyword => "keyword",
            ProtocolKind::Json => "json",
        }
    }
}

/// Substring matching on the upper-cased response.
///
/// Note that `INVALID` contains `VALID`, so a verifier answering "invalid"
/// still counts as valid under this grammar.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordProtocol;

impl VerdictProtocol for KeywordProtocol {
    fn parse_verification(&self, response: &str) -> Verdict {
        if response.to_uppercase().contains(VALID_TOKEN) {
            Verdict::Valid
        } else {
            Verdict::Invalid
        }
    }

    fn parse_review(&self, response: &str) -> Approval {
        if response.to_uppercase().contains(APPROVE_TOKEN) {
            Approval::Approved
        } else {
            Approval::Rejected {
                feedback: response.trim().to_string(),
            }
        }
    }
}

/// Structured verdicts embedded as a JSON object in the response.
///
/// Verifier: `{"verdict": "valid" | "invalid", "reason": "..."}`.
/// Reviewer: `{"decision": "approve" | "revise", "feedback": "..."}`.
/// Anything unparseable counts as invalid / rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProtocol;

#[derive(Debug, Deserialize)]
struct VerificationJson {
    verdict: String,
}

#[derive(Debug, Deserialize)]
struct ReviewJson {
    decision: String,
    #[serde(default)]
    feedback: Option<String>,
}

impl VerdictProtocol for JsonProtocol {
    fn parse_verification(&self, response: &str) -> Verdict {
        match extract_json::<VerificationJson>(response) {
            Some(parsed) if parsed.verdict.eq_ignore_ascii_case("valid") => Verdict::Valid,
            _ => Verdict::Invalid,
        }
    }

    fn parse_review(&self, response: &str) -> Approval {
        match extract_json::<ReviewJson>(response) {
            Some(parsed) if parsed.decision.eq_ignore_ascii_case("approve") => Approval::Approved,
            Some(parsed) => Approval::Rejected {
                feedback: parsed
                    .feedback
                    .map(|f| f.trim().to_string())
                    .filter(|f| !f.is_empty())
                    .unwrap_or_else(|| response.trim().to_string()),
            },
            None => Approval::Rejected {
                feedback: response.trim().to_string(),
            },
        }
    }
}

/// Parse the first JSON object in `response` that deserializes as `T`.
///
/// Each `{` is tried as a start; trailing text after the object is ignored.
fn extract_json<T: DeserializeOwned>(response: &str) -> Option<T> {
    response.match_indices('{').find_map(|(start, _)| {
        serde_json::Deserializer::from_str(&response[start..])
            .into_iter::<T>()
            .next()?
            .ok()
    })
}
