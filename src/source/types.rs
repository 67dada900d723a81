//! Wire payload types for the upstream word-count service.

use chrono::NaiveDate;
use serde::Deserialize;

/// Location label substituted when the upstream omits one for a correction.
pub(crate) const UNKNOWN_LOCATION: &str = "Unknown";

/// One correction event for a regulatory title: the effective date of the
/// amendment and the location within the title it touched.
///
/// Immutable once received; the analysis loop treats `(date, location)` as
/// the identity of a revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Correction {
    pub date: NaiveDate,
    pub location: String,
}

impl Correction {
    pub fn new(date: NaiveDate, location: impl Into<String>) -> Self {
        Self {
            date,
            location: location.into(),
        }
    }
}

/// An agency together with the title identifiers it manages.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AgencyTitles {
    pub agency: String,
    #[serde(default)]
    pub titles: Vec<String>,
}

/// One sample from the history endpoint. A `null` word count marks a date
/// the upstream could not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryPoint {
    pub date: NaiveDate,
    pub word_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PingPayload {
    pub(crate) message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CorrectionsPayload {
    #[serde(default)]
    pub(crate) corrections: Vec<RawCorrection>,
}

/// A correction as the upstream serializes it; `location` may be absent.
#[derive(Debug, Deserialize)]
pub(crate) struct RawCorrection {
    pub(crate) date: NaiveDate,
    #[serde(default)]
    pub(crate) location: Option<String>,
}

impl RawCorrection {
    pub(crate) fn normalize(self) -> Correction {
        Correction {
            date: self.date,
            location: self
                .location
                .unwrap_or_else(|| UNKNOWN_LOCATION.to_owned()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct WordCountPayload {
    #[serde(default)]
    pub(crate) word_count: Option<u64>,
}
