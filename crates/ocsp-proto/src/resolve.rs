//! Status resolution
//!
//! Maps a [`ValidatedResponse`] onto the [`CheckResult`] handed back to
//! callers. No I/O.

use crate::response::CertStatus;
use crate::validate::ValidatedResponse;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Outcome of a successful status check
///
/// Only [`resolve`] builds one, from a response that passed validation, so
/// `responder_verified` is always true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    #[serde(flatten)]
    status: CertStatus,
    responder_verified: bool,
    produced_at: DateTime<Utc>,
    this_update: DateTime<Utc>,
    next_update: Option<DateTime<Utc>>,
    #[serde(skip)]
    raw_response: Vec<u8>,
}

impl CheckResult {
    pub fn status(&self) -> &CertStatus {
        &self.status
    }

    pub fn responder_verified(&self) -> bool {
        self.responder_verified
    }

    pub fn produced_at(&self) -> DateTime<Utc> {
        self.produced_at
    }

    pub fn this_update(&self) -> DateTime<Utc> {
        self.this_update
    }

    pub fn next_update(&self) -> Option<DateTime<Utc>> {
        self.next_update
    }

    /// Raw DER response, for callers that persist or staple it
    pub fn raw_response(&self) -> &[u8] {
        &self.raw_response
    }

    pub fn is_good(&self) -> bool {
        matches!(self.status, CertStatus::Good)
    }

    pub fn is_revoked(&self) -> bool {
        matches!(self.status, CertStatus::Revoked { .. })
    }

    /// Time until `nextUpdate`, if the responder set one and it has not passed
    pub fn ttl(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_update
            .and_then(|next_update| (next_update - now).to_std().ok())
    }
}

/// Map a validated response to a [`CheckResult`]
pub fn resolve(validated: ValidatedResponse) -> CheckResult {
    let (single, produced_at, raw_response) = validated.into_parts();

    CheckResult {
        status: single.status,
        responder_verified: true,
        produced_at,
        this_update: single.this_update,
        next_update: single.next_update,
        raw_response,
    }
}

#[cfg(test)]
impl CheckResult {
    pub(crate) fn for_tests(status: CertStatus, next_update: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            status,
            responder_verified: true,
            produced_at: now,
            this_update: now,
            next_update,
            raw_response: vec![0x30, 0x03, 0x0A, 0x01, 0x00],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::RevocationReason;
    use chrono::TimeZone;

    #[test]
    fn test_helpers() {
        let good = CheckResult::for_tests(CertStatus::Good, None);
        assert!(good.is_good());
        assert!(!good.is_revoked());
        assert!(good.responder_verified());

        let revoked = CheckResult::for_tests(
            CertStatus::Revoked {
                revocation_time: Utc::now(),
                reason: Some(RevocationReason::KeyCompromise),
            },
            None,
        );
        assert!(revoked.is_revoked());
        assert!(!revoked.is_good());
    }

    #[test]
    fn test_ttl() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let result = CheckResult::for_tests(
            CertStatus::Good,
            Some(now + chrono::Duration::seconds(3600)),
        );
        assert_eq!(result.ttl(now), Some(Duration::from_secs(3600)));
        assert_eq!(result.ttl(now + chrono::Duration::seconds(7200)), None);

        let no_next = CheckResult::for_tests(CertStatus::Good, None);
        assert_eq!(no_next.ttl(now), None);
    }

    #[test]
    fn test_json_omits_raw_response() {
        let result = CheckResult::for_tests(
            CertStatus::Revoked {
                revocation_time: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
                reason: Some(RevocationReason::KeyCompromise),
            },
            None,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "revoked");
        assert_eq!(json["reason"], "key_compromise");
        assert_eq!(json["responder_verified"], true);
        assert!(json.get("raw_response").is_none());
    }
}
