use serde::{Deserialize, Serialize};

use crate::policy::ar::timeline::round_to_bucket_seconds;

/// Result of an `AR_CREATE` request, encoded exactly as the original wire format:
/// a 3-element `[tag, reservationId, expiryTime]` the user-side decodes. `Ok` maps
/// to `reservation_id != 0`; failures carry no reservation id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArCreateResult {
    Ok,
    FailResourceFullIn { bucket_seconds: i64 },
    FailResourceCantSupport,
    Error,
}

impl ArCreateResult {
    /// Builds the `FAIL_RESOURCE_FULL_IN_<N>_<UNIT>` result for a busy remainder,
    /// applying the bucket-rounding rule from §4.6.
    pub fn full_in(remainder_ms: i64) -> Self {
        ArCreateResult::FailResourceFullIn { bucket_seconds: round_to_bucket_seconds(remainder_ms) }
    }

    /// Renders the bucket as the original code (e.g. `FAIL_RESOURCE_FULL_IN_10_SEC`,
    /// `FAIL_RESOURCE_FULL_IN_5_MIN`, `FAIL_RESOURCE_FULL_IN_1_HOUR`).
    pub fn label(&self) -> String {
        match self {
            ArCreateResult::Ok => "OK".to_string(),
            ArCreateResult::FailResourceCantSupport => "FAIL_RESOURCE_CANT_SUPPORT".to_string(),
            ArCreateResult::Error => "ERROR".to_string(),
            ArCreateResult::FailResourceFullIn { bucket_seconds } => {
                if bucket_seconds % 3600 == 0 {
                    format!("FAIL_RESOURCE_FULL_IN_{}_HOUR", bucket_seconds / 3600)
                } else if bucket_seconds % 60 == 0 {
                    format!("FAIL_RESOURCE_FULL_IN_{}_MIN", bucket_seconds / 60)
                } else {
                    format!("FAIL_RESOURCE_FULL_IN_{}_SEC", bucket_seconds)
                }
            }
        }
    }
}

/// Shared result taxonomy for cancel/commit/modify, encoded as the original 2-element
/// `[tag, resultCode]` reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArSimpleResult {
    Ok,
    Error,
    ErrorResourceCantSupport,
    NotFound,
    AlreadyCommitted,
    ModifyError,
}

/// Result of an `AR_QUERY_STATUS` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArQueryResult {
    Status(crate::policy::ar::timeline::ReservationStatus),
    NotFound,
}

/// One `(startTimeLocal, duration, peCount)` triple in a busy/free time-query reply,
/// already converted to the requesting user's time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start_time_ms: i64,
    pub duration_ms: i64,
    pub pe_count: u32,
}
