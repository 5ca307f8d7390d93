use chrono::{SecondsFormat, Utc};

/// Current UTC time in RFC 3339 form with a `Z` suffix.
///
/// Every document and run record in the system stamps time through this one
/// helper so timestamps compare lexicographically.
pub fn iso_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
