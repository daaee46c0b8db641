use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Render a timestamp as RFC 3339 in UTC.
///
/// Years outside `0..=9999` cannot be represented; those fall back to the
/// unix timestamp so callers never have to handle a formatting error.
pub fn rfc3339(value: OffsetDateTime) -> String {
    let utc = value.to_offset(time::UtcOffset::UTC);
    utc.format(&Rfc3339)
        .unwrap_or_else(|_| utc.unix_timestamp().to_string())
}
