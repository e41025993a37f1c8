use time::OffsetDateTime;

/// Elasticsearch metric aggregations over date fields (timestamp min/max)
/// report epoch milliseconds as a float.
pub fn parse_timestamp_millis_float(millis: f64) -> Result<OffsetDateTime, String> {
    if !millis.is_finite() {
        return Err(format!("failed to parse epoch millis `{millis}`: not finite"));
    }
    let whole = millis.trunc() as i128;
    let fract = (millis.fract() * 1_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(whole * 1_000_000 + fract)
        .map_err(|e| format!("failed to parse epoch millis `{millis}`: {e}"))
}

pub fn format_rfc3339(dt: OffsetDateTime) -> Result<String, String> {
    dt.format(&time::format_description::well_known::Rfc3339)
        .map_err(|e| format!("failed to format datetime: {e}"))
}
