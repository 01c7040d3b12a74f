#![forbid(unsafe_code)]

//! Publish-time cutoff deciding which videos a run syncs children for.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Utc};

#[derive(Debug, thiserror::Error)]
#[error("invalid since watermark {value:?}: expected an ISO-8601 date or date-time")]
pub struct InvalidWatermark {
    pub value: String,
}

/// Optional `since` cutoff, parsed once per run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Watermark {
    since: Option<DateTime<FixedOffset>>,
}

impl Watermark {
    /// A watermark that keeps every video in scope.
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn since(cutoff: DateTime<FixedOffset>) -> Self {
        Self {
            since: Some(cutoff),
        }
    }

    /// Parses the configured value. Blank or absent input means no cutoff; a
    /// value that is present but unparseable is rejected.
    pub fn parse(value: Option<&str>) -> Result<Self, InvalidWatermark> {
        let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
            return Ok(Self::unbounded());
        };
        parse_timestamp(raw)
            .map(Self::since)
            .ok_or_else(|| InvalidWatermark {
                value: raw.to_owned(),
            })
    }

    pub fn cutoff(&self) -> Option<DateTime<FixedOffset>> {
        self.since
    }

    /// Missing or unreadable publish times stay in scope so incomplete
    /// upstream metadata never hides a video.
    pub fn in_scope(&self, published_at: Option<&str>) -> bool {
        let Some(since) = self.since else {
            return true;
        };
        match published_at.and_then(parse_timestamp) {
            Some(published) => published >= since,
            None => true,
        }
    }
}

/// Parses ISO-8601 timestamps as the platform reports them. A trailing `Z`
/// becomes an explicit `+00:00`; date-only and offset-less values are read
/// as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<FixedOffset>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    let normalized = match trimmed.strip_suffix('Z').or_else(|| trimmed.strip_suffix('z')) {
        Some(stripped) => format!("{stripped}+00:00"),
        None => trimmed.to_owned(),
    };

    if let Ok(datetime) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(datetime);
    }
    if let Ok(datetime) = DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f%:z") {
        return Some(datetime);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc().fixed_offset());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(&normalized, "%Y-%m-%d") {
        let naive = date.and_hms_opt(0, 0, 0)?;
        return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).fixed_offset());
    }
    None
}
