use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Layout of transcript timestamps: `YYYY-MM-DD HH:MM:SS`.
pub const TIMESTAMP_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// Format a point in time as a transcript timestamp.
pub fn format_timestamp(datetime: OffsetDateTime) -> String {
    datetime
        .format(TIMESTAMP_FORMAT)
        .unwrap_or_else(|_| datetime.unix_timestamp().to_string())
}

/// The current local time as a transcript timestamp, falling back to UTC when
/// the local offset cannot be determined.
pub fn now_timestamp() -> String {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    format_timestamp(now)
}

/// Returns true if `s` parses as a transcript timestamp.
pub fn is_timestamp(s: &str) -> bool {
    PrimitiveDateTime::parse(s, TIMESTAMP_FORMAT).is_ok()
}
