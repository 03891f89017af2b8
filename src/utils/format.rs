use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;

/// Display format for event timestamps, e.g. `22:13 14.11.2023`.
pub const TIMESTAMP_FORMAT: &str = "%H:%M %d.%m.%Y";

/// Render seconds since the Unix epoch in the local time zone.
pub fn format_timestamp(seconds: u64) -> String {
	format_timestamp_in(seconds, &Local)
}

/// Render seconds since the Unix epoch in `tz`. Out-of-range values render as an empty string.
pub fn format_timestamp_in<Tz: TimeZone>(seconds: u64, tz: &Tz) -> String
where
	Tz::Offset: Display,
{
	i64::try_from(seconds)
		.ok()
		.and_then(|seconds| DateTime::from_timestamp(seconds, 0))
		.map(|utc| utc.with_timezone(tz).format(TIMESTAMP_FORMAT).to_string())
		.unwrap_or_default()
}

/// Insert thousands separators into a decimal integer string: `1234567` becomes `1,234,567`.
pub fn group_digits(digits: &str) -> String {
	let len = digits.len();
	let mut grouped = String::with_capacity(len + len / 3);
	for (i, c) in digits.chars().enumerate() {
		if i > 0 && (len - i) % 3 == 0 {
			grouped.push(',');
		}
		grouped.push(c);
	}
	grouped
}
