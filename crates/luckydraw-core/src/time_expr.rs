//! Draw time expressions: relative durations ("10min", "2h") or absolute local times

use time::{
    macros::format_description, Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset,
};

pub const MINUTE_SUFFIXES: [&str; 6] = ["m", "min", "mins", "minute", "minutes", "分钟"];
pub const HOUR_SUFFIXES: [&str; 6] = ["h", "hr", "hrs", "hour", "hours", "小时"];

/// Upper bound for relative durations, anything larger is treated as unparseable
const MAX_DURATION_MINUTES: f64 = 366.0 * 24.0 * 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateOrder {
    YearMonthDay,
    MonthDayYear,
    DayMonthYear,
}

fn date_order(locale: &str) -> DateOrder {
    let locale = locale.to_lowercase();
    let language = locale.split(['-', '_']).next().unwrap_or_default();
    match language {
        "zh" | "ja" | "ko" | "hu" | "lt" | "mn" => DateOrder::YearMonthDay,
        "en" if locale == "en" || locale.ends_with("us") || locale.ends_with("ph") => {
            DateOrder::MonthDayYear
        }
        "" => DateOrder::MonthDayYear,
        _ => DateOrder::DayMonthYear,
    }
}

/// Parses `<number><suffix>` into a duration.
///
/// All minute suffixes are checked before any hour suffix; within a family the
/// first suffix that matches and leaves a parseable number wins.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let lowered = text.trim().to_lowercase();

    if let Some(minutes) = MINUTE_SUFFIXES
        .iter()
        .find_map(|suffix| parse_number_before(&lowered, suffix))
    {
        return Some(Duration::seconds_f64(minutes * 60.0));
    }

    HOUR_SUFFIXES
        .iter()
        .find_map(|s| parse_number_before(&lowered, s))
        .filter(|hours| (hours * 60.0).abs() <= MAX_DURATION_MINUTES)
        .map(|hours| Duration::seconds_f64(hours * 3600.0))
}

fn parse_number_before(lowered: &str, suffix: &str) -> Option<f64> {
    let number = lowered.strip_suffix(suffix)?.trim();
    let value: f64 = number.parse().ok()?;
    if !value.is_finite() || value.abs() > MAX_DURATION_MINUTES {
        return None;
    }
    Some(value)
}

/// Parses an absolute date and/or time as written in the given locale.
/// A bare time is taken to be on `local_today`, a bare date at midnight.
pub fn parse_local_date_time(
    text: &str,
    locale: &str,
    local_today: Date,
) -> Option<PrimitiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(time) = parse_time(text) {
        return Some(PrimitiveDateTime::new(local_today, time));
    }

    let (date_part, time_part) = match text.find([' ', 'T']) {
        Some(split) => (&text[..split], text[split + 1..].trim()),
        None => (text, ""),
    };

    let date = parse_date(date_part, date_order(locale))?;
    let time = if time_part.is_empty() {
        Time::MIDNIGHT
    } else {
        parse_time(time_part)?
    };
    Some(PrimitiveDateTime::new(date, time))
}

fn parse_date(text: &str, order: DateOrder) -> Option<Date> {
    let iso = [
        format_description!("[year]-[month padding:none]-[day padding:none]"),
        format_description!("[year]/[month padding:none]/[day padding:none]"),
    ];
    if let Some(date) = iso.iter().find_map(|f| Date::parse(text, *f).ok()) {
        return Some(date);
    }

    let localized = match order {
        DateOrder::YearMonthDay => [
            format_description!("[year].[month padding:none].[day padding:none]"),
            format_description!("[year]-[month padding:none]-[day padding:none]"),
        ],
        DateOrder::MonthDayYear => [
            format_description!("[month padding:none]/[day padding:none]/[year]"),
            format_description!("[month padding:none]-[day padding:none]-[year]"),
        ],
        DateOrder::DayMonthYear => [
            format_description!("[day padding:none]/[month padding:none]/[year]"),
            format_description!("[day padding:none].[month padding:none].[year]"),
        ],
    };
    localized.iter().find_map(|f| Date::parse(text, *f).ok())
}

fn parse_time(text: &str) -> Option<Time> {
    let formats = [
        format_description!("[hour padding:none]:[minute]"),
        format_description!("[hour padding:none]:[minute]:[second]"),
        format_description!(
            "[hour padding:none repr:12]:[minute] [period case_sensitive:false]"
        ),
        format_description!(
            "[hour padding:none repr:12]:[minute]:[second] [period case_sensitive:false]"
        ),
        format_description!("[hour padding:none repr:12]:[minute][period case_sensitive:false]"),
    ];
    formats.iter().find_map(|f| Time::parse(text, *f).ok())
}

/// Resolves a draw time expression to a UTC instant.
///
/// Durations are added to `now`. Anything else is parsed as an absolute local
/// time, truncated to whole seconds, placed at `offset` and converted to UTC.
/// `None` means the expression could not be understood.
pub fn resolve_draw_time(
    text: &str,
    locale: &str,
    offset: UtcOffset,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    if let Some(duration) = parse_duration(text) {
        return now.checked_add(duration);
    }

    let local_today = now.to_offset(offset).date();
    let local = parse_local_date_time(text, locale, local_today)?;
    let local = local.replace_nanosecond(0).ok()?;
    local
        .assume_offset(offset)
        .checked_to_offset(UtcOffset::UTC)
}
