//! Competition creation commands: `<mention><gift>,<winners>[,<draw time>][,<image url>]`

use time::{Duration, OffsetDateTime, UtcOffset};

use crate::resolve_draw_time;

/// Closing tag of the bot mention, everything after it is the command
pub const MENTION_END_TAG: &str = "</at>";
pub const FULLWIDTH_COMMA: char = '\u{FF0C}';
pub const DEFAULT_DRAW_DELAY: Duration = Duration::minutes(1);

/// Parsed creation parameters
#[derive(Debug, Clone, PartialEq)]
pub struct CompetitionCommand {
    pub gift: String,
    pub gift_image_url: Option<String>,
    pub winner_count: i32,
    pub planned_draw_time: OffsetDateTime,
    pub offset_hours: f64,
}

/// What the parser needs to know about the sender
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub locale: &'a str,
    /// Offset of the sender's local timestamp, if the message carried one
    pub local_offset: Option<UtcOffset>,
    pub now: OffsetDateTime,
    /// Used when the command has no draw time
    pub default_draw_delay: Duration,
}

impl<'a> CommandContext<'a> {
    pub fn new(locale: &'a str, local_offset: Option<UtcOffset>, now: OffsetDateTime) -> Self {
        Self {
            locale,
            local_offset,
            now,
            default_draw_delay: DEFAULT_DRAW_DELAY,
        }
    }
}

/// Parses a creation command. `None` means the text is not one and the
/// caller should answer with help instead.
pub fn parse_command(text: &str, context: &CommandContext<'_>) -> Option<CompetitionCommand> {
    let (_, command) = text.split_once(MENTION_END_TAG)?;

    let parts: Vec<&str> = command
        .split([',', FULLWIDTH_COMMA])
        .map(str::trim)
        .collect();
    if parts.len() < 2 {
        return None;
    }

    let gift = parts[0];
    if gift.is_empty() {
        return None;
    }
    let winner_count: i32 = parts[1].parse().ok()?;

    let offset = context.local_offset.unwrap_or(UtcOffset::UTC);
    let planned_draw_time = match parts.get(2) {
        Some(expression) => resolve_draw_time(expression, context.locale, offset, context.now)?,
        None => context.now.checked_add(context.default_draw_delay)?,
    };

    let gift_image_url = parts
        .get(3)
        .filter(|url| !url.is_empty())
        .map(|url| url.to_string());

    Some(CompetitionCommand {
        gift: gift.to_string(),
        gift_image_url,
        winner_count,
        planned_draw_time,
        offset_hours: offset.whole_seconds() as f64 / 3600.0,
    })
}
