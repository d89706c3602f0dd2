//! User facing strings, picked by the locale a message was sent with

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    English,
    Chinese,
}

impl Language {
    /// Unknown or missing locales fall back to English
    pub fn from_locale(locale: &str) -> Self {
        let language = locale.split(['-', '_']).next().unwrap_or_default();
        if language.eq_ignore_ascii_case("zh") {
            Language::Chinese
        } else {
            Language::English
        }
    }

    pub fn join_button(self) -> &'static str {
        match self {
            Language::English => "I am in",
            Language::Chinese => "我要参加",
        }
    }

    pub fn detail_button(self) -> &'static str {
        match self {
            Language::English => "Detail",
            Language::Chinese => "详情",
        }
    }

    pub fn draw_summary(self, winner_count: u32, draw_time: &str) -> String {
        match self {
            Language::English => format!("{} winner(s), drawn at {}", winner_count, draw_time),
            Language::Chinese => format!("{} 名获奖者，开奖时间 {}", winner_count, draw_time),
        }
    }

    /// "A joined", "A and B joined", "A, B and C joined", "A, B and N others joined"
    pub fn competitors_joined(self, names: &[&str]) -> String {
        match (self, names) {
            (_, []) => String::new(),
            (Language::English, [a]) => format!("{} joined this lucky draw", a),
            (Language::English, [a, b]) => format!("{} and {} joined this lucky draw", a, b),
            (Language::English, [a, b, c]) => {
                format!("{}, {} and {} joined this lucky draw", a, b, c)
            }
            (Language::English, [a, b, rest @ ..]) => format!(
                "{}, {} and {} others joined this lucky draw",
                a,
                b,
                rest.len()
            ),
            (Language::Chinese, [a]) => format!("{} 参加了抽奖", a),
            (Language::Chinese, [a, b]) => format!("{} 和 {} 参加了抽奖", a, b),
            (Language::Chinese, [a, b, c]) => format!("{}、{} 和 {} 参加了抽奖", a, b, c),
            (Language::Chinese, [a, b, rest @ ..]) => {
                format!("{}、{} 和其他 {} 人参加了抽奖", a, b, rest.len())
            }
        }
    }

    pub fn no_winner(self) -> &'static str {
        match self {
            Language::English => "No one joined, no winner",
            Language::Chinese => "无人参加，没有获奖者",
        }
    }

    pub fn winners_title(self, names: &[&str]) -> String {
        match self {
            Language::English => format!("Our winners are: {}", names.join(", ")),
            Language::Chinese => format!("获奖者是：{}", names.join("、")),
        }
    }

    pub fn winner_marker(self) -> &'static str {
        match self {
            Language::English => " (winner)",
            Language::Chinese => "（获奖）",
        }
    }

    pub fn help_message(self, bot_name: &str) -> String {
        match self {
            Language::English => format!(
                "To start a lucky draw, mention me followed by: gift, number of winners, \
                 draw time and an optional image url. For example: @{} Surface Pro, 2, 10min, \
                 https://example.com/gift.png. The draw time can be a duration such as 30min \
                 or 2h, or a date and time such as 2019-05-01 18:00.",
                bot_name
            ),
            Language::Chinese => format!(
                "发起抽奖请 @我 并依次输入：奖品、获奖人数、开奖时间和可选的图片链接。\
                 例如：@{} Surface Pro，2，10分钟，https://example.com/gift.png。\
                 开奖时间可以是时长，如 30分钟 或 2小时，也可以是日期时间，如 2019-05-01 18:00。",
                bot_name
            ),
        }
    }
}
