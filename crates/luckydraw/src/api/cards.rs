//! Chat cards rendered from a competition's state

use luckydraw_core::{Competition, Competitor};
use serde::Serialize;
use time::{macros::format_description, UtcOffset};
use uuid::Uuid;

use crate::{
    api::{
        activity::{ChannelAccount, ConversationAccount, InvokeActionKind, InvokeValue},
        localization::Language,
    },
    config::BotSettings,
};

pub const HERO_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.hero";
pub const ADAPTIVE_CARD_CONTENT_TYPE: &str = "application/vnd.microsoft.card.adaptive";
pub const TASK_FETCH: &str = "task/fetch";

const WINNERS_IMAGE_URL: &str =
    "https://serverpress.com/wp-content/uploads/2015/12/congrats-gif-2.gif";
const NO_WINNER_IMAGE_URL: &str =
    "https://media.tenor.co/images/5d6e7c144fb4ef5985652ea6d7219965/raw";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingActivity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationAccount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl OutgoingActivity {
    fn message() -> Self {
        Self {
            activity_type: String::from("message"),
            from: None,
            conversation: None,
            reply_to_id: None,
            text: None,
            attachments: vec![],
        }
    }

    pub fn hero_card(&self) -> Option<&HeroCard> {
        self.attachments.iter().find_map(|a| match &a.content {
            CardContent::Hero(card) => Some(card),
            CardContent::Adaptive(_) => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub content_type: String,
    pub content: CardContent,
}

impl Attachment {
    fn hero(card: HeroCard) -> Self {
        Self {
            content_type: HERO_CARD_CONTENT_TYPE.to_string(),
            content: CardContent::Hero(card),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CardContent {
    Hero(HeroCard),
    Adaptive(AdaptiveCard),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HeroCard {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<CardImage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tap: Option<CardAction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<CardAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CardAction {
    #[serde(rename = "type")]
    pub action_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub value: InvokeValue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdaptiveCard {
    #[serde(rename = "type")]
    pub card_type: String,
    pub version: String,
    pub body: Vec<TextBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<String>,
    pub wrap: bool,
}

impl TextBlock {
    fn new(text: impl Into<String>) -> Self {
        Self {
            block_type: String::from("TextBlock"),
            text: text.into(),
            size: None,
            weight: None,
            wrap: true,
        }
    }
}

/// Response to a `task/fetch` invoke, shown by the client as a dialog
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskModuleResponse {
    pub task: TaskModuleContinue,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskModuleContinue {
    #[serde(rename = "type")]
    pub response_type: String,
    pub value: TaskModuleInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskModuleInfo {
    pub title: String,
    pub height: String,
    pub width: String,
    pub card: Attachment,
}

/// Builds every card the bot posts, always under the configured bot identity
#[derive(Debug, Clone)]
pub struct CardBuilder {
    bot: BotSettings,
}

impl CardBuilder {
    pub fn new(bot: BotSettings) -> Self {
        Self { bot }
    }

    fn bot_account(&self) -> ChannelAccount {
        ChannelAccount {
            id: self.bot.id.clone(),
            name: self.bot.name.clone(),
            aad_object_id: None,
        }
    }

    /// Announcement card: gift, draw time and who joined, with join/detail
    /// buttons while the competition is open
    pub fn main_activity(&self, competition: &Competition) -> OutgoingActivity {
        let language = Language::from_locale(&competition.locale);
        let detail = invoke_action(
            None,
            InvokeActionKind::ViewDetail,
            competition.id,
            Some(TASK_FETCH),
        );
        let buttons = if competition.is_completed {
            vec![]
        } else {
            vec![
                invoke_action(
                    Some(language.join_button()),
                    InvokeActionKind::Join,
                    competition.id,
                    None,
                ),
                invoke_action(
                    Some(language.detail_button()),
                    InvokeActionKind::ViewDetail,
                    competition.id,
                    Some(TASK_FETCH),
                ),
            ]
        };

        let card = HeroCard {
            title: competition.gift.clone(),
            subtitle: Some(language.draw_summary(
                competition.winner_count,
                &format_planned_draw_time(competition),
            )),
            text: competitors_text(language, &competition.competitors),
            images: competition
                .gift_image_url
                .iter()
                .map(|url| CardImage { url: url.clone() })
                .collect(),
            tap: Some(detail),
            buttons,
        };

        OutgoingActivity {
            from: Some(self.bot_account()),
            conversation: Some(ConversationAccount {
                id: competition.origin.channel_id.clone(),
            }),
            attachments: vec![Attachment::hero(card)],
            ..OutgoingActivity::message()
        }
    }

    pub fn result_activity(&self, competition: &Competition) -> OutgoingActivity {
        let language = Language::from_locale(&competition.locale);
        let winners = competition.winners();
        let card = if winners.is_empty() {
            HeroCard {
                title: language.no_winner().to_string(),
                images: vec![CardImage {
                    url: NO_WINNER_IMAGE_URL.to_string(),
                }],
                ..HeroCard::default()
            }
        } else {
            let names: Vec<&str> = winners.iter().map(|w| w.display_name.as_str()).collect();
            HeroCard {
                title: language.winners_title(&names),
                subtitle: Some(competition.gift.clone()),
                images: vec![CardImage {
                    url: WINNERS_IMAGE_URL.to_string(),
                }],
                ..HeroCard::default()
            }
        };

        OutgoingActivity {
            from: Some(self.bot_account()),
            conversation: Some(ConversationAccount {
                id: competition.origin.channel_id.clone(),
            }),
            attachments: vec![Attachment::hero(card)],
            ..OutgoingActivity::message()
        }
    }

    /// Detail dialog: a header block followed by one block per competitor
    pub fn detail_task_module(&self, competition: &Competition) -> TaskModuleResponse {
        let language = Language::from_locale(&competition.locale);
        let mut header = TextBlock::new(format!(
            "{} - {}",
            competition.gift,
            language.draw_summary(
                competition.winner_count,
                &format_planned_draw_time(competition)
            )
        ));
        header.size = Some(String::from("Large"));
        header.weight = Some(String::from("Bolder"));

        let winners: Vec<&str> = competition.winner_ids.iter().map(String::as_str).collect();
        let body = std::iter::once(header)
            .chain(competition.competitors.iter().enumerate().map(|(i, c)| {
                let marker = if winners.contains(&c.participant_id.as_str()) {
                    language.winner_marker()
                } else {
                    ""
                };
                TextBlock::new(format!("{}. {}{}", i + 1, c.display_name, marker))
            }))
            .collect();

        TaskModuleResponse {
            task: TaskModuleContinue {
                response_type: String::from("continue"),
                value: TaskModuleInfo {
                    title: competition.gift.clone(),
                    height: String::from("medium"),
                    width: String::from("small"),
                    card: Attachment {
                        content_type: ADAPTIVE_CARD_CONTENT_TYPE.to_string(),
                        content: CardContent::Adaptive(AdaptiveCard {
                            card_type: String::from("AdaptiveCard"),
                            version: String::from("1.0"),
                            body,
                        }),
                    },
                },
            },
        }
    }

    /// Usage reply for messages that are not a valid creation command
    pub fn help_activity(
        &self,
        locale: &str,
        conversation: Option<ConversationAccount>,
        reply_to_id: Option<String>,
    ) -> OutgoingActivity {
        OutgoingActivity {
            from: Some(self.bot_account()),
            conversation,
            reply_to_id,
            text: Some(Language::from_locale(locale).help_message(&self.bot.name)),
            ..OutgoingActivity::message()
        }
    }
}

fn invoke_action(
    title: Option<&str>,
    kind: InvokeActionKind,
    competition_id: Uuid,
    invoke_type: Option<&str>,
) -> CardAction {
    CardAction {
        action_type: String::from("invoke"),
        title: title.map(str::to_string),
        value: InvokeValue {
            invoke_type: invoke_type.map(str::to_string),
            user_action: kind.as_str().to_string(),
            competition_id: Some(competition_id),
        },
    }
}

pub fn competitors_text(language: Language, competitors: &[Competitor]) -> String {
    let names: Vec<&str> = competitors
        .iter()
        .map(|c| c.display_name.as_str())
        .collect();
    language.competitors_joined(&names)
}

/// Planned draw time in the creator's offset
fn format_planned_draw_time(competition: &Competition) -> String {
    let offset = UtcOffset::from_whole_seconds((competition.offset_hours * 3600.0).round() as i32)
        .unwrap_or(UtcOffset::UTC);
    competition
        .planned_draw_time
        .to_offset(offset)
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute] UTC[offset_hour sign:mandatory]:[offset_minute]"
        ))
        .unwrap_or_else(|_| competition.planned_draw_time.to_string())
}
