//! Discord webhook payload.
//!
//! Only the subset of the embed schema the notifier fills in is modelled.
//! Empty optional parts are omitted from the serialized JSON.

use crate::models::Article;
use serde::Serialize;

/// Character budget for the embed description.
pub const DESCRIPTION_MAX_CHARS: usize = 300;

pub const FOOTER_TEXT: &str = "RSS Discord Notifier";

/// Top-level webhook body.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Embed {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<EmbedAuthor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    /// RFC 3339.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<EmbedImage>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EmbedAuthor {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EmbedImage {
    pub url: String,
}

/// Embed accent color, picked from the feed category.
///
/// Categories are free-form strings; anything not listed here gets
/// [`EmbedColor::Blurple`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedColor {
    /// `Tech` and unknown categories.
    Blurple,
    /// `News`.
    Green,
    /// `Blog`.
    Yellow,
    /// `Other`.
    Pink,
}

impl EmbedColor {
    pub fn for_category(category: &str) -> Self {
        match category {
            "Tech" => EmbedColor::Blurple,
            "News" => EmbedColor::Green,
            "Blog" => EmbedColor::Yellow,
            "Other" => EmbedColor::Pink,
            _ => EmbedColor::Blurple,
        }
    }

    pub fn value(self) -> u32 {
        match self {
            EmbedColor::Blurple => 5793522,
            EmbedColor::Green => 5763719,
            EmbedColor::Yellow => 16770908,
            EmbedColor::Pink => 15418782,
        }
    }
}

impl WebhookMessage {
    /// Render the announcement for one article.
    pub fn for_article(article: &Article) -> Self {
        let fields = vec![
            EmbedField {
                name: "📰 Feed".to_string(),
                value: article.feed_name.clone(),
                inline: true,
            },
            EmbedField {
                name: "📅 Published".to_string(),
                value: article.published_at.format("%Y-%m-%d %H:%M").to_string(),
                inline: true,
            },
            EmbedField {
                name: "🏷️ Category".to_string(),
                value: article.category.clone(),
                inline: true,
            },
        ];

        let author = (!article.author.is_empty()).then(|| EmbedAuthor {
            name: article.author.clone(),
            ..EmbedAuthor::default()
        });

        let thumbnail = article
            .image_url
            .as_ref()
            .filter(|u| !u.is_empty())
            .map(|u| EmbedImage { url: u.clone() });

        let embed = Embed {
            title: article.title.clone(),
            description: article.short_description(DESCRIPTION_MAX_CHARS),
            url: article.url.clone(),
            color: EmbedColor::for_category(&article.category).value(),
            fields,
            author,
            footer: Some(EmbedFooter {
                text: FOOTER_TEXT.to_string(),
                icon_url: None,
            }),
            timestamp: article.published_at.to_rfc3339(),
            thumbnail,
        };

        WebhookMessage {
            content: String::new(),
            embeds: vec![embed],
        }
    }
}
