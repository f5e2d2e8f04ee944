use serde::Serialize;

use super::error::DomainError;

pub const MAX_TWEET_LENGTH: usize = 180;
pub const ANONYMOUS_USERNAME: &str = "Anonymous";

// 認証済みユーザーはグローバルから取らず、呼び出し側が渡す
#[derive(Debug, Clone, PartialEq)]
pub struct Author {
    pub user_id: String,
    pub display_name: Option<String>,
}

impl Author {
    pub fn new(user_id: impl Into<String>, display_name: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            display_name,
        }
    }

    pub fn username(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(ANONYMOUS_USERNAME)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TweetText(String);

impl TweetText {
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        if text.trim().is_empty() {
            return Err(DomainError::InvalidTweet("text is empty".to_string()));
        }
        let length = text.chars().count();
        if length > MAX_TWEET_LENGTH {
            return Err(DomainError::InvalidTweet(format!(
                "text is {} characters, limit is {}",
                length, MAX_TWEET_LENGTH
            )));
        }
        Ok(Self(text.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetRecord {
    pub tweet: String,
    pub created_at: i64,
    pub username: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl TweetRecord {
    pub fn new(author: &Author, text: TweetText, created_at: i64, photo: Option<String>) -> Self {
        Self {
            tweet: text.0,
            created_at,
            username: author.username().to_string(),
            user_id: author.user_id.clone(),
            photo,
        }
    }
}
