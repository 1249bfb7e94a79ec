use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issue descriptions longer than this are truncated in their display string.
const ISSUE_DISPLAY_CHARS: usize = 50;

/// Related issues shown per article in listings.
const ARTICLE_ISSUE_PREVIEW: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub user_id: i64,
    pub about: String,
    /// Path of the avatar relative to the media root.
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: i64,
    pub issue_num: i64,
    pub title: String,
    pub description: String,
    pub slug: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.description.chars().count() > ISSUE_DISPLAY_CHARS {
            let head: String = self.description.chars().take(ISSUE_DISPLAY_CHARS).collect();
            write!(f, "{}...", head)
        } else {
            f.write_str(&self.description)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub content: String,
    /// Path of the image relative to the media root.
    pub image: String,
    pub published: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub created_by: Option<i64>,
    /// Display name of the creator, if the account still exists.
    pub creator: Option<String>,
    pub slug: String,
    pub issues: Vec<Issue>,
}

impl Article {
    pub fn is_created_by(&self, user_id: Option<i64>) -> bool {
        user_id.is_some() && self.created_by == user_id
    }

    /// Titles of the first few related issues, comma separated.
    pub fn issue_titles(&self) -> String {
        self.issues
            .iter()
            .take(ARTICLE_ISSUE_PREVIEW)
            .map(|issue| issue.title.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub text: String,
    pub article_id: i64,
    pub article_title: String,
    pub article_slug: String,
    pub author_id: Option<i64>,
    /// Display name of the author, if the account still exists.
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_authored_by(&self, user_id: Option<i64>) -> bool {
        user_id.is_some() && self.author_id == user_id
    }
}

impl fmt::Display for Comment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
