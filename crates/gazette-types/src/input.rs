//! Validated input handed from the form layer to the database layer.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueInput {
    pub issue_num: i64,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleInput {
    pub title: String,
    pub description: String,
    pub content: String,
    pub issue_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub is_active: bool,
    pub is_staff: bool,
}

/// Profile fields collected at registration or on edit.
#[derive(Debug, Clone, Default)]
pub struct ProfileInput {
    pub about: String,
    pub avatar: Option<String>,
}
