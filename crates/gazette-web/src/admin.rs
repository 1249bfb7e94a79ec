//! Staff back-office: read-only listings plus account flag toggles.

use axum::{
    extract::{Path, Query, State},
    response::Response,
};
use serde::Deserialize;
use tracing::info;

use crate::error::AppError;
use crate::session::Session;
use crate::state::{AppState, blocking};
use crate::templates::{
    AdminArticlesTemplate, AdminCommentsTemplate, AdminIndexTemplate, AdminIssuesTemplate,
    AdminUsersTemplate,
};

const USERS_URL: &str = "/admin/users/";

pub async fn index(State(state): State<AppState>, mut session: Session) -> Result<Response, AppError> {
    let (article_count, issue_count, comment_count, user_count) = blocking(&state, |db| {
        Ok((
            db.list_articles(None)?.len(),
            db.list_issues(None)?.len(),
            db.list_comments()?.len(),
            db.list_users()?.len(),
        ))
    })
    .await?;
    let page = session.page();
    session.render(&AdminIndexTemplate {
        page,
        article_count,
        issue_count,
        comment_count,
        user_count,
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct ArticleFilter {
    #[serde(default)]
    pub title: String,
}

pub async fn articles(
    State(state): State<AppState>,
    Query(filter): Query<ArticleFilter>,
    mut session: Session,
) -> Result<Response, AppError> {
    let title = filter.title.trim().to_string();
    let lookup = title.clone();
    let articles = blocking(&state, move |db| {
        db.list_articles((!lookup.is_empty()).then_some(lookup.as_str()))
    })
    .await?;
    let page = session.page();
    session.render(&AdminArticlesTemplate { page, articles, title_filter: title })
}

#[derive(Debug, Default, Deserialize)]
pub struct IssueFilter {
    #[serde(default)]
    pub issue_num: String,
}

pub async fn issues(
    State(state): State<AppState>,
    Query(filter): Query<IssueFilter>,
    mut session: Session,
) -> Result<Response, AppError> {
    let raw = filter.issue_num.trim().to_string();
    let issues = if raw.is_empty() {
        blocking(&state, |db| db.list_issues(None)).await?
    } else {
        match raw.parse::<i64>() {
            Ok(num) => blocking(&state, move |db| db.list_issues(Some(num))).await?,
            // A filter value that is not a number matches nothing
            Err(_) => Vec::new(),
        }
    };
    let page = session.page();
    session.render(&AdminIssuesTemplate { page, issues, issue_num_filter: raw })
}

pub async fn comments(State(state): State<AppState>, mut session: Session) -> Result<Response, AppError> {
    let comments = blocking(&state, |db| db.list_comments()).await?;
    let page = session.page();
    session.render(&AdminCommentsTemplate { page, comments })
}

pub async fn users(State(state): State<AppState>, mut session: Session) -> Result<Response, AppError> {
    let users = blocking(&state, |db| db.list_users()).await?;
    let page = session.page();
    session.render(&AdminUsersTemplate { page, users })
}

fn parse_user_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

pub async fn toggle_active(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let id = parse_user_id(&user_id)?;
    let user = blocking(&state, move |db| {
        let Some(row) = db.get_user_by_id(id)? else {
            return Ok(None);
        };
        db.set_user_active(id, !row.is_active)?;
        Ok(Some(row))
    })
    .await?
    .ok_or(AppError::NotFound)?;

    let state_word = if user.is_active { "deactivated" } else { "activated" };
    info!("Staff {:?} {} user {}", session.viewer_id(), state_word, id);
    session.success(format!("{} was {}.", user.email, state_word));
    Ok(session.redirect(USERS_URL))
}

pub async fn toggle_staff(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let id = parse_user_id(&user_id)?;
    let user = blocking(&state, move |db| {
        let Some(row) = db.get_user_by_id(id)? else {
            return Ok(None);
        };
        db.set_user_staff(id, !row.is_staff)?;
        Ok(Some(row))
    })
    .await?
    .ok_or(AppError::NotFound)?;

    let change = if user.is_staff { "removed from staff" } else { "added to staff" };
    info!("Staff {:?}: user {} {}", session.viewer_id(), id, change);
    session.success(format!("{} was {}.", user.email, change));
    Ok(session.redirect(USERS_URL))
}
