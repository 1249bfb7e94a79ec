use axum::{
    Form,
    extract::{Multipart, Path, State},
    response::Response,
};
use tracing::info;

use gazette_types::models::{Article, Comment, Issue};

use crate::error::AppError;
use crate::forms::{ArticleForm, CommentForm, FieldErrors, FormParts, IssueForm};
use crate::media::MediaKind;
use crate::session::Session;
use crate::state::{AppState, blocking};
use crate::templates::{
    ArticleDetailTemplate, ArticleFormTemplate, ArticlesTemplate, CommentFormTemplate,
    CommentItem, ConfirmDeleteTemplate, HomeTemplate, IssueDetailTemplate, IssueFormTemplate,
    IssuesTemplate,
};

/// Numeric path segments that do not parse are treated like a missing object.
fn parse_id(raw: &str) -> Result<i64, AppError> {
    raw.parse().map_err(|_| AppError::NotFound)
}

fn article_url(slug: &str) -> String {
    format!("/article-detail/{}/", slug)
}

fn issue_url(slug: &str) -> String {
    format!("/issue-detail/{}/", slug)
}

pub async fn home(mut session: Session) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&HomeTemplate { page })
}

// -- Listings --

pub async fn list_articles(
    State(state): State<AppState>,
    mut session: Session,
) -> Result<Response, AppError> {
    let articles = blocking(&state, |db| db.list_articles(None)).await?;
    let page = session.page();
    session.render(&ArticlesTemplate { page, articles })
}

pub async fn article_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let (article, comments) = blocking(&state, move |db| {
        let Some(article) = db.get_article_by_slug(&slug)? else {
            return Ok(None);
        };
        let comments = db.comments_for_article(article.id)?;
        Ok(Some((article, comments)))
    })
    .await?
    .ok_or(AppError::NotFound)?;

    let viewer = session.viewer_id();
    let comments = comments
        .into_iter()
        .map(|comment| CommentItem {
            editable: comment.is_authored_by(viewer),
            comment,
        })
        .collect();
    let editable = article.is_created_by(viewer);
    let page = session.page();
    session.render(&ArticleDetailTemplate { page, article, comments, editable })
}

pub async fn list_issues(
    State(state): State<AppState>,
    mut session: Session,
) -> Result<Response, AppError> {
    let issues = blocking(&state, |db| db.list_issues(None)).await?;
    let page = session.page();
    session.render(&IssuesTemplate { page, issues })
}

pub async fn issue_detail(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let (issue, articles) = blocking(&state, move |db| {
        let Some(issue) = db.get_issue_by_slug(&slug)? else {
            return Ok(None);
        };
        let articles = db.articles_for_issue(issue.id)?;
        Ok(Some((issue, articles)))
    })
    .await?
    .ok_or(AppError::NotFound)?;

    let page = session.page();
    session.render(&IssueDetailTemplate { page, issue, articles })
}

// -- Lookups with ownership checks --

/// The article, if it exists and the viewer created it.
fn owned_article(session: &Session, article: Option<Article>) -> Result<Article, AppError> {
    match article {
        Some(article) if article.is_created_by(session.viewer_id()) => Ok(article),
        _ => Err(AppError::NotFound),
    }
}

async fn article_by_id(state: &AppState, id: i64) -> Result<Option<Article>, AppError> {
    blocking(state, move |db| db.get_article(id)).await
}

async fn article_by_slug(state: &AppState, slug: String) -> Result<Option<Article>, AppError> {
    blocking(state, move |db| db.get_article_by_slug(&slug)).await
}

/// The comment, if it exists and the viewer wrote it.
async fn owned_comment(state: &AppState, session: &Session, id: i64) -> Result<Comment, AppError> {
    let viewer = session.viewer_id();
    match blocking(state, move |db| db.get_comment(id)).await? {
        Some(comment) if comment.is_authored_by(viewer) => Ok(comment),
        _ => Err(AppError::NotFound),
    }
}

async fn issue_by_id(state: &AppState, id: i64) -> Result<Issue, AppError> {
    blocking(state, move |db| db.get_issue(id))
        .await?
        .ok_or(AppError::NotFound)
}

// -- Articles --

fn render_article_form(
    mut session: Session,
    heading: &'static str,
    action: String,
    form: ArticleForm,
    issues: Vec<Issue>,
    errors: FieldErrors,
    current_image: Option<String>,
) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&ArticleFormTemplate {
        page,
        heading,
        action,
        form,
        issues,
        errors,
        current_image,
    })
}

pub async fn create_article_form(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let issues = blocking(&state, |db| db.list_issues(None)).await?;
    render_article_form(
        session,
        "Create article",
        "/create-article/".into(),
        ArticleForm::default(),
        issues,
        FieldErrors::default(),
        None,
    )
}

pub async fn create_article(
    State(state): State<AppState>,
    mut session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let user_id = session.require_user()?.id;
    let form = ArticleForm::from_parts(FormParts::collect(multipart).await?);
    let issues = blocking(&state, |db| db.list_issues(None)).await?;

    let (input, image) = match form.validate(&issues, true) {
        Ok(clean) => clean,
        Err(errors) => {
            return render_article_form(
                session,
                "Create article",
                "/create-article/".into(),
                form,
                issues,
                errors,
                None,
            );
        }
    };
    let image = image.ok_or_else(|| AppError::BadRequest("missing image".into()))?;

    let stored = state
        .media
        .save(MediaKind::ArticleImage, image.extension, &image.data)
        .await?;
    let image_path = stored.clone();
    let article = match blocking(&state, move |db| db.create_article(&input, &image_path, user_id)).await {
        Ok(article) => article,
        Err(e) => {
            state.media.discard(&stored).await;
            return Err(e);
        }
    };

    info!("Article {} ({}) created by user {}", article.id, article.slug, user_id);
    session.success("Successfully created article.");
    Ok(session.redirect("/articles/"))
}

pub async fn edit_article_form(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
    session: Session,
) -> Result<Response, AppError> {
    let id = parse_id(&article_id)?;
    let article = owned_article(&session, article_by_id(&state, id).await?)?;
    let issues = blocking(&state, |db| db.list_issues(None)).await?;
    render_article_form(
        session,
        "Edit article",
        format!("/edit-article/{}/", id),
        ArticleForm::for_article(&article),
        issues,
        FieldErrors::default(),
        Some(article.image),
    )
}

pub async fn edit_article(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
    mut session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let id = parse_id(&article_id)?;
    let article = owned_article(&session, article_by_id(&state, id).await?)?;
    let form = ArticleForm::from_parts(FormParts::collect(multipart).await?);
    let issues = blocking(&state, |db| db.list_issues(None)).await?;

    let (input, image) = match form.validate(&issues, false) {
        Ok(clean) => clean,
        Err(errors) => {
            return render_article_form(
                session,
                "Edit article",
                format!("/edit-article/{}/", id),
                form,
                issues,
                errors,
                Some(article.image),
            );
        }
    };

    let stored = match image {
        Some(image) => Some(
            state
                .media
                .save(MediaKind::ArticleImage, image.extension, &image.data)
                .await?,
        ),
        None => None,
    };
    let new_image = stored.clone();
    let updated = match blocking(&state, move |db| db.update_article(id, &input, new_image.as_deref())).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(path) = &stored {
                state.media.discard(path).await;
            }
            return Err(e);
        }
    };
    if stored.is_some() {
        state.media.discard(&article.image).await;
    }

    info!("Article {} updated", id);
    session.success("Article updated successfully.");
    Ok(session.redirect(&article_url(&updated.slug)))
}

pub async fn delete_article_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let article = owned_article(&session, article_by_slug(&state, slug).await?)?;
    let page = session.page();
    session.render(&ConfirmDeleteTemplate {
        page,
        kind: "article",
        object: article.to_string(),
        action: format!("/delete-article/{}/", article.slug),
        cancel: article_url(&article.slug),
    })
}

pub async fn delete_article(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let article = owned_article(&session, article_by_slug(&state, slug).await?)?;
    let id = article.id;
    blocking(&state, move |db| db.delete_article(id)).await?;
    state.media.discard(&article.image).await;

    info!("Article {} deleted", id);
    session.success("Successfully deleted article.");
    Ok(session.redirect("/"))
}

// -- Issues --

fn render_issue_form(
    mut session: Session,
    heading: &'static str,
    action: String,
    form: IssueForm,
    errors: FieldErrors,
) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&IssueFormTemplate { page, heading, action, form, errors })
}

pub async fn create_issue_form(session: Session) -> Result<Response, AppError> {
    render_issue_form(
        session,
        "Create issue",
        "/create-issue/".into(),
        IssueForm::default(),
        FieldErrors::default(),
    )
}

pub async fn create_issue(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<IssueForm>,
) -> Result<Response, AppError> {
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return render_issue_form(session, "Create issue", "/create-issue/".into(), form, errors);
        }
    };
    let issue = blocking(&state, move |db| db.create_issue(&input)).await?;

    info!("Issue {} ({}) created", issue.id, issue.slug);
    session.success("Issue created successfully.");
    Ok(session.redirect("/issues/"))
}

pub async fn edit_issue_form(
    State(state): State<AppState>,
    Path(issue_id): Path<String>,
    session: Session,
) -> Result<Response, AppError> {
    let issue = issue_by_id(&state, parse_id(&issue_id)?).await?;
    render_issue_form(
        session,
        "Edit issue",
        format!("/edit-issue/{}/", issue.id),
        IssueForm::for_issue(&issue),
        FieldErrors::default(),
    )
}

pub async fn edit_issue(
    State(state): State<AppState>,
    Path(issue_id): Path<String>,
    mut session: Session,
    Form(form): Form<IssueForm>,
) -> Result<Response, AppError> {
    let id = issue_by_id(&state, parse_id(&issue_id)?).await?.id;
    let input = match form.validate() {
        Ok(input) => input,
        Err(errors) => {
            return render_issue_form(session, "Edit issue", format!("/edit-issue/{}/", id), form, errors);
        }
    };
    let issue = blocking(&state, move |db| db.update_issue(id, &input)).await?;

    info!("Issue {} updated", id);
    session.success("Issue updated successfully.");
    Ok(session.redirect(&issue_url(&issue.slug)))
}

async fn issue_by_slug(state: &AppState, slug: String) -> Result<Issue, AppError> {
    blocking(state, move |db| db.get_issue_by_slug(&slug))
        .await?
        .ok_or(AppError::NotFound)
}

pub async fn delete_issue_form(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let issue = issue_by_slug(&state, slug).await?;
    let page = session.page();
    session.render(&ConfirmDeleteTemplate {
        page,
        kind: "issue",
        object: issue.title.clone(),
        action: format!("/delete-issue/{}/", issue.slug),
        cancel: issue_url(&issue.slug),
    })
}

pub async fn delete_issue(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let id = issue_by_slug(&state, slug).await?.id;
    blocking(&state, move |db| db.delete_issue(id)).await?;

    info!("Issue {} deleted", id);
    session.success("Successfully deleted issue.");
    Ok(session.redirect("/"))
}

// -- Comments --

fn render_comment_form(
    mut session: Session,
    heading: &'static str,
    action: String,
    article_title: String,
    article_slug: String,
    form: CommentForm,
    errors: FieldErrors,
) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&CommentFormTemplate {
        page,
        heading,
        action,
        article_title,
        article_slug,
        form,
        errors,
    })
}

pub async fn create_comment_form(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
    session: Session,
) -> Result<Response, AppError> {
    let id = parse_id(&article_id)?;
    let article = article_by_id(&state, id).await?.ok_or(AppError::NotFound)?;
    render_comment_form(
        session,
        "Add comment",
        format!("/create-comment/{}/", id),
        article.title,
        article.slug,
        CommentForm::default(),
        FieldErrors::default(),
    )
}

pub async fn create_comment(
    State(state): State<AppState>,
    Path(article_id): Path<String>,
    mut session: Session,
    Form(form): Form<CommentForm>,
) -> Result<Response, AppError> {
    let id = parse_id(&article_id)?;
    let user_id = session.require_user()?.id;
    let article = article_by_id(&state, id).await?.ok_or(AppError::NotFound)?;

    let text = match form.validate() {
        Ok(text) => text,
        Err(errors) => {
            return render_comment_form(
                session,
                "Add comment",
                format!("/create-comment/{}/", id),
                article.title,
                article.slug,
                form,
                errors,
            );
        }
    };
    let comment = blocking(&state, move |db| db.create_comment(id, user_id, &text)).await?;

    info!("Comment {} added to article {} by user {}", comment.id, id, user_id);
    session.success("Comment created successfully.");
    Ok(session.redirect(&article_url(&article.slug)))
}

pub async fn edit_comment_form(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    session: Session,
) -> Result<Response, AppError> {
    let comment = owned_comment(&state, &session, parse_id(&comment_id)?).await?;
    let form = CommentForm { text: comment.text };
    render_comment_form(
        session,
        "Edit comment",
        format!("/edit-comment/{}/", comment.id),
        comment.article_title,
        comment.article_slug,
        form,
        FieldErrors::default(),
    )
}

pub async fn edit_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    mut session: Session,
    Form(form): Form<CommentForm>,
) -> Result<Response, AppError> {
    let comment = owned_comment(&state, &session, parse_id(&comment_id)?).await?;
    let text = match form.validate() {
        Ok(text) => text,
        Err(errors) => {
            return render_comment_form(
                session,
                "Edit comment",
                format!("/edit-comment/{}/", comment.id),
                comment.article_title,
                comment.article_slug,
                form,
                errors,
            );
        }
    };
    let id = comment.id;
    blocking(&state, move |db| db.update_comment(id, &text)).await?;

    info!("Comment {} updated", id);
    session.success("Comment updated successfully.");
    Ok(session.redirect(&article_url(&comment.article_slug)))
}

pub async fn delete_comment_form(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let comment = owned_comment(&state, &session, parse_id(&comment_id)?).await?;
    let page = session.page();
    session.render(&ConfirmDeleteTemplate {
        page,
        kind: "comment",
        object: comment.to_string(),
        action: format!("/delete-comment/{}/", comment.id),
        cancel: article_url(&comment.article_slug),
    })
}

pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let id = owned_comment(&state, &session, parse_id(&comment_id)?).await?.id;
    blocking(&state, move |db| db.delete_comment(id)).await?;

    info!("Comment {} deleted", id);
    session.success("Successfully deleted comment.");
    Ok(session.redirect("/"))
}
