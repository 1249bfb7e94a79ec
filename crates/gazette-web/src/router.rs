use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
};
use tower_http::{services::ServeDir, trace::TraceLayer};

use crate::media::MAX_IMAGE_BYTES;
use crate::middleware::{load_session, require_login, require_staff};
use crate::state::AppState;
use crate::{admin, news, users};

/// Multipart bodies carry one image plus a handful of text fields.
const MAX_BODY_BYTES: usize = MAX_IMAGE_BYTES + 3 * 1024 * 1024;

pub fn build(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(news::home))
        .route("/articles/", get(news::list_articles))
        .route("/article-detail/{slug}/", get(news::article_detail))
        .route("/issues/", get(news::list_issues))
        .route("/issue-detail/{slug}/", get(news::issue_detail))
        .route("/users/login/", get(users::login_form).post(users::login))
        .route("/users/logout/", post(users::logout))
        .route("/users/register/", get(users::register_form).post(users::register))
        .route("/users/activate/{uidb64}/{token}", get(users::activate))
        .route("/users/profile/{email}/", get(users::profile))
        .route(
            "/users/password-reset/",
            get(users::password_reset_form).post(users::password_reset),
        )
        .route(
            "/users/reset/{uidb64}/{token}",
            get(users::password_reset_confirm_form).post(users::password_reset_confirm),
        );

    let member_routes = Router::new()
        .route(
            "/create-comment/{article_id}/",
            get(news::create_comment_form).post(news::create_comment),
        )
        .route(
            "/edit-article/{article_id}/",
            get(news::edit_article_form).post(news::edit_article),
        )
        .route(
            "/edit-comment/{comment_id}/",
            get(news::edit_comment_form).post(news::edit_comment),
        )
        .route(
            "/delete-article/{slug}/",
            get(news::delete_article_form).post(news::delete_article),
        )
        .route(
            "/delete-comment/{comment_id}/",
            get(news::delete_comment_form).post(news::delete_comment),
        )
        .route(
            "/users/edit-profile/{email}/",
            get(users::edit_profile_form).post(users::edit_profile),
        )
        .route(
            "/users/delete-account/{email}/",
            get(users::delete_account_form).post(users::delete_account),
        )
        .route(
            "/users/change-password/",
            get(users::change_password_form).post(users::change_password),
        )
        .route_layer(middleware::from_fn(require_login));

    let staff_routes = Router::new()
        .route(
            "/create-article/",
            get(news::create_article_form).post(news::create_article),
        )
        .route(
            "/create-issue/",
            get(news::create_issue_form).post(news::create_issue),
        )
        .route(
            "/edit-issue/{issue_id}/",
            get(news::edit_issue_form).post(news::edit_issue),
        )
        .route(
            "/delete-issue/{slug}/",
            get(news::delete_issue_form).post(news::delete_issue),
        )
        .route("/admin/", get(admin::index))
        .route("/admin/articles/", get(admin::articles))
        .route("/admin/issues/", get(admin::issues))
        .route("/admin/comments/", get(admin::comments))
        .route("/admin/users/", get(admin::users))
        .route("/admin/users/{user_id}/toggle-active/", post(admin::toggle_active))
        .route("/admin/users/{user_id}/toggle-staff/", post(admin::toggle_staff))
        .route_layer(middleware::from_fn(require_staff));

    let media = ServeDir::new(state.media.root());

    Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(staff_routes)
        .nest_service("/media", media)
        .layer(middleware::from_fn_with_state(state.clone(), load_session))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
