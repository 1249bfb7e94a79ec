//! Askama page structs. Every page carries a `Page` for the shared layout.

use askama::Template;

use gazette_types::models::{Article, Comment, Issue, Profile, User};

use crate::forms::{
    ArticleForm, CommentForm, FieldErrors, IssueForm, LoginForm, PasswordResetForm,
    ProfileForm, RegistrationForm,
};
use crate::messages::Message;

/// Layout context: the signed-in user and the flash messages to show once.
#[derive(Debug, Default)]
pub struct Page {
    pub user: Option<User>,
    pub messages: Vec<Message>,
}

impl Page {
    pub fn is_staff(&self) -> bool {
        self.user.as_ref().is_some_and(|u| u.is_staff)
    }
}

// -- News --

#[derive(Template)]
#[template(path = "home.html")]
pub struct HomeTemplate {
    pub page: Page,
}

#[derive(Template)]
#[template(path = "articles.html")]
pub struct ArticlesTemplate {
    pub page: Page,
    pub articles: Vec<Article>,
}

pub struct CommentItem {
    pub comment: Comment,
    /// The viewer wrote this comment and may edit or delete it.
    pub editable: bool,
}

#[derive(Template)]
#[template(path = "article_detail.html")]
pub struct ArticleDetailTemplate {
    pub page: Page,
    pub article: Article,
    pub comments: Vec<CommentItem>,
    pub editable: bool,
}

#[derive(Template)]
#[template(path = "issues.html")]
pub struct IssuesTemplate {
    pub page: Page,
    pub issues: Vec<Issue>,
}

#[derive(Template)]
#[template(path = "issue_detail.html")]
pub struct IssueDetailTemplate {
    pub page: Page,
    pub issue: Issue,
    pub articles: Vec<Article>,
}

#[derive(Template)]
#[template(path = "article_form.html")]
pub struct ArticleFormTemplate {
    pub page: Page,
    pub heading: &'static str,
    pub action: String,
    pub form: ArticleForm,
    pub issues: Vec<Issue>,
    pub errors: FieldErrors,
    /// Image already stored for the article being edited.
    pub current_image: Option<String>,
}

#[derive(Template)]
#[template(path = "issue_form.html")]
pub struct IssueFormTemplate {
    pub page: Page,
    pub heading: &'static str,
    pub action: String,
    pub form: IssueForm,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "comment_form.html")]
pub struct CommentFormTemplate {
    pub page: Page,
    pub heading: &'static str,
    pub action: String,
    pub article_title: String,
    pub article_slug: String,
    pub form: CommentForm,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "confirm_delete.html")]
pub struct ConfirmDeleteTemplate {
    pub page: Page,
    /// "article", "issue" or "comment".
    pub kind: &'static str,
    pub object: String,
    pub action: String,
    pub cancel: String,
}

// -- Accounts --

#[derive(Template)]
#[template(path = "users/login.html")]
pub struct LoginTemplate {
    pub page: Page,
    pub form: LoginForm,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/register.html")]
pub struct RegisterTemplate {
    pub page: Page,
    pub form: RegistrationForm,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/confirm.html")]
pub struct ConfirmEmailTemplate {
    pub page: Page,
    pub email: String,
}

#[derive(Template)]
#[template(path = "users/profile.html")]
pub struct ProfileTemplate {
    pub page: Page,
    pub owner: User,
    pub profile: Profile,
    pub is_owner: bool,
}

#[derive(Template)]
#[template(path = "users/edit_profile.html")]
pub struct EditProfileTemplate {
    pub page: Page,
    pub owner: User,
    pub profile: Profile,
    pub form: ProfileForm,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/delete_account.html")]
pub struct DeleteAccountTemplate {
    pub page: Page,
    pub email: String,
}

#[derive(Template)]
#[template(path = "users/change_password.html")]
pub struct ChangePasswordTemplate {
    pub page: Page,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/password_reset.html")]
pub struct PasswordResetTemplate {
    pub page: Page,
    pub form: PasswordResetForm,
    pub errors: FieldErrors,
}

#[derive(Template)]
#[template(path = "users/password_reset_done.html")]
pub struct PasswordResetDoneTemplate {
    pub page: Page,
}

#[derive(Template)]
#[template(path = "users/password_reset_confirm.html")]
pub struct PasswordResetConfirmTemplate {
    pub page: Page,
    /// False when the link was bad or expired; the form is then hidden.
    pub valid: bool,
    pub action: String,
    pub errors: FieldErrors,
}

// -- Email bodies --

#[derive(Template)]
#[template(path = "email/activate.txt")]
pub struct ActivationEmail<'a> {
    pub name: &'a str,
    pub link: &'a str,
}

#[derive(Template)]
#[template(path = "email/password_reset.txt")]
pub struct PasswordResetEmail<'a> {
    pub name: &'a str,
    pub link: &'a str,
}

// -- Admin --

#[derive(Template)]
#[template(path = "admin/index.html")]
pub struct AdminIndexTemplate {
    pub page: Page,
    pub article_count: usize,
    pub issue_count: usize,
    pub comment_count: usize,
    pub user_count: usize,
}

#[derive(Template)]
#[template(path = "admin/articles.html")]
pub struct AdminArticlesTemplate {
    pub page: Page,
    pub articles: Vec<Article>,
    pub title_filter: String,
}

#[derive(Template)]
#[template(path = "admin/issues.html")]
pub struct AdminIssuesTemplate {
    pub page: Page,
    pub issues: Vec<Issue>,
    pub issue_num_filter: String,
}

#[derive(Template)]
#[template(path = "admin/comments.html")]
pub struct AdminCommentsTemplate {
    pub page: Page,
    pub comments: Vec<Comment>,
}

#[derive(Template)]
#[template(path = "admin/users.html")]
pub struct AdminUsersTemplate {
    pub page: Page,
    pub users: Vec<User>,
}
