//! Form parsing and validation.
//!
//! Each form keeps the raw submitted strings so it can be re-rendered, and
//! `validate` either returns clean input or per-field error messages.

use std::collections::{BTreeMap, HashMap};

use axum::extract::Multipart;
use bytes::Bytes;
use serde::Deserialize;
use tracing::debug;
use validator::ValidateEmail;

use gazette_types::input::{ArticleInput, IssueInput};
use gazette_types::models::{Article, Issue};
use gazette_types::slugify;

use crate::error::AppError;
use crate::media::{MAX_IMAGE_BYTES, detect_image_format};
use crate::password::{UserAttributes, validate_password};

pub const REQUIRED: &str = "This field is required.";
pub const PASSWORD_MISMATCH: &str = "The two password fields didn’t match.";

/// Key for errors that belong to the form as a whole.
pub const NON_FIELD: &str = "__all__";

const ISSUE_TITLE_MAX: usize = 100;
const ARTICLE_TITLE_MAX: usize = 300;
const NAME_MAX: usize = 150;
const EMAIL_MAX: usize = 254;

#[derive(Debug, Default)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn non_field(&self) -> &[String] {
        self.get(NON_FIELD)
    }

    pub fn has(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn finish<T>(self, value: T) -> Result<T, FieldErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

// -- Raw multipart collection --

#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub data: Bytes,
}

/// Every part of a multipart body, text fields by name and non-empty files by name.
#[derive(Debug, Default)]
pub struct FormParts {
    fields: HashMap<String, Vec<String>>,
    files: HashMap<String, Upload>,
}

impl FormParts {
    pub async fn collect(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut parts = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.body_text()))?
        {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    let data = field
                        .bytes()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    if !data.is_empty() {
                        parts.files.insert(name, Upload { file_name, data });
                    }
                }
                None => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| AppError::BadRequest(e.body_text()))?;
                    parts.fields.entry(name).or_default().push(text);
                }
            }
        }
        Ok(parts)
    }

    /// First value of a field with surrounding whitespace removed.
    pub fn text(&self, name: &str) -> String {
        self.raw(name).trim().to_string()
    }

    /// First value of a field exactly as submitted.
    pub fn raw(&self, name: &str) -> String {
        self.values(name).first().cloned().unwrap_or_default()
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn checked(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    pub fn take_file(&mut self, name: &str) -> Option<Upload> {
        self.files.remove(name)
    }
}

/// An uploaded file that passed image validation.
#[derive(Debug, Clone)]
pub struct ValidImage {
    pub extension: &'static str,
    pub data: Bytes,
}

fn clean_image(
    upload: Option<&Upload>,
    required: bool,
    field: &'static str,
    errors: &mut FieldErrors,
) -> Option<ValidImage> {
    let Some(upload) = upload else {
        if required {
            errors.add(field, REQUIRED);
        }
        return None;
    };
    if upload.data.len() > MAX_IMAGE_BYTES {
        debug!("Rejected oversized upload {:?} ({} bytes)", upload.file_name, upload.data.len());
        errors.add(field, "The image is larger than 5 MB.");
        return None;
    }
    match detect_image_format(&upload.data) {
        Some(extension) => Some(ValidImage { extension, data: upload.data.clone() }),
        None => {
            debug!("Rejected upload {:?}: not a recognised image", upload.file_name);
            errors.add(
                field,
                "Upload a valid image. The file you uploaded was either not an image or a corrupted image.",
            );
            None
        }
    }
}

fn required(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.add(field, REQUIRED);
    }
}

fn max_length(errors: &mut FieldErrors, field: &'static str, value: &str, max: usize) {
    let len = value.chars().count();
    if len > max {
        errors.add(
            field,
            format!("Ensure this value has at most {} characters (it has {}).", max, len),
        );
    }
}

fn sluggable_title(errors: &mut FieldErrors, value: &str) {
    if !value.is_empty() && slugify(value).is_empty() {
        errors.add("title", "Title must contain at least one letter or digit.");
    }
}

fn clean_email(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.is_empty() {
        errors.add(field, REQUIRED);
    } else if value.chars().count() > EMAIL_MAX || !value.validate_email() {
        errors.add(field, "Enter a valid email address.");
    }
}

/// Lowercase the domain part, as addresses are stored and looked up that way.
pub fn normalize_email(email: &str) -> String {
    match email.trim().rsplit_once('@') {
        Some((local, domain)) => format!("{}@{}", local, domain.to_lowercase()),
        None => email.trim().to_string(),
    }
}

// -- News --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IssueForm {
    pub title: String,
    pub description: String,
    pub issue_num: String,
}

impl IssueForm {
    pub fn for_issue(issue: &Issue) -> Self {
        Self {
            title: issue.title.clone(),
            description: issue.description.clone(),
            issue_num: issue.issue_num.to_string(),
        }
    }

    pub fn validate(&self) -> Result<IssueInput, FieldErrors> {
        let mut errors = FieldErrors::default();
        let title = self.title.trim();
        let description = self.description.trim();

        required(&mut errors, "title", title);
        max_length(&mut errors, "title", title, ISSUE_TITLE_MAX);
        sluggable_title(&mut errors, title);
        required(&mut errors, "description", description);

        let issue_num = match self.issue_num.trim() {
            "" => {
                errors.add("issue_num", REQUIRED);
                0
            }
            raw => match raw.parse::<i64>() {
                Ok(n) if n >= 1 => n,
                Ok(_) => {
                    errors.add("issue_num", "Ensure this value is greater than or equal to 1.");
                    0
                }
                Err(_) => {
                    errors.add("issue_num", "Enter a whole number.");
                    0
                }
            },
        };

        errors.finish(IssueInput {
            issue_num,
            title: title.to_string(),
            description: description.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct ArticleForm {
    pub title: String,
    pub description: String,
    pub content: String,
    pub issues: Vec<String>,
    pub image: Option<Upload>,
}

impl ArticleForm {
    pub fn from_parts(mut parts: FormParts) -> Self {
        Self {
            title: parts.text("title"),
            description: parts.text("description"),
            content: parts.text("content"),
            issues: parts.values("issues").to_vec(),
            image: parts.take_file("image"),
        }
    }

    pub fn for_article(article: &Article) -> Self {
        Self {
            title: article.title.clone(),
            description: article.description.clone(),
            content: article.content.clone(),
            issues: article.issues.iter().map(|i| i.id.to_string()).collect(),
            image: None,
        }
    }

    /// Whether the issue is selected, for re-rendering the multi-select.
    pub fn has_issue(&self, id: &i64) -> bool {
        let id = id.to_string();
        self.issues.iter().any(|v| *v == id)
    }

    /// Validate against the issues that exist. The image is required when
    /// creating, optional when editing.
    pub fn validate(
        &self,
        known_issues: &[Issue],
        image_required: bool,
    ) -> Result<(ArticleInput, Option<ValidImage>), FieldErrors> {
        let mut errors = FieldErrors::default();

        required(&mut errors, "title", &self.title);
        max_length(&mut errors, "title", &self.title, ARTICLE_TITLE_MAX);
        sluggable_title(&mut errors, &self.title);
        required(&mut errors, "description", &self.description);
        required(&mut errors, "content", &self.content);

        let mut issue_ids = Vec::with_capacity(self.issues.len());
        for raw in &self.issues {
            match raw.parse::<i64>() {
                Ok(id) if known_issues.iter().any(|i| i.id == id) => {
                    if !issue_ids.contains(&id) {
                        issue_ids.push(id);
                    }
                }
                _ => errors.add(
                    "issues",
                    format!("Select a valid choice. {} is not one of the available choices.", raw),
                ),
            }
        }

        let image = clean_image(self.image.as_ref(), image_required, "image", &mut errors);

        errors.finish((
            ArticleInput {
                title: self.title.clone(),
                description: self.description.clone(),
                content: self.content.clone(),
                issue_ids,
            },
            image,
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

impl CommentForm {
    pub fn validate(&self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::default();
        let text = self.text.trim();
        required(&mut errors, "text", text);
        errors.finish(text.to_string())
    }
}

// -- Accounts --

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub next: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(String, String), FieldErrors> {
        let mut errors = FieldErrors::default();
        clean_email(&mut errors, "email", self.email.trim());
        required(&mut errors, "password", &self.password);
        errors.finish((normalize_email(&self.email), self.password.clone()))
    }
}

#[derive(Debug, Default)]
pub struct RegistrationForm {
    pub email: String,
    pub email_confirmation: String,
    pub password1: String,
    pub password2: String,
    pub first_name: String,
    pub last_name: String,
    pub about: String,
    pub avatar: Option<Upload>,
}

/// Clean registration data. The password is still plain text here.
#[derive(Debug)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub about: String,
    pub avatar: Option<ValidImage>,
}

impl RegistrationForm {
    pub fn from_parts(mut parts: FormParts) -> Self {
        Self {
            email: parts.text("email"),
            email_confirmation: parts.text("email_confirmation"),
            password1: parts.raw("password1"),
            password2: parts.raw("password2"),
            first_name: parts.text("first_name"),
            last_name: parts.text("last_name"),
            about: parts.text("about"),
            avatar: parts.take_file("avatar"),
        }
    }

    /// `email_taken` reports whether the normalized address is already registered.
    pub fn validate(&self, email_taken: bool) -> Result<Registration, FieldErrors> {
        let mut errors = FieldErrors::default();
        let email = normalize_email(&self.email);

        clean_email(&mut errors, "email", &self.email);
        if email_taken {
            errors.add("email", "That email is already taken.");
        }
        if self.email_confirmation.is_empty() {
            errors.add("email_confirmation", REQUIRED);
        } else if self.email_confirmation != self.email {
            errors.add("email_confirmation", "Emails do not match.");
        }

        required(&mut errors, "first_name", &self.first_name);
        max_length(&mut errors, "first_name", &self.first_name, NAME_MAX);
        required(&mut errors, "last_name", &self.last_name);
        max_length(&mut errors, "last_name", &self.last_name, NAME_MAX);

        required(&mut errors, "password1", &self.password1);
        required(&mut errors, "password2", &self.password2);
        if !self.password1.is_empty() && !self.password2.is_empty() {
            if self.password1 != self.password2 {
                errors.add("password2", PASSWORD_MISMATCH);
            } else {
                let attrs = UserAttributes {
                    email: &email,
                    first_name: &self.first_name,
                    last_name: &self.last_name,
                };
                for message in validate_password(&self.password2, &attrs) {
                    errors.add("password2", message);
                }
            }
        }

        let avatar = clean_image(self.avatar.as_ref(), false, "avatar", &mut errors);

        errors.finish(Registration {
            email,
            password: self.password1.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            about: self.about.clone(),
            avatar,
        })
    }
}

#[derive(Debug, Default)]
pub struct ProfileForm {
    pub about: String,
    pub avatar: Option<Upload>,
    /// "Clear" checkbox next to an existing avatar.
    pub clear_avatar: bool,
}

impl ProfileForm {
    pub fn from_parts(mut parts: FormParts) -> Self {
        Self {
            about: parts.text("about"),
            avatar: parts.take_file("avatar"),
            clear_avatar: parts.checked("avatar-clear"),
        }
    }

    pub fn validate(&self) -> Result<Option<ValidImage>, FieldErrors> {
        let mut errors = FieldErrors::default();
        let avatar = clean_image(self.avatar.as_ref(), false, "avatar", &mut errors);
        if avatar.is_some() && self.clear_avatar {
            errors.add(
                "avatar",
                "Please either submit a file or check the clear checkbox, not both.",
            );
        }
        errors.finish(avatar)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfirmPasswordForm {
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ChangePasswordForm {
    pub old_password: String,
    pub new_password1: String,
    pub new_password2: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetPasswordForm {
    pub new_password1: String,
    pub new_password2: String,
}

impl SetPasswordForm {
    /// Check both new-password fields match and pass the validators.
    pub fn validate(&self, attrs: &UserAttributes<'_>) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::default();
        clean_new_password(&mut errors, &self.new_password1, &self.new_password2, attrs);
        errors.finish(self.new_password1.clone())
    }
}

impl ChangePasswordForm {
    /// `old_matches` reports whether `old_password` matched the stored hash.
    pub fn validate(&self, old_matches: bool, attrs: &UserAttributes<'_>) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::default();
        if self.old_password.is_empty() {
            errors.add("old_password", REQUIRED);
        } else if !old_matches {
            errors.add(
                "old_password",
                "Your old password was entered incorrectly. Please enter it again.",
            );
        }
        clean_new_password(&mut errors, &self.new_password1, &self.new_password2, attrs);
        errors.finish(self.new_password1.clone())
    }
}

fn clean_new_password(errors: &mut FieldErrors, first: &str, second: &str, attrs: &UserAttributes<'_>) {
    required(errors, "new_password1", first);
    required(errors, "new_password2", second);
    if first.is_empty() || second.is_empty() {
        return;
    }
    if first != second {
        errors.add("new_password2", PASSWORD_MISMATCH);
        return;
    }
    for message in validate_password(second, attrs) {
        errors.add("new_password2", message);
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PasswordResetForm {
    pub email: String,
}

impl PasswordResetForm {
    pub fn validate(&self) -> Result<String, FieldErrors> {
        let mut errors = FieldErrors::default();
        clean_email(&mut errors, "email", self.email.trim());
        errors.finish(normalize_email(&self.email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-data";

    fn issue(id: i64) -> Issue {
        Issue {
            id,
            issue_num: id,
            title: format!("Issue {}", id),
            description: "d".into(),
            slug: format!("issue-{}", id),
        }
    }

    fn registration() -> RegistrationForm {
        RegistrationForm {
            email: "Rudra@Example.COM".into(),
            email_confirmation: "Rudra@Example.COM".into(),
            password1: "plum-orchard-42".into(),
            password2: "plum-orchard-42".into(),
            first_name: "Rudra".into(),
            last_name: "Shende".into(),
            about: String::new(),
            avatar: None,
        }
    }

    #[test]
    fn test_issue_form() {
        let form = IssueForm {
            title: " Spring ".into(),
            description: "Fresh".into(),
            issue_num: "3".into(),
        };
        let input = form.validate().unwrap();
        assert_eq!(input.title, "Spring");
        assert_eq!(input.issue_num, 3);

        let errors = IssueForm { issue_num: "0".into(), ..Default::default() }.validate().unwrap_err();
        assert_eq!(errors.get("title"), [REQUIRED]);
        assert_eq!(errors.get("description"), [REQUIRED]);
        assert_eq!(errors.get("issue_num"), ["Ensure this value is greater than or equal to 1."]);

        let errors = IssueForm { issue_num: "two".into(), ..Default::default() }.validate().unwrap_err();
        assert_eq!(errors.get("issue_num"), ["Enter a whole number."]);
    }

    #[test]
    fn test_issue_title_length() {
        let form = IssueForm {
            title: "x".repeat(101),
            description: "d".into(),
            issue_num: "1".into(),
        };
        let errors = form.validate().unwrap_err();
        assert_eq!(
            errors.get("title"),
            ["Ensure this value has at most 100 characters (it has 101)."]
        );
    }

    #[test]
    fn test_article_form_requires_image_on_create() {
        let form = ArticleForm {
            title: "Title".into(),
            description: "d".into(),
            content: "c".into(),
            issues: vec!["1".into()],
            image: None,
        };
        let errors = form.validate(&[issue(1)], true).unwrap_err();
        assert_eq!(errors.get("image"), [REQUIRED]);

        let (input, image) = form.validate(&[issue(1)], false).unwrap();
        assert_eq!(input.issue_ids, vec![1]);
        assert!(image.is_none());
    }

    #[test]
    fn test_oversized_image_is_rejected() {
        let mut data = PNG.to_vec();
        data.resize(MAX_IMAGE_BYTES + 1, 0);
        let upload = Upload { file_name: "huge.png".into(), data: Bytes::from(data) };
        let mut errors = FieldErrors::default();
        assert!(clean_image(Some(&upload), true, "image", &mut errors).is_none());
        assert_eq!(errors.get("image"), ["The image is larger than 5 MB."]);
    }

    #[test]
    fn test_article_form_checks_image_and_issues() {
        let mut form = ArticleForm {
            title: "Title".into(),
            description: "d".into(),
            content: "c".into(),
            issues: vec!["9".into()],
            image: Some(Upload { file_name: "notes.txt".into(), data: Bytes::from_static(b"hello") }),
        };
        let errors = form.validate(&[issue(1)], true).unwrap_err();
        assert!(errors.has("image"));
        assert_eq!(
            errors.get("issues"),
            ["Select a valid choice. 9 is not one of the available choices."]
        );

        form.issues = vec!["1".into(), "1".into()];
        form.image = Some(Upload { file_name: "pic.png".into(), data: Bytes::from_static(PNG) });
        let (input, image) = form.validate(&[issue(1)], true).unwrap();
        assert_eq!(input.issue_ids, vec![1]);
        assert_eq!(image.unwrap().extension, "png");
        assert!(form.has_issue(&1));
        assert!(!form.has_issue(&2));
    }

    #[test]
    fn test_title_needs_slug_characters() {
        let form = ArticleForm {
            title: "?!".into(),
            description: "d".into(),
            content: "c".into(),
            ..Default::default()
        };
        let errors = form.validate(&[], false).unwrap_err();
        assert_eq!(errors.get("title"), ["Title must contain at least one letter or digit."]);
    }

    #[test]
    fn test_comment_form() {
        assert_eq!(CommentForm { text: " hi ".into() }.validate().unwrap(), "hi");
        let errors = CommentForm { text: "   ".into() }.validate().unwrap_err();
        assert_eq!(errors.get("text"), [REQUIRED]);
    }

    #[test]
    fn test_registration_normalizes_email() {
        let clean = registration().validate(false).unwrap();
        assert_eq!(clean.email, "Rudra@example.com");
        assert_eq!(clean.password, "plum-orchard-42");
    }

    #[test]
    fn test_registration_errors() {
        let form = RegistrationForm {
            email_confirmation: "other@example.com".into(),
            password2: "different-password".into(),
            first_name: String::new(),
            ..registration()
        };
        let errors = form.validate(true).unwrap_err();
        assert_eq!(errors.get("email"), ["That email is already taken."]);
        assert_eq!(errors.get("email_confirmation"), ["Emails do not match."]);
        assert_eq!(errors.get("first_name"), [REQUIRED]);
        assert_eq!(errors.get("password2"), [PASSWORD_MISMATCH]);
    }

    #[test]
    fn test_registration_runs_password_validators() {
        let form = RegistrationForm {
            password1: "12345678".into(),
            password2: "12345678".into(),
            ..registration()
        };
        let errors = form.validate(false).unwrap_err();
        assert!(errors.get("password2").contains(&"This password is too common.".to_string()));
        assert!(errors.get("password2").contains(&"This password is entirely numeric.".to_string()));
    }

    #[test]
    fn test_registration_rejects_bad_email() {
        let form = RegistrationForm {
            email: "not-an-email".into(),
            email_confirmation: "not-an-email".into(),
            ..registration()
        };
        let errors = form.validate(false).unwrap_err();
        assert_eq!(errors.get("email"), ["Enter a valid email address."]);
    }

    #[test]
    fn test_change_password_form() {
        let attrs = UserAttributes { email: "a@example.com", first_name: "Ann", last_name: "Lee" };
        let form = ChangePasswordForm {
            old_password: "old".into(),
            new_password1: "plum-orchard-42".into(),
            new_password2: "plum-orchard-42".into(),
        };
        assert_eq!(form.validate(true, &attrs).unwrap(), "plum-orchard-42");

        let errors = form.validate(false, &attrs).unwrap_err();
        assert_eq!(
            errors.get("old_password"),
            ["Your old password was entered incorrectly. Please enter it again."]
        );
    }

    #[test]
    fn test_profile_form_clear_and_upload_conflict() {
        let form = ProfileForm {
            about: String::new(),
            avatar: Some(Upload { file_name: "a.png".into(), data: Bytes::from_static(PNG) }),
            clear_avatar: true,
        };
        assert!(form.validate().unwrap_err().has("avatar"));
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email(" Ann@EXAMPLE.com "), "Ann@example.com");
        assert_eq!(normalize_email("no-at-sign"), "no-at-sign");
    }
}
