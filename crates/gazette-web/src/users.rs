use askama::Template;
use axum::{
    Form,
    extract::{Multipart, Path, Query, State},
    response::{Html, IntoResponse, Response},
};
use serde::Deserialize;
use tracing::{error, info, warn};

use gazette_db::is_unique_violation;
use gazette_db::models::UserRow;
use gazette_types::input::{NewUser, ProfileInput};
use gazette_types::models::Profile;

use crate::error::AppError;
use crate::forms::{
    ChangePasswordForm, ConfirmPasswordForm, FieldErrors, FormParts, LoginForm, NON_FIELD,
    PasswordResetForm, ProfileForm, RegistrationForm, SetPasswordForm, normalize_email,
};
use crate::mail::OutgoingEmail;
use crate::media::MediaKind;
use crate::password::{UserAttributes, hash_password, verify_password};
use crate::session::Session;
use crate::state::{AppState, blocking};
use crate::templates::{
    ActivationEmail, ChangePasswordTemplate, ConfirmEmailTemplate, DeleteAccountTemplate,
    EditProfileTemplate, LoginTemplate, PasswordResetConfirmTemplate, PasswordResetDoneTemplate,
    PasswordResetEmail, PasswordResetTemplate, ProfileTemplate, RegisterTemplate,
};
use crate::tokens::{ACTIVATION_SALT, PASSWORD_RESET_SALT, TokenGenerator, decode_uid, encode_uid};

pub const INVALID_LOGIN: &str =
    "Please enter a correct email and password. Note that both fields may be case-sensitive.";
pub const INVALID_ACTIVATION: &str = "<h1>Sorry, but the activation link was invalid.</h1>";
const MAIL_FAILED: &str = "We could not send the activation email. Please try again later.";

fn profile_url(email: &str) -> String {
    format!("/users/profile/{}/", urlencoding::encode(email))
}

/// Only same-site paths are followed after login.
fn safe_next(next: &str) -> &str {
    if next.starts_with('/') && !next.starts_with("//") && !next.contains('\\') {
        next
    } else {
        "/"
    }
}

fn attributes(user: &UserRow) -> UserAttributes<'_> {
    UserAttributes {
        email: &user.email,
        first_name: &user.first_name,
        last_name: &user.last_name,
    }
}

async fn user_by_id(state: &AppState, id: i64) -> Result<UserRow, AppError> {
    blocking(state, move |db| db.get_user_by_id(id))
        .await?
        .ok_or(AppError::NotFound)
}

/// The signed-in user's row, but only when `email` names them.
async fn owner(state: &AppState, session: &Session, email: &str) -> Result<UserRow, AppError> {
    let user = session.require_user()?;
    if user.email != email {
        return Err(AppError::NotFound);
    }
    user_by_id(state, user.id).await
}

// -- Login / logout --

#[derive(Debug, Default, Deserialize)]
pub struct NextQuery {
    #[serde(default)]
    pub next: String,
}

pub async fn login_form(Query(query): Query<NextQuery>, mut session: Session) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&LoginTemplate {
        page,
        form: LoginForm { next: query.next, ..Default::default() },
        errors: FieldErrors::default(),
    })
}

pub async fn login(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Response, AppError> {
    let mut errors = match form.validate() {
        Ok(_) => FieldErrors::default(),
        Err(errors) => errors,
    };

    if errors.is_empty() {
        let email = normalize_email(&form.email);
        let lookup = email.clone();
        let row = blocking(&state, move |db| db.get_user_by_email(&lookup)).await?;
        match row {
            Some(row) if row.is_active && verify_password(&form.password, &row.password) => {
                let id = row.id;
                blocking(&state, move |db| db.record_login(id)).await?;
                session.sign_in(&state.secret_key, &row)?;
                info!("User {} logged in", id);
                return Ok(session.redirect(safe_next(&form.next)));
            }
            _ => {
                warn!("Failed login for {}", email);
                errors.add(NON_FIELD, INVALID_LOGIN);
            }
        }
    }

    let page = session.page();
    session.render(&LoginTemplate {
        page,
        form: LoginForm { password: String::new(), ..form },
        errors,
    })
}

pub async fn logout(mut session: Session) -> Response {
    if let Some(user) = session.user() {
        info!("User {} logged out", user.id);
    }
    session.sign_out();
    session.redirect("/")
}

// -- Registration --

pub async fn register_form(mut session: Session) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&RegisterTemplate {
        page,
        form: RegistrationForm::default(),
        errors: FieldErrors::default(),
    })
}

fn render_register(
    mut session: Session,
    form: RegistrationForm,
    errors: FieldErrors,
) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&RegisterTemplate { page, form, errors })
}

pub async fn register(
    State(state): State<AppState>,
    mut session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let form = RegistrationForm::from_parts(FormParts::collect(multipart).await?);
    let lookup = normalize_email(&form.email);
    let taken = blocking(&state, move |db| db.email_taken(&lookup)).await?;

    let clean = match form.validate(taken) {
        Ok(clean) => clean,
        Err(errors) => return render_register(session, form, errors),
    };

    let avatar = match &clean.avatar {
        Some(image) => Some(state.media.save(MediaKind::Avatar, image.extension, &image.data).await?),
        None => None,
    };
    let new_user = NewUser {
        email: clean.email.clone(),
        first_name: clean.first_name.clone(),
        last_name: clean.last_name.clone(),
        password_hash: hash_password(&clean.password)?,
        is_active: false,
        is_staff: false,
    };
    let profile = ProfileInput { about: clean.about.clone(), avatar: avatar.clone() };

    let created = blocking(&state, move |db| {
        match db.create_user(&new_user, &profile) {
            Ok(id) => Ok(db.get_user_by_id(id)?),
            // Lost a race with another registration for the same address
            Err(e) if is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e),
        }
    })
    .await;
    let row = match created {
        Ok(Some(row)) => row,
        Ok(None) => {
            if let Some(path) = &avatar {
                state.media.discard(path).await;
            }
            let mut errors = FieldErrors::default();
            errors.add("email", "That email is already taken.");
            return render_register(session, form, errors);
        }
        Err(e) => {
            if let Some(path) = &avatar {
                state.media.discard(path).await;
            }
            return Err(e);
        }
    };

    if let Err(e) = send_activation(&state, &row).await {
        error!("Activation mail to {} failed: {:#}", row.email, e);
        let id = row.id;
        blocking(&state, move |db| db.delete_user(id)).await?;
        if let Some(path) = &avatar {
            state.media.discard(path).await;
        }
        let mut errors = FieldErrors::default();
        errors.add(NON_FIELD, MAIL_FAILED);
        return render_register(session, form, errors);
    }

    info!("Registered user {} ({}), awaiting activation", row.id, row.email);
    session.success("You are now registered! Please confirm your email.");
    let page = session.page();
    session.render(&ConfirmEmailTemplate { page, email: row.email })
}

async fn send_activation(state: &AppState, user: &UserRow) -> anyhow::Result<()> {
    let token = TokenGenerator::new(&state.secret_key, ACTIVATION_SALT, state.token_timeout)
        .make_token(user);
    let link = state.absolute_url(&format!("/users/activate/{}/{}", encode_uid(user.id), token));
    let name = user.to_user().to_string();
    let body = ActivationEmail { name: &name, link: &link }.render()?;
    state
        .mailer
        .send(OutgoingEmail {
            to: user.email.clone(),
            subject: "Activate your account.".into(),
            body,
        })
        .await
}

/// Look up the account named by a `uidb64` path segment.
async fn user_from_uid(state: &AppState, uidb64: &str) -> Result<Option<UserRow>, AppError> {
    let Some(id) = decode_uid(uidb64) else {
        return Ok(None);
    };
    blocking(state, move |db| db.get_user_by_id(id)).await
}

pub async fn activate(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    mut session: Session,
) -> Result<Response, AppError> {
    let tokens = TokenGenerator::new(&state.secret_key, ACTIVATION_SALT, state.token_timeout);
    let row = match user_from_uid(&state, &uidb64).await? {
        Some(row) if tokens.check_token(&row, &token) => row,
        _ => {
            warn!("Rejected activation link for uid {:?}", uidb64);
            return Ok(Html(INVALID_ACTIVATION).into_response());
        }
    };

    let id = row.id;
    let row = blocking(&state, move |db| {
        db.set_user_active(id, true)?;
        db.record_login(id)?;
        db.get_user_by_id(id)
    })
    .await?
    .ok_or(AppError::NotFound)?;
    session.sign_in(&state.secret_key, &row)?;

    info!("Activated user {} ({})", row.id, row.email);
    session.success("Successfully activated your account.");
    Ok(session.redirect("/"))
}

// -- Profile --

fn empty_profile(user_id: i64) -> Profile {
    Profile { id: 0, user_id, about: String::new(), avatar: None }
}

pub async fn profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let (row, profile) = blocking(&state, move |db| {
        let Some(row) = db.get_user_by_email(&email)? else {
            return Ok(None);
        };
        let profile = db.get_profile(row.id)?;
        Ok(Some((row, profile)))
    })
    .await?
    .ok_or(AppError::NotFound)?;

    let profile = profile.unwrap_or_else(|| empty_profile(row.id));
    let is_owner = session.viewer_id() == Some(row.id);
    let page = session.page();
    session.render(&ProfileTemplate { page, owner: row.to_user(), profile, is_owner })
}

async fn load_profile(state: &AppState, user_id: i64) -> Result<Profile, AppError> {
    Ok(blocking(state, move |db| db.get_profile(user_id))
        .await?
        .unwrap_or_else(|| empty_profile(user_id)))
}

pub async fn edit_profile_form(
    State(state): State<AppState>,
    Path(email): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let row = owner(&state, &session, &email).await?;
    let profile = load_profile(&state, row.id).await?;
    let form = ProfileForm { about: profile.about.clone(), ..Default::default() };
    let page = session.page();
    session.render(&EditProfileTemplate {
        page,
        owner: row.to_user(),
        profile,
        form,
        errors: FieldErrors::default(),
    })
}

pub async fn edit_profile(
    State(state): State<AppState>,
    Path(email): Path<String>,
    mut session: Session,
    multipart: Multipart,
) -> Result<Response, AppError> {
    let row = owner(&state, &session, &email).await?;
    let profile = load_profile(&state, row.id).await?;
    let form = ProfileForm::from_parts(FormParts::collect(multipart).await?);

    let upload = match form.validate() {
        Ok(upload) => upload,
        Err(errors) => {
            let page = session.page();
            return session.render(&EditProfileTemplate {
                page,
                owner: row.to_user(),
                profile,
                form,
                errors,
            });
        }
    };

    let avatar = match &upload {
        Some(image) => Some(state.media.save(MediaKind::Avatar, image.extension, &image.data).await?),
        None if form.clear_avatar => None,
        None => profile.avatar.clone(),
    };
    let input = ProfileInput { about: form.about.clone(), avatar: avatar.clone() };
    let user_id = row.id;
    if let Err(e) = blocking(&state, move |db| db.update_profile(user_id, &input)).await {
        if let Some(path) = upload.as_ref().and(avatar.as_ref()) {
            state.media.discard(path).await;
        }
        return Err(e);
    }
    if let Some(old) = &profile.avatar {
        if avatar.as_ref() != Some(old) {
            state.media.discard(old).await;
        }
    }

    info!("Profile of user {} updated", user_id);
    session.success("Your account has been updated!");
    Ok(session.redirect(&profile_url(&row.email)))
}

// -- Account deletion --

pub async fn delete_account_form(
    State(state): State<AppState>,
    Path(email): Path<String>,
    mut session: Session,
) -> Result<Response, AppError> {
    let row = owner(&state, &session, &email).await?;
    let page = session.page();
    session.render(&DeleteAccountTemplate { page, email: row.email })
}

pub async fn delete_account(
    State(state): State<AppState>,
    Path(email): Path<String>,
    mut session: Session,
    Form(form): Form<ConfirmPasswordForm>,
) -> Result<Response, AppError> {
    let row = owner(&state, &session, &email).await?;

    if !verify_password(&form.password, &row.password) {
        warn!("Wrong password confirming deletion of user {}", row.id);
        session.error("Password incorrect. Please try again.");
        let page = session.page();
        return session.render(&DeleteAccountTemplate { page, email: row.email });
    }

    let id = row.id;
    if let Some(avatar) = blocking(&state, move |db| db.delete_user(id)).await? {
        state.media.discard(&avatar).await;
    }
    session.sign_out();

    info!("User {} deleted their account", id);
    session.success("Your account was deleted.");
    Ok(session.redirect("/"))
}

// -- Passwords --

pub async fn change_password_form(mut session: Session) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&ChangePasswordTemplate { page, errors: FieldErrors::default() })
}

pub async fn change_password(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<ChangePasswordForm>,
) -> Result<Response, AppError> {
    let user_id = session.require_user()?.id;
    let row = user_by_id(&state, user_id).await?;

    let old_matches = verify_password(&form.old_password, &row.password);
    let new_password = match form.validate(old_matches, &attributes(&row)) {
        Ok(password) => password,
        Err(errors) => {
            session.error("Please correct the below errors.");
            let page = session.page();
            return session.render(&ChangePasswordTemplate { page, errors });
        }
    };

    let hash = hash_password(&new_password)?;
    let row = blocking(&state, move |db| {
        db.set_password(user_id, &hash)?;
        db.get_user_by_id(user_id)
    })
    .await?
    .ok_or(AppError::NotFound)?;
    // Older session tokens carry the previous fingerprint; keep this one valid
    session.sign_in(&state.secret_key, &row)?;

    info!("User {} changed their password", user_id);
    session.success("Your password was successfully updated!");
    Ok(session.redirect(&profile_url(&row.email)))
}

pub async fn password_reset_form(mut session: Session) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&PasswordResetTemplate {
        page,
        form: PasswordResetForm::default(),
        errors: FieldErrors::default(),
    })
}

pub async fn password_reset(
    State(state): State<AppState>,
    mut session: Session,
    Form(form): Form<PasswordResetForm>,
) -> Result<Response, AppError> {
    let email = match form.validate() {
        Ok(email) => email,
        Err(errors) => {
            let page = session.page();
            return session.render(&PasswordResetTemplate { page, form, errors });
        }
    };

    let lookup = email.clone();
    match blocking(&state, move |db| db.get_user_by_email(&lookup)).await? {
        Some(row) if row.is_active => {
            if let Err(e) = send_password_reset(&state, &row).await {
                error!("Password reset mail to {} failed: {:#}", row.email, e);
            } else {
                info!("Password reset requested for user {}", row.id);
            }
        }
        _ => info!("Password reset requested for unknown or inactive address {}", email),
    }

    let page = session.page();
    session.render(&PasswordResetDoneTemplate { page })
}

async fn send_password_reset(state: &AppState, user: &UserRow) -> anyhow::Result<()> {
    let token = TokenGenerator::new(&state.secret_key, PASSWORD_RESET_SALT, state.token_timeout)
        .make_token(user);
    let link = state.absolute_url(&format!("/users/reset/{}/{}", encode_uid(user.id), token));
    let name = user.to_user().to_string();
    let body = PasswordResetEmail { name: &name, link: &link }.render()?;
    state
        .mailer
        .send(OutgoingEmail {
            to: user.email.clone(),
            subject: "Password reset".into(),
            body,
        })
        .await
}

/// The account a reset link is for, if the link still checks out.
async fn reset_user(state: &AppState, uidb64: &str, token: &str) -> Result<Option<UserRow>, AppError> {
    let tokens = TokenGenerator::new(&state.secret_key, PASSWORD_RESET_SALT, state.token_timeout);
    Ok(user_from_uid(state, uidb64)
        .await?
        .filter(|row| tokens.check_token(row, token)))
}

fn render_reset_confirm(
    mut session: Session,
    valid: bool,
    uidb64: &str,
    token: &str,
    errors: FieldErrors,
) -> Result<Response, AppError> {
    let page = session.page();
    session.render(&PasswordResetConfirmTemplate {
        page,
        valid,
        action: format!("/users/reset/{}/{}", uidb64, token),
        errors,
    })
}

pub async fn password_reset_confirm_form(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    session: Session,
) -> Result<Response, AppError> {
    let valid = reset_user(&state, &uidb64, &token).await?.is_some();
    if !valid {
        warn!("Rejected password reset link for uid {:?}", uidb64);
    }
    render_reset_confirm(session, valid, &uidb64, &token, FieldErrors::default())
}

pub async fn password_reset_confirm(
    State(state): State<AppState>,
    Path((uidb64, token)): Path<(String, String)>,
    mut session: Session,
    Form(form): Form<SetPasswordForm>,
) -> Result<Response, AppError> {
    let Some(row) = reset_user(&state, &uidb64, &token).await? else {
        warn!("Rejected password reset submission for uid {:?}", uidb64);
        return render_reset_confirm(session, false, &uidb64, &token, FieldErrors::default());
    };

    let new_password = match form.validate(&attributes(&row)) {
        Ok(password) => password,
        Err(errors) => return render_reset_confirm(session, true, &uidb64, &token, errors),
    };

    let hash = hash_password(&new_password)?;
    let id = row.id;
    blocking(&state, move |db| db.set_password(id, &hash)).await?;

    info!("User {} reset their password", id);
    session.success("Your password has been set. You may go ahead and log in now.");
    Ok(session.redirect("/users/login/"))
}
