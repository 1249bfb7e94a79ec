mod common;

use axum::http::StatusCode;

use common::{PASSWORD, PNG, TestApp, link_path};
use gazette_web::session::SESSION_COOKIE;

const EMAIL: &str = "rudra@example.com";

fn registration<'a>(email: &'a str, confirmation: &'a str, password2: &'a str) -> Vec<(&'a str, &'a str)> {
    vec![
        ("email", email),
        ("email_confirmation", confirmation),
        ("password1", PASSWORD),
        ("password2", password2),
        ("first_name", "Rudra"),
        ("last_name", "Shende"),
        ("about", "Reader of news"),
    ]
}

#[tokio::test]
async fn test_register_sends_activation() {
    let mut app = TestApp::new().await;
    let response = app
        .post_multipart(
            "/users/register/",
            &registration(EMAIL, EMAIL, PASSWORD),
            &[("avatar", "me.png", PNG)],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("You are now registered! Please confirm your email."));
    assert!(response.body.contains(EMAIL));

    let row = app.state.db.get_user_by_email(EMAIL).unwrap().unwrap();
    assert!(!row.is_active);
    let profile = app.state.db.get_profile(row.id).unwrap().unwrap();
    assert_eq!(profile.about, "Reader of news");
    assert!(profile.avatar.unwrap().starts_with("avatars/"));

    let outbox = app.outbox();
    assert_eq!(outbox.len(), 1);
    assert_eq!(outbox[0].to, EMAIL);
    assert_eq!(outbox[0].subject, "Activate your account.");
    assert!(link_path(&outbox[0]).starts_with("/users/activate/"));

    // Inactive accounts cannot log in
    let login = app
        .post_form("/users/login/", &[("email", EMAIL), ("password", PASSWORD)])
        .await;
    assert_eq!(login.status, StatusCode::OK);
    assert!(login.body.contains("Please enter a correct email and password."));
}

#[tokio::test]
async fn test_activation_link_signs_in_once() {
    let mut app = TestApp::new().await;
    app.post_multipart("/users/register/", &registration(EMAIL, EMAIL, PASSWORD), &[])
        .await;
    let link = link_path(&app.outbox()[0]);

    app.get(&link).await.assert_redirect("/");
    assert!(app.has_cookie(SESSION_COOKIE));
    let home = app.get("/").await;
    assert!(home.body.contains("Successfully activated your account."));
    assert!(home.body.contains("Rudra Shende"));
    assert!(app.state.db.get_user_by_email(EMAIL).unwrap().unwrap().is_active);

    let reused = app.get(&link).await;
    assert_eq!(reused.status, StatusCode::OK);
    assert_eq!(reused.body, "<h1>Sorry, but the activation link was invalid.</h1>");
}

#[tokio::test]
async fn test_bad_activation_links() {
    let mut app = TestApp::new().await;
    for link in ["/users/activate/MQ/1-abcdef", "/users/activate/!!/x", "/users/activate/OTk5/zz-00"] {
        let response = app.get(link).await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(response.body.contains("Sorry, but the activation link was invalid."));
    }
}

#[tokio::test]
async fn test_register_validation() {
    let mut app = TestApp::new().await;
    let response = app
        .post_multipart(
            "/users/register/",
            &registration(EMAIL, "other@example.com", "something-else-7"),
            &[],
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("Emails do not match."));
    assert!(response.body.contains("The two password fields didn’t match."));
    assert!(app.state.db.get_user_by_email(EMAIL).unwrap().is_none());
    assert!(app.outbox().is_empty());
}

#[tokio::test]
async fn test_register_duplicate_email() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);
    let response = app
        .post_multipart("/users/register/", &registration(EMAIL, EMAIL, PASSWORD), &[])
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains("That email is already taken."));
}

#[tokio::test]
async fn test_login_follows_local_next() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);

    let form = app.get("/users/login/?next=/users/change-password/").await;
    assert_eq!(form.status, StatusCode::OK);
    assert!(form.body.contains("name=\"next\""));
    assert!(form.body.contains("change-password"));

    app.post_form(
        "/users/login/",
        &[("email", EMAIL), ("password", PASSWORD), ("next", "/users/change-password/")],
    )
    .await
    .assert_redirect("/users/change-password/");
    let row = app.state.db.get_user_by_email(EMAIL).unwrap().unwrap();
    assert!(row.last_login.is_some());

    let mut other = app.new_client();
    other
        .post_form(
            "/users/login/",
            &[("email", EMAIL), ("password", PASSWORD), ("next", "https://evil.example.com/")],
        )
        .await
        .assert_redirect("/");
}

#[tokio::test]
async fn test_login_rejects_wrong_password() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);
    let response = app
        .post_form("/users/login/", &[("email", EMAIL), ("password", "wrong-password")])
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body.contains(
        "Please enter a correct email and password. Note that both fields may be case-sensitive."
    ));
    assert!(!app.has_cookie(SESSION_COOKIE));
}

#[tokio::test]
async fn test_logout() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);
    app.login(EMAIL).await;
    app.post_form("/users/logout/", &[]).await.assert_redirect("/");
    assert!(!app.has_cookie(SESSION_COOKIE));
    app.get("/users/change-password/")
        .await
        .assert_redirect("/users/login/?next=%2Fusers%2Fchange-password%2F");
}

#[tokio::test]
async fn test_profile_pages() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);
    app.create_user("other@example.com", "Oth", "Er", false);

    assert_eq!(
        app.get("/users/profile/nobody@example.com/").await.status,
        StatusCode::NOT_FOUND
    );
    let public = app.get(&format!("/users/profile/{}/", EMAIL)).await;
    assert_eq!(public.status, StatusCode::OK);
    assert!(public.body.contains("Rudra Shende"));

    app.login(EMAIL).await;
    assert_eq!(
        app.get("/users/edit-profile/other@example.com/").await.status,
        StatusCode::NOT_FOUND
    );

    let edit_url = format!("/users/edit-profile/{}/", EMAIL);
    assert_eq!(app.get(&edit_url).await.status, StatusCode::OK);
    app.post_multipart(&edit_url, &[("about", "Writes letters")], &[("avatar", "me.png", PNG)])
        .await
        .assert_redirect(&format!("/users/profile/{}/", EMAIL));

    let profile = app.get(&format!("/users/profile/{}/", EMAIL)).await;
    assert!(profile.body.contains("Your account has been updated!"));
    assert!(profile.body.contains("Writes letters"));

    let user_id = app.state.db.get_user_by_email(EMAIL).unwrap().unwrap().id;
    let avatar = app.state.db.get_profile(user_id).unwrap().unwrap().avatar.unwrap();
    assert!(app.state.media.root().join(&avatar).exists());

    // Clearing removes the stored file
    app.post_multipart(&edit_url, &[("about", "Writes letters"), ("avatar-clear", "on")], &[])
        .await
        .assert_redirect(&format!("/users/profile/{}/", EMAIL));
    assert!(app.state.db.get_profile(user_id).unwrap().unwrap().avatar.is_none());
    assert!(!app.state.media.root().join(&avatar).exists());
}

#[tokio::test]
async fn test_change_password() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);
    app.login(EMAIL).await;
    let mut second_browser = app.new_client();
    second_browser.login(EMAIL).await;

    let wrong = app
        .post_form(
            "/users/change-password/",
            &[
                ("old_password", "not-my-password"),
                ("new_password1", "fresh-lemon-tree-9"),
                ("new_password2", "fresh-lemon-tree-9"),
            ],
        )
        .await;
    assert_eq!(wrong.status, StatusCode::OK);
    assert!(wrong.body.contains("Please correct the below errors."));
    assert!(wrong.body.contains("Your old password was entered incorrectly. Please enter it again."));

    app.post_form(
        "/users/change-password/",
        &[
            ("old_password", PASSWORD),
            ("new_password1", "fresh-lemon-tree-9"),
            ("new_password2", "fresh-lemon-tree-9"),
        ],
    )
    .await
    .assert_redirect(&format!("/users/profile/{}/", EMAIL));
    let profile = app.get(&format!("/users/profile/{}/", EMAIL)).await;
    assert!(profile.body.contains("Your password was successfully updated!"));

    // This browser keeps its session; the other one is signed out
    assert_eq!(app.get("/users/change-password/").await.status, StatusCode::OK);
    assert_eq!(
        second_browser.get("/users/change-password/").await.status,
        StatusCode::SEE_OTHER
    );

    let mut third = app.new_client();
    third.login_with(EMAIL, "fresh-lemon-tree-9").await;
}

#[tokio::test]
async fn test_delete_account() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);
    app.login(EMAIL).await;
    let url = format!("/users/delete-account/{}/", EMAIL);

    assert_eq!(app.get(&url).await.status, StatusCode::OK);
    let wrong = app.post_form(&url, &[("password", "nope")]).await;
    assert_eq!(wrong.status, StatusCode::OK);
    assert!(wrong.body.contains("Password incorrect. Please try again."));
    assert!(app.state.db.get_user_by_email(EMAIL).unwrap().is_some());

    app.post_form(&url, &[("password", PASSWORD)])
        .await
        .assert_redirect("/");
    assert!(!app.has_cookie(SESSION_COOKIE));
    assert!(app.get("/").await.body.contains("Your account was deleted."));
    assert!(app.state.db.get_user_by_email(EMAIL).unwrap().is_none());
}

#[tokio::test]
async fn test_password_reset() {
    let mut app = TestApp::new().await;
    app.create_user(EMAIL, "Rudra", "Shende", false);

    let unknown = app
        .post_form("/users/password-reset/", &[("email", "nobody@example.com")])
        .await;
    assert_eq!(unknown.status, StatusCode::OK);
    assert!(app.outbox().is_empty());

    let sent = app.post_form("/users/password-reset/", &[("email", EMAIL)]).await;
    assert_eq!(sent.status, StatusCode::OK);
    assert_eq!(sent.body, unknown.body);
    let link = link_path(&app.outbox()[0]);
    assert!(link.starts_with("/users/reset/"));

    let form = app.get(&link).await;
    assert!(form.body.contains("Enter new password"));

    let mismatch = app
        .post_form(&link, &[("new_password1", "fresh-lemon-tree-9"), ("new_password2", "other")])
        .await;
    assert!(mismatch.body.contains("The two password fields didn’t match."));

    app.post_form(
        &link,
        &[("new_password1", "fresh-lemon-tree-9"), ("new_password2", "fresh-lemon-tree-9")],
    )
    .await
    .assert_redirect("/users/login/");
    let login_page = app.get("/users/login/").await;
    assert!(login_page.body.contains("Your password has been set. You may go ahead and log in now."));
    app.login_with(EMAIL, "fresh-lemon-tree-9").await;

    // The link stops working once the password changed
    let reused = app.get(&link).await;
    assert!(reused.body.contains("Password reset unsuccessful"));
}

#[tokio::test]
async fn test_admin_users() {
    let mut app = TestApp::new().await;
    app.create_user("staff@example.com", "Sta", "Ff", true);
    let reader_id = app.create_user(EMAIL, "Rudra", "Shende", false);
    app.login("staff@example.com").await;

    let listing = app.get("/admin/users/").await;
    assert_eq!(listing.status, StatusCode::OK);
    assert!(listing.body.contains(EMAIL));

    app.post_form(&format!("/admin/users/{}/toggle-staff/", reader_id), &[])
        .await
        .assert_redirect("/admin/users/");
    assert!(app.state.db.get_user_by_id(reader_id).unwrap().unwrap().is_staff);

    app.post_form(&format!("/admin/users/{}/toggle-active/", reader_id), &[])
        .await
        .assert_redirect("/admin/users/");
    assert!(!app.state.db.get_user_by_id(reader_id).unwrap().unwrap().is_active);
    assert!(app.get("/admin/users/").await.body.contains("was deactivated."));
}

#[tokio::test]
async fn test_profile_links_encode_the_email() {
    const DESK: &str = "news/desk@example.com";
    const DESK_SEGMENT: &str = "news%2Fdesk%40example.com";

    let mut app = TestApp::new().await;
    app.post_multipart("/users/register/", &registration(DESK, DESK, PASSWORD), &[])
        .await;
    let link = link_path(&app.outbox()[0]);
    app.get(&link).await.assert_redirect("/");

    let profile_url = format!("/users/profile/{DESK_SEGMENT}/");
    let edit_url = format!("/users/edit-profile/{DESK_SEGMENT}/");
    let delete_url = format!("/users/delete-account/{DESK_SEGMENT}/");

    let home = app.get("/").await;
    assert!(home.body.contains(&format!(r#"href="{profile_url}""#)));

    let profile = app.get(&profile_url).await;
    assert_eq!(profile.status, StatusCode::OK);
    assert!(profile.body.contains(&format!(r#"href="{edit_url}""#)));
    assert!(profile.body.contains(&format!(r#"href="{delete_url}""#)));

    let edit = app.get(&edit_url).await;
    assert_eq!(edit.status, StatusCode::OK);
    assert!(edit.body.contains(&format!(r#"action="{edit_url}""#)));
    app.post_multipart(&edit_url, &[("about", "Desk notes")], &[])
        .await
        .assert_redirect(&profile_url);

    app.post_form(
        "/users/change-password/",
        &[
            ("old_password", PASSWORD),
            ("new_password1", "fresh-lemon-tree-9"),
            ("new_password2", "fresh-lemon-tree-9"),
        ],
    )
    .await
    .assert_redirect(&profile_url);
    assert_eq!(app.get(&profile_url).await.status, StatusCode::OK);

    let confirm = app.get(&delete_url).await;
    assert_eq!(confirm.status, StatusCode::OK);
    assert!(confirm.body.contains(&format!(r#"action="{delete_url}""#)));
    app.post_form(&delete_url, &[("password", "fresh-lemon-tree-9")])
        .await
        .assert_redirect("/");
    assert!(app.state.db.get_user_by_email(DESK).unwrap().is_none());
}
