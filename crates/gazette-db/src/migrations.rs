use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (accounts)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                email       TEXT NOT NULL UNIQUE,
                first_name  TEXT NOT NULL,
                last_name   TEXT NOT NULL,
                password    TEXT NOT NULL,
                is_active   INTEGER NOT NULL DEFAULT 0,
                is_staff    INTEGER NOT NULL DEFAULT 0,
                date_joined TEXT NOT NULL,
                last_login  TEXT
            );

            CREATE TABLE profiles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id     INTEGER NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
                about       TEXT NOT NULL DEFAULT '',
                avatar      TEXT
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (news)");
        conn.execute_batch(
            "
            CREATE TABLE issues (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                issue_num   INTEGER NOT NULL CHECK (issue_num >= 1),
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                slug        TEXT NOT NULL
            );

            CREATE INDEX idx_issues_slug ON issues(slug);

            CREATE TABLE articles (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                content     TEXT NOT NULL,
                image       TEXT NOT NULL,
                published   TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                created_by  INTEGER REFERENCES users(id) ON DELETE SET NULL,
                slug        TEXT NOT NULL
            );

            CREATE INDEX idx_articles_slug ON articles(slug);
            CREATE INDEX idx_articles_published ON articles(published);

            CREATE TABLE article_issues (
                article_id  INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                issue_id    INTEGER NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                PRIMARY KEY (article_id, issue_id)
            );

            CREATE TABLE comments (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                text        TEXT NOT NULL,
                article_id  INTEGER NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                author_id   INTEGER REFERENCES users(id) ON DELETE SET NULL,
                created_at  TEXT NOT NULL
            );

            CREATE INDEX idx_comments_article ON comments(article_id, created_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
