use std::collections::HashMap;

use anyhow::{Result, anyhow};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params};

use gazette_types::input::{ArticleInput, IssueInput};
use gazette_types::models::{Article, Comment, Issue};
use gazette_types::slugify;

use crate::{Database, parse_timestamp, timestamp};

const ARTICLE_SELECT: &str = "SELECT a.id, a.title, a.description, a.content, a.image,
        a.published, a.updated_at, a.created_by, u.first_name || ' ' || u.last_name, a.slug
     FROM articles a
     LEFT JOIN users u ON a.created_by = u.id";

const COMMENT_SELECT: &str = "SELECT c.id, c.text, c.article_id, a.title, a.slug,
        c.author_id, u.first_name || ' ' || u.last_name, c.created_at
     FROM comments c
     JOIN articles a ON c.article_id = a.id
     LEFT JOIN users u ON c.author_id = u.id";

impl Database {
    // -- Issues --

    /// Issues ordered by title, optionally restricted to one issue number.
    pub fn list_issues(&self, issue_num: Option<i64>) -> Result<Vec<Issue>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, issue_num, title, description, slug FROM issues
                 WHERE ?1 IS NULL OR issue_num = ?1
                 ORDER BY title, id",
            )?;
            let rows = stmt
                .query_map([issue_num], issue_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_issue(&self, id: i64) -> Result<Option<Issue>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, issue_num, title, description, slug FROM issues WHERE id = ?1",
                    [id],
                    issue_row,
                )
                .optional()?)
        })
    }

    /// Slugs are not unique; the oldest issue with the slug wins.
    pub fn get_issue_by_slug(&self, slug: &str) -> Result<Option<Issue>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, issue_num, title, description, slug FROM issues
                     WHERE slug = ?1 ORDER BY id LIMIT 1",
                    [slug],
                    issue_row,
                )
                .optional()?)
        })
    }

    pub fn create_issue(&self, input: &IssueInput) -> Result<Issue> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO issues (issue_num, title, description, slug) VALUES (?1, ?2, ?3, ?4)",
                params![input.issue_num, input.title, input.description, slugify(&input.title)],
            )?;
            let id = conn.last_insert_rowid();
            conn.query_row(
                "SELECT id, issue_num, title, description, slug FROM issues WHERE id = ?1",
                [id],
                issue_row,
            )
            .map_err(Into::into)
        })
    }

    /// Update an issue, re-deriving its slug from the new title.
    pub fn update_issue(&self, id: i64, input: &IssueInput) -> Result<Issue> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE issues SET issue_num = ?1, title = ?2, description = ?3, slug = ?4 WHERE id = ?5",
                params![input.issue_num, input.title, input.description, slugify(&input.title), id],
            )?;
            if changed == 0 {
                return Err(anyhow!("Issue not found: {}", id));
            }
            conn.query_row(
                "SELECT id, issue_num, title, description, slug FROM issues WHERE id = ?1",
                [id],
                issue_row,
            )
            .map_err(Into::into)
        })
    }

    pub fn delete_issue(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM issues WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Articles --

    /// Articles ordered by publication time, oldest first, optionally
    /// restricted to an exact title.
    pub fn list_articles(&self, title: Option<&str>) -> Result<Vec<Article>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{ARTICLE_SELECT} WHERE ?1 IS NULL OR a.title = ?1 ORDER BY a.published, a.id"
            );
            query_articles(conn, &sql, params![title])
        })
    }

    pub fn articles_for_issue(&self, issue_id: i64) -> Result<Vec<Article>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{ARTICLE_SELECT}
                 JOIN article_issues ai ON ai.article_id = a.id
                 WHERE ai.issue_id = ?1
                 ORDER BY a.published, a.id"
            );
            query_articles(conn, &sql, params![issue_id])
        })
    }

    pub fn get_article(&self, id: i64) -> Result<Option<Article>> {
        self.with_conn(|conn| query_article_by_id(conn, id))
    }

    /// Slugs are not unique; the oldest article with the slug wins.
    pub fn get_article_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        self.with_conn(|conn| {
            let sql = format!("{ARTICLE_SELECT} WHERE a.slug = ?1 ORDER BY a.id LIMIT 1");
            Ok(query_articles(conn, &sql, params![slug])?.into_iter().next())
        })
    }

    pub fn create_article(&self, input: &ArticleInput, image: &str, created_by: i64) -> Result<Article> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = timestamp(Utc::now());
            tx.execute(
                "INSERT INTO articles (title, description, content, image, published, updated_at, created_by, slug)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?7)",
                params![
                    input.title,
                    input.description,
                    input.content,
                    image,
                    now,
                    created_by,
                    slugify(&input.title),
                ],
            )?;
            let id = tx.last_insert_rowid();
            link_issues(&tx, id, &input.issue_ids)?;
            tx.commit()?;

            query_article_by_id(conn, id)?.ok_or_else(|| anyhow!("Article vanished after insert: {}", id))
        })
    }

    /// Update an article. `image` replaces the stored image when given.
    pub fn update_article(&self, id: i64, input: &ArticleInput, image: Option<&str>) -> Result<Article> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE articles
                 SET title = ?1, description = ?2, content = ?3, image = COALESCE(?4, image),
                     updated_at = ?5, slug = ?6
                 WHERE id = ?7",
                params![
                    input.title,
                    input.description,
                    input.content,
                    image,
                    timestamp(Utc::now()),
                    slugify(&input.title),
                    id,
                ],
            )?;
            if changed == 0 {
                return Err(anyhow!("Article not found: {}", id));
            }
            tx.execute("DELETE FROM article_issues WHERE article_id = ?1", [id])?;
            link_issues(&tx, id, &input.issue_ids)?;
            tx.commit()?;

            query_article_by_id(conn, id)?.ok_or_else(|| anyhow!("Article vanished after update: {}", id))
        })
    }

    /// Delete an article with its comments and issue links.
    pub fn delete_article(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM articles WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    // -- Comments --

    pub fn list_comments(&self) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} ORDER BY c.id");
            query_comments(conn, &sql, params![])
        })
    }

    pub fn comments_for_article(&self, article_id: i64) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let sql = format!("{COMMENT_SELECT} WHERE c.article_id = ?1 ORDER BY c.created_at, c.id");
            query_comments(conn, &sql, params![article_id])
        })
    }

    pub fn get_comment(&self, id: i64) -> Result<Option<Comment>> {
        self.with_conn(|conn| query_comment_by_id(conn, id))
    }

    pub fn create_comment(&self, article_id: i64, author_id: i64, text: &str) -> Result<Comment> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO comments (text, article_id, author_id, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![text, article_id, author_id, timestamp(Utc::now())],
            )?;
            let id = conn.last_insert_rowid();
            query_comment_by_id(conn, id)?.ok_or_else(|| anyhow!("Comment vanished after insert: {}", id))
        })
    }

    pub fn update_comment(&self, id: i64, text: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE comments SET text = ?1 WHERE id = ?2", params![text, id])?;
            Ok(())
        })
    }

    pub fn delete_comment(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM comments WHERE id = ?1", [id])?;
            Ok(())
        })
    }
}

fn link_issues(conn: &Connection, article_id: i64, issue_ids: &[i64]) -> Result<()> {
    let mut stmt =
        conn.prepare("INSERT OR IGNORE INTO article_issues (article_id, issue_id) VALUES (?1, ?2)")?;
    for issue_id in issue_ids {
        stmt.execute(params![article_id, issue_id])?;
    }
    Ok(())
}

fn query_article_by_id(conn: &Connection, id: i64) -> Result<Option<Article>> {
    let sql = format!("{ARTICLE_SELECT} WHERE a.id = ?1");
    Ok(query_articles(conn, &sql, params![id])?.into_iter().next())
}

/// Run an article query, then batch-fetch the issues of every returned article.
fn query_articles(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Article>> {
    let mut stmt = conn.prepare(sql)?;
    let mut articles = stmt
        .query_map(params, article_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if articles.is_empty() {
        return Ok(articles);
    }

    let placeholders: Vec<String> = (1..=articles.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT ai.article_id, i.id, i.issue_num, i.title, i.description, i.slug
         FROM article_issues ai
         JOIN issues i ON ai.issue_id = i.id
         WHERE ai.article_id IN ({})
         ORDER BY i.title, i.id",
        placeholders.join(", ")
    );
    let ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
    let mut stmt = conn.prepare(&sql)?;
    let links = stmt
        .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                Issue {
                    id: row.get(1)?,
                    issue_num: row.get(2)?,
                    title: row.get(3)?,
                    description: row.get(4)?,
                    slug: row.get(5)?,
                },
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut by_article: HashMap<i64, Vec<Issue>> = HashMap::new();
    for (article_id, issue) in links {
        by_article.entry(article_id).or_default().push(issue);
    }
    for article in &mut articles {
        article.issues = by_article.remove(&article.id).unwrap_or_default();
    }

    Ok(articles)
}

fn query_comment_by_id(conn: &Connection, id: i64) -> Result<Option<Comment>> {
    let sql = format!("{COMMENT_SELECT} WHERE c.id = ?1");
    Ok(query_comments(conn, &sql, params![id])?.into_iter().next())
}

fn query_comments(conn: &Connection, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<Comment>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, comment_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn issue_row(row: &Row<'_>) -> rusqlite::Result<Issue> {
    Ok(Issue {
        id: row.get(0)?,
        issue_num: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        slug: row.get(4)?,
    })
}

fn article_row(row: &Row<'_>) -> rusqlite::Result<Article> {
    Ok(Article {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        content: row.get(3)?,
        image: row.get(4)?,
        published: parse_timestamp(&row.get::<_, String>(5)?)?,
        updated_at: parse_timestamp(&row.get::<_, String>(6)?)?,
        created_by: row.get(7)?,
        creator: row.get(8)?,
        slug: row.get(9)?,
        issues: Vec::new(),
    })
}

fn comment_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        text: row.get(1)?,
        article_id: row.get(2)?,
        article_title: row.get(3)?,
        article_slug: row.get(4)?,
        author_id: row.get(5)?,
        author: row.get(6)?,
        created_at: parse_timestamp(&row.get::<_, String>(7)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use gazette_types::input::{NewUser, ProfileInput};

    fn db_with_user() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = NewUser {
            email: "editor@example.com".into(),
            first_name: "Ed".into(),
            last_name: "Itor".into(),
            password_hash: "hash".into(),
            is_active: true,
            is_staff: true,
        };
        let id = db.create_user(&user, &ProfileInput::default()).unwrap();
        (db, id)
    }

    fn issue_input(num: i64, title: &str) -> IssueInput {
        IssueInput { issue_num: num, title: title.into(), description: "test description".into() }
    }

    fn article_input(title: &str, issue_ids: Vec<i64>) -> ArticleInput {
        ArticleInput {
            title: title.into(),
            description: "desc".into(),
            content: "body".into(),
            issue_ids,
        }
    }

    #[test]
    fn test_issue_slug_follows_title() {
        let (db, _) = db_with_user();
        let issue = db.create_issue(&issue_input(1, "Spring Edition")).unwrap();
        assert_eq!(issue.slug, "spring-edition");

        let issue = db.update_issue(issue.id, &issue_input(2, "Summer Edition")).unwrap();
        assert_eq!(issue.slug, "summer-edition");
        assert_eq!(issue.issue_num, 2);
        assert!(db.get_issue_by_slug("spring-edition").unwrap().is_none());
    }

    #[test]
    fn test_issue_num_must_be_positive() {
        let (db, _) = db_with_user();
        assert!(db.create_issue(&issue_input(0, "Zero")).is_err());
    }

    #[test]
    fn test_issues_ordered_by_title_and_filtered() {
        let (db, _) = db_with_user();
        db.create_issue(&issue_input(2, "Beta")).unwrap();
        db.create_issue(&issue_input(1, "Alpha")).unwrap();
        db.create_issue(&issue_input(3, "Gamma")).unwrap();

        let titles: Vec<String> = db.list_issues(None).unwrap().into_iter().map(|i| i.title).collect();
        assert_eq!(titles, ["Alpha", "Beta", "Gamma"]);

        let filtered = db.list_issues(Some(3)).unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].title, "Gamma");
    }

    #[test]
    fn test_article_with_issues() {
        let (db, user_id) = db_with_user();
        let a = db.create_issue(&issue_input(1, "Alpha")).unwrap();
        let b = db.create_issue(&issue_input(2, "Beta")).unwrap();

        let article = db
            .create_article(&article_input("Test title", vec![b.id, a.id]), "article-images/x.png", user_id)
            .unwrap();
        assert_eq!(article.slug, "test-title");
        assert_eq!(article.creator.as_deref(), Some("Ed Itor"));
        assert_eq!(article.issue_titles(), "Alpha, Beta");

        let in_alpha = db.articles_for_issue(a.id).unwrap();
        assert_eq!(in_alpha.len(), 1);
        assert_eq!(in_alpha[0].id, article.id);
    }

    #[test]
    fn test_update_article_keeps_image_unless_replaced() {
        let (db, user_id) = db_with_user();
        let article = db
            .create_article(&article_input("Old title", vec![]), "article-images/old.png", user_id)
            .unwrap();

        let updated = db.update_article(article.id, &article_input("New title", vec![]), None).unwrap();
        assert_eq!(updated.image, "article-images/old.png");
        assert_eq!(updated.slug, "new-title");

        let updated = db
            .update_article(article.id, &article_input("New title", vec![]), Some("article-images/new.png"))
            .unwrap();
        assert_eq!(updated.image, "article-images/new.png");
    }

    #[test]
    fn test_articles_ordered_by_published() {
        let (db, user_id) = db_with_user();
        for title in ["First", "Second", "Third"] {
            db.create_article(&article_input(title, vec![]), "img.png", user_id).unwrap();
        }
        let titles: Vec<String> = db.list_articles(None).unwrap().into_iter().map(|a| a.title).collect();
        assert_eq!(titles, ["First", "Second", "Third"]);
        assert_eq!(db.list_articles(Some("Second")).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_slug_resolves_to_oldest() {
        let (db, user_id) = db_with_user();
        let first = db.create_article(&article_input("Same", vec![]), "a.png", user_id).unwrap();
        db.create_article(&article_input("Same", vec![]), "b.png", user_id).unwrap();
        let found = db.get_article_by_slug("same").unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[test]
    fn test_deleting_article_cascades_comments() {
        let (db, user_id) = db_with_user();
        let article = db.create_article(&article_input("Doomed", vec![]), "a.png", user_id).unwrap();
        let comment = db.create_comment(article.id, user_id, "first!").unwrap();
        assert_eq!(comment.article_slug, "doomed");
        assert_eq!(comment.author.as_deref(), Some("Ed Itor"));

        db.delete_article(article.id).unwrap();
        assert!(db.get_comment(comment.id).unwrap().is_none());
    }

    #[test]
    fn test_deleting_user_orphans_content() {
        let (db, user_id) = db_with_user();
        let article = db.create_article(&article_input("Kept", vec![]), "a.png", user_id).unwrap();
        let comment = db.create_comment(article.id, user_id, "still here").unwrap();

        db.delete_user(user_id).unwrap();

        let article = db.get_article(article.id).unwrap().unwrap();
        assert!(article.created_by.is_none());
        assert!(article.creator.is_none());
        let comment = db.get_comment(comment.id).unwrap().unwrap();
        assert!(comment.author_id.is_none());
        assert!(!comment.is_authored_by(Some(user_id)));
    }
}
