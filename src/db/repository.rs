use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tokio_rusqlite::Connection;

use crate::error::{AppError, Result};
use crate::models::{Artist, PageCursor, PageView, Release, User};

use super::schema::SCHEMA;
use super::{CatalogStore, Paging, ALL_MONTHS};

const SELECT_RELEASES: &str = r#"SELECT r.release_id, a.artist_id, a.name, r.release_type, r.title,
                                       r.out_year, r.out_month, r.out_day, r.cover_url
                                FROM releases r
                                JOIN artists a ON r.artist_id = a.artist_id"#;

const ORDER_BY_DATE: &str = "ORDER BY r.out_year, r.out_month, r.out_day, r.release_id";

const SELECT_USERS: &str = r#"SELECT id, username, today_subscribe,
                                     releases_message_id, releases_page_count,
                                     today_releases_message_id, today_releases_page_count
                              FROM users"#;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;
        Self::init(conn).await
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    async fn query_releases(&self, sql: String, args: Vec<i64>) -> Result<Vec<Release>> {
        let releases = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let releases = stmt
                    .query_map(params_from_iter(args), release_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(releases)
            })
            .await?;
        Ok(releases)
    }

    async fn query_release_range(
        &self,
        filter: &str,
        mut args: Vec<i64>,
        paging: Paging,
    ) -> Result<Vec<Release>> {
        let sql = format!("{SELECT_RELEASES} WHERE {filter} {ORDER_BY_DATE} LIMIT ? OFFSET ?");
        args.push(paging.limit.map(i64::from).unwrap_or(-1));
        args.push(i64::from(paging.offset));
        let releases = self.query_releases(sql, args).await?;
        non_empty(releases, "releases")
    }
}

#[async_trait]
impl CatalogStore for Repository {
    // Artist operations

    async fn add_artist(&self, name: &str) -> Result<i64> {
        let owned = name.to_string();
        let id = self
            .conn
            .call(move |conn| {
                match conn.execute("INSERT INTO artists (name) VALUES (?1)", params![owned]) {
                    Ok(_) => Ok(Some(conn.last_insert_rowid())),
                    Err(e) if is_unique_violation(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        id.ok_or_else(|| AppError::ArtistExists(name.to_string()))
    }

    async fn get_artist_by_name(&self, name: &str) -> Result<Option<Artist>> {
        let name = name.to_string();
        let artist = self
            .conn
            .call(move |conn| {
                let artist = conn
                    .query_row(
                        "SELECT artist_id, name FROM artists WHERE name = ?1",
                        params![name],
                        |row| {
                            Ok(Artist {
                                id: row.get(0)?,
                                name: row.get(1)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(artist)
            })
            .await?;
        Ok(artist)
    }

    // Release operations

    async fn add_release(&self, release: &Release, artist_id: i64) -> Result<i64> {
        let release_id = release.id;
        let release = release.clone();
        let cover_url = release.cover_url.clone().filter(|url| !url.is_empty());
        let id = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT INTO releases (release_id, artist_id, release_type, title,
                                             out_year, out_month, out_day, cover_url)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
                    params![
                        release.id,
                        artist_id,
                        release.kind,
                        release.title,
                        release.date.year(),
                        release.date.month(),
                        release.date.day(),
                        cover_url,
                    ],
                );
                match inserted {
                    Ok(_) => Ok(Some(release.id)),
                    Err(e) if is_unique_violation(&e) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        id.ok_or(AppError::ReleaseExists(release_id))
    }

    async fn get_release(&self, id: i64) -> Result<Option<Release>> {
        let sql = format!("{SELECT_RELEASES} WHERE r.release_id = ?");
        let mut releases = self.query_releases(sql, vec![id]).await?;
        Ok(releases.pop())
    }

    async fn releases_by_month(&self, year: i32, month: u32, paging: Paging) -> Result<Vec<Release>> {
        if month == ALL_MONTHS {
            return self.releases_by_year(year, paging).await;
        }
        self.query_release_range(
            "r.out_year = ? AND r.out_month = ?",
            vec![i64::from(year), i64::from(month)],
            paging,
        )
        .await
    }

    async fn releases_by_year(&self, year: i32, paging: Paging) -> Result<Vec<Release>> {
        self.query_release_range("r.out_year = ?", vec![i64::from(year)], paging)
            .await
    }

    async fn releases_by_day(
        &self,
        year: i32,
        month: u32,
        day: u32,
        paging: Paging,
    ) -> Result<Vec<Release>> {
        self.query_release_range(
            "r.out_year = ? AND r.out_month = ? AND r.out_day = ?",
            vec![i64::from(year), i64::from(month), i64::from(day)],
            paging,
        )
        .await
    }

    async fn releases_missing_cover(&self) -> Result<Vec<Release>> {
        let sql = format!("{SELECT_RELEASES} WHERE r.cover_url IS NULL OR r.cover_url = '' {ORDER_BY_DATE}");
        let releases = self.query_releases(sql, Vec::new()).await?;
        non_empty(releases, "releases without cover")
    }

    async fn update_release_cover(&self, id: i64, url: &str) -> Result<()> {
        let url = url.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE releases SET cover_url = ?1 WHERE release_id = ?2",
                    params![url, id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn release_count(&self) -> Result<u64> {
        let count = self
            .conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM releases", [], |row| row.get(0))?;
                Ok(count)
            })
            .await?;
        Ok(count.max(0) as u64)
    }

    // User operations

    async fn add_user(&self, user: &User) -> Result<()> {
        let user_id = user.id;
        let user = user.clone();
        let inserted = self
            .conn
            .call(move |conn| {
                let inserted = conn.execute(
                    r#"INSERT INTO users (id, username, today_subscribe,
                                          releases_message_id, releases_page_count,
                                          today_releases_message_id, today_releases_page_count)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                    params![
                        user.id,
                        user.username,
                        user.daily_subscription,
                        user.releases.message_id,
                        user.releases.page,
                        user.today_releases.message_id,
                        user.today_releases.page,
                    ],
                );
                match inserted {
                    Ok(_) => Ok(true),
                    Err(e) if is_unique_violation(&e) => Ok(false),
                    Err(e) => Err(e.into()),
                }
            })
            .await?;
        if inserted {
            Ok(())
        } else {
            Err(AppError::UserExists(user_id))
        }
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>> {
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("{SELECT_USERS} WHERE id = ?1"),
                        params![id],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        let user = self
            .conn
            .call(move |conn| {
                let user = conn
                    .query_row(
                        &format!("{SELECT_USERS} WHERE username = ?1"),
                        params![username],
                        user_from_row,
                    )
                    .optional()?;
                Ok(user)
            })
            .await?;
        Ok(user)
    }

    async fn set_daily_subscription(&self, user_id: i64, subscribed: bool) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE users SET today_subscribe = ?1 WHERE id = ?2",
                    params![subscribed, user_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn set_page_cursor(&self, user_id: i64, view: PageView, cursor: PageCursor) -> Result<()> {
        let sql = match view {
            PageView::Releases => {
                "UPDATE users SET releases_message_id = ?1, releases_page_count = ?2 WHERE id = ?3"
            }
            PageView::TodayReleases => {
                "UPDATE users SET today_releases_message_id = ?1, today_releases_page_count = ?2 WHERE id = ?3"
            }
        };
        self.conn
            .call(move |conn| {
                conn.execute(sql, params![cursor.message_id, cursor.page, user_id])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn subscribers(&self) -> Result<Vec<User>> {
        let users = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("{SELECT_USERS} WHERE today_subscribe = 1 ORDER BY id"))?;
                let users = stmt
                    .query_map([], user_from_row)?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(users)
            })
            .await?;
        non_empty(users, "subscribers")
    }

    async fn close(&self) -> Result<()> {
        self.conn.clone().close().await?;
        Ok(())
    }
}

/// Primary key or UNIQUE collision. Foreign key failures stay errors.
fn is_unique_violation(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        }
        _ => false,
    }
}

fn non_empty<T>(rows: Vec<T>, what: &str) -> Result<Vec<T>> {
    if rows.is_empty() {
        Err(AppError::not_found(what))
    } else {
        Ok(rows)
    }
}

fn release_from_row(row: &Row) -> rusqlite::Result<Release> {
    let year: i32 = row.get(5)?;
    let month: u32 = row.get(6)?;
    let day: u32 = row.get(7)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(7, i64::from(day)))?;
    let cover_url: Option<String> = row.get(8)?;

    Ok(Release {
        id: row.get(0)?,
        artist: Artist {
            id: row.get(1)?,
            name: row.get(2)?,
        },
        kind: row.get(3)?,
        title: row.get(4)?,
        date,
        cover_url: cover_url.filter(|url| !url.is_empty()),
    })
}

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        daily_subscription: row.get(2)?,
        releases: PageCursor {
            message_id: row.get(3)?,
            page: row.get(4)?,
        },
        today_releases: PageCursor {
            message_id: row.get(5)?,
            page: row.get(6)?,
        },
    })
}
