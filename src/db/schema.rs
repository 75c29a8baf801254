pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- artists table
CREATE TABLE IF NOT EXISTS artists (
    artist_id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

-- releases table (release_id comes from the source, not the store)
CREATE TABLE IF NOT EXISTS releases (
    release_id INTEGER PRIMARY KEY,
    artist_id INTEGER NOT NULL REFERENCES artists(artist_id),
    release_type INTEGER NOT NULL,
    title TEXT NOT NULL,
    out_year INTEGER NOT NULL,
    out_month INTEGER NOT NULL,
    out_day INTEGER NOT NULL,
    cover_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_releases_out_date ON releases(out_year, out_month, out_day);
CREATE INDEX IF NOT EXISTS idx_releases_artist_id ON releases(artist_id);

-- users table
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY,
    username TEXT NOT NULL UNIQUE,
    today_subscribe INTEGER NOT NULL DEFAULT 0,
    releases_message_id INTEGER NOT NULL DEFAULT 0,
    releases_page_count INTEGER NOT NULL DEFAULT 0,
    today_releases_message_id INTEGER NOT NULL DEFAULT 0,
    today_releases_page_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_users_today_subscribe ON users(today_subscribe);
"#;
