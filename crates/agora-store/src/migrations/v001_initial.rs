//! v001 -- Initial schema creation.
//!
//! Creates the peer registry (`servers`), local accounts and content
//! (`users`, `posts`), federated interactions (`likes`, `comments`), the
//! social graph (`follows`) and both blocklists.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Servers (peer registry, including the local sentinel row)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS servers (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    address    TEXT NOT NULL,                 -- IP / hostname, 'local' for this instance
    port       INTEGER NOT NULL,
    is_local   INTEGER NOT NULL DEFAULT 0,    -- boolean 0/1
    blocked    INTEGER NOT NULL DEFAULT 0,    -- global block, boolean 0/1
    created_at TEXT NOT NULL,                 -- RFC-3339

    UNIQUE (address, port)
);

-- At most one local row.
CREATE UNIQUE INDEX IF NOT EXISTS idx_servers_single_local
    ON servers(is_local) WHERE is_local = 1;

-- ----------------------------------------------------------------
-- Users (local accounts only)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS users (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    username   TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- ----------------------------------------------------------------
-- Posts
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS posts (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id    TEXT NOT NULL,                 -- FK -> users(id)
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_posts_created ON posts(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_posts_user ON posts(user_id, created_at DESC);

-- ----------------------------------------------------------------
-- Likes (local or foreign actor, keyed by username + server)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS likes (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    post_id    TEXT NOT NULL,                 -- FK -> posts(id)
    server_id  TEXT NOT NULL,                 -- FK -> servers(id), actor's server
    username   TEXT NOT NULL,                 -- actor username on that server
    user_id    TEXT,                          -- FK -> users(id) when the actor is local
    created_at TEXT NOT NULL,

    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    UNIQUE (post_id, server_id, username)
);

CREATE INDEX IF NOT EXISTS idx_likes_post ON likes(post_id);

-- ----------------------------------------------------------------
-- Comments
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS comments (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    post_id    TEXT NOT NULL,                 -- FK -> posts(id)
    server_id  TEXT NOT NULL,                 -- FK -> servers(id), author's server
    username   TEXT NOT NULL,
    user_id    TEXT,                          -- FK -> users(id) when the author is local
    content    TEXT NOT NULL,
    created_at TEXT NOT NULL,

    FOREIGN KEY (post_id) REFERENCES posts(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE,
    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, created_at ASC);

-- ----------------------------------------------------------------
-- Follow edges (local follower -> username on some server)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS follows (
    id          TEXT PRIMARY KEY NOT NULL,    -- UUID v4
    follower_id TEXT NOT NULL,                -- FK -> users(id)
    followee    TEXT NOT NULL,                -- username on server_id
    server_id   TEXT NOT NULL,                -- FK -> servers(id)
    created_at  TEXT NOT NULL,

    FOREIGN KEY (follower_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE,
    UNIQUE (follower_id, followee, server_id)
);

CREATE INDEX IF NOT EXISTS idx_follows_followee ON follows(followee, server_id);

-- ----------------------------------------------------------------
-- Per-user blocklists
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS user_blocks (
    id               TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    user_id          TEXT NOT NULL,              -- FK -> users(id)
    blocked_username TEXT NOT NULL,
    server_id        TEXT NOT NULL,              -- FK -> servers(id)
    created_at       TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE,
    UNIQUE (user_id, blocked_username, server_id)
);

CREATE TABLE IF NOT EXISTS server_blocks (
    id         TEXT PRIMARY KEY NOT NULL,     -- UUID v4
    user_id    TEXT NOT NULL,                 -- FK -> users(id)
    server_id  TEXT NOT NULL,                 -- FK -> servers(id)
    created_at TEXT NOT NULL,

    FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
    FOREIGN KEY (server_id) REFERENCES servers(id) ON DELETE CASCADE,
    UNIQUE (user_id, server_id)
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
