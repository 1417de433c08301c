use rusqlite::Connection;
use tracing::info;

use crate::Result;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            BEGIN;

            CREATE TABLE users (
                id              TEXT PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password        TEXT NOT NULL,
                first_name      TEXT NOT NULL,
                last_name       TEXT NOT NULL,
                date_of_birth   TEXT NOT NULL,
                nickname        TEXT,
                about_me        TEXT,
                avatar          TEXT,
                is_private      INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TABLE sessions (
                token_hash  TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                expires_at  TEXT NOT NULL
            );

            CREATE INDEX idx_sessions_expires ON sessions(expires_at);

            CREATE TABLE groups (
                id          TEXT PRIMARY KEY,
                creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE TABLE group_members (
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role        TEXT NOT NULL CHECK (role IN ('admin', 'member')),
                joined_at   TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                PRIMARY KEY (group_id, user_id)
            );

            CREATE INDEX idx_group_members_user ON group_members(user_id);

            CREATE TABLE group_invitations (
                id          TEXT PRIMARY KEY,
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                inviter_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                invitee_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            -- One open invitation per invitee; closed ones are history
            CREATE UNIQUE INDEX idx_group_invitations_pending
                ON group_invitations(group_id, invitee_id) WHERE status = 'pending';

            CREATE TABLE group_join_requests (
                id          TEXT PRIMARY KEY,
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status      TEXT NOT NULL DEFAULT 'pending'
                            CHECK (status IN ('pending', 'accepted', 'rejected')),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE UNIQUE INDEX idx_group_join_requests_pending
                ON group_join_requests(group_id, user_id) WHERE status = 'pending';

            CREATE TABLE group_events (
                id          TEXT PRIMARY KEY,
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                creator_id  TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title       TEXT NOT NULL,
                description TEXT NOT NULL,
                event_time  TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE INDEX idx_group_events_group ON group_events(group_id, event_time);

            CREATE TABLE event_responses (
                event_id    TEXT NOT NULL REFERENCES group_events(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                response    TEXT NOT NULL CHECK (response IN ('going', 'not_going')),
                updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                PRIMARY KEY (event_id, user_id)
            );

            CREATE TABLE posts (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                group_id    TEXT REFERENCES groups(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                image       TEXT,
                privacy     TEXT NOT NULL DEFAULT 'public'
                            CHECK (privacy IN ('public', 'almost_private', 'private')),
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE INDEX idx_posts_user ON posts(user_id, created_at);
            CREATE INDEX idx_posts_group ON posts(group_id, created_at);

            CREATE TABLE post_allowed_users (
                post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (post_id, user_id)
            );

            CREATE TABLE comments (
                id          TEXT PRIMARY KEY,
                post_id     TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                image       TEXT,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);

            CREATE TABLE followers (
                follower_id     TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                following_id    TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                status          TEXT NOT NULL CHECK (status IN ('pending', 'accepted')),
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                PRIMARY KEY (follower_id, following_id),
                CHECK (follower_id <> following_id)
            );

            CREATE INDEX idx_followers_following ON followers(following_id, status);

            CREATE TABLE messages (
                id          TEXT PRIMARY KEY,
                sender_id   TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                receiver_id TEXT REFERENCES users(id) ON DELETE CASCADE,
                group_id    TEXT REFERENCES groups(id) ON DELETE CASCADE,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now')),
                CHECK ((receiver_id IS NULL) <> (group_id IS NULL))
            );

            CREATE INDEX idx_messages_direct ON messages(sender_id, receiver_id, created_at);
            CREATE INDEX idx_messages_group ON messages(group_id, created_at);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                user_id         TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                kind            TEXT NOT NULL,
                actor_id        TEXT REFERENCES users(id) ON DELETE SET NULL,
                reference_id    TEXT,
                message         TEXT NOT NULL,
                is_read         INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%d %H:%M:%f', 'now'))
            );

            CREATE INDEX idx_notifications_user ON notifications(user_id, is_read, created_at);

            INSERT INTO schema_version (version) VALUES (1);

            COMMIT;
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
