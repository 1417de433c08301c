pub mod comments;
pub mod events;
pub mod followers;
pub mod groups;
pub mod messages;
pub mod notifications;
pub mod posts;
pub mod sessions;
pub mod users;

/// Clamp caller-supplied page sizes.
pub(crate) fn page(limit: u32) -> i64 {
    i64::from(limit.clamp(1, 200))
}
