use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::models::{
    Attendance, ChatTarget, FollowStatus, MemberRole, NotificationKind, PostPrivacy,
    RequestStatus,
};

/// Uniform JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Returned by both register and login.
#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

// -- Users --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub nickname: Option<String>,
    pub about_me: Option<String>,
    pub avatar: Option<String>,
    pub is_private: bool,
    pub created_at: DateTime<Utc>,
}

/// The part of a user that is always visible, even for private profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProfileResponse {
    pub summary: UserSummary,
    pub is_private: bool,
    /// `None` when the viewer may not see the full profile.
    pub profile: Option<UserResponse>,
    pub followers: i64,
    pub following: i64,
    /// The viewer's follow edge towards this user.
    pub follow_status: Option<FollowStatus>,
}

/// Absent fields stay as they are. `nickname`, `about_me` and `avatar`
/// are cleared by an explicit `null`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, deserialize_with = "nullable")]
    pub nickname: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub about_me: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar: Option<Option<String>>,
}

/// Present-but-null becomes `Some(None)`; `#[serde(default)]` covers absent.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetPrivacyRequest {
    pub is_private: bool,
}

// -- Followers --

#[derive(Debug, Serialize, Deserialize)]
pub struct FollowResponse {
    pub status: FollowStatus,
}

// -- Posts --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreatePostRequest {
    pub content: String,
    pub image: Option<String>,
    #[serde(default = "default_privacy")]
    pub privacy: PostPrivacy,
    /// Only read for `private` posts.
    #[serde(default)]
    pub allowed_user_ids: Vec<Uuid>,
}

fn default_privacy() -> PostPrivacy {
    PostPrivacy::Public
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupPostRequest {
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PostResponse {
    pub id: Uuid,
    pub author: UserSummary,
    pub group_id: Option<Uuid>,
    pub content: String,
    pub image: Option<String>,
    pub privacy: PostPrivacy,
    pub comment_count: i64,
    pub created_at: DateTime<Utc>,
}

// -- Comments --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub content: String,
    pub image: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: UserSummary,
    pub content: String,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
}

// -- Groups --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateGroupRequest {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupResponse {
    pub id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub member_count: i64,
    /// The viewer's role, if they are a member.
    pub role: Option<MemberRole>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MemberResponse {
    pub user: UserSummary,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InviteRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvitationResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub group_title: String,
    pub inviter_id: Uuid,
    pub invitee_id: Uuid,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequestResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user: UserSummary,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

// -- Group events --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateEventRequest {
    pub title: String,
    pub description: String,
    pub event_time: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GroupEventResponse {
    pub id: Uuid,
    pub group_id: Uuid,
    pub creator_id: Uuid,
    pub title: String,
    pub description: String,
    pub event_time: DateTime<Utc>,
    pub going: i64,
    pub not_going: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventDetailResponse {
    pub event: GroupEventResponse,
    pub responses: Vec<AttendeeResponse>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AttendeeResponse {
    pub user: UserSummary,
    pub response: Attendance,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RespondEventRequest {
    pub response: Attendance,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub sender: UserSummary,
    pub target: ChatTarget,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConversationResponse {
    pub user: UserSummary,
    pub last_message_at: DateTime<Utc>,
}

// -- Notifications --

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationResponse {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub actor_id: Option<Uuid>,
    pub reference_id: Option<Uuid>,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnreadCountResponse {
    pub count: i64,
}
