//! Row → API model conversions.

use plaza_types::api::{
    AttendeeResponse, CommentResponse, ConversationResponse, GroupEventResponse,
    InvitationResponse, JoinRequestResponse, MemberResponse, MessageResponse,
    NotificationResponse, PostResponse, UserResponse, UserSummary,
};

use crate::models::{
    AttendeeRow, CommentRow, ConversationRow, GroupEventRow, InvitationRow, JoinRequestRow,
    MemberRow, MessageRow, NotificationRow, PostRow, UserBrief, UserRow,
};

impl From<UserBrief> for UserSummary {
    fn from(row: UserBrief) -> Self {
        Self {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            nickname: row.nickname,
            avatar: row.avatar,
        }
    }
}

/// Drops the password hash.
impl From<UserRow> for UserResponse {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            nickname: row.nickname,
            about_me: row.about_me,
            avatar: row.avatar,
            is_private: row.is_private,
            created_at: row.created_at,
        }
    }
}

impl From<PostRow> for PostResponse {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author: row.author.into(),
            group_id: row.group_id,
            content: row.content,
            image: row.image,
            privacy: row.privacy,
            comment_count: row.comment_count,
            created_at: row.created_at,
        }
    }
}

impl From<CommentRow> for CommentResponse {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author: row.author.into(),
            content: row.content,
            image: row.image,
            created_at: row.created_at,
        }
    }
}

impl From<MemberRow> for MemberResponse {
    fn from(row: MemberRow) -> Self {
        Self {
            user: row.user.into(),
            role: row.role,
            joined_at: row.joined_at,
        }
    }
}

impl From<InvitationRow> for InvitationResponse {
    fn from(row: InvitationRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            group_title: row.group_title,
            inviter_id: row.inviter_id,
            invitee_id: row.invitee_id,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

impl From<JoinRequestRow> for JoinRequestResponse {
    fn from(row: JoinRequestRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            user: row.user.into(),
            status: row.status,
            created_at: row.created_at,
        }
    }
}

impl From<GroupEventRow> for GroupEventResponse {
    fn from(row: GroupEventRow) -> Self {
        Self {
            id: row.id,
            group_id: row.group_id,
            creator_id: row.creator_id,
            title: row.title,
            description: row.description,
            event_time: row.event_time,
            going: row.going,
            not_going: row.not_going,
            created_at: row.created_at,
        }
    }
}

impl From<AttendeeRow> for AttendeeResponse {
    fn from(row: AttendeeRow) -> Self {
        Self {
            user: row.user.into(),
            response: row.response,
        }
    }
}

impl From<MessageRow> for MessageResponse {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            sender: row.sender.into(),
            target: row.target,
            content: row.content,
            created_at: row.created_at,
        }
    }
}

impl From<ConversationRow> for ConversationResponse {
    fn from(row: ConversationRow) -> Self {
        Self {
            user: row.partner.into(),
            last_message_at: row.last_message_at,
        }
    }
}

impl From<NotificationRow> for NotificationResponse {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            kind: row.kind,
            actor_id: row.actor_id,
            reference_id: row.reference_id,
            message: row.message,
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}
