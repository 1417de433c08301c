use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Returned when a stored or submitted string is not a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Enums that are stored as TEXT columns. The string form is the same one
/// used on the wire.
macro_rules! text_enum {
    (
        $(#[$meta:meta])*
        $name:ident as $kind:literal {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

text_enum! {
    /// Who can see a post.
    PostPrivacy as "post privacy" {
        Public => "public",
        AlmostPrivate => "almost_private",
        Private => "private",
    }
}

text_enum! {
    FollowStatus as "follow status" {
        Pending => "pending",
        Accepted => "accepted",
    }
}

text_enum! {
    MemberRole as "member role" {
        Admin => "admin",
        Member => "member",
    }
}

text_enum! {
    /// Lifecycle of both group invitations and join requests.
    RequestStatus as "request status" {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
    }
}

text_enum! {
    Attendance as "attendance" {
        Going => "going",
        NotGoing => "not_going",
    }
}

text_enum! {
    NotificationKind as "notification kind" {
        FollowRequest => "follow_request",
        NewFollower => "new_follower",
        FollowAccepted => "follow_accepted",
        GroupInvitation => "group_invitation",
        GroupJoinRequest => "group_join_request",
        GroupJoinAccepted => "group_join_accepted",
        GroupEvent => "group_event",
        NewComment => "new_comment",
        NewMessage => "new_message",
    }
}

/// Destination of a chat message: another user or a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChatTarget {
    User(Uuid),
    Group(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn privacy_parses_stored_text() {
        assert_eq!("almost_private".parse::<PostPrivacy>(), Ok(PostPrivacy::AlmostPrivate));
        assert_eq!(PostPrivacy::Private.as_str(), "private");

        let err = "friends".parse::<PostPrivacy>().unwrap_err();
        assert_eq!(err.kind, "post privacy");
    }

    #[test]
    fn enums_serialize_as_stored_text() {
        let json = serde_json::to_string(&Attendance::NotGoing).unwrap();
        assert_eq!(json, "\"not_going\"");

        let kind: NotificationKind = serde_json::from_str("\"group_invitation\"").unwrap();
        assert_eq!(kind, NotificationKind::GroupInvitation);
    }

    #[test]
    fn chat_target_is_tagged() {
        let id = Uuid::new_v4();
        let json = serde_json::to_value(ChatTarget::Group(id)).unwrap();
        assert_eq!(json["kind"], "group");
        assert_eq!(json["id"], id.to_string());
    }
}
