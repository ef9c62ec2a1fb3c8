//! Records persisted in collection snapshots.
//!
//! Every struct derives `Serialize` and `Deserialize` so a whole collection
//! can be handed to [`crate::snapshot`] as a plain slice.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portalis_shared::{MatrixEventId, MatrixRoomId, MatrixUserId, WhatsAppId, WhatsAppMessageId};

use crate::index::Record;

// ---------------------------------------------------------------------------
// Portal key
// ---------------------------------------------------------------------------

/// Identity of a portal.
///
/// Group chats have a single portal shared by every bridged user, so
/// `receiver == jid`. One-to-one chats get one portal per bridged user, and
/// `receiver` is that user's own JID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortalKey {
    pub jid: WhatsAppId,
    pub receiver: WhatsAppId,
}

impl PortalKey {
    /// Build a key for a chat as seen by `receiver`. The receiver is ignored
    /// for group chats.
    pub fn new(jid: WhatsAppId, receiver: WhatsAppId) -> Self {
        if jid.is_group() {
            return Self::group(jid);
        }
        Self { jid, receiver }
    }

    pub fn group(jid: WhatsAppId) -> Self {
        Self {
            receiver: jid.clone(),
            jid,
        }
    }

    pub fn is_group(&self) -> bool {
        self.jid.is_group()
    }
}

impl std::fmt::Display for PortalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.receiver == self.jid {
            write!(f, "{}", self.jid)
        } else {
            write!(f, "{}-{}", self.jid, self.receiver)
        }
    }
}

// ---------------------------------------------------------------------------
// Portal
// ---------------------------------------------------------------------------

/// Binding between one WhatsApp chat and one Matrix room.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Portal {
    pub key: PortalKey,
    /// Matrix room, once one has been created for this chat.
    pub mxid: Option<MatrixRoomId>,

    pub name: String,
    pub topic: String,
    pub avatar: String,
    pub avatar_url: String,

    /// Most recently bridged message in this chat.
    pub last_message: Option<Message>,
    /// Matrix users participating in the portal.
    pub user_ids: BTreeSet<MatrixUserId>,
}

impl Portal {
    pub fn new(key: PortalKey) -> Self {
        Self {
            key,
            mxid: None,
            name: String::new(),
            topic: String::new(),
            avatar: String::new(),
            avatar_url: String::new(),
            last_message: None,
            user_ids: BTreeSet::new(),
        }
    }
}

impl Record for Portal {
    type Key = PortalKey;
    type SecondaryKey = MatrixRoomId;

    const COLLECTION: &'static str = "portals";

    fn key(&self) -> PortalKey {
        self.key.clone()
    }

    fn secondary_key(&self) -> Option<MatrixRoomId> {
        self.mxid.clone()
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// Opaque WhatsApp Web session credentials.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionBlob(pub Vec<u8>);

impl std::fmt::Debug for SessionBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SessionBlob(<{} bytes>)", self.0.len())
    }
}

/// A Matrix user of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub mxid: MatrixUserId,
    /// Linked WhatsApp account, unset until the user logs in.
    pub jid: Option<WhatsAppId>,
    pub management_room: Option<MatrixRoomId>,
    pub session: Option<SessionBlob>,
    pub last_connection: Option<DateTime<Utc>>,

    pub portal_keys: Vec<PortalKey>,
}

impl User {
    pub fn new(mxid: MatrixUserId) -> Self {
        Self {
            mxid,
            jid: None,
            management_room: None,
            session: None,
            last_connection: None,
            portal_keys: Vec::new(),
        }
    }
}

impl Record for User {
    type Key = MatrixUserId;
    type SecondaryKey = WhatsAppId;

    const COLLECTION: &'static str = "users";

    fn key(&self) -> MatrixUserId {
        self.mxid.clone()
    }

    fn secondary_key(&self) -> Option<WhatsAppId> {
        self.jid.clone()
    }
}

// ---------------------------------------------------------------------------
// Puppet
// ---------------------------------------------------------------------------

/// Matrix ghost representing a WhatsApp contact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Puppet {
    pub jid: WhatsAppId,
    /// Real Matrix account the contact has logged in with ("double puppeting").
    pub custom_mxid: Option<MatrixUserId>,

    pub displayname: Option<String>,
    pub avatar: Option<String>,
}

impl Puppet {
    pub fn new(jid: WhatsAppId) -> Self {
        Self {
            jid,
            custom_mxid: None,
            displayname: None,
            avatar: None,
        }
    }
}

impl Record for Puppet {
    type Key = WhatsAppId;
    type SecondaryKey = MatrixUserId;

    const COLLECTION: &'static str = "puppets";

    fn key(&self) -> WhatsAppId {
        self.jid.clone()
    }

    fn secondary_key(&self) -> Option<MatrixUserId> {
        self.custom_mxid.clone()
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Identity of a bridged message: WhatsApp message IDs are only unique
/// within a chat.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MessageKey {
    pub chat: PortalKey,
    pub jid: WhatsAppMessageId,
}

/// Mapping between a WhatsApp message and the Matrix event it was bridged to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub chat: PortalKey,
    pub jid: WhatsAppMessageId,
    pub mxid: MatrixEventId,
    pub sender: WhatsAppId,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn message_key(&self) -> MessageKey {
        MessageKey {
            chat: self.chat.clone(),
            jid: self.jid.clone(),
        }
    }
}

impl Record for Message {
    type Key = MessageKey;
    type SecondaryKey = MatrixEventId;

    const COLLECTION: &'static str = "messages";

    fn key(&self) -> MessageKey {
        self.message_key()
    }

    fn secondary_key(&self) -> Option<MatrixEventId> {
        Some(self.mxid.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> WhatsAppId {
        WhatsAppId::parse(s).unwrap()
    }

    #[test]
    fn test_group_key_ignores_receiver() {
        let key = PortalKey::new(jid("123@g.us"), jid("other@s.whatsapp.net"));
        assert_eq!(key.receiver.as_str(), "123@g.us");
        assert!(key.is_group());
        assert_eq!(key.to_string(), "123@g.us");
    }

    #[test]
    fn test_direct_key_keeps_receiver() {
        let key = PortalKey::new(jid("123@net"), jid("456"));
        assert_eq!(key.jid.as_str(), "123@net");
        assert_eq!(key.receiver.as_str(), "456");
        assert!(!key.is_group());
        assert_eq!(key.to_string(), "123@net-456");
    }

    #[test]
    fn test_self_chat_is_not_a_group() {
        let me = jid("4915100000001@s.whatsapp.net");
        let key = PortalKey::new(me.clone(), me);
        assert_eq!(key.jid, key.receiver);
        assert!(!key.is_group());
    }

    #[test]
    fn test_group_portal_key() {
        let key = PortalKey::group(jid("123@g.us"));
        assert_eq!(key.jid, key.receiver);
        assert_eq!(key.jid.as_str(), "123@g.us");
    }

    #[test]
    fn test_direct_chats_are_isolated_per_receiver() {
        let a = PortalKey::new(jid("contact@s.whatsapp.net"), jid("alice@s.whatsapp.net"));
        let b = PortalKey::new(jid("contact@s.whatsapp.net"), jid("bob@s.whatsapp.net"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_secondary_keys_follow_optional_fields() {
        let mut user = User::new(MatrixUserId::parse("@alice:example.org").unwrap());
        assert_eq!(user.secondary_key(), None);
        user.jid = Some(jid("alice@s.whatsapp.net"));
        assert_eq!(user.secondary_key(), user.jid);

        let puppet = Puppet::new(jid("bob@s.whatsapp.net"));
        assert_eq!(puppet.secondary_key(), None);
    }

    #[test]
    fn test_session_blob_debug_is_redacted() {
        let blob = SessionBlob(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(format!("{blob:?}"), "SessionBlob(<4 bytes>)");
    }
}
