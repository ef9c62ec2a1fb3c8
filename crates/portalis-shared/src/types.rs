use serde::{Deserialize, Serialize};

use crate::constants::{GROUP_SERVER, USER_SERVER};
use crate::error::IdError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[serde(try_from = "String")]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier, rejecting the empty string.
            pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
                let s = s.into();
                if s.is_empty() {
                    return Err(IdError::Empty(stringify!($name)));
                }
                Ok(Self(s))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                Self::parse(s)
            }
        }
    };
}

string_id!(
    /// Matrix user ID, e.g. `@alice:example.org`.
    MatrixUserId
);

string_id!(
    /// Matrix room ID, e.g. `!abc:example.org`.
    MatrixRoomId
);

string_id!(
    /// Matrix event ID of a bridged message.
    MatrixEventId
);

string_id!(
    /// WhatsApp message ID as assigned by the sender's client.
    WhatsAppMessageId
);

// WhatsApp JID, e.g. `4915112345678@s.whatsapp.net` or `123-456@g.us`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String")]
pub struct WhatsAppId(String);

impl WhatsAppId {
    /// Wrap a JID, rejecting the empty string. The `@server` part is
    /// optional: bare user parts are kept as they are.
    pub fn parse(s: impl Into<String>) -> Result<Self, IdError> {
        let s = s.into();
        if s.is_empty() {
            return Err(IdError::Empty("WhatsAppId"));
        }
        Ok(Self(s))
    }

    /// Build a user JID from a bare phone number.
    pub fn from_phone(number: &str) -> Result<Self, IdError> {
        Self::parse(format!("{}@{}", number.trim_start_matches('+'), USER_SERVER))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before the `@`.
    pub fn user(&self) -> &str {
        self.0.split_once('@').map(|(u, _)| u).unwrap_or(&self.0)
    }

    /// The part after the `@`.
    pub fn server(&self) -> &str {
        self.0.split_once('@').map(|(_, s)| s).unwrap_or("")
    }

    /// Whether this JID names a group chat.
    pub fn is_group(&self) -> bool {
        self.server() == GROUP_SERVER
    }
}

impl std::fmt::Display for WhatsAppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for WhatsAppId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for WhatsAppId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_ids_rejected() {
        assert!(MatrixUserId::parse("").is_err());
        assert!(MatrixRoomId::parse("").is_err());
        assert!(WhatsAppId::parse("").is_err());
    }

    #[test]
    fn test_jid_parts() {
        let jid = WhatsAppId::parse("123-456@g.us").unwrap();
        assert_eq!(jid.user(), "123-456");
        assert_eq!(jid.server(), "g.us");
        assert!(jid.is_group());

        let user = WhatsAppId::from_phone("+4915112345678").unwrap();
        assert_eq!(user.as_str(), "4915112345678@s.whatsapp.net");
        assert!(!user.is_group());
    }

    #[test]
    fn test_bare_jid_accepted() {
        let bare = WhatsAppId::parse("456").unwrap();
        assert_eq!(bare.user(), "456");
        assert_eq!(bare.server(), "");
        assert!(!bare.is_group());
    }

    #[test]
    fn test_try_from_rejects_empty() {
        assert_eq!(
            MatrixUserId::try_from(String::new()),
            Err(IdError::Empty("MatrixUserId"))
        );
        assert!(WhatsAppId::try_from(String::new()).is_err());
        assert!(MatrixEventId::try_from("$ev:hs".to_string()).is_ok());
    }

    #[test]
    fn test_display_round_trip() {
        let mxid: MatrixUserId = "@alice:example.org".parse().unwrap();
        assert_eq!(mxid.to_string(), "@alice:example.org");
    }
}
