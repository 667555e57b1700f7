//! Identifier types for users, rooms, aliases and servers
//!
//! Every federated identifier has the shape `<sigil><localpart>:<domain>`.
//! The domain names the server that owns the identifier.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sigil for user IDs
pub const USER_SIGIL: char = '@';

/// Sigil for canonical room IDs
pub const ROOM_ID_SIGIL: char = '!';

/// Sigil for room aliases
pub const ROOM_ALIAS_SIGIL: char = '#';

/// Identifier parse errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("identifier is empty")]
    Empty,

    #[error("identifier does not start with '{0}'")]
    WrongSigil(char),

    #[error("identifier does not contain a domain")]
    MissingDomain,

    #[error("identifier has an empty domain")]
    EmptyDomain,
}

/// Split `<sigil><localpart>:<domain>` into its localpart and domain.
///
/// Everything after the first `:` is the domain, so ports such as
/// `example.org:8448` stay attached to it.
pub fn split_id(sigil: char, id: &str) -> Result<(&str, &str), IdError> {
    if id.is_empty() {
        return Err(IdError::Empty);
    }
    let rest = id.strip_prefix(sigil).ok_or(IdError::WrongSigil(sigil))?;
    let (localpart, domain) = rest.split_once(':').ok_or(IdError::MissingDomain)?;
    if domain.is_empty() {
        return Err(IdError::EmptyDomain);
    }
    Ok((localpart, domain))
}

/// Name of a server taking part in federation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(String);

impl ServerName {
    pub fn new(name: impl Into<String>) -> Self {
        ServerName(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for ServerName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl From<&str> for ServerName {
    fn from(name: &str) -> Self {
        ServerName(name.to_string())
    }
}

macro_rules! sigil_id {
    ($(#[$meta:meta])* $name:ident, $sigil:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Parse and validate the identifier
            pub fn parse(id: impl Into<String>) -> Result<Self, IdError> {
                let id = id.into();
                split_id($sigil, &id)?;
                Ok($name(id))
            }

            /// The localpart, without the sigil
            pub fn localpart(&self) -> &str {
                self.parts().0
            }

            /// The domain of the server that owns this identifier
            pub fn server_name(&self) -> ServerName {
                ServerName::new(self.parts().1)
            }

            /// Whether this identifier belongs to `server`
            pub fn is_owned_by(&self, server: &ServerName) -> bool {
                self.parts().1 == server.as_str()
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            fn parts(&self) -> (&str, &str) {
                // validated in parse()
                let rest = &self.0[$sigil.len_utf8()..];
                rest.split_once(':').unwrap_or((rest, ""))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(id: String) -> Result<Self, Self::Error> {
                $name::parse(id)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> String {
                id.0
            }
        }
    };
}

sigil_id!(
    /// A user identifier, e.g. `@alice:example.org`
    UserId,
    USER_SIGIL
);

sigil_id!(
    /// A canonical, immutable room identifier, e.g. `!abc123:example.org`
    RoomId,
    ROOM_ID_SIGIL
);

sigil_id!(
    /// A human-readable room alias, e.g. `#lobby:example.org`
    RoomAlias,
    ROOM_ALIAS_SIGIL
);

/// Shape of a room reference supplied by a client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomReferenceKind {
    /// Starts with `!`
    RoomId,
    /// Starts with `#`
    Alias,
}

impl RoomReferenceKind {
    /// Classify a room reference by its first character.
    ///
    /// Returns `None` for empty input or any other leading character.
    pub fn classify(reference: &str) -> Option<Self> {
        match reference.chars().next() {
            Some(ROOM_ID_SIGIL) => Some(RoomReferenceKind::RoomId),
            Some(ROOM_ALIAS_SIGIL) => Some(RoomReferenceKind::Alias),
            _ => None,
        }
    }
}
