//! Identifier types shared by the room service and the session controller.

use crate::error::CommonError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Symbols a room code is drawn from.
pub const ROOM_CODE_ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Fixed length of every room code.
pub const ROOM_CODE_LENGTH: usize = 5;

/// Short, human-typable room identifier.
///
/// Always held in canonical uppercase form, so two codes typed with
/// different casing compare equal once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Canonicalise user input into a room code.
    ///
    /// Surrounding whitespace is ignored and letters are uppercased.
    ///
    /// # Errors
    ///
    /// Returns [`CommonError::InvalidRoomCode`] if the input is not exactly
    /// [`ROOM_CODE_LENGTH`] symbols from [`ROOM_CODE_ALPHABET`].
    pub fn parse(input: &str) -> Result<Self, CommonError> {
        let canonical = input.trim().to_ascii_uppercase();
        let well_formed = canonical.len() == ROOM_CODE_LENGTH
            && canonical.bytes().all(|b| ROOM_CODE_ALPHABET.contains(&b));

        if well_formed {
            Ok(Self(canonical))
        } else {
            Err(CommonError::InvalidRoomCode(input.to_string()))
        }
    }

    /// The canonical code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = CommonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

/// Opaque participant identifier, assigned when a member connects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(String);

impl ParticipantId {
    /// Create a new random participant ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ParticipantId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
