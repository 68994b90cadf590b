//! Room code parsing and formatting
//!
//! This module provides the room code type players enter to join a live
//! session. Room codes are generated by the session server; the client only
//! parses, displays, and transmits them. They are rendered as six decimal
//! digits to keep them easy to communicate verbally.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Smallest value a room code can take (renders as `000000`)
const MIN_VALUE: u32 = 0;
/// One past the largest value a room code can take
const MAX_VALUE: u32 = 1_000_000;

/// A human-enterable code identifying a live session
///
/// The server resolves a room code to a session id when a player joins.
/// The client treats the code as opaque beyond its six-digit shape: it is
/// parsed from user input, echoed on screens, and included in join commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomCode(u32);

/// Errors that can occur when parsing a room code from user input
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The input contained characters other than decimal digits
    #[error("room code must be decimal digits")]
    NotNumeric,
    /// The input was numeric but outside the six-digit range
    #[error("room code must be six digits")]
    OutOfRange,
}

impl Display for RoomCode {
    /// Formats the room code as six zero-padded decimal digits
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl FromStr for RoomCode {
    type Err = Error;

    /// Parses a room code from a six-digit decimal string
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotNumeric`] if the string is not a decimal number,
    /// or [`Error::OutOfRange`] if it does not fit in six digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u32 = s.trim().parse().map_err(|_| Error::NotNumeric)?;
        if (MIN_VALUE..MAX_VALUE).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::OutOfRange)
        }
    }
}

impl Serialize for RoomCode {
    /// Serializes the room code as its six-digit string form
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for RoomCode {
    /// Deserializes a room code from its six-digit string form
    fn deserialize<D>(deserializer: D) -> Result<RoomCode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        RoomCode::from_str(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_code_display_zero_padded() {
        assert_eq!(RoomCode(42).to_string(), "000042");
        assert_eq!(RoomCode(123_456).to_string(), "123456");
        assert_eq!(RoomCode(0).to_string(), "000000");
    }

    #[test]
    fn test_room_code_from_str() {
        assert_eq!(RoomCode::from_str("000042"), Ok(RoomCode(42)));
        assert_eq!(RoomCode::from_str("999999"), Ok(RoomCode(999_999)));
        assert_eq!(RoomCode::from_str(" 123456 "), Ok(RoomCode(123_456)));
    }

    #[test]
    fn test_room_code_from_str_invalid() {
        assert_eq!(RoomCode::from_str("abc123"), Err(Error::NotNumeric));
        assert_eq!(RoomCode::from_str(""), Err(Error::NotNumeric));
        assert_eq!(RoomCode::from_str("1000000"), Err(Error::OutOfRange));
    }

    #[test]
    fn test_room_code_serialization_round_trip() {
        let code = RoomCode(7_001);
        let serialized = serde_json::to_string(&code).unwrap();
        assert_eq!(serialized, "\"007001\"");

        let deserialized: RoomCode = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, code);
    }

    #[test]
    fn test_room_code_deserialization_rejects_numbers() {
        let result: Result<RoomCode, _> = serde_json::from_str("123456");
        assert!(result.is_err());
    }
}
