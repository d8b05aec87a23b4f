//! Identifier types for the war-ticket service.
//!
//! This module provides strongly-typed identifiers for users, events, orders and tickets,
//! plus the two human-facing codes: the booking code of an order and the ticket number
//! printed on each artifact.
//!
//! # Macro-based ID Types
//!
//! The `uuid_id_type!` macro reduces boilerplate for UUID-based identifier types,
//! ensuring consistent implementation of serialization, parsing, and display traits.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Characters used for random code suffixes (no `0/O` or `1/I` look-alikes).
const CODE_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of the random suffix of a booking code.
const BOOKING_SUFFIX_LEN: usize = 6;

/// Length of the random suffix of a ticket number.
const TICKET_SUFFIX_LEN: usize = 6;

/// Maximum stored length of a booking code.
pub const BOOKING_CODE_MAX_LEN: usize = 25;

/// Maximum stored length of a ticket number.
pub const TICKET_NUMBER_MAX_LEN: usize = 50;

/// Macro to define a UUID-based identifier type with standard trait implementations.
///
/// This macro generates a newtype wrapper around `uuid::Uuid` with implementations for:
/// - `Clone`, `Copy`, `PartialEq`, `Eq`, `Hash`
/// - `Serialize`, `Deserialize` (as string)
/// - `FromStr`, `Display`, `Debug`
/// - `TryFrom<String>`, `Into<String>`
/// - `AsRef<[u8]>`
macro_rules! uuid_id_type {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Create a new identifier from a UUID.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// Generate a new random identifier.
            #[must_use]
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4())
            }

            /// Return the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &uuid::Uuid {
                &self.0
            }

            /// Return the bytes of the UUID (16 bytes).
            #[must_use]
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
                Ok(Self(uuid))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IdError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0.to_string()
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                self.0.as_bytes()
            }
        }
    };
}

uuid_id_type!(UserId, "A user identifier (UUID).\n\nUser IDs come from the `sub` claim of the caller's access token.");
uuid_id_type!(EventId, "An event identifier (UUID).");
uuid_id_type!(OrderId, "An order identifier (UUID).\n\nInternal identity; customers see the [`BookingCode`].");
uuid_id_type!(TicketId, "A ticket identifier (UUID).");

/// Draw `len` random characters from [`CODE_CHARSET`].
fn random_suffix(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())]))
        .collect()
}

/// Shared validation for the human-facing codes.
fn validate_code(value: &str, prefix: &str, max_len: usize) -> Result<(), IdError> {
    let well_formed = value.starts_with(prefix)
        && value.len() <= max_len
        && value
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit() || b == b'-');

    if well_formed {
        Ok(())
    } else {
        Err(IdError::InvalidCode(value.to_string()))
    }
}

/// Human-facing order identifier, e.g. `WT-3F2A9C1B-K7M2QX`.
///
/// Made of the first segment of the owner's UUID and a random suffix, upper-cased.
/// The format is deterministic; uniqueness comes from the suffix and is enforced by
/// the durable store's unique index.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BookingCode(String);

impl BookingCode {
    /// Prefix shared by all booking codes.
    pub const PREFIX: &'static str = "WT-";

    /// Synthesize a fresh booking code for `user_id`.
    #[must_use]
    pub fn generate(user_id: &UserId) -> Self {
        let user = user_id.to_string();
        let head = user.split('-').next().unwrap_or_default();
        let code = format!("{}{head}-{}", Self::PREFIX, random_suffix(BOOKING_SUFFIX_LEN));
        Self(code.to_uppercase())
    }

    /// Return the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for BookingCode {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_code(s, Self::PREFIX, BOOKING_CODE_MAX_LEN)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for BookingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BookingCode({})", self.0)
    }
}

impl fmt::Display for BookingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for BookingCode {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BookingCode> for String {
    fn from(code: BookingCode) -> Self {
        code.0
    }
}

/// Number printed on a single ticket and encoded in its QR code,
/// e.g. `TIK-WT-3F2A9C1B-K7M2QX-8HD3PA`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TicketNumber(String);

impl TicketNumber {
    /// Prefix shared by all ticket numbers.
    pub const PREFIX: &'static str = "TIK-";

    /// Synthesize a fresh ticket number for a seat of `booking`.
    #[must_use]
    pub fn generate(booking: &BookingCode) -> Self {
        Self(format!(
            "{}{booking}-{}",
            Self::PREFIX,
            random_suffix(TICKET_SUFFIX_LEN)
        ))
    }

    /// Return the number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TicketNumber {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate_code(s, Self::PREFIX, TICKET_NUMBER_MAX_LEN)?;
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TicketNumber({})", self.0)
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TicketNumber {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TicketNumber> for String {
    fn from(number: TicketNumber) -> Self {
        number.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,

    /// The input is not a well-formed booking code or ticket number.
    #[error("invalid code: {0}")]
    InvalidCode(String),
}
