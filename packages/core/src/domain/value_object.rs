//! Value objects of the room model.

use std::fmt;

use uuid::Uuid;

use super::error::ValueObjectError;

const MAX_ID_LEN: usize = 64;
const MAX_NAME_LEN: usize = 50;

/// Characters that cannot appear in a store path segment
const FORBIDDEN_ID_CHARS: [char; 6] = ['/', '.', '#', '$', '[', ']'];

fn validate_id(kind: &'static str, value: &str) -> Result<(), ValueObjectError> {
    if value.is_empty() {
        return Err(ValueObjectError::EmptyId { kind });
    }
    let len = value.chars().count();
    if len > MAX_ID_LEN {
        return Err(ValueObjectError::IdTooLong {
            kind,
            max: MAX_ID_LEN,
            found: len,
        });
    }
    if let Some(ch) = value
        .chars()
        .find(|ch| FORBIDDEN_ID_CHARS.contains(ch) || ch.is_control())
    {
        return Err(ValueObjectError::ForbiddenCharacter { kind, ch });
    }
    Ok(())
}

fn normalize_name(value: String) -> Result<String, ValueObjectError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValueObjectError::EmptyName);
    }
    let len = trimmed.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValueObjectError::NameTooLong {
            max: MAX_NAME_LEN,
            found: len,
        });
    }
    Ok(trimmed.to_string())
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: String) -> Result<Self, ValueObjectError> {
                validate_id($kind, &value)?;
                Ok(Self(value))
            }

            /// Generate a fresh random id
            pub fn generate() -> Self {
                Self(Uuid::new_v4().simple().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueObjectError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValueObjectError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

define_id!(
    /// Opaque room identifier, used as the `rooms/{roomId}` path segment.
    RoomId,
    "room id"
);
define_id!(
    /// Stable per-participant identifier.
    UserId,
    "user id"
);
define_id!(
    /// Group identifier. `"default"` is reserved for the undeletable group.
    GroupId,
    "group id"
);
define_id!(ConfettiId, "confetti id");

impl GroupId {
    pub const DEFAULT: &'static str = "default";

    /// The group every room starts with and that can never be deleted
    pub fn default_group() -> Self {
        Self(Self::DEFAULT.to_string())
    }

    pub fn is_default(&self) -> bool {
        self.0 == Self::DEFAULT
    }
}

/// Participant display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserName(String);

impl UserName {
    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        normalize_name(value).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for UserName {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Group display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupName(String);

impl GroupName {
    /// Name of the default group
    pub const DEFAULT_GROUP: &'static str = "Users";

    pub fn new(value: String) -> Result<Self, ValueObjectError> {
        normalize_name(value).map(Self)
    }

    pub fn default_group() -> Self {
        Self(Self::DEFAULT_GROUP.to_string())
    }

    /// `"Group <n>"`, where `n` is the number of groups when it was created
    pub fn numbered(group_count: usize) -> Self {
        Self(format!("Group {}", group_count))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl TryFrom<String> for GroupName {
    type Error = ValueObjectError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unix timestamp in milliseconds, resolved by the store's clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// One card of the deck.
///
/// The deck is `0.5` followed by the Fibonacci numbers `fib(2)..=fib(9)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vote {
    Half,
    One,
    Two,
    Three,
    Five,
    Eight,
    Thirteen,
    TwentyOne,
    ThirtyFour,
}

impl Vote {
    /// Every card, in display order
    pub const DECK: [Vote; 9] = [
        Vote::Half,
        Vote::One,
        Vote::Two,
        Vote::Three,
        Vote::Five,
        Vote::Eight,
        Vote::Thirteen,
        Vote::TwentyOne,
        Vote::ThirtyFour,
    ];

    pub fn value(&self) -> f64 {
        match self {
            Vote::Half => 0.5,
            Vote::One => 1.0,
            Vote::Two => 2.0,
            Vote::Three => 3.0,
            Vote::Five => 5.0,
            Vote::Eight => 8.0,
            Vote::Thirteen => 13.0,
            Vote::TwentyOne => 21.0,
            Vote::ThirtyFour => 34.0,
        }
    }

    /// Canonical text form, also accepted by [`Vote::parse`]
    pub fn as_str(&self) -> &'static str {
        match self {
            Vote::Half => "0.5",
            Vote::One => "1",
            Vote::Two => "2",
            Vote::Three => "3",
            Vote::Five => "5",
            Vote::Eight => "8",
            Vote::Thirteen => "13",
            Vote::TwentyOne => "21",
            Vote::ThirtyFour => "34",
        }
    }

    /// Text printed on the card
    pub fn label(&self) -> &'static str {
        match self {
            Vote::Thirteen => "12 + 1",
            other => other.as_str(),
        }
    }

    pub fn parse(value: &str) -> Result<Self, ValueObjectError> {
        let value = value.trim();
        Self::DECK
            .into_iter()
            .find(|card| card.as_str() == value || card.label() == value)
            .or_else(|| value.parse::<f64>().ok().and_then(Self::from_number))
            .ok_or_else(|| ValueObjectError::UnknownCard(value.to_string()))
    }

    pub fn from_number(value: f64) -> Option<Self> {
        Self::DECK
            .into_iter()
            .find(|card| (card.value() - value).abs() < f64::EPSILON)
    }
}

impl TryFrom<&str> for Vote {
    type Error = ValueObjectError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
