//! Tag model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A label from the fixed tag vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tag {
    #[serde(rename = "Trigger Warning")]
    TriggerWarning,
    Emotional,
    Inspiring,
    Growth,
    Sad,
    Love,
    Family,
    Work,
    Funny,
    Happy,
    /// Shown and filterable, but never attachable to a new upload.
    Depression,
}

/// Returned when a label is not part of the vocabulary
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown tag '{0}'")]
pub struct ParseTagError(pub String);

impl Tag {
    /// Every tag in display order
    pub const ALL: [Self; 11] = [
        Self::TriggerWarning,
        Self::Emotional,
        Self::Inspiring,
        Self::Growth,
        Self::Sad,
        Self::Love,
        Self::Family,
        Self::Work,
        Self::Funny,
        Self::Happy,
        Self::Depression,
    ];

    /// Display label, also used on the wire
    pub const fn label(self) -> &'static str {
        match self {
            Self::TriggerWarning => "Trigger Warning",
            Self::Emotional => "Emotional",
            Self::Inspiring => "Inspiring",
            Self::Growth => "Growth",
            Self::Sad => "Sad",
            Self::Love => "Love",
            Self::Family => "Family",
            Self::Work => "Work",
            Self::Funny => "Funny",
            Self::Happy => "Happy",
            Self::Depression => "Depression",
        }
    }

    /// Whether the tag can be attached to a new upload
    pub const fn is_selectable(self) -> bool {
        !matches!(self, Self::Depression)
    }

    /// Tags offered when composing an upload
    pub fn selectable() -> impl Iterator<Item = Self> {
        Self::ALL.into_iter().filter(|tag| tag.is_selectable())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Tag {
    type Err = ParseTagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|tag| {
                tag.label().eq_ignore_ascii_case(wanted)
                    || tag.label().replace(' ', "-").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| ParseTagError(wanted.to_string()))
    }
}
