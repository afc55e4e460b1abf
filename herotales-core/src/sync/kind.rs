//! Entity kinds that take part in sync.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Entity kinds known to the sync core, in push/pull order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    Hero,
    Story,
    CustomEvent,
}

/// Who produces the content of an entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOrigin {
    /// Written by the user and never regenerated on the server.
    UserAuthored,
    /// Regenerated by a server-side service (AI text, illustrations, avatars).
    Regenerated,
    /// User input mixed with server-produced content.
    Mixed,
}

impl EntityKind {
    /// Every kind, parents before children.
    pub const ALL: [EntityKind; 3] = [EntityKind::Hero, EntityKind::Story, EntityKind::CustomEvent];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Hero => "hero",
            EntityKind::Story => "story",
            EntityKind::CustomEvent => "customEvent",
        }
    }

    /// Path segment of the REST collection for this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            EntityKind::Hero => "heroes",
            EntityKind::Story => "stories",
            EntityKind::CustomEvent => "custom-events",
        }
    }

    pub fn content_origin(&self) -> ContentOrigin {
        match self {
            // Avatars are regenerated server-side.
            EntityKind::Hero => ContentOrigin::Regenerated,
            EntityKind::Story => ContentOrigin::Regenerated,
            EntityKind::CustomEvent => ContentOrigin::UserAuthored,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hero" | "heroes" => Ok(EntityKind::Hero),
            "story" | "stories" => Ok(EntityKind::Story),
            "customevent" | "custom-event" | "custom_event" | "events" | "event" => {
                Ok(EntityKind::CustomEvent)
            }
            _ => Err(format!(
                "Invalid entity kind '{}'. Valid options: hero, story, customEvent",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_str() {
        assert_eq!(EntityKind::from_str("hero").unwrap(), EntityKind::Hero);
        assert_eq!(EntityKind::from_str("Stories").unwrap(), EntityKind::Story);
        assert_eq!(
            EntityKind::from_str("customEvent").unwrap(),
            EntityKind::CustomEvent
        );
        assert_eq!(
            EntityKind::from_str("custom-event").unwrap(),
            EntityKind::CustomEvent
        );
    }

    #[test]
    fn test_kind_from_str_invalid() {
        assert!(EntityKind::from_str("illustration").is_err());
        assert!(EntityKind::from_str("").is_err());
    }

    #[test]
    fn test_as_str_round_trips() {
        for kind in EntityKind::ALL {
            assert_eq!(EntityKind::from_str(kind.as_str()).unwrap(), kind);
        }
    }

    #[test]
    fn test_collection() {
        assert_eq!(EntityKind::Hero.collection(), "heroes");
        assert_eq!(EntityKind::Story.collection(), "stories");
        assert_eq!(EntityKind::CustomEvent.collection(), "custom-events");
    }
}
