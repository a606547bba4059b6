use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Closed set of content categories shared by articles, events and visuals.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "camelCase")]
#[sqlx(type_name = "category", rename_all = "camelCase")]
pub enum Category {
    EventsAndTouring,
    RockingTheDaisies,
    InTheCity,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::EventsAndTouring,
        Category::RockingTheDaisies,
        Category::InTheCity,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::EventsAndTouring => "eventsAndTouring",
            Category::RockingTheDaisies => "rockingTheDaisies",
            Category::InTheCity => "inTheCity",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}
