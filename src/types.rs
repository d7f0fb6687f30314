use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::ResolverError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    Youtube,
    Apple,
}

impl Provider {
    /// The two platforms a track on this one converts to.
    pub fn others(&self) -> [Provider; 2] {
        match self {
            Provider::Spotify => [Provider::Youtube, Provider::Apple],
            Provider::Youtube => [Provider::Spotify, Provider::Apple],
            Provider::Apple   => [Provider::Spotify, Provider::Youtube],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Youtube => "youtube",
            Provider::Apple   => "apple",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ResolverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "spotify" => Ok(Provider::Spotify),
            "youtube" | "youtube-music" => Ok(Provider::Youtube),
            "apple" | "apple-music" => Ok(Provider::Apple),
            other => Err(ResolverError::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// Canonical identity of the source track as its home platform reports it.
/// The artist is absent when the platform only exposes a free-text title.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub title: String,
    pub artist: Option<String>,
}

/// One raw search hit from a foreign catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCandidate {
    pub title: String,
    pub artist: String,
    pub url: String,
    #[serde(rename = "trackNumber", skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
}

/// Cleaned identity a search runs against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchTarget {
    pub title: String,
    pub artist: Option<String>,
}

/// Result of splitting a free-text title.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitTitle {
    pub title: String,
    pub artist: Option<String>,
}

impl From<SplitTitle> for MatchTarget {
    fn from(s: SplitTitle) -> Self {
        MatchTarget { title: s.title, artist: s.artist }
    }
}

/// One ordered search attempt against a foreign catalog.
#[derive(Debug, Clone)]
pub struct SearchStrategy {
    pub query: String,
    pub region: Option<String>,
    pub priority: u32,
}

/// Accepted winner of one candidate set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub candidate: RawCandidate,
    pub score: f64,
}

/// Outcome for one opposite platform. A missing result means the track
/// could not be matched with confidence, not that resolution failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformMatch {
    pub provider: Provider,
    pub result: Option<MatchResult>,
}

/// Full conversion report for one source track.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversion {
    pub request_id: uuid::Uuid,
    pub source: Provider,
    pub track: Track,
    pub matches: Vec<PlatformMatch>,
}
