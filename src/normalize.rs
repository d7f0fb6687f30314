//!
//! src/normalize.rs
//!
//! Cleans free-text platform titles into searchable title/artist pairs.
//! Decoration stripping and splitting are pure and never fail; an
//! unrecognized shape falls back to title-only
//!
//!

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::SplitTitle;

// Annotation vocabulary that never carries musical identity.
const NOISE: &str = "official|lyrics?|video|audio|music|mv|hd|4k|live|cover|visuali[sz]er|topic";

/// Bracketed annotations containing a noise word: "(Official Video)", "[HD]".
static PAREN_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\s*[(\[][^)\]]*\b(?:{NOISE})\b[^)\]]*[)\]]")).unwrap()
});

/// Trailing dash segments that open with a noise word: "Song - Official Video",
/// "Artist - Topic". The repetition group keeps stripping idempotent when
/// several such segments stack up.
static DASH_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)(?:\s*[-–—]\s*(?:{NOISE})\b[^-–—]*)+$")).unwrap()
});

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Standalone noise-word check, used to tell "Artist - Title" splits apart
/// from "Title - Annotation" ones.
static NOISE_CHECK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:{NOISE})\b")).unwrap()
});

/// "Artist - Title" separators. The ASCII hyphen must be space-delimited so
/// hyphenated words ("Spider-Man") survive; the wide dash family splits with
/// or without surrounding spaces.
static DASH_SPLIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)(?:\s+-\s+|\s*[–—―ー－]\s*)(.+)$").unwrap()
});

/// "Artist: Title". The space after the colon keeps times ("10:15") whole.
static COLON_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?):\s+(.+)$").unwrap());

static SLASH_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(.+?)\s+/\s+(.+)$").unwrap());

/// "Title (feat. Artist)" and bracketed variants.
static FEAT_IN_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\s*[(\[](?:feat\.?|ft\.?|featuring)\s+([^)\]]+)[)\]]\s*$").unwrap()
});

/// "Title (with Artist)".
static WITH_IN_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(.+?)\s*[(\[]with\s+([^)\]]+)[)\]]\s*$").unwrap()
});

/// Featured-artist clause inside an artist credit: "A feat. B", "A with B".
static FEAT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*[(\[]?\b(?:feat\.?|ft\.?|featuring|with)\b.*$").unwrap()
});

/// Removes presentation noise from a title. Idempotent and infallible; a
/// clean title comes back trimmed and space-collapsed but otherwise intact.
pub fn strip_decoration(raw: &str) -> String {
    let cleaned = PAREN_NOISE.replace_all(raw, " ");
    let cleaned = DASH_NOISE.replace(&cleaned, "");
    let cleaned = MULTI_SPACE.replace_all(&cleaned, " ");
    cleaned.trim().to_string()
}

/// Splits a combined string into artist and title by trying separator
/// patterns in priority order. Absence of an artist is a normal outcome.
pub fn split_artist_title(raw: &str) -> SplitTitle {
    if let Some(caps) = DASH_SPLIT.captures(raw) {
        let left = caps[1].trim();
        let right = caps[2].trim();
        if !left.is_empty() && !right.is_empty() {
            // "Title - Official Video" is an annotation, not an artist credit
            if NOISE_CHECK.is_match(right) {
                return SplitTitle { title: left.to_string(), artist: None };
            }
            return SplitTitle {
                title: right.to_string(),
                artist: Some(left.to_string()),
            };
        }
    }

    for pattern in [&COLON_SPLIT, &SLASH_SPLIT] {
        if let Some(caps) = pattern.captures(raw) {
            let left = caps[1].trim();
            let right = caps[2].trim();
            if !left.is_empty() && !right.is_empty() {
                return SplitTitle {
                    title: right.to_string(),
                    artist: Some(left.to_string()),
                };
            }
        }
    }

    for pattern in [&FEAT_IN_TITLE, &WITH_IN_TITLE] {
        if let Some(caps) = pattern.captures(raw) {
            let title = caps[1].trim();
            let artist = caps[2].trim();
            if !title.is_empty() && !artist.is_empty() {
                return SplitTitle {
                    title: title.to_string(),
                    artist: Some(artist.to_string()),
                };
            }
        }
    }

    SplitTitle { title: raw.trim().to_string(), artist: None }
}

/// Entry point for free-text titles: strip decoration, split, then strip
/// again since annotations can survive inside the split halves.
pub fn normalize_title(raw: &str) -> SplitTitle {
    let split = split_artist_title(&strip_decoration(raw));

    let title = strip_decoration(&split.title);
    let title = if title.is_empty() { split.title } else { title };
    let artist = split.artist
        .map(|a| strip_decoration(&a))
        .filter(|a| !a.is_empty());

    SplitTitle { title, artist }
}

/// Reduces a composite artist credit to its case-folded first-listed artist:
/// "Tame Impala, Lil Yachty" and "Tame Impala feat. Lil Yachty" both become
/// "tame impala".
pub fn primary_artist(raw: &str) -> String {
    let folded = raw.to_lowercase();
    let stripped = FEAT_CLAUSE.replace(&folded, "");
    stripped
        .split([',', '&'])
        .next()
        .unwrap_or("")
        .trim()
        .to_string()
}
