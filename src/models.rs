use crate::error::{RequestError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Which downstream system a configured instance talks to. Chosen once at
/// setup and never mixed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Overseerr,
    Arr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Tv,
}

impl MediaKind {
    /// "show" is accepted as an alias for "tv".
    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "movie" => Ok(Self::Movie),
            "tv" | "show" => Ok(Self::Tv),
            other => Err(RequestError::Validation(format!(
                "media_type must be 'movie' or 'tv' (or 'show'), got '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Tv => "tv",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which seasons of a series a request covers. Equality is semantic: a
/// season number's presence in the set, not the input representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SeasonSpec {
    All,
    Specific(BTreeSet<u32>),
}

impl SeasonSpec {
    pub fn specific<I: IntoIterator<Item = u32>>(seasons: I) -> Self {
        Self::Specific(seasons.into_iter().collect())
    }

    /// Parse caller input: the literal "all" (any case), an integer array,
    /// or a string form like "1,2,5" / "[1,2,5]".
    pub fn parse(input: &Value) -> Result<Self> {
        match input {
            Value::String(s) => Self::parse_str(s),
            Value::Array(items) => {
                let mut set = BTreeSet::new();
                for item in items {
                    set.insert(season_number(item)?);
                }
                if set.is_empty() {
                    return Err(RequestError::Validation("seasons list is empty".into()));
                }
                Ok(Self::Specific(set))
            }
            other => Err(RequestError::Validation(format!(
                "seasons must be \"all\" or a list of season numbers, got {other}"
            ))),
        }
    }

    pub fn parse_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        // A JSON array string normalizes the same as a real array.
        if trimmed.starts_with('[') {
            let value: Value = serde_json::from_str(trimmed).map_err(|e| {
                RequestError::Validation(format!("malformed seasons list '{trimmed}': {e}"))
            })?;
            return Self::parse(&value);
        }
        let mut set = BTreeSet::new();
        for part in trimmed.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let n = part
                .parse::<u32>()
                .map_err(|_| RequestError::Validation(format!("invalid season number '{part}'")))?;
            set.insert(n);
        }
        if set.is_empty() {
            return Err(RequestError::Validation(format!(
                "no season numbers in '{trimmed}'"
            )));
        }
        Ok(Self::Specific(set))
    }

    /// Overseerr wire shape: the literal string "all" or a plain int list.
    pub fn to_overseerr(&self) -> Value {
        match self {
            Self::All => json!("all"),
            Self::Specific(set) => json!(set.iter().copied().collect::<Vec<u32>>()),
        }
    }

    /// Sonarr wire shape is an explicit monitored flag per season the lookup
    /// reported. `All` monitors everything except specials (season 0); a
    /// specific set monitors exactly its members.
    pub fn monitors(&self, season_number: u32) -> bool {
        match self {
            Self::All => season_number != 0,
            Self::Specific(set) => set.contains(&season_number),
        }
    }
}

/// One service invocation. Consumed once, never persisted.
#[derive(Debug, Clone)]
pub struct MediaRequest {
    pub query: String,
    pub kind: MediaKind,
    pub seasons: Option<SeasonSpec>,
    pub is_4k: bool,
    pub overrides: Overrides,
}

/// Call-time overrides; each wins over every other resolution source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    // Overseerr backend
    pub server_id: Option<i64>,
    pub profile_id: Option<i64>,
    // Arr backend
    pub profile_preset: Option<String>,
    pub quality_profile_id: Option<i64>,
    pub language_profile_id: Option<i64>,
    pub root_folder_path: Option<String>,
}

/// The fully merged destination, built fresh per request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub server_id: Option<i64>,
    pub profile_id: Option<i64>,
    pub root_folder: Option<String>,
    pub language_profile_id: Option<i64>,
}

/// A Radarr/Sonarr instance registered inside Overseerr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerProfile {
    pub id: i64,
    pub name: String,
    #[serde(default, rename = "isDefault")]
    pub is_default: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityProfile {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFolder {
    pub id: Option<i64>,
    pub path: String,
}

fn season_number(value: &Value) -> Result<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| RequestError::Validation(format!("season number {n} is out of range"))),
        Value::String(s) => s
            .trim()
            .parse::<u32>()
            .map_err(|_| RequestError::Validation(format!("invalid season number '{s}'"))),
        other => Err(RequestError::Validation(format!(
            "season entries must be numbers, got {other}"
        ))),
    }
}

/// Coerce a JSON value into a numeric identifier, surfacing a validation
/// error on malformed input rather than silently truncating.
pub fn numeric_id(value: &Value, field: &str) -> Result<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| RequestError::Validation(format!("{field} {n} is not an integer id"))),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| RequestError::Validation(format!("{field} '{s}' is not an integer id"))),
        other => Err(RequestError::Validation(format!(
            "{field} must be an integer, got {other}"
        ))),
    }
}
