//! Identifier types shared across the workspace.
//!
//! The parser emits player handles as decimal strings and lane/team
//! timelines under `"<lane>_<team>"` keys. Both are parsed into typed values
//! at the deserialization boundary so malformed keys never reach the
//! transforms.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::IntegrityError;

/// Custom ids below this value belong to human players.
pub const HUMAN_PLAYER_ID_THRESHOLD: u32 = 20;

/// Team value for Amber, which pushes toward low Y.
pub const TEAM_AMBER: u32 = 2;

/// Team value for Sapphire, which pushes toward high Y.
pub const TEAM_SAPPHIRE: u32 = 3;

// ============================================================================
// MATCH ID
// ============================================================================

/// Upstream match identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchId(i64);

impl MatchId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error parsing a MatchId from a path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchIdParseError(pub String);

impl fmt::Display for MatchIdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid match id: {}", self.0)
    }
}

impl std::error::Error for MatchIdParseError {}

impl FromStr for MatchId {
    type Err = MatchIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<i64>() {
            Ok(id) if id > 0 => Ok(Self(id)),
            _ => Err(MatchIdParseError(s.to_string())),
        }
    }
}

// ============================================================================
// CUSTOM ID
// ============================================================================

/// Stable per-match entity handle.
///
/// Accepts either a JSON string (`"7"`) or number (`7`) and always
/// serializes as a string, which is also how it appears as a map key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CustomId(u32);

impl CustomId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u32 {
        self.0
    }

    pub fn is_human(&self) -> bool {
        self.0 < HUMAN_PLAYER_ID_THRESHOLD
    }

    /// Key used by the raw damage maps.
    pub fn as_key(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for CustomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CustomId {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(Self)
            .map_err(|_| IntegrityError::InvalidCustomId {
                value: s.to_string(),
            })
    }
}

impl Serialize for CustomId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

struct CustomIdVisitor;

impl<'de> Visitor<'de> for CustomIdVisitor {
    type Value = CustomId;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative integer or a decimal string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<CustomId, E> {
        u32::try_from(v)
            .map(CustomId)
            .map_err(|_| E::custom(format!("custom id {} out of range", v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<CustomId, E> {
        u32::try_from(v)
            .map(CustomId)
            .map_err(|_| E::custom(format!("custom id {} out of range", v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<CustomId, E> {
        v.parse().map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for CustomId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(CustomIdVisitor)
    }
}

// ============================================================================
// LANE KEY
// ============================================================================

/// `"<lane>_<team>"` key used by creep-wave and lane-pressure timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LaneKey {
    pub lane: i32,
    pub team: u32,
}

impl LaneKey {
    pub const fn new(lane: i32, team: u32) -> Self {
        Self { lane, team }
    }
}

impl fmt::Display for LaneKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.lane, self.team)
    }
}

impl FromStr for LaneKey {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IntegrityError::InvalidLaneKey { key: s.to_string() };
        let (lane, team) = s.rsplit_once('_').ok_or_else(invalid)?;
        Ok(Self {
            lane: lane.parse().map_err(|_| invalid())?,
            team: team.parse().map_err(|_| invalid())?,
        })
    }
}

impl Serialize for LaneKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for LaneKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_match_id_parse() {
        assert_eq!("42".parse::<MatchId>(), Ok(MatchId::new(42)));
        assert!("0".parse::<MatchId>().is_err());
        assert!("-3".parse::<MatchId>().is_err());
        assert!("abc".parse::<MatchId>().is_err());
    }

    #[test]
    fn test_custom_id_accepts_string_and_number() {
        let from_str: CustomId = serde_json::from_str("\"7\"").unwrap();
        let from_num: CustomId = serde_json::from_str("7").unwrap();
        assert_eq!(from_str, from_num);
        assert_eq!(serde_json::to_string(&from_num).unwrap(), "\"7\"");
    }

    #[test]
    fn test_custom_id_as_map_key() {
        let map: BTreeMap<CustomId, u8> = serde_json::from_str(r#"{"3": 1, "12": 2}"#).unwrap();
        assert_eq!(map.get(&CustomId::new(12)), Some(&2));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"3":1,"12":2}"#);
    }

    #[test]
    fn test_custom_id_human_threshold() {
        assert!(CustomId::new(0).is_human());
        assert!(CustomId::new(19).is_human());
        assert!(!CustomId::new(20).is_human());
    }

    #[test]
    fn test_lane_key_grammar() {
        assert_eq!("1_2".parse::<LaneKey>(), Ok(LaneKey::new(1, 2)));
        assert_eq!("-1_3".parse::<LaneKey>(), Ok(LaneKey::new(-1, 3)));
        assert!("north".parse::<LaneKey>().is_err());
        assert!("1_".parse::<LaneKey>().is_err());
        assert_eq!(LaneKey::new(4, 3).to_string(), "4_3");
    }

    #[test]
    fn test_lane_key_rejected_at_deserialization() {
        let result: Result<BTreeMap<LaneKey, u8>, _> = serde_json::from_str(r#"{"bad": 1}"#);
        assert!(result.is_err());
    }
}
