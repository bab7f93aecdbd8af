//! Raw parser output.
//!
//! `RawMatchPayload` is tick-major: index `t` of `positions`, `damage` and
//! every creep-wave timeline describes second `t` after match start. The
//! payload is produced once per match and never mutated.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::IntegrityError;
use crate::identity::{CustomId, LaneKey};

/// Samples recorded during one tick. `None` means no sample in that slot.
pub type PositionWindow = Vec<Option<PlayerPosition>>;

/// Damage dealt by one attacker during one tick, keyed by victim id.
pub type DamageWindow = BTreeMap<String, Vec<DamageRecord>>;

/// All damage during one tick, keyed by attacker id.
pub type TickDamage = BTreeMap<String, DamageWindow>;

/// Per-tick creep-wave timeline for one lane/team.
pub type CreepWaveTimeline = Vec<Option<CreepWaveSnapshot>>;

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Player metadata extracted from the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerIdentity {
    #[serde(default)]
    pub entity_id: String,
    pub custom_id: CustomId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steam_id_32: u32,
    #[serde(default)]
    pub hero_id: u32,
    #[serde(default)]
    pub lobby_player_slot: u32,
    pub team: u32,
    pub lane: i32,
    #[serde(default)]
    pub zipline_lane_color: u32,
}

/// Position of a player or entity at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerPosition {
    pub custom_id: CustomId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub is_npc: bool,
}

/// Single damage event. Every field is optional; unknown fields are kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DamageRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_damage: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub damage_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citadel_type: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ability_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attacker_class: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_class: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_health_max: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub victim_health_new: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hits: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_lost: Option<i64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Creep wave centroid at one tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CreepWaveSnapshot {
    pub x: f32,
    pub y: f32,
    pub count: u32,
    pub team: u32,
}

/// Creep waves for every lane/team combination seen in the match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreepWaveData {
    #[serde(default)]
    pub waves: BTreeMap<LaneKey, CreepWaveTimeline>,
}

impl CreepWaveData {
    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }
}

/// Boss entity lifecycle record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossSnapshot {
    pub entity_index: i32,
    pub custom_id: u32,
    #[serde(default)]
    pub boss_name_hash: u64,
    pub team: u32,
    pub lane: i32,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub z: f32,
    #[serde(default)]
    pub spawn_time_s: u32,
    #[serde(default)]
    pub max_health: i32,
    #[serde(default)]
    pub life_state_on_create: i32,
    #[serde(default)]
    pub death_time_s: Option<u32>,
    #[serde(default)]
    pub life_state_on_delete: Option<i32>,
}

/// Boss snapshots plus a per-tick health timeline keyed by entity index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BossData {
    #[serde(default)]
    pub snapshots: Vec<BossSnapshot>,
    #[serde(default)]
    pub health_timeline: Vec<BTreeMap<String, i32>>,
}

/// Tick-major output of the replay parser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMatchPayload {
    /// Match end, in seconds of game clock.
    pub total_match_time_s: u32,
    /// Match start, in seconds of game clock. `null` is read as zero.
    #[serde(default, deserialize_with = "null_as_default")]
    pub match_start_time_s: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub players: Vec<PlayerIdentity>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub positions: Vec<PositionWindow>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub damage: Vec<TickDamage>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub bosses: BossData,
    #[serde(default, deserialize_with = "null_as_default")]
    pub creep_waves: CreepWaveData,
}

impl RawMatchPayload {
    /// Number of ticks between match start and match end.
    pub fn tick_count(&self) -> Result<usize, IntegrityError> {
        if self.match_start_time_s > self.total_match_time_s {
            return Err(IntegrityError::InvertedTimeline {
                start: self.match_start_time_s,
                total: self.total_match_time_s,
            });
        }
        Ok((self.total_match_time_s - self.match_start_time_s) as usize)
    }

    /// Check that the tick-indexed timelines cover the whole match.
    ///
    /// Longer timelines are tolerated (trailing ticks are ignored); shorter
    /// ones are an integrity fault.
    pub fn validate(&self) -> Result<usize, IntegrityError> {
        let ticks = self.tick_count()?;
        if self.positions.len() < ticks {
            return Err(IntegrityError::ShortTimeline {
                field: "positions",
                expected: ticks,
                actual: self.positions.len(),
            });
        }
        if self.damage.len() < ticks {
            return Err(IntegrityError::ShortTimeline {
                field: "damage",
                expected: ticks,
                actual: self.damage.len(),
            });
        }
        Ok(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "total_match_time_s": 3,
        "match_start_time_s": 1,
        "players": [
            {"entity_id": "5", "custom_id": "0", "name": "a", "steam_id_32": 11,
             "hero_id": 1, "lobby_player_slot": 0, "team": 2, "lane": 1, "zipline_lane_color": 0}
        ],
        "positions": [
            [{"custom_id": "0", "x": 1.0, "y": 2.0, "z": 0.0, "is_npc": false}, null],
            []
        ],
        "damage": [
            {"0": {"31": [{"damage": 40, "type": 1, "ability_id": 9}]}},
            {}
        ],
        "bosses": {"snapshots": [], "health_timeline": []},
        "creep_waves": {"waves": {"1_2": [{"x": 0.0, "y": 10.0, "count": 4, "team": 2}, null]}}
    }"#;

    #[test]
    fn test_parse_parser_output() {
        let payload: RawMatchPayload = serde_json::from_str(SAMPLE).unwrap();
        assert_eq!(payload.validate().unwrap(), 2);
        assert_eq!(payload.players[0].custom_id, CustomId::new(0));
        assert!(payload.positions[0][1].is_none());
        let record = &payload.damage[0]["0"]["31"][0];
        assert_eq!(record.damage, Some(40));
        assert_eq!(record.damage_type, Some(1));
        assert_eq!(record.victim_class, None);
        assert_eq!(payload.creep_waves.waves[&LaneKey::new(1, 2)].len(), 2);
    }

    #[test]
    fn test_null_start_and_missing_waves() {
        let payload: RawMatchPayload = serde_json::from_str(
            r#"{"total_match_time_s": 0, "match_start_time_s": null, "creep_waves": null}"#,
        )
        .unwrap();
        assert_eq!(payload.match_start_time_s, 0);
        assert!(payload.creep_waves.is_empty());
        assert_eq!(payload.validate().unwrap(), 0);
    }

    #[test]
    fn test_short_damage_is_integrity_fault() {
        let mut payload: RawMatchPayload = serde_json::from_str(SAMPLE).unwrap();
        payload.damage.pop();
        assert_eq!(
            payload.validate(),
            Err(IntegrityError::ShortTimeline {
                field: "damage",
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn test_inverted_timeline() {
        let payload = RawMatchPayload {
            total_match_time_s: 5,
            match_start_time_s: 9,
            ..Default::default()
        };
        assert!(matches!(
            payload.tick_count(),
            Err(IntegrityError::InvertedTimeline { .. })
        ));
    }

    #[test]
    fn test_damage_record_keeps_unknown_fields() {
        let record: DamageRecord =
            serde_json::from_str(r#"{"damage": 3, "flags": 12, "entindex_inflictor": 7}"#).unwrap();
        assert_eq!(record.damage, Some(3));
        assert_eq!(record.extra.get("flags"), Some(&serde_json::json!(12)));
        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back["entindex_inflictor"], serde_json::json!(7));
    }
}
