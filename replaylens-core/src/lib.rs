//! replaylens core - match analysis types and transforms
//!
//! Pure data structures plus the deterministic transforms that turn a
//! tick-major parser payload into a player-major analysis artifact. No I/O
//! happens in this crate; every other crate depends on it.

pub mod aggregate;
pub mod artifact;
pub mod circuit;
pub mod error;
pub mod etag;
pub mod identity;
pub mod lane_pressure;
pub mod payload;

pub use aggregate::aggregate_players;
pub use artifact::{AnalysisArtifact, LanePressureData, LanePressureSnapshot, PlayerArtifact};
pub use circuit::CircuitState;
pub use error::{
    ConfigError, ErrorKind, IntegrityError, MetadataError, ParserError, ReplayLensError,
    ReplayLensResult, StorageError,
};
pub use etag::{compute_etag, is_not_modified};
pub use identity::{
    CustomId, LaneKey, MatchId, MatchIdParseError, HUMAN_PLAYER_ID_THRESHOLD, TEAM_AMBER,
    TEAM_SAPPHIRE,
};
pub use lane_pressure::compute_lane_pressure;
pub use payload::{
    BossData, BossSnapshot, CreepWaveData, CreepWaveSnapshot, DamageRecord, DamageWindow,
    PlayerIdentity, PlayerPosition, PositionWindow, RawMatchPayload, TickDamage,
};

/// Artifact schema version used when none is configured.
pub const DEFAULT_SCHEMA_VERSION: i32 = 1;

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// Roster of humans and entities plus `ticks` of random samples drawn
    /// only from roster members.
    fn arb_payload() -> impl Strategy<Value = RawMatchPayload> {
        (
            proptest::collection::btree_set(0u32..40, 0..12),
            0u32..30,
            0u32..10,
        )
            .prop_flat_map(|(ids, ticks, start)| {
                let ids: Vec<u32> = ids.into_iter().collect();
                let roster = ids.clone();
                let sample_ids = if ids.is_empty() { vec![25u32] } else { ids };
                let tick = proptest::collection::vec(
                    proptest::option::of((
                        proptest::sample::select(sample_ids),
                        -12000.0f32..12000.0,
                        -12000.0f32..12000.0,
                    )),
                    0..6,
                );
                (
                    Just(roster),
                    Just(start),
                    proptest::collection::vec(tick, ticks as usize),
                )
            })
            .prop_map(|(roster, start, positions)| {
                let ticks = positions.len() as u32;
                let players: Vec<_> = roster
                    .iter()
                    .map(|id| json!({"custom_id": id.to_string(), "team": 2 + id % 2, "lane": 1}))
                    .collect();
                let positions: Vec<Vec<serde_json::Value>> = positions
                    .into_iter()
                    .map(|tick| {
                        let mut seen = std::collections::BTreeSet::new();
                        tick.into_iter()
                            .map(|s| match s {
                                Some((id, x, y))
                                    if id >= HUMAN_PLAYER_ID_THRESHOLD
                                        || (roster.contains(&id) && seen.insert(id)) =>
                                {
                                    json!({"custom_id": id.to_string(), "x": x, "y": y})
                                }
                                _ => serde_json::Value::Null,
                            })
                            .collect()
                    })
                    .collect();
                let damage: Vec<serde_json::Value> = (0..ticks)
                    .map(|t| match roster.get(t as usize % roster.len().max(1)) {
                        Some(id) if t % 3 == 0 => json!({ id.to_string(): {"99": [{"damage": t}]} }),
                        _ => json!({}),
                    })
                    .collect();
                serde_json::from_value(json!({
                    "total_match_time_s": start + ticks,
                    "match_start_time_s": start,
                    "players": players,
                    "positions": positions,
                    "damage": damage,
                }))
                .unwrap()
            })
    }

    proptest! {
        #[test]
        fn prop_every_player_has_full_damage_timeline(payload in arb_payload()) {
            let ticks = payload.tick_count().unwrap();
            let out = aggregate_players(&payload).unwrap();
            prop_assert_eq!(out.len(), payload.players.len());
            for player in &payload.players {
                prop_assert_eq!(out[&player.custom_id].damage.len(), ticks);
            }
        }

        #[test]
        fn prop_positions_only_from_humans(payload in arb_payload()) {
            let ticks = payload.tick_count().unwrap();
            let out = aggregate_players(&payload).unwrap();
            for (id, artifact) in &out {
                if id.is_human() {
                    prop_assert_eq!(artifact.positions.len(), ticks);
                } else {
                    prop_assert!(artifact.positions.is_empty());
                }
                for sample in artifact.positions.iter().flatten() {
                    prop_assert!(sample.custom_id.get() < HUMAN_PLAYER_ID_THRESHOLD);
                    prop_assert_eq!(sample.custom_id, *id);
                }
            }
        }

        #[test]
        fn prop_artifact_etag_is_stable(payload in arb_payload(), version in 1i32..4) {
            let first = AnalysisArtifact::build(&payload).unwrap();
            let second = AnalysisArtifact::build(&payload.clone()).unwrap();
            prop_assert_eq!(
                compute_etag(&first, version).unwrap(),
                compute_etag(&second, version).unwrap()
            );
        }
    }
}
