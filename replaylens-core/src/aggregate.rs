//! Tick-major to player-major aggregation.
//!
//! Positions and damage are gathered in a single pass over the match ticks.
//! Every timeline in the output has exactly one entry per tick.

use std::collections::BTreeMap;

use crate::artifact::PlayerArtifact;
use crate::error::IntegrityError;
use crate::identity::CustomId;
use crate::payload::RawMatchPayload;

/// Build one [`PlayerArtifact`] per roster entry.
///
/// Human players (custom id below the threshold) receive one position slot
/// per tick, filled with their sample or `None`. A second sample for the same
/// human in one tick is an integrity fault. Non-player entities never
/// contribute positions. Every roster entry receives one damage window per
/// tick, empty when it dealt no damage that second.
pub fn aggregate_players(
    payload: &RawMatchPayload,
) -> Result<BTreeMap<CustomId, PlayerArtifact>, IntegrityError> {
    let ticks = payload.validate()?;

    let mut per_player: BTreeMap<CustomId, PlayerArtifact> = payload
        .players
        .iter()
        .map(|p| {
            let id = p.custom_id;
            (id, PlayerArtifact::with_capacity(ticks, id.is_human()))
        })
        .collect();

    // Damage maps are keyed by the decimal form of the custom id.
    let damage_keys: Vec<(CustomId, String)> =
        per_player.keys().map(|id| (*id, id.as_key())).collect();

    for tick in 0..ticks {
        for (id, artifact) in per_player.iter_mut() {
            if id.is_human() {
                artifact.positions.push(None);
            }
        }

        for sample in payload.positions[tick].iter().flatten() {
            if !sample.custom_id.is_human() {
                continue;
            }
            let artifact = per_player.get_mut(&sample.custom_id).ok_or(
                IntegrityError::UnknownPlayer {
                    custom_id: sample.custom_id.get(),
                    tick,
                },
            )?;
            match artifact.positions.last_mut() {
                Some(slot) if slot.is_none() => *slot = Some(sample.clone()),
                _ => {
                    return Err(IntegrityError::DuplicateSample {
                        custom_id: sample.custom_id.get(),
                        tick,
                    })
                }
            }
        }

        let tick_damage = &payload.damage[tick];
        for (id, key) in &damage_keys {
            let window = tick_damage.get(key).cloned().unwrap_or_default();
            if let Some(artifact) = per_player.get_mut(id) {
                artifact.damage.push(window);
            }
        }
    }

    Ok(per_player)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PlayerPosition;
    use serde_json::json;

    fn raw(value: serde_json::Value) -> RawMatchPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_positions_are_tick_aligned() {
        let payload = raw(json!({
            "total_match_time_s": 13,
            "match_start_time_s": 10,
            "players": [{"custom_id": "3", "team": 2, "lane": 1}],
            "positions": [
                [{"custom_id": "3", "x": 1.0, "y": 1.0}],
                [null],
                [{"custom_id": "3", "x": 3.0, "y": 3.0}]
            ],
            "damage": [{}, {}, {}]
        }));
        let out = aggregate_players(&payload).unwrap();
        let positions = &out[&CustomId::new(3)].positions;
        assert_eq!(positions.len(), 3);
        assert!(positions[0].is_some());
        assert!(positions[1].is_none());
        assert_eq!(positions[2].as_ref().map(|p| p.x), Some(3.0));
    }

    #[test]
    fn test_second_sample_in_one_tick_is_integrity_fault() {
        let payload = raw(json!({
            "total_match_time_s": 2,
            "players": [
                {"custom_id": "3", "team": 2, "lane": 1},
                {"custom_id": "25", "team": 3, "lane": 1}
            ],
            "positions": [
                [
                    {"custom_id": "25", "x": 0.0, "y": 0.0, "is_npc": true},
                    {"custom_id": "25", "x": 5.0, "y": 5.0, "is_npc": true}
                ],
                [
                    {"custom_id": "3", "x": 1.0, "y": 1.0},
                    {"custom_id": "3", "x": 2.0, "y": 2.0}
                ]
            ],
            "damage": [{}, {}]
        }));
        // Repeated entity samples are ignored; repeated human samples are not.
        assert_eq!(
            aggregate_players(&payload),
            Err(IntegrityError::DuplicateSample {
                custom_id: 3,
                tick: 1
            })
        );
    }

    #[test]
    fn test_npc_samples_excluded() {
        let payload = raw(json!({
            "total_match_time_s": 1,
            "players": [
                {"custom_id": "0", "team": 2, "lane": 1},
                {"custom_id": "40", "team": 3, "lane": 1}
            ],
            "positions": [[
                {"custom_id": "40", "x": 9.0, "y": 9.0, "is_npc": true},
                {"custom_id": "77", "x": 1.0, "y": 1.0, "is_npc": true}
            ]],
            "damage": [{"40": {"0": [{"damage": 5}]}}]
        }));
        let out = aggregate_players(&payload).unwrap();
        assert_eq!(out[&CustomId::new(0)].positions, vec![None]);
        assert!(out[&CustomId::new(40)].positions.is_empty());
        // Damage is tracked for non-player roster entries too.
        assert_eq!(out[&CustomId::new(40)].damage[0]["0"][0].damage, Some(5));
        assert!(out[&CustomId::new(0)].damage[0].is_empty());
    }

    #[test]
    fn test_unknown_human_sample_is_integrity_fault() {
        let payload = raw(json!({
            "total_match_time_s": 2,
            "players": [{"custom_id": "1", "team": 2, "lane": 1}],
            "positions": [[], [{"custom_id": "4", "x": 0.0, "y": 0.0}]],
            "damage": [{}, {}]
        }));
        assert_eq!(
            aggregate_players(&payload),
            Err(IntegrityError::UnknownPlayer {
                custom_id: 4,
                tick: 1
            })
        );
    }

    #[test]
    fn test_short_positions_rejected() {
        let payload = raw(json!({
            "total_match_time_s": 3,
            "players": [],
            "positions": [[], []],
            "damage": [{}, {}, {}]
        }));
        assert!(matches!(
            aggregate_players(&payload),
            Err(IntegrityError::ShortTimeline {
                field: "positions",
                ..
            })
        ));
    }

    #[test]
    fn test_trailing_ticks_ignored() {
        let mut payload = raw(json!({
            "total_match_time_s": 1,
            "players": [{"custom_id": "2", "team": 3, "lane": 4}],
            "positions": [[], []],
            "damage": [{}, {"2": {"5": [{}]}}]
        }));
        payload.positions[1].push(Some(PlayerPosition {
            custom_id: CustomId::new(2),
            x: 0.0,
            y: 0.0,
            z: 0.0,
            is_npc: false,
        }));
        let out = aggregate_players(&payload).unwrap();
        assert_eq!(out[&CustomId::new(2)].positions.len(), 1);
        assert_eq!(out[&CustomId::new(2)].damage.len(), 1);
    }
}
