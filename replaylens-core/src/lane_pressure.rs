//! Lane pressure from creep-wave centroids.

use std::collections::BTreeMap;

use tracing::debug;

use crate::artifact::{LanePressureData, LanePressureSnapshot};
use crate::identity::TEAM_AMBER;
use crate::payload::{CreepWaveData, CreepWaveSnapshot, PositionWindow};

/// Lowest world coordinate on either map axis.
pub const WORLD_MIN: f32 = -10752.0;

/// Width of the playable world on either map axis.
pub const WORLD_SPAN: f32 = 21504.0;

/// Players within this distance of a wave centroid are attributed to it.
pub const ATTRIBUTION_RADIUS: f32 = 1500.0;

/// Wave Y mapped onto `[0, 1]` across the world bounds.
pub fn normalized_y(y: f32) -> f32 {
    ((y - WORLD_MIN) / WORLD_SPAN).clamp(0.0, 1.0)
}

/// How far the wave has pushed toward the enemy base.
///
/// Amber advances toward low Y, every other team toward high Y.
pub fn wave_pressure(wave: &CreepWaveSnapshot) -> f32 {
    let y = normalized_y(wave.y);
    if wave.team == TEAM_AMBER {
        1.0 - y
    } else {
        y
    }
}

/// Human players standing within [`ATTRIBUTION_RADIUS`] of the wave.
pub fn attribute_players(wave: &CreepWaveSnapshot, samples: &PositionWindow) -> Vec<u32> {
    let radius_sq = ATTRIBUTION_RADIUS * ATTRIBUTION_RADIUS;
    samples
        .iter()
        .flatten()
        .filter(|p| p.custom_id.is_human())
        .filter(|p| {
            let dx = p.x - wave.x;
            let dy = p.y - wave.y;
            dx * dx + dy * dy <= radius_sq
        })
        .map(|p| p.custom_id.get())
        .collect()
}

/// Derive per-tick pressure for every lane/team timeline.
///
/// `None` waves stay `None`. Ticks past the end of `positions` get an empty
/// attribution list.
pub fn compute_lane_pressure(
    creep_waves: &CreepWaveData,
    positions: &[PositionWindow],
) -> LanePressureData {
    if creep_waves.is_empty() {
        debug!("No creep wave data; lane pressure left empty");
        return LanePressureData::default();
    }

    let empty = PositionWindow::new();
    let pressure: BTreeMap<_, _> = creep_waves
        .waves
        .iter()
        .map(|(key, timeline)| {
            let snapshots = timeline
                .iter()
                .enumerate()
                .map(|(tick, wave)| {
                    wave.as_ref().map(|wave| LanePressureSnapshot {
                        pressure: wave_pressure(wave),
                        team: wave.team,
                        attributed_players: attribute_players(
                            wave,
                            positions.get(tick).unwrap_or(&empty),
                        ),
                        wave_x: wave.x,
                        wave_y: wave.y,
                        wave_count: wave.count,
                    })
                })
                .collect();
            (*key, snapshots)
        })
        .collect();

    debug!(lanes = pressure.len(), "Computed lane pressure");
    LanePressureData { pressure }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::{CustomId, LaneKey, TEAM_SAPPHIRE};
    use crate::payload::PlayerPosition;
    use proptest::prelude::*;

    fn wave(x: f32, y: f32, team: u32) -> CreepWaveSnapshot {
        CreepWaveSnapshot {
            x,
            y,
            count: 4,
            team,
        }
    }

    fn sample(id: u32, x: f32, y: f32) -> Option<PlayerPosition> {
        Some(PlayerPosition {
            custom_id: CustomId::new(id),
            x,
            y,
            z: 0.0,
            is_npc: !CustomId::new(id).is_human(),
        })
    }

    #[test]
    fn test_pressure_direction_by_team() {
        assert_eq!(wave_pressure(&wave(0.0, WORLD_MIN, TEAM_AMBER)), 1.0);
        assert_eq!(wave_pressure(&wave(0.0, WORLD_MIN, TEAM_SAPPHIRE)), 0.0);
        assert_eq!(wave_pressure(&wave(0.0, 0.0, TEAM_AMBER)), 0.5);
        assert_eq!(wave_pressure(&wave(0.0, 0.0, TEAM_SAPPHIRE)), 0.5);
    }

    #[test]
    fn test_out_of_bounds_wave_is_clamped() {
        assert_eq!(wave_pressure(&wave(0.0, 20000.0, TEAM_SAPPHIRE)), 1.0);
        assert_eq!(wave_pressure(&wave(0.0, -20000.0, TEAM_AMBER)), 1.0);
    }

    #[test]
    fn test_attribution_radius_is_inclusive() {
        let samples = vec![
            sample(1, 1500.0, 0.0),
            sample(2, 1500.1, 0.0),
            None,
            sample(30, 0.0, 0.0),
        ];
        assert_eq!(attribute_players(&wave(0.0, 0.0, 2), &samples), vec![1]);
    }

    #[test]
    fn test_null_wave_and_missing_positions() {
        let mut data = CreepWaveData::default();
        data.waves.insert(
            LaneKey::new(4, 3),
            vec![Some(wave(0.0, 0.0, 3)), None, Some(wave(0.0, 0.0, 3))],
        );
        let positions = vec![vec![sample(5, 10.0, 10.0)]];
        let out = compute_lane_pressure(&data, &positions);
        let timeline = &out.pressure[&LaneKey::new(4, 3)];
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].as_ref().map(|s| s.attributed_players.clone()), Some(vec![5]));
        assert!(timeline[1].is_none());
        assert_eq!(
            timeline[2].as_ref().map(|s| s.attributed_players.len()),
            Some(0)
        );
    }

    #[test]
    fn test_missing_waves_yield_empty_map() {
        let out = compute_lane_pressure(&CreepWaveData::default(), &[]);
        assert!(out.is_empty());
    }

    proptest! {
        #[test]
        fn prop_pressure_within_bounds(y in -1.0e6f32..1.0e6f32, team in 0u32..6) {
            let p = wave_pressure(&wave(0.0, y, team));
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
