//! Derived, player-indexed analysis artifact.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::aggregate_players;
use crate::error::IntegrityError;
use crate::identity::{CustomId, LaneKey};
use crate::lane_pressure::compute_lane_pressure;
use crate::payload::{
    BossData, CreepWaveData, DamageWindow, PlayerIdentity, PlayerPosition, RawMatchPayload,
};

/// Per-player timelines, each aligned to match ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerArtifact {
    /// One slot per tick for human players; empty for non-player entities.
    pub positions: Vec<Option<PlayerPosition>>,
    /// Damage dealt by this player, one window per tick.
    pub damage: Vec<DamageWindow>,
}

impl PlayerArtifact {
    pub(crate) fn with_capacity(ticks: usize, tracks_positions: bool) -> Self {
        Self {
            positions: Vec::with_capacity(if tracks_positions { ticks } else { 0 }),
            damage: Vec::with_capacity(ticks),
        }
    }
}

/// Lane pressure for one wave at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanePressureSnapshot {
    /// 0.0 at the wave's own base, 1.0 at the enemy base.
    pub pressure: f32,
    pub team: u32,
    pub attributed_players: Vec<u32>,
    pub wave_x: f32,
    pub wave_y: f32,
    pub wave_count: u32,
}

/// Lane pressure timelines, keyed like the creep waves they derive from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanePressureData {
    #[serde(default)]
    pub pressure: BTreeMap<LaneKey, Vec<Option<LanePressureSnapshot>>>,
}

impl LanePressureData {
    pub fn is_empty(&self) -> bool {
        self.pressure.is_empty()
    }
}

/// The cacheable result of analysing one match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisArtifact {
    pub total_match_time_s: u32,
    pub match_start_time_s: u32,
    pub players_data: Vec<PlayerIdentity>,
    pub per_player_data: BTreeMap<CustomId, PlayerArtifact>,
    #[serde(default)]
    pub bosses: BossData,
    #[serde(default)]
    pub creep_waves: CreepWaveData,
    #[serde(default)]
    pub lane_pressure: LanePressureData,
}

impl AnalysisArtifact {
    /// Run the aggregator and lane pressure engine over a raw payload.
    pub fn build(payload: &RawMatchPayload) -> Result<Self, IntegrityError> {
        let per_player_data = aggregate_players(payload)?;
        let lane_pressure = compute_lane_pressure(&payload.creep_waves, &payload.positions);

        Ok(Self {
            total_match_time_s: payload.total_match_time_s,
            match_start_time_s: payload.match_start_time_s,
            players_data: payload.players.clone(),
            per_player_data,
            bosses: payload.bosses.clone(),
            creep_waves: payload.creep_waves.clone(),
            lane_pressure,
        })
    }

    /// Number of ticks covered by every per-player timeline.
    pub fn tick_count(&self) -> usize {
        self.total_match_time_s.saturating_sub(self.match_start_time_s) as usize
    }
}
