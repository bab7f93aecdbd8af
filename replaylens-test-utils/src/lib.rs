//! replaylens Test Utilities
//!
//! Shared test infrastructure for the replaylens workspace:
//! - Fake parser and metadata gateways with call counters
//! - Payload fixtures and a builder for tick-major parser output
//! - Proptest generators

// Re-export the in-memory store from its source crate
pub use replaylens_storage::InMemoryArtifactStore;

// Re-export core types for convenience
pub use replaylens_core::{
    AnalysisArtifact, CircuitState, CreepWaveData, CreepWaveSnapshot, CustomId, DamageRecord, LaneKey,
    MatchId, MetadataError, ParserError, PlayerIdentity, PlayerPosition, RawMatchPayload,
};
pub use replaylens_upstream::{LocalDemo, MetadataProvider, ReplayParser, SourceReference};

use async_trait::async_trait;
use replaylens_upstream::PARSE_OPERATION;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// FAKE GATEWAYS
// ============================================================================

/// Replay directory the fake parser reports for staged demos.
pub const FAKE_REPLAY_DIR: &str = "/parser/src/replays";

fn not_configured() -> ParserError {
    ParserError::Status {
        operation: PARSE_OPERATION.to_string(),
        status: 500,
        body: "fake parser not configured".to_string(),
    }
}

/// Scripted [`ReplayParser`].
///
/// Parse calls are routed by reference: anything that decodes to a path under
/// [`FAKE_REPLAY_DIR`] is a local parse, everything else is remote.
#[derive(Debug)]
pub struct FakeParser {
    local_demo: Mutex<Result<LocalDemo, ParserError>>,
    local_parse: Mutex<Result<RawMatchPayload, ParserError>>,
    remote_parse: Mutex<Result<RawMatchPayload, ParserError>>,
    delay: Option<Duration>,
    circuits: Vec<(String, CircuitState)>,
    check_calls: AtomicUsize,
    local_parse_calls: AtomicUsize,
    remote_parse_calls: AtomicUsize,
    sources: Mutex<Vec<String>>,
}

impl Default for FakeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeParser {
    /// No local demo; every parse fails.
    pub fn new() -> Self {
        Self {
            local_demo: Mutex::new(Ok(LocalDemo::unavailable())),
            local_parse: Mutex::new(Err(not_configured())),
            remote_parse: Mutex::new(Err(not_configured())),
            delay: None,
            circuits: Vec::new(),
            check_calls: AtomicUsize::new(0),
            local_parse_calls: AtomicUsize::new(0),
            remote_parse_calls: AtomicUsize::new(0),
            sources: Mutex::new(Vec::new()),
        }
    }

    pub fn with_local_demo(self, demo: LocalDemo) -> Self {
        *lock(&self.local_demo) = Ok(demo);
        self
    }

    pub fn with_check_error(self, err: ParserError) -> Self {
        *lock(&self.local_demo) = Err(err);
        self
    }

    pub fn with_local_parse(self, result: Result<RawMatchPayload, ParserError>) -> Self {
        *lock(&self.local_parse) = result;
        self
    }

    pub fn with_remote_parse(self, result: Result<RawMatchPayload, ParserError>) -> Self {
        *lock(&self.remote_parse) = result;
        self
    }

    /// Sleep this long inside every parse call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report `state` for `operation` from `circuit_states`.
    pub fn with_circuit(mut self, operation: &str, state: CircuitState) -> Self {
        self.circuits.push((operation.to_string(), state));
        self
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn local_parse_calls(&self) -> usize {
        self.local_parse_calls.load(Ordering::SeqCst)
    }

    pub fn remote_parse_calls(&self) -> usize {
        self.remote_parse_calls.load(Ordering::SeqCst)
    }

    pub fn parse_calls(&self) -> usize {
        self.local_parse_calls() + self.remote_parse_calls()
    }

    /// Decoded references passed to `parse`, in call order.
    pub fn parsed_sources(&self) -> Vec<String> {
        lock(&self.sources).clone()
    }
}

#[async_trait]
impl ReplayParser for FakeParser {
    async fn check_local_demo(&self, _match_id: MatchId) -> Result<LocalDemo, ParserError> {
        self.check_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.local_demo).clone()
    }

    async fn parse(&self, source: &SourceReference) -> Result<RawMatchPayload, ParserError> {
        let decoded = source.decode().unwrap_or_default();
        lock(&self.sources).push(decoded.clone());
        let is_local = decoded.starts_with(FAKE_REPLAY_DIR);
        if is_local {
            self.local_parse_calls.fetch_add(1, Ordering::SeqCst);
        } else {
            self.remote_parse_calls.fetch_add(1, Ordering::SeqCst);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if is_local {
            lock(&self.local_parse).clone()
        } else {
            lock(&self.remote_parse).clone()
        }
    }

    fn local_replay_dir(&self) -> &str {
        FAKE_REPLAY_DIR
    }

    fn circuit_states(&self) -> Vec<(String, CircuitState)> {
        self.circuits.clone()
    }
}

/// Scripted [`MetadataProvider`].
#[derive(Debug)]
pub struct FakeMetadata {
    demo_url: Mutex<Result<Option<String>, MetadataError>>,
    metadata: Mutex<Result<serde_json::Value, MetadataError>>,
    demo_url_calls: AtomicUsize,
    metadata_calls: AtomicUsize,
}

impl Default for FakeMetadata {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeMetadata {
    /// No demo URL and empty metadata.
    pub fn new() -> Self {
        Self {
            demo_url: Mutex::new(Ok(None)),
            metadata: Mutex::new(Ok(serde_json::json!({}))),
            demo_url_calls: AtomicUsize::new(0),
            metadata_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_demo_url(self, url: impl Into<String>) -> Self {
        *lock(&self.demo_url) = Ok(Some(url.into()));
        self
    }

    pub fn with_demo_url_error(self, err: MetadataError) -> Self {
        *lock(&self.demo_url) = Err(err);
        self
    }

    pub fn with_metadata(self, result: Result<serde_json::Value, MetadataError>) -> Self {
        *lock(&self.metadata) = result;
        self
    }

    pub fn demo_url_calls(&self) -> usize {
        self.demo_url_calls.load(Ordering::SeqCst)
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataProvider for FakeMetadata {
    async fn demo_url(&self, _match_id: MatchId) -> Result<Option<String>, MetadataError> {
        self.demo_url_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.demo_url).clone()
    }

    async fn match_metadata(&self, _match_id: MatchId) -> Result<serde_json::Value, MetadataError> {
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.metadata).clone()
    }
}

// ============================================================================
// PAYLOAD BUILDER
// ============================================================================

/// Builds tick-major parser payloads. Timelines are padded to the match
/// length on [`PayloadBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PayloadBuilder {
    payload: RawMatchPayload,
}

impl PayloadBuilder {
    pub fn new(match_start_time_s: u32, total_match_time_s: u32) -> Self {
        Self {
            payload: RawMatchPayload {
                total_match_time_s,
                match_start_time_s,
                ..RawMatchPayload::default()
            },
        }
    }

    fn ticks(&self) -> usize {
        self.payload
            .total_match_time_s
            .saturating_sub(self.payload.match_start_time_s) as usize
    }

    pub fn player(mut self, custom_id: u32, team: u32, lane: i32) -> Self {
        self.payload.players.push(PlayerIdentity {
            entity_id: (custom_id + 1).to_string(),
            custom_id: CustomId::new(custom_id),
            name: format!("player-{}", custom_id),
            steam_id_32: 1000 + custom_id,
            hero_id: custom_id + 1,
            lobby_player_slot: custom_id,
            team,
            lane,
            zipline_lane_color: 0,
        });
        self
    }

    pub fn position(mut self, tick: usize, custom_id: u32, x: f32, y: f32) -> Self {
        if self.payload.positions.len() <= tick {
            self.payload.positions.resize(tick + 1, Vec::new());
        }
        self.payload.positions[tick].push(Some(PlayerPosition {
            custom_id: CustomId::new(custom_id),
            x,
            y,
            z: 0.0,
            is_npc: custom_id >= replaylens_core::HUMAN_PLAYER_ID_THRESHOLD,
        }));
        self
    }

    pub fn damage(mut self, tick: usize, attacker: u32, victim: u32, amount: i64) -> Self {
        if self.payload.damage.len() <= tick {
            self.payload.damage.resize(tick + 1, Default::default());
        }
        self.payload.damage[tick]
            .entry(attacker.to_string())
            .or_default()
            .entry(victim.to_string())
            .or_default()
            .push(DamageRecord {
                damage: Some(amount),
                ..DamageRecord::default()
            });
        self
    }

    pub fn wave(mut self, lane: i32, team: u32, tick: usize, x: f32, y: f32, count: u32) -> Self {
        let ticks = self.ticks().max(tick + 1);
        let timeline = self
            .payload
            .creep_waves
            .waves
            .entry(LaneKey::new(lane, team))
            .or_insert_with(|| vec![None; ticks]);
        if timeline.len() <= tick {
            timeline.resize(tick + 1, None);
        }
        timeline[tick] = Some(CreepWaveSnapshot { x, y, count, team });
        self
    }

    pub fn build(mut self) -> RawMatchPayload {
        let ticks = self.ticks();
        if self.payload.positions.len() < ticks {
            self.payload.positions.resize(ticks, Vec::new());
        }
        if self.payload.damage.len() < ticks {
            self.payload.damage.resize(ticks, Default::default());
        }
        self.payload
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    use super::*;
    use replaylens_core::{TEAM_AMBER, TEAM_SAPPHIRE};

    /// Signed download URL the fake metadata provider hands out.
    pub const SAMPLE_DEMO_URL: &str = "https://replay.example/42.dem.bz2?sig=abc";

    /// Three-tick match with one human per team, one NPC and a single Amber
    /// wave on lane 1.
    pub fn sample_payload() -> RawMatchPayload {
        PayloadBuilder::new(10, 13)
            .player(0, TEAM_AMBER, 1)
            .player(1, TEAM_SAPPHIRE, 1)
            .position(0, 0, 100.0, 200.0)
            .position(0, 1, 5000.0, 5000.0)
            .position(0, 30, 120.0, 220.0)
            .position(2, 0, 150.0, 250.0)
            .damage(0, 0, 1, 40)
            .damage(2, 1, 0, 25)
            .wave(1, TEAM_AMBER, 0, 0.0, 0.0, 4)
            .wave(1, TEAM_AMBER, 2, 0.0, -5376.0, 3)
            .build()
    }

    /// Same roster as [`sample_payload`] with no creep wave data at all.
    pub fn payload_without_waves() -> RawMatchPayload {
        PayloadBuilder::new(0, 2)
            .player(0, TEAM_AMBER, 1)
            .player(1, TEAM_SAPPHIRE, 4)
            .position(1, 1, 10.0, 10.0)
            .damage(1, 1, 0, 12)
            .build()
    }

    /// Parser failure as seen on a 503.
    pub fn parser_unavailable() -> ParserError {
        ParserError::Status {
            operation: PARSE_OPERATION.to_string(),
            status: 503,
            body: "parser busy".to_string(),
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    use super::*;
    use proptest::prelude::*;

    pub fn arb_match_id() -> impl Strategy<Value = MatchId> {
        (1i64..=i64::MAX).prop_map(MatchId::new)
    }

    pub fn arb_wave_snapshot() -> impl Strategy<Value = CreepWaveSnapshot> {
        (-15000.0f32..15000.0, -15000.0f32..15000.0, 0u32..12, 2u32..=3)
            .prop_map(|(x, y, count, team)| CreepWaveSnapshot { x, y, count, team })
    }

    /// Payload with up to ten humans, a few NPC samples and random waves.
    /// Every human sample belongs to the roster.
    pub fn arb_payload() -> impl Strategy<Value = RawMatchPayload> {
        (
            proptest::collection::btree_set(0u32..10, 0..6),
            0u32..20,
            0usize..12,
        )
            .prop_flat_map(|(ids, start, ticks)| {
                let ids: Vec<u32> = ids.into_iter().collect();
                let sample_ids: Vec<u32> = ids.iter().copied().chain([25, 31]).collect();
                let samples = proptest::collection::vec(
                    proptest::collection::vec(
                        (
                            proptest::sample::select(sample_ids),
                            -12000.0f32..12000.0,
                            -12000.0f32..12000.0,
                        ),
                        0..4,
                    ),
                    ticks,
                );
                let waves = proptest::collection::vec(
                    proptest::option::of(arb_wave_snapshot()),
                    ticks,
                );
                (Just(ids), Just(start), samples, waves)
            })
            .prop_map(|(ids, start, samples, waves)| {
                let ticks = samples.len();
                let mut builder = PayloadBuilder::new(start, start + ticks as u32);
                for id in &ids {
                    builder = builder.player(*id, 2 + id % 2, 1);
                }
                for (tick, window) in samples.into_iter().enumerate() {
                    let mut seen = std::collections::BTreeSet::new();
                    for (id, x, y) in window {
                        // At most one sample per human per tick.
                        if id < replaylens_core::HUMAN_PLAYER_ID_THRESHOLD && !seen.insert(id) {
                            continue;
                        }
                        builder = builder.position(tick, id, x, y);
                    }
                    if let Some(attacker) = ids.get(tick % ids.len().max(1)) {
                        builder = builder.damage(tick, *attacker, 99, tick as i64);
                    }
                }
                for (tick, wave) in waves.into_iter().enumerate() {
                    if let Some(w) = wave {
                        builder = builder.wave(1, w.team, tick, w.x, w.y, w.count);
                    }
                }
                builder.build()
            })
    }
}
