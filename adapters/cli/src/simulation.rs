//! Headless simulation loop that drives NPC pursuers across a generated level.

use anyhow::{bail, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tower_siege_core::{BuildingKind, Command, Event, MatrixPosition};
use tower_siege_system_pursuit::{PursuitState, Pursuer};
use tower_siege_world::{apply, navigation, query, World, WorldPosition};
use tracing::{debug, info};

use crate::config::GameConfig;

/// Simulated milliseconds per tick.
const TICK_MS: u32 = 16;
/// Ticks between two player steps.
const PLAYER_STEP_INTERVAL: u64 = 20;
/// World units an NPC covers per tick.
const NPC_SPEED: f32 = 2.5;
/// Fog-of-war radius lifted around the player.
const REVEAL_RADIUS: u32 = 6;
/// Ticks an NPC stays calm after striking the player.
const STRIKE_COOLDOWN_TICKS: u64 = 45;

const BUILDING_KINDS: [BuildingKind; 3] = [
    BuildingKind::Wall,
    BuildingKind::Tower,
    BuildingKind::Generator,
];

const PLAYER_STEPS: [(i32, i32); 4] = [(0, -1), (1, 0), (0, 1), (-1, 0)];

/// Population parameters chosen on the command line.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SimulationOptions {
    /// Number of pursuing NPCs.
    pub(crate) npcs: usize,
    /// Number of building placements attempted before the first tick.
    pub(crate) buildings: usize,
    /// Seed driving spawn positions, placements and player movement.
    pub(crate) seed: u64,
}

/// Aggregated outcome of a simulation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    /// Ticks simulated.
    pub(crate) ticks: u64,
    /// Simulated milliseconds.
    pub(crate) elapsed_ms: u64,
    /// Buildings that were placed.
    pub(crate) buildings_placed: usize,
    /// Building placements the world rejected.
    pub(crate) buildings_rejected: usize,
    /// NPCs standing at the end of their path when the run ended.
    pub(crate) arrived: usize,
    /// NPCs waiting out a failed request when the run ended.
    pub(crate) stalled: usize,
    /// NPCs within reach of the player when the run ended.
    pub(crate) engaged: usize,
    /// NPCs standing on revealed ground when the run ended.
    pub(crate) visible: usize,
    /// Strikes landed by engaged NPCs.
    pub(crate) strikes: u64,
    /// Node expansions spent by the navigator.
    pub(crate) expansions: u64,
    /// Requests that resolved with a path.
    pub(crate) resolved: u64,
    /// Requests that resolved without a path.
    pub(crate) failed: u64,
    /// Requests withdrawn by the final teardown.
    pub(crate) cancelled: usize,
}

struct Npc {
    pursuer: Pursuer,
    position: WorldPosition,
}

/// World plus the actors that live in it.
pub(crate) struct Simulation {
    world: World,
    npcs: Vec<Npc>,
    player: MatrixPosition,
    rng: ChaCha8Rng,
    summary: Summary,
}

impl Simulation {
    /// Generates the level, places buildings and spawns every actor.
    pub(crate) fn new(config: &GameConfig, options: SimulationOptions) -> Result<Self> {
        let mut world = World::from_config(&config.world());
        let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
        let mut summary = Summary::default();

        let (width, height) = query::level(&world).matrix().dimensions();
        if width == 0 || height == 0 {
            bail!("level dimensions must be non-zero, got {width}x{height}");
        }

        let mut events = Vec::new();
        for _ in 0..options.buildings {
            let kind = BUILDING_KINDS[rng.gen_range(0..BUILDING_KINDS.len())];
            let origin = MatrixPosition::new(rng.gen_range(0..width), rng.gen_range(0..height));
            apply(&mut world, Command::PlaceBuilding { kind, origin }, &mut events);
        }
        for event in events.drain(..) {
            match event {
                Event::BuildingPlaced { .. } => summary.buildings_placed += 1,
                Event::BuildingPlacementRejected { .. } => summary.buildings_rejected += 1,
                _ => {}
            }
        }

        let walkable: Vec<MatrixPosition> = query::level(&world).walkable_cells().collect();
        if walkable.is_empty() {
            bail!("generated level has no walkable cells");
        }

        let player = walkable[rng.gen_range(0..walkable.len())];
        let npcs = (0..options.npcs)
            .map(|_| {
                let cell = walkable[rng.gen_range(0..walkable.len())];
                Npc {
                    pursuer: Pursuer::new(config.pursuit),
                    position: query::level(&world).to_world_position(cell),
                }
            })
            .collect();

        apply(
            &mut world,
            Command::RevealArea {
                center: player,
                radius: REVEAL_RADIUS,
            },
            &mut events,
        );
        info!(
            width,
            height,
            walkable = walkable.len(),
            buildings = summary.buildings_placed,
            npcs = options.npcs,
            "simulation ready"
        );

        Ok(Self {
            world,
            npcs,
            player,
            rng,
            summary,
        })
    }

    /// Runs `ticks` frames, then tears the navigator down.
    pub(crate) fn run(&mut self, ticks: u64) -> Summary {
        for _ in 0..ticks {
            self.step();
        }

        let mut events = Vec::new();
        apply(&mut self.world, Command::Teardown, &mut events);
        for event in events {
            if let Event::NavigatorCleared { cancelled } = event {
                self.summary.cancelled += cancelled;
            }
        }

        self.summary.elapsed_ms = query::elapsed_ms(&self.world);
        self.summary.arrived = self.count_in(PursuitState::Arrived);
        self.summary.stalled = self.count_in(PursuitState::Stalled);
        self.summary.engaged = self.count_in(PursuitState::Engaged);
        let level = query::level(&self.world);
        self.summary.visible = self
            .npcs
            .iter()
            .filter(|npc| Pursuer::is_visible(level, npc.position))
            .count();
        self.summary
    }

    fn step(&mut self) {
        self.summary.ticks += 1;
        let tick = self.summary.ticks;
        if tick % PLAYER_STEP_INTERVAL == 0 {
            self.move_player();
        }

        let target = query::level(&self.world).to_world_position(self.player);
        for npc in &mut self.npcs {
            let (navigator, level) = navigation(&mut self.world);
            npc.pursuer.update(navigator, level, npc.position, target, tick);
            if npc.pursuer.state() == PursuitState::Engaged && !npc.pursuer.is_calm(tick) {
                self.summary.strikes += 1;
                npc.pursuer.calm(tick + STRIKE_COOLDOWN_TICKS);
            }
            npc.position = npc.pursuer.advance(npc.position, NPC_SPEED);
        }

        let mut events = Vec::new();
        apply(&mut self.world, Command::Tick { dt_ms: TICK_MS }, &mut events);
        for event in events {
            if let Event::NavigatorAdvanced { report } = event {
                debug!(
                    tick,
                    expansions = report.expansions,
                    resolved = report.resolved,
                    failed = report.failed,
                    restarts = report.restarts,
                    pending = report.pending,
                    "navigator report"
                );
                self.summary.expansions += u64::from(report.expansions);
                self.summary.resolved += u64::from(report.resolved);
                self.summary.failed += u64::from(report.failed);
            }
        }
    }

    fn move_player(&mut self) {
        let level = query::level(&self.world);
        let (width, height) = level.matrix().dimensions();
        let candidates: Vec<MatrixPosition> = PLAYER_STEPS
            .iter()
            .filter_map(|&(dx, dy)| self.player.offset(dx, dy, width, height))
            .filter(|cell| level.is_walkable(*cell))
            .collect();
        if candidates.is_empty() {
            return;
        }

        self.player = candidates[self.rng.gen_range(0..candidates.len())];
        let mut events = Vec::new();
        apply(
            &mut self.world,
            Command::RevealArea {
                center: self.player,
                radius: REVEAL_RADIUS,
            },
            &mut events,
        );
    }

    fn count_in(&self, state: PursuitState) -> usize {
        self.npcs
            .iter()
            .filter(|npc| npc.pursuer.state() == state)
            .count()
    }
}
