use crate::config::{BoidConfig, EpidemicConfig};
use crate::space::{AgentId, Space, Topology, Vec2};
use anyhow::{Context, Result, bail};
use rand::Rng;
use rand_distr::{Bernoulli, Distribution};
use std::fmt;

/// Number of infected ticks after which an infection resolves.
pub const RESOLUTION_THRESHOLD: u32 = 10;

/// Health state of a boid.
///
/// Transitions only go forward: `Susceptible -> Infected -> {Recovered, Removed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Health {
    Susceptible,
    Infected,
    Recovered,
    Removed,
}

impl Health {
    /// Whether no further transition can leave this state.
    pub fn is_terminal(self) -> bool {
        matches!(self, Health::Recovered | Health::Removed)
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Health::Susceptible => "susceptible",
            Health::Infected => "infected",
            Health::Recovered => "recovered",
            Health::Removed => "removed",
        };
        f.write_str(name)
    }
}

/// Read-only view of another boid as seen by its neighbor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub pos: Vec2,
    pub vel: Vec2,
    pub health: Health,
}

/// Process-wide infection and mortality probabilities.
#[derive(Debug, Clone, Copy)]
pub struct Epidemic {
    infection: Bernoulli,
    mortality: Bernoulli,
}

impl Epidemic {
    pub fn new(cfg: &EpidemicConfig) -> Result<Self> {
        cfg.validate().context("invalid epidemic parameters")?;
        Ok(Self {
            infection: Bernoulli::new(cfg.prob_infection)?,
            mortality: Bernoulli::new(cfg.prob_mortality)?,
        })
    }
}

/// Outcome of a motion update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Motion {
    /// The velocity was steered and renormalized.
    Steered,
    /// The steered velocity vanished, so the previous velocity was kept.
    Retained,
}

/// A flocking agent carrying an epidemic state.
#[derive(Debug, Clone)]
pub struct Boid {
    id: AgentId,

    pos: Vec2,
    vel: Vec2,

    speed: f64,
    vision: f64,
    separation: f64,

    cohere: f64,
    separate: f64,
    align: f64,

    health: Health,
    infection_time: u32,
}

impl Boid {
    /// Create a boid, rejecting invalid parameters and degenerate velocities.
    ///
    /// The velocity is stored normalized to unit length.
    pub fn new(
        id: AgentId,
        pos: Vec2,
        vel: Vec2,
        cfg: &BoidConfig,
        health: Health,
    ) -> Result<Self> {
        cfg.validate().context("invalid boid parameters")?;
        if !pos.iter().all(|c| c.is_finite()) {
            bail!("position must be finite, but is {pos:?}");
        }
        if !vel.iter().all(|c| c.is_finite()) || vel.norm() == 0.0 {
            bail!("velocity must be finite and non-zero, but is {vel:?}");
        }

        Ok(Self {
            id,
            pos,
            vel: vel.normalize(),
            speed: cfg.speed,
            vision: cfg.vision,
            separation: cfg.separation,
            cohere: cfg.cohere,
            separate: cfg.separate,
            align: cfg.align,
            health,
            infection_time: 0,
        })
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn pos(&self) -> Vec2 {
        self.pos
    }

    pub fn vel(&self) -> Vec2 {
        self.vel
    }

    pub fn vision(&self) -> f64 {
        self.vision
    }

    pub fn health(&self) -> Health {
        self.health
    }

    pub fn infection_time(&self) -> u32 {
        self.infection_time
    }

    /// Mean heading towards the neighbors.
    pub fn cohesion<T: Topology + ?Sized>(&self, topo: &T, neighbors: &[Neighbor]) -> Vec2 {
        if neighbors.is_empty() {
            return Vec2::zeros();
        }
        let sum: Vec2 = neighbors
            .iter()
            .map(|other| topo.heading(&self.pos, &other.pos))
            .sum();
        sum / neighbors.len() as f64
    }

    /// Vector pointing away from every neighbor closer than the separation distance.
    pub fn separation<T: Topology + ?Sized>(&self, topo: &T, neighbors: &[Neighbor]) -> Vec2 {
        neighbors
            .iter()
            .filter(|other| topo.distance(&self.pos, &other.pos) < self.separation)
            .map(|other| -topo.heading(&self.pos, &other.pos))
            .sum()
    }

    /// Mean velocity of the neighbors.
    pub fn alignment(&self, neighbors: &[Neighbor]) -> Vec2 {
        if neighbors.is_empty() {
            return Vec2::zeros();
        }
        let sum: Vec2 = neighbors.iter().map(|other| other.vel).sum();
        sum / neighbors.len() as f64
    }

    /// Steer, renormalize and move one step, relocating the boid in `space`.
    ///
    /// If the steered velocity has zero length the previous velocity is kept
    /// for this tick.
    pub fn update_motion<S: Space + ?Sized>(
        &mut self,
        space: &mut S,
        neighbors: &[Neighbor],
    ) -> Motion {
        let delta = (self.cohesion(&*space, neighbors) * self.cohere
            + self.separation(&*space, neighbors) * self.separate
            + self.alignment(neighbors) * self.align)
            / 2.0;

        let vel = self.vel + delta;
        let norm = vel.norm();
        let motion = if norm > 0.0 && norm.is_finite() {
            self.vel = vel / norm;
            Motion::Steered
        } else {
            log::debug!("boid {} retained velocity {:?}", self.id, self.vel);
            Motion::Retained
        };

        self.pos = space.move_agent(self.id, self.pos + self.vel * self.speed);

        motion
    }

    /// Advance the health state by one tick given the neighbors' health.
    ///
    /// A boid infected during this call is not also progressed as infected.
    pub fn update_health<R: Rng + ?Sized>(
        &mut self,
        neighbors: &[Neighbor],
        epidemic: &Epidemic,
        rng: &mut R,
    ) -> Health {
        let prev = self.health;

        match self.health {
            Health::Susceptible => {
                let exposed = neighbors
                    .iter()
                    .filter(|other| other.health == Health::Infected)
                    .any(|_| epidemic.infection.sample(rng));
                if exposed {
                    self.health = Health::Infected;
                }
            }
            Health::Infected => {
                self.infection_time += 1;
                if self.infection_time > RESOLUTION_THRESHOLD {
                    self.health = if epidemic.mortality.sample(rng) {
                        Health::Removed
                    } else {
                        Health::Recovered
                    };
                }
            }
            Health::Recovered | Health::Removed => {}
        }

        if self.health != prev {
            log::trace!("boid {} went from {prev} to {}", self.id, self.health);
        }

        self.health
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::Plane;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;

    fn cfg(separation: f64, cohere: f64, separate: f64, align: f64) -> BoidConfig {
        BoidConfig {
            speed: 1.0,
            vision: 10.0,
            separation,
            cohere,
            separate,
            align,
        }
    }

    fn boid(pos: Vec2, vel: Vec2, health: Health) -> Boid {
        Boid::new(0, pos, vel, &cfg(1.0, 0.025, 0.25, 0.04), health).unwrap()
    }

    fn neighbor(x: f64, y: f64, health: Health) -> Neighbor {
        Neighbor {
            pos: Vec2::new(x, y),
            vel: Vec2::new(1.0, 0.0),
            health,
        }
    }

    fn epidemic(prob_infection: f64, prob_mortality: f64) -> Epidemic {
        Epidemic::new(&EpidemicConfig {
            prob_infection,
            prob_mortality,
        })
        .unwrap()
    }

    #[test]
    fn construction_rejects_invalid_parameters() {
        let origin = Vec2::zeros();
        let east = Vec2::new(1.0, 0.0);
        let healthy = Health::Susceptible;

        assert!(Boid::new(0, origin, east, &cfg(-1.0, 0.0, 0.0, 0.0), healthy).is_err());
        assert!(Boid::new(0, origin, east, &cfg(1.0, -0.1, 0.0, 0.0), healthy).is_err());
        assert!(Boid::new(0, origin, Vec2::zeros(), &cfg(1.0, 0.0, 0.0, 0.0), healthy).is_err());
        assert!(
            Boid::new(0, origin, Vec2::new(f64::NAN, 1.0), &cfg(1.0, 0.0, 0.0, 0.0), healthy)
                .is_err()
        );
        assert!(Boid::new(0, origin, east, &cfg(0.0, 0.0, 0.0, 0.0), healthy).is_ok());
    }

    #[test]
    fn epidemic_rejects_probabilities_outside_unit_interval() {
        let invalid = [(1.5, 0.1), (-0.1, 0.1), (0.5, 2.0), (0.5, f64::NAN)];
        for (prob_infection, prob_mortality) in invalid {
            let cfg = EpidemicConfig {
                prob_infection,
                prob_mortality,
            };
            assert!(Epidemic::new(&cfg).is_err());
        }
    }

    #[test]
    fn collinear_flock_steers_towards_centroid() {
        let plane = Plane::default();
        let me = boid(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Health::Susceptible);
        let neighbors = [
            neighbor(2.0, 0.0, Health::Susceptible),
            neighbor(4.0, 0.0, Health::Susceptible),
        ];

        let cohesion = me.cohesion(&plane, &neighbors);
        assert!((cohesion - Vec2::new(3.0, 0.0)).norm() < 1e-12);
        assert_eq!(me.alignment(&neighbors), Vec2::new(1.0, 0.0));
        assert_eq!(me.separation(&plane, &neighbors), Vec2::zeros());
    }

    #[test]
    fn separation_pushes_away_from_close_neighbors_only() {
        let plane = Plane::default();
        let me = boid(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Health::Susceptible);
        let neighbors = [
            neighbor(0.5, 0.0, Health::Susceptible),
            neighbor(0.0, -0.25, Health::Susceptible),
            neighbor(1.0, 0.0, Health::Susceptible),
        ];
        let separation = me.separation(&plane, &neighbors);
        assert!((separation - Vec2::new(-0.5, 0.25)).norm() < 1e-12);
    }

    #[test]
    fn cancelled_velocity_is_retained() {
        let mut plane = Plane::default();
        let cfg = cfg(0.0, 0.0, 0.0, 1.0);
        let mut me = Boid::new(0, Vec2::zeros(), Vec2::new(3.0, 0.0), &cfg, Health::Susceptible)
            .unwrap();
        assert_eq!(me.vel(), Vec2::new(1.0, 0.0));
        plane.place_agent(0, me.pos());
        let opposing = [Neighbor {
            pos: Vec2::new(3.0, 0.0),
            vel: Vec2::new(-2.0, 0.0),
            health: Health::Susceptible,
        }];

        assert_eq!(me.update_motion(&mut plane, &opposing), Motion::Retained);
        assert_eq!(me.vel(), Vec2::new(1.0, 0.0));
        assert_eq!(me.pos(), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn motion_moves_by_speed_along_unit_velocity() {
        let mut plane = Plane::default();
        let mut me = boid(Vec2::new(1.0, 1.0), Vec2::new(3.0, 4.0), Health::Susceptible);
        plane.place_agent(0, me.pos());

        assert_eq!(me.update_motion(&mut plane, &[]), Motion::Steered);
        assert!((me.vel() - Vec2::new(0.6, 0.8)).norm() < 1e-12);
        assert!((me.pos() - Vec2::new(1.6, 1.8)).norm() < 1e-12);
        assert_eq!(plane.neighbors(&me.pos(), 0.0, true), vec![0]);
    }

    #[test]
    fn motion_leaves_health_untouched() {
        let mut plane = Plane::default();
        let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Infected);
        let neighbors = [neighbor(0.5, 0.5, Health::Susceptible)];
        me.update_motion(&mut plane, &neighbors);
        assert_eq!(me.health(), Health::Infected);
        assert_eq!(me.infection_time(), 0);
    }

    #[test]
    fn certain_exposure_infects_with_zero_duration() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Susceptible);
        let neighbors = [neighbor(1.0, 0.0, Health::Infected)];

        let health = me.update_health(&neighbors, &epidemic(1.0, 0.1), &mut rng);
        assert_eq!(health, Health::Infected);
        assert_eq!(me.infection_time(), 0);
    }

    #[test]
    fn exposure_requires_an_infected_neighbor() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Susceptible);
        let neighbors = [
            neighbor(1.0, 0.0, Health::Recovered),
            neighbor(0.0, 1.0, Health::Removed),
            neighbor(1.0, 1.0, Health::Susceptible),
        ];

        let health = me.update_health(&neighbors, &epidemic(1.0, 0.1), &mut rng);
        assert_eq!(health, Health::Susceptible);
        assert_eq!(me.update_health(&[], &epidemic(1.0, 0.1), &mut rng), Health::Susceptible);
    }

    #[test]
    fn long_infection_recovers_without_mortality() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Infected);
        me.infection_time = 11;
        assert_eq!(me.update_health(&[], &epidemic(0.5, 0.0), &mut rng), Health::Recovered);
    }

    #[test]
    fn long_infection_is_removed_with_certain_mortality() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Infected);
        me.infection_time = 11;
        assert_eq!(me.update_health(&[], &epidemic(0.5, 1.0), &mut rng), Health::Removed);
    }

    #[test]
    fn infection_resolves_on_the_eleventh_tick() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let epidemic = epidemic(0.5, 0.0);
        let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Infected);

        for tick in 1..=RESOLUTION_THRESHOLD {
            assert_eq!(me.update_health(&[], &epidemic, &mut rng), Health::Infected);
            assert_eq!(me.infection_time(), tick);
        }
        assert_eq!(me.update_health(&[], &epidemic, &mut rng), Health::Recovered);
        assert_eq!(me.infection_time(), RESOLUTION_THRESHOLD + 1);
    }

    #[test]
    fn health_display_is_lowercase() {
        assert_eq!(Health::Susceptible.to_string(), "susceptible");
        assert_eq!(Health::Removed.to_string(), "removed");
    }

    prop_compose! {
        fn arb_vec(max: f64)(x in -max..max, y in -max..max) -> Vec2 {
            Vec2::new(x, y)
        }
    }

    prop_compose! {
        fn arb_neighbor()(
            pos in arb_vec(20.0),
            vel in arb_vec(2.0),
            health in prop_oneof![
                Just(Health::Susceptible),
                Just(Health::Infected),
                Just(Health::Recovered),
                Just(Health::Removed),
            ]
        ) -> Neighbor {
            Neighbor { pos, vel, health }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn empty_neighbors_steer_nowhere(
            pos in arb_vec(50.0),
            separation in 0.0f64..20.0,
        ) {
            let plane = Plane::default();
            let me = Boid::new(0, pos, Vec2::new(0.0, 1.0), &cfg(separation, 1.0, 1.0, 1.0), Health::Susceptible).unwrap();
            prop_assert_eq!(me.cohesion(&plane, &[]), Vec2::zeros());
            prop_assert_eq!(me.separation(&plane, &[]), Vec2::zeros());
            prop_assert_eq!(me.alignment(&[]), Vec2::zeros());
        }

        #[test]
        fn separation_ignores_neighbors_at_or_beyond_threshold(
            separation in 0.0f64..20.0,
            offsets in prop::collection::vec((0.0f64..20.0, 0.0f64..std::f64::consts::TAU), 0..10),
        ) {
            let plane = Plane::default();
            let me = Boid::new(0, Vec2::zeros(), Vec2::new(1.0, 0.0), &cfg(separation, 1.0, 1.0, 1.0), Health::Susceptible).unwrap();
            let neighbors: Vec<_> = offsets
                .iter()
                .map(|&(extra, angle)| Neighbor {
                    pos: Vec2::new(angle.cos(), angle.sin()) * (separation + extra),
                    vel: Vec2::zeros(),
                    health: Health::Susceptible,
                })
                .filter(|other| other.pos.norm() >= separation)
                .collect();
            prop_assert_eq!(me.separation(&plane, &neighbors), Vec2::zeros());
        }

        #[test]
        fn steered_velocity_has_unit_length(
            vel in arb_vec(5.0),
            neighbors in prop::collection::vec(arb_neighbor(), 0..8),
        ) {
            prop_assume!(vel.norm() > 1e-6);
            let mut plane = Plane::default();
            let mut me = Boid::new(0, Vec2::zeros(), vel, &cfg(2.0, 0.025, 0.25, 0.04), Health::Susceptible).unwrap();
            plane.place_agent(0, me.pos());

            match me.update_motion(&mut plane, &neighbors) {
                Motion::Steered => prop_assert!((me.vel().norm() - 1.0).abs() < 1e-9),
                Motion::Retained => prop_assert!((me.vel() - vel / vel.norm()).norm() < 1e-12),
            }
            prop_assert!(me.vel().iter().all(|c| c.is_finite()));
            prop_assert!(me.vel().norm() > 0.0);
        }

        #[test]
        fn terminal_states_never_change(
            seed in any::<u64>(),
            terminal in prop_oneof![Just(Health::Recovered), Just(Health::Removed)],
            prob_infection in 0.0f64..=1.0,
            prob_mortality in 0.0f64..=1.0,
            ticks in prop::collection::vec(prop::collection::vec(arb_neighbor(), 0..5), 1..20),
        ) {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let epidemic = epidemic(prob_infection, prob_mortality);
            let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), terminal);
            for neighbors in &ticks {
                prop_assert_eq!(me.update_health(neighbors, &epidemic, &mut rng), terminal);
            }
        }

        #[test]
        fn infection_counter_ticks_until_resolution(
            seed in any::<u64>(),
            prob_mortality in 0.0f64..=1.0,
            neighbors in prop::collection::vec(arb_neighbor(), 0..5),
        ) {
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            let epidemic = epidemic(1.0, prob_mortality);
            let mut me = boid(Vec2::zeros(), Vec2::new(1.0, 0.0), Health::Infected);
            let mut prev = me.infection_time();
            while me.health() == Health::Infected {
                me.update_health(&neighbors, &epidemic, &mut rng);
                prop_assert_eq!(me.infection_time(), prev + 1);
                prev = me.infection_time();
            }
            prop_assert!(me.health().is_terminal());
            prop_assert_eq!(me.infection_time(), RESOLUTION_THRESHOLD + 1);
        }
    }
}
