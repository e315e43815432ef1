use crate::boid::{Boid, Epidemic, Health, Neighbor};
use crate::config::{Activation, Config};
use crate::space::{AgentId, ContinuousSpace, Space, Vec2};
use anyhow::{Context, Result, bail};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use std::{f64::consts::TAU, fmt};

/// Number of boids in each health state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Census {
    pub susceptible: usize,
    pub infected: usize,
    pub recovered: usize,
    pub removed: usize,
}

impl fmt::Display for Census {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "S={} I={} R={} D={}",
            self.susceptible, self.infected, self.recovered, self.removed
        )
    }
}

/// Population of boids sharing one space, one epidemic and one random source.
///
/// Health changes made during a tick become visible to other boids at the
/// next tick; positions and velocities are visible as soon as they change.
pub struct Flock<S: Space = ContinuousSpace> {
    space: S,
    boids: Vec<Boid>,
    epidemic: Epidemic,
    activation: Activation,
    rng: ChaCha12Rng,

    order: Vec<AgentId>,
    health_at_start: Vec<Health>,
    n_steps: usize,
}

impl Flock<ContinuousSpace> {
    /// Create a flock with a random initial condition.
    ///
    /// Boids are placed uniformly at random with random unit headings; the
    /// first `n_infected` boids start infected.
    pub fn new(cfg: &Config) -> Result<Self> {
        let mut rng = match cfg.init.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng().context("failed to seed rng from the OS")?,
        };

        let space = ContinuousSpace::new(&cfg.space);

        let mut boids = Vec::with_capacity(cfg.init.n_agents);
        for id in 0..cfg.init.n_agents {
            let pos = Vec2::new(
                rng.random_range(0.0..space.width()),
                rng.random_range(0.0..space.height()),
            );
            let angle: f64 = rng.random_range(0.0..TAU);
            let vel = Vec2::new(angle.cos(), angle.sin());
            let health = if id < cfg.init.n_infected {
                Health::Infected
            } else {
                Health::Susceptible
            };
            let boid = Boid::new(id, pos, vel, &cfg.boid, health)
                .with_context(|| format!("failed to construct boid {id}"))?;
            boids.push(boid);
        }

        let epidemic = Epidemic::new(&cfg.epidemic)?;

        Self::from_parts(space, boids, epidemic, cfg.run.activation, rng)
    }
}

impl<S: Space> Flock<S> {
    /// Assemble a flock from existing parts, placing every boid in `space`.
    ///
    /// Boid ids must match their index in `boids`.
    pub fn from_parts(
        mut space: S,
        boids: Vec<Boid>,
        epidemic: Epidemic,
        activation: Activation,
        rng: ChaCha12Rng,
    ) -> Result<Self> {
        for (idx, boid) in boids.iter().enumerate() {
            if boid.id() != idx {
                bail!("boid at index {idx} has id {}", boid.id());
            }
            space.place_agent(boid.id(), boid.pos());
        }

        let n_agents = boids.len();
        Ok(Self {
            space,
            boids,
            epidemic,
            activation,
            rng,
            order: Vec::with_capacity(n_agents),
            health_at_start: Vec::with_capacity(n_agents),
            n_steps: 0,
        })
    }

    pub fn boids(&self) -> &[Boid] {
        &self.boids
    }

    pub fn space(&self) -> &S {
        &self.space
    }

    /// Number of ticks performed so far.
    pub fn n_steps(&self) -> usize {
        self.n_steps
    }

    pub fn census(&self) -> Census {
        let mut census = Census::default();
        for boid in &self.boids {
            match boid.health() {
                Health::Susceptible => census.susceptible += 1,
                Health::Infected => census.infected += 1,
                Health::Recovered => census.recovered += 1,
                Health::Removed => census.removed += 1,
            }
        }
        census
    }

    /// Perform one tick, activating every boid once.
    pub fn step(&mut self) {
        self.health_at_start.clear();
        self.health_at_start
            .extend(self.boids.iter().map(|boid| boid.health()));

        self.order.clear();
        self.order.extend(0..self.boids.len());
        if self.activation == Activation::Random {
            self.order.shuffle(&mut self.rng);
        }

        for i_order in 0..self.order.len() {
            let id = self.order[i_order];
            let neighbors = self.observe(id);

            let boid = &mut self.boids[id];
            boid.update_motion(&mut self.space, &neighbors);
            boid.update_health(&neighbors, &self.epidemic, &mut self.rng);
        }

        self.n_steps += 1;
    }

    /// Perform `n_steps` ticks, logging progress every `steps_per_log` ticks.
    pub fn run(&mut self, n_steps: usize, steps_per_log: usize) -> Result<()> {
        if steps_per_log == 0 {
            bail!("steps per log must be positive");
        }

        log::info!("step {:6}: {}", self.n_steps, self.census());
        for i_step in 0..n_steps {
            self.step();

            if (i_step + 1) % steps_per_log == 0 || i_step + 1 == n_steps {
                let progress = 100.0 * (i_step + 1) as f64 / n_steps as f64;
                log::info!("completed {progress:06.2}%");
                log::info!("step {:6}: {}", self.n_steps, self.census());
            }
        }

        Ok(())
    }

    /// Neighbors within vision of boid `id`, with health as of the start of the tick.
    fn observe(&self, id: AgentId) -> Vec<Neighbor> {
        let boid = &self.boids[id];
        self.space
            .neighbors(&boid.pos(), boid.vision(), true)
            .into_iter()
            .filter(|&other| other != id)
            .map(|other| Neighbor {
                pos: self.boids[other].pos(),
                vel: self.boids[other].vel(),
                health: self.health_at_start[other],
            })
            .collect()
    }
}
