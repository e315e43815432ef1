use crate::config::SpaceConfig;
use nalgebra::Vector2;

/// Two-dimensional position, velocity or displacement.
pub type Vec2 = Vector2<f64>;

/// Index of an agent within its flock.
pub type AgentId = usize;

/// Metric of a space: how far apart two points are and in which direction.
pub trait Topology {
    /// Displacement from `a` to `b`.
    fn heading(&self, a: &Vec2, b: &Vec2) -> Vec2;

    /// Non-negative distance between `a` and `b`.
    fn distance(&self, a: &Vec2, b: &Vec2) -> f64 {
        self.heading(a, b).norm()
    }
}

/// Spatial index storing one position per agent and answering proximity queries.
pub trait Space: Topology {
    /// Agents within `radius` of `center` (inclusive), in unspecified order.
    ///
    /// Agents located exactly at `center` are skipped unless `include_center` is set.
    fn neighbors(&self, center: &Vec2, radius: f64, include_center: bool) -> Vec<AgentId>;

    /// Insert or overwrite the position of an agent.
    fn place_agent(&mut self, id: AgentId, pos: Vec2);

    /// Relocate an agent and return the position actually stored.
    fn move_agent(&mut self, id: AgentId, pos: Vec2) -> Vec2;
}

/// Rectangular continuous space, optionally wrapping around at its edges.
///
/// Neighbor queries scan every stored position.
#[derive(Debug, Clone)]
pub struct ContinuousSpace {
    width: f64,
    height: f64,
    torus: bool,
    positions: Vec<Option<Vec2>>,
}

impl ContinuousSpace {
    pub fn new(cfg: &SpaceConfig) -> Self {
        Self {
            width: cfg.width,
            height: cfg.height,
            torus: cfg.torus,
            positions: Vec::new(),
        }
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Map an arbitrary point into the space.
    pub fn bound(&self, pos: Vec2) -> Vec2 {
        if self.torus {
            Vec2::new(wrap(pos.x, self.width), wrap(pos.y, self.height))
        } else {
            Vec2::new(pos.x.clamp(0.0, self.width), pos.y.clamp(0.0, self.height))
        }
    }
}

fn wrap(val: f64, size: f64) -> f64 {
    let val = val.rem_euclid(size);
    // Rounding can land tiny negative inputs exactly on the upper edge.
    if val >= size { 0.0 } else { val }
}

fn shortest(delta: f64, size: f64) -> f64 {
    if delta.abs() > size / 2.0 {
        delta - size * delta.signum()
    } else {
        delta
    }
}

impl Topology for ContinuousSpace {
    fn heading(&self, a: &Vec2, b: &Vec2) -> Vec2 {
        let delta = b - a;
        if self.torus {
            Vec2::new(shortest(delta.x, self.width), shortest(delta.y, self.height))
        } else {
            delta
        }
    }
}

impl Space for ContinuousSpace {
    fn neighbors(&self, center: &Vec2, radius: f64, include_center: bool) -> Vec<AgentId> {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(id, pos)| pos.map(|pos| (id, pos)))
            .filter(|(_, pos)| include_center || pos != center)
            .filter(|(_, pos)| self.distance(center, pos) <= radius)
            .map(|(id, _)| id)
            .collect()
    }

    fn place_agent(&mut self, id: AgentId, pos: Vec2) {
        if id >= self.positions.len() {
            self.positions.resize(id + 1, None);
        }
        self.positions[id] = Some(self.bound(pos));
    }

    fn move_agent(&mut self, id: AgentId, pos: Vec2) -> Vec2 {
        let pos = self.bound(pos);
        self.place_agent(id, pos);
        pos
    }
}

/// Unbounded Euclidean plane used as a lightweight stand-in in tests.
#[cfg(test)]
#[derive(Debug, Default, Clone)]
pub struct Plane {
    positions: Vec<Option<Vec2>>,
}

#[cfg(test)]
impl Topology for Plane {
    fn heading(&self, a: &Vec2, b: &Vec2) -> Vec2 {
        b - a
    }
}

#[cfg(test)]
impl Space for Plane {
    fn neighbors(&self, center: &Vec2, radius: f64, include_center: bool) -> Vec<AgentId> {
        self.positions
            .iter()
            .enumerate()
            .filter_map(|(id, pos)| pos.map(|pos| (id, pos)))
            .filter(|(_, pos)| include_center || pos != center)
            .filter(|(_, pos)| (pos - center).norm() <= radius)
            .map(|(id, _)| id)
            .collect()
    }

    fn place_agent(&mut self, id: AgentId, pos: Vec2) {
        if id >= self.positions.len() {
            self.positions.resize(id + 1, None);
        }
        self.positions[id] = Some(pos);
    }

    fn move_agent(&mut self, id: AgentId, pos: Vec2) -> Vec2 {
        self.place_agent(id, pos);
        pos
    }
}
