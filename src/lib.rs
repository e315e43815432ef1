//! Flocking boids carrying a proximity-driven epidemic.
//!
//! Each tick every [`Boid`](boid::Boid) queries its neighbors in a
//! [`Space`](space::Space), steers by cohesion, separation and alignment,
//! moves, and advances its [`Health`](boid::Health) state.

pub mod boid;
pub mod config;
pub mod flock;
pub mod space;
