use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub space: SpaceConfig,
    pub boid: BoidConfig,
    pub epidemic: EpidemicConfig,
    pub init: InitConfig,
    pub run: RunConfig,
}

/// Dimensions and topology of the continuous space.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpaceConfig {
    pub width: f64,
    pub height: f64,
    /// Whether the space wraps around at its edges.
    pub torus: bool,
}

/// Kinematic parameters and steering weights shared by every boid.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoidConfig {
    /// Distance moved per step.
    pub speed: f64,
    /// Radius in which neighbors are observed.
    pub vision: f64,
    /// Minimum distance kept from other boids.
    pub separation: f64,

    #[serde(default = "default_cohere")]
    pub cohere: f64,
    #[serde(default = "default_separate")]
    pub separate: f64,
    #[serde(default = "default_align")]
    pub align: f64,
}

/// Process-wide epidemic probabilities.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EpidemicConfig {
    /// Probability of infection per exposure to an infected neighbor.
    #[serde(default = "default_prob_infection")]
    pub prob_infection: f64,
    /// Probability of removal when an infection resolves.
    #[serde(default = "default_prob_mortality")]
    pub prob_mortality: f64,
}

/// Initial population.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InitConfig {
    pub n_agents: usize,
    pub n_infected: usize,
    /// Seed of the random number generator (OS entropy when absent).
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Run length and logging cadence.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub n_steps: usize,
    pub steps_per_log: usize,
    #[serde(default)]
    pub activation: Activation,
}

/// Order in which agents are activated within a tick.
#[derive(Debug, Default, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// Agents are activated in creation order.
    Sequential,
    /// Activation order is shuffled every tick.
    #[default]
    Random,
}

fn default_cohere() -> f64 {
    0.025
}

fn default_separate() -> f64 {
    0.25
}

fn default_align() -> f64 {
    0.04
}

fn default_prob_infection() -> f64 {
    0.5
}

fn default_prob_mortality() -> f64 {
    0.1
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::from_toml(&contents)
    }

    /// Parse and validate a [`Config`] from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        check_num(self.space.width, f64::MIN_POSITIVE..f64::MAX).context("invalid space width")?;
        check_num(self.space.height, f64::MIN_POSITIVE..f64::MAX)
            .context("invalid space height")?;

        self.boid.validate()?;
        self.epidemic.validate()?;

        check_num(self.init.n_agents, 1..1_000_000).context("invalid number of agents")?;
        check_num(self.init.n_infected, 0..=self.init.n_agents)
            .context("invalid number of initially infected agents")?;

        check_num(self.run.n_steps, 1..10_000_000).context("invalid number of steps")?;
        check_num(self.run.steps_per_log, 1..10_000_000)
            .context("invalid number of steps per log")?;

        Ok(())
    }
}

impl BoidConfig {
    /// Check speed, vision, separation and weights are finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        check_num(self.speed, 0.0..f64::MAX).context("invalid speed")?;
        check_num(self.vision, 0.0..f64::MAX).context("invalid vision")?;
        check_num(self.separation, 0.0..f64::MAX).context("invalid separation")?;

        check_num(self.cohere, 0.0..f64::MAX).context("invalid cohesion weight")?;
        check_num(self.separate, 0.0..f64::MAX).context("invalid separation weight")?;
        check_num(self.align, 0.0..f64::MAX).context("invalid alignment weight")?;

        Ok(())
    }
}

impl EpidemicConfig {
    /// Check both probabilities lie in `[0, 1]`.
    pub fn validate(&self) -> Result<()> {
        check_num(self.prob_infection, 0.0..=1.0).context("invalid infection probability")?;
        check_num(self.prob_mortality, 0.0..=1.0).context("invalid mortality probability")?;
        Ok(())
    }
}

/// Fail unless `num` lies in `range`.
///
/// NaN is never contained in any range, so it is always rejected.
pub fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
