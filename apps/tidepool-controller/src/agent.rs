use clap::ValueEnum;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tidepool_core::{Coordinate, Observation};

use crate::space::ActionSpace;

/// Decision policy driven by the session runner.
pub trait Agent: Send {
    fn predict(&mut self, observation: &Observation) -> anyhow::Result<Coordinate>;
}

/// Ignores the screen and touches a uniformly random point.
pub struct RandomAgent {
    space: ActionSpace,
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(space: ActionSpace, seed: Option<u64>) -> anyhow::Result<Self> {
        if space.is_empty() {
            anyhow::bail!("cannot sample touches from an empty {:?}", space.dimensions());
        }
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self { space, rng })
    }
}

impl Agent for RandomAgent {
    fn predict(&mut self, _observation: &Observation) -> anyhow::Result<Coordinate> {
        Ok(self.space.sample(&mut self.rng))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum AgentKind {
    #[default]
    Random,
}

impl AgentKind {
    pub fn build(self, space: ActionSpace, seed: Option<u64>) -> anyhow::Result<Box<dyn Agent>> {
        match self {
            AgentKind::Random => Ok(Box::new(RandomAgent::new(space, seed)?)),
        }
    }
}

impl<A: Agent + ?Sized> Agent for Box<A> {
    fn predict(&mut self, observation: &Observation) -> anyhow::Result<Coordinate> {
        (**self).predict(observation)
    }
}
