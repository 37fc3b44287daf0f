mod fitness;
mod individual;
mod optimizer;

pub use fitness::{FitnessCalculator, HARD_WEIGHT, SOFT_WEIGHT};
pub use optimizer::{EngineState, GeneticEngine, RunOutcome};
