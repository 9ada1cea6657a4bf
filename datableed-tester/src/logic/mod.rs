pub mod game_tester;
pub mod policy;
pub mod reports;
pub mod tester;

pub use game_tester::{RunSummary, SimulationPlan};
pub use policy::GameplayStrategy;
pub use tester::*;
