pub mod lp;
pub mod model;
pub mod policy;
pub mod solver;
pub mod strategies;
pub mod tiebreak;
pub mod types;

pub use model::{ChargingModel, ModelBuilder, SolvedModel};
pub use policy::*;
pub use solver::{GoodLpSolver, Solver};
pub use strategies::*;
pub use tiebreak::*;
pub use types::*;
