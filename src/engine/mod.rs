// Request translation core: planning, lowering, execution, shaping
pub mod cursor;
pub mod dialect;
pub mod executor;
pub mod gateway;
pub mod planner;
pub mod rest_params;
pub mod shaper;
pub mod sql_builder;
pub mod structure;

pub use cursor::*;
pub use dialect::*;
pub use executor::*;
pub use gateway::*;
pub use planner::*;
pub use rest_params::*;
pub use shaper::*;
pub use sql_builder::*;
pub use structure::*;
