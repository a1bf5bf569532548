pub mod schedule;
pub mod session;
pub mod tariff;
pub mod time_grid;

pub use schedule::*;
pub use session::*;
pub use tariff::*;
pub use time_grid::*;
