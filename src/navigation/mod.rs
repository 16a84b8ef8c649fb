//! Turn-by-turn guidance along a planned route

pub mod instructions;
pub mod live;
pub mod machine;
pub mod session;
pub mod state;

pub use live::LiveNavSession;
pub use machine::{NavEvent, NavMachine};
pub use session::NavSession;
pub use state::{NavState, StateKind};
