pub mod controller;
pub mod countdown;
pub mod error;
pub mod policy;
pub mod recorder;
pub mod state;

pub use controller::{TimerController, TimerEvent};
pub use error::TimerError;
pub use recorder::SessionStore;
pub use state::{TimerState, TimerStatus};
