pub mod appointment;
pub mod session;

pub use appointment::{Appointment, Business};
pub use session::{CallSession, SlotState, Stage, TurnResult};
