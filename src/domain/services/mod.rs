pub mod actions;
mod app_state;
mod bubble;
mod bubble_list;
pub mod events;
mod orchestrator;
mod scroll;
mod session_list;

pub use app_state::*;
pub use bubble::*;
pub use bubble_list::*;
pub use orchestrator::*;
pub use scroll::*;
pub use session_list::*;
