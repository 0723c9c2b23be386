mod backend;
mod error;
mod event;
mod loading;
mod message;
mod notice;
mod role;
mod session;
mod slash_commands;
mod textarea;

pub use backend::*;
pub use error::*;
pub use event::*;
pub use loading::*;
pub use message::*;
pub use notice::*;
pub use role::*;
pub use session::*;
pub use slash_commands::*;
pub use textarea::*;
