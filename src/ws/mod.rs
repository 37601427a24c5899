mod frame;
mod handler;

pub use frame::{ClientFrame, Outbound, ServerFrame};
pub use handler::ws_handler;
