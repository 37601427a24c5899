mod handlers;
mod health;

pub use handlers::{create_queue, delete_queue, receive_messages, send_message};
pub use health::{health, HealthResponse};
