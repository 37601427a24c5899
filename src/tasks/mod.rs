mod keepalive;
mod sweeper;

pub use keepalive::KeepaliveTask;
pub use sweeper::SweeperTask;
