mod settings;

pub use settings::{RedisSettings, ServerSettings, Settings, StreamSettings, SweeperSettings};
