//! Agent configuration

mod agent;
mod resolver;

pub use agent::{AgentConfig, ConfigLayer, SERVER_DESTINATION};
pub use resolver::{ConfigResolver, LOCAL_CONFIG_NAME, SYSTEM_CONFIG};
