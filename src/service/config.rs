use std::path::Path;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

pub static GLOBAL_CONFIG: OnceCell<ServerConfig> = OnceCell::new();
pub fn global_config() -> &'static ServerConfig {
    GLOBAL_CONFIG.get().unwrap()
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    pub ip: String,
    pub port: u16,
    pub max_connection: usize,
    /// inbound frames with a larger payload terminate the connection
    pub max_frame_size: usize,
    pub conn_read_buffer_size: usize,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub network: NetworkConfig,
}

impl ServerConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<ServerConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::IllegalState(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;

        Ok(server_config)
    }
}
