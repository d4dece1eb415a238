use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, TryFromFloatSecsError};

use crate::net::{DEFAULT_PORT, DEFAULT_TICK_RATE, DEFAULT_TIMEOUT_SECS};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub bind_address: IpAddr,
    /// First port the server tries; taken ports are skipped upwards.
    pub server_port: u16,
    /// Local port for the client socket, 0 lets the OS choose.
    pub client_port: u16,
    pub remote_address: String,
    pub remote_port: u16,
    pub timeout: Duration,
    pub tick_rate: u32,
}

impl EngineConfig {
    /// Fails for negative, non-finite or out-of-range values.
    pub fn with_timeout_secs(mut self, secs: f32) -> Result<Self, TryFromFloatSecsError> {
        self.timeout = Duration::try_from_secs_f32(secs)?;
        Ok(self)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate.max(1) as f64)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            server_port: DEFAULT_PORT,
            client_port: 0,
            remote_address: "127.0.0.1".to_string(),
            remote_port: DEFAULT_PORT,
            timeout: Duration::from_secs_f32(DEFAULT_TIMEOUT_SECS),
            tick_rate: DEFAULT_TICK_RATE,
        }
    }
}
