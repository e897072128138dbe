use crate::settings::SynthSettings;
use serde::{Deserialize, Serialize};

fn default_sample_rate_hz() -> u32 {
    44_100
}

fn default_init_timeout_ms() -> u64 {
    10_000
}

fn default_command_queue_capacity() -> usize {
    1024
}

fn default_response_queue_capacity() -> usize {
    256
}

fn default_block_frames() -> u32 {
    512
}

#[derive(thiserror::Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
    #[serde(default = "default_command_queue_capacity")]
    pub command_queue_capacity: usize,
    #[serde(default = "default_response_queue_capacity")]
    pub response_queue_capacity: usize,
    /// Frames the render buffer is sized for before the first block.
    #[serde(default = "default_block_frames")]
    pub block_frames: u32,
    pub settings: SynthSettings,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 44_100,
            init_timeout_ms: 10_000,
            command_queue_capacity: 1024,
            response_queue_capacity: 256,
            block_frames: 512,
            settings: SynthSettings::default(),
        }
    }
}

pub trait StoragePort: Send + Sync {
    fn load_config(&self) -> Result<BridgeConfig, StorageError>;
    fn save_config(&self, config: &BridgeConfig) -> Result<(), StorageError>;
}
