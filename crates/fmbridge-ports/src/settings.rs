use crate::engine::{ChannelAllocMode, VolumeModel};
use serde::{Deserialize, Serialize};

pub const AUTO_FOUR_OP_CHANNELS: i32 = -1;

fn default_num_chips() -> u32 {
    4
}

fn default_four_op_channels() -> i32 {
    AUTO_FOUR_OP_CHANNELS
}

fn default_soft_pan() -> bool {
    true
}

/// Engine settings snapshot held by the synthesis session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthSettings {
    #[serde(default = "default_num_chips")]
    pub num_chips: u32,
    #[serde(default = "default_four_op_channels")]
    pub num_four_op_channels: i32,
    pub bank: u32,
    #[serde(default = "default_soft_pan")]
    pub soft_pan: bool,
    pub deep_vibrato: bool,
    pub deep_tremolo: bool,
    pub volume_model: VolumeModel,
    pub channel_alloc_mode: ChannelAllocMode,
    pub loop_enabled: bool,
}

impl Default for SynthSettings {
    fn default() -> Self {
        Self {
            num_chips: 4,
            num_four_op_channels: AUTO_FOUR_OP_CHANNELS,
            bank: 0,
            soft_pan: true,
            deep_vibrato: false,
            deep_tremolo: false,
            volume_model: VolumeModel::Auto,
            channel_alloc_mode: ChannelAllocMode::Auto,
            loop_enabled: false,
        }
    }
}

/// Partial settings update: only `Some` fields are forwarded to the engine.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_chips: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_four_op_channels: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soft_pan: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_vibrato: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deep_tremolo: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_model: Option<VolumeModel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_alloc_mode: Option<ChannelAllocMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub loop_enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        *self == SettingsPatch::default()
    }
}

impl From<&SynthSettings> for SettingsPatch {
    fn from(s: &SynthSettings) -> Self {
        Self {
            num_chips: Some(s.num_chips),
            num_four_op_channels: Some(s.num_four_op_channels),
            bank: Some(s.bank),
            soft_pan: Some(s.soft_pan),
            deep_vibrato: Some(s.deep_vibrato),
            deep_tremolo: Some(s.deep_tremolo),
            volume_model: Some(s.volume_model),
            channel_alloc_mode: Some(s.channel_alloc_mode),
            loop_enabled: Some(s.loop_enabled),
        }
    }
}
