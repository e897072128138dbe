use fmbridge_ports::engine::FmEngine;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Audio comes from live events only.
    #[default]
    Realtime,
    /// Audio comes from advancing the loaded MIDI file.
    File,
}

/// File-vs-realtime state machine consulted once per render.
///
/// Transitions:
/// - `Realtime --play--> File` (rewinds first when the file already ended)
/// - `File --end of stream during render--> Realtime` (panic, one notification)
/// - `* --stop--> Realtime` (rewind + panic, always)
/// - `* --reset--> Realtime`
#[derive(Clone, Debug, Default)]
pub struct PlaybackCoordinator {
    mode: PlaybackMode,
}

impl PlaybackCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn is_file(&self) -> bool {
        self.mode == PlaybackMode::File
    }

    pub fn play(&mut self, engine: &mut dyn FmEngine) {
        if engine.at_end() {
            engine.position_rewind();
        }
        self.mode = PlaybackMode::File;
    }

    pub fn stop(&mut self, engine: &mut dyn FmEngine) {
        engine.position_rewind();
        engine.panic();
        self.mode = PlaybackMode::Realtime;
    }

    /// Called from the render path after `play`. Returns true exactly once per
    /// natural end of the file.
    pub fn check_end_of_stream(&mut self, engine: &mut dyn FmEngine) -> bool {
        if self.mode != PlaybackMode::File || !engine.at_end() {
            return false;
        }
        engine.panic();
        self.mode = PlaybackMode::Realtime;
        true
    }

    pub fn reset(&mut self) {
        self.mode = PlaybackMode::Realtime;
    }
}
