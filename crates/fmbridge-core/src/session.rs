use crate::ipc::StateSnapshot;
use crate::playback::{PlaybackCoordinator, PlaybackMode};
use crate::render_buffer::RenderBuffer;
use fmbridge_domain_codec::{decode_instrument, encode_instrument, Instrument};
use fmbridge_ports::engine::{Emulator, EngineError, EngineLoader, FmEngine};
use fmbridge_ports::midi::RealtimeEvent;
use fmbridge_ports::settings::{SettingsPatch, SynthSettings};
use fmbridge_ports::types::{BankId, Program, INSTRUMENT_SIZE, OUTPUT_CHANNELS};
use tracing::{info, warn};

const I16_SCALE: f32 = 32768.0;

#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    #[error("engine returned no handle for {0} Hz")]
    InitFailed(u32),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("bank {bank_id} unavailable: {source}")]
    BankUnavailable { bank_id: BankId, source: EngineError },
    #[error("instrument {program} of bank {bank_id} unavailable: {source}")]
    InstrumentUnavailable {
        bank_id: BankId,
        program: Program,
        source: EngineError,
    },
    #[error("no MIDI file loaded")]
    NoMidiLoaded,
    #[error("invalid tempo multiplier: {0}")]
    InvalidTempo(f64),
}

/// One rendered block, interleaved stereo.
#[derive(Debug)]
pub struct Rendered<'a> {
    pub samples: &'a [f32],
    /// The loaded file reached its end during this block.
    pub playback_ended: bool,
}

/// Sole owner of the engine handle.
///
/// All engine access goes through here, from a single render context; the
/// session is `Send` but deliberately not shared.
pub struct SynthesisSession {
    engine: Box<dyn FmEngine>,
    sample_rate_hz: u32,
    settings: SynthSettings,
    scratch: RenderBuffer,
    output: Vec<f32>,
    playback: PlaybackCoordinator,
    midi_loaded: bool,
}

impl SynthesisSession {
    pub fn init(
        loader: &dyn EngineLoader,
        sample_rate_hz: u32,
        settings: SynthSettings,
    ) -> Result<Self, SessionError> {
        let engine = loader
            .init(sample_rate_hz)
            .ok_or(SessionError::InitFailed(sample_rate_hz))?;

        let mut session = Self {
            engine,
            sample_rate_hz,
            settings: settings.clone(),
            scratch: RenderBuffer::new(),
            output: Vec::new(),
            playback: PlaybackCoordinator::new(),
            midi_loaded: false,
        };
        session.apply_settings(&SettingsPatch::from(&settings))?;

        info!(
            sample_rate_hz,
            engine = %session.engine.version(),
            emulator = %session.engine.emulator_name(),
            "synthesis session started"
        );
        Ok(session)
    }

    /// Size the render buffers for `frames` ahead of the first block.
    pub fn reserve_frames(&mut self, frames: usize) -> Result<(), SessionError> {
        let samples = frames * OUTPUT_CHANNELS;
        self.scratch.ensure_capacity(self.engine.as_mut(), samples)?;
        if self.output.len() < samples {
            self.output.resize(samples, 0.0);
        }
        Ok(())
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn settings(&self) -> &SynthSettings {
        &self.settings
    }

    pub fn mode(&self) -> PlaybackMode {
        self.playback.mode()
    }

    pub fn midi_loaded(&self) -> bool {
        self.midi_loaded
    }

    pub fn render_buffer(&self) -> &RenderBuffer {
        &self.scratch
    }

    /// Forward the present fields only; each one is recorded in the snapshot
    /// once the engine accepted it.
    pub fn apply_settings(&mut self, patch: &SettingsPatch) -> Result<(), SessionError> {
        let engine = self.engine.as_mut();
        let settings = &mut self.settings;

        if let Some(chips) = patch.num_chips {
            engine.set_num_chips(chips)?;
            settings.num_chips = chips;
        }
        if let Some(channels) = patch.num_four_op_channels {
            engine.set_num_four_op_channels(channels)?;
            settings.num_four_op_channels = channels;
        }
        if let Some(bank) = patch.bank {
            engine.set_bank(bank)?;
            settings.bank = bank;
        }
        if let Some(enabled) = patch.soft_pan {
            engine.set_soft_pan(enabled);
            settings.soft_pan = enabled;
        }
        if let Some(enabled) = patch.deep_vibrato {
            engine.set_deep_vibrato(enabled);
            settings.deep_vibrato = enabled;
        }
        if let Some(enabled) = patch.deep_tremolo {
            engine.set_deep_tremolo(enabled);
            settings.deep_tremolo = enabled;
        }
        if let Some(model) = patch.volume_model {
            engine.set_volume_model(model);
            settings.volume_model = model;
        }
        if let Some(mode) = patch.channel_alloc_mode {
            engine.set_channel_alloc_mode(mode);
            settings.channel_alloc_mode = mode;
        }
        if let Some(enabled) = patch.loop_enabled {
            engine.set_loop_enabled(enabled);
            settings.loop_enabled = enabled;
        }
        Ok(())
    }

    /// Render `frames` stereo frames. Only allocates when the block is larger
    /// than any block before it.
    pub fn render(&mut self, frames: usize) -> Result<Rendered<'_>, SessionError> {
        let sample_count = frames * OUTPUT_CHANNELS;
        if self.output.len() < sample_count {
            self.output.resize(sample_count, 0.0);
        }
        if sample_count == 0 {
            return Ok(Rendered {
                samples: &self.output[..0],
                playback_ended: false,
            });
        }

        let engine = self.engine.as_mut();
        let out_ptr = self.scratch.ensure_capacity(engine, sample_count)?;

        let mut playback_ended = false;
        let produced = if self.playback.is_file() {
            let produced = engine.play(sample_count, out_ptr)?;
            playback_ended = self.playback.check_end_of_stream(engine);
            produced
        } else {
            engine.generate(sample_count, out_ptr)?
        };

        // play/generate may have grown the arena: take a fresh view
        let view = self.scratch.view(engine.heap(), produced.min(sample_count))?;
        let out = &mut self.output[..sample_count];
        let mut written = 0;
        for (dst, sample) in out.iter_mut().zip(view.iter()) {
            *dst = sample as f32 / I16_SCALE;
            written += 1;
        }
        for dst in &mut out[written..] {
            *dst = 0.0;
        }

        Ok(Rendered {
            samples: &self.output[..sample_count],
            playback_ended,
        })
    }

    pub fn handle_event(&mut self, event: RealtimeEvent) {
        self.engine.realtime(event.sanitized());
    }

    pub fn panic(&mut self) {
        self.engine.panic();
    }

    pub fn reset_realtime(&mut self) {
        self.engine.reset_realtime();
    }

    pub fn reset(&mut self) {
        self.engine.reset();
        self.playback.reset();
    }

    pub fn play(&mut self) -> Result<(), SessionError> {
        if !self.midi_loaded {
            return Err(SessionError::NoMidiLoaded);
        }
        self.playback.play(self.engine.as_mut());
        Ok(())
    }

    pub fn stop(&mut self) {
        self.playback.stop(self.engine.as_mut());
    }

    pub fn seek(&mut self, seconds: f64) {
        self.engine.position_seek(seconds.max(0.0));
    }

    pub fn set_loop_enabled(&mut self, enabled: bool) {
        self.engine.set_loop_enabled(enabled);
        self.settings.loop_enabled = enabled;
    }

    pub fn set_tempo(&mut self, tempo: f64) -> Result<(), SessionError> {
        if !tempo.is_finite() || tempo <= 0.0 {
            return Err(SessionError::InvalidTempo(tempo));
        }
        self.engine.set_tempo(tempo);
        Ok(())
    }

    pub fn load_bank(&mut self, data: &[u8]) -> Result<(), SessionError> {
        self.engine.open_bank_data(data)?;
        info!(bytes = data.len(), "bank data loaded");
        Ok(())
    }

    pub fn set_bank(&mut self, bank: u32) -> Result<(), SessionError> {
        self.apply_settings(&SettingsPatch {
            bank: Some(bank),
            ..SettingsPatch::default()
        })
    }

    /// Replace the loaded MIDI file; returns its length in seconds.
    pub fn load_midi(&mut self, data: &[u8]) -> Result<f64, SessionError> {
        let engine = self.engine.as_mut();
        engine.panic();
        self.playback.reset();
        self.midi_loaded = false;

        engine.open_midi_data(data)?;
        engine.set_loop_enabled(self.settings.loop_enabled);
        self.midi_loaded = true;

        let duration = engine.total_time_length();
        info!(bytes = data.len(), duration, "MIDI data loaded");
        Ok(duration)
    }

    pub fn switch_emulator(&mut self, emulator: Emulator) -> Result<(), SessionError> {
        self.engine.switch_emulator(emulator)?;
        Ok(())
    }

    pub fn engine_version(&self) -> String {
        self.engine.version()
    }

    pub fn emulator_name(&self) -> String {
        self.engine.emulator_name()
    }

    pub fn state(&self) -> StateSnapshot {
        StateSnapshot {
            sample_rate_hz: self.sample_rate_hz,
            mode: self.playback.mode(),
            settings: self.settings.clone(),
            midi_loaded: self.midi_loaded,
            position_seconds: self.engine.position_tell(),
            total_seconds: self.engine.total_time_length(),
            at_end: self.engine.at_end(),
            emulator: self.engine.emulator_name(),
        }
    }

    /// Read one instrument; the bank is created when missing.
    pub fn get_instrument(
        &mut self,
        bank_id: BankId,
        program: Program,
    ) -> Result<Instrument, SessionError> {
        let program = program & 0x7F;
        let engine = self.engine.as_mut();
        let bank = engine
            .get_bank(bank_id, true)
            .map_err(|source| SessionError::BankUnavailable { bank_id, source })?;

        let mut raw = [0u8; INSTRUMENT_SIZE];
        engine
            .get_instrument(bank, program, &mut raw)
            .map_err(|source| SessionError::InstrumentUnavailable {
                bank_id,
                program,
                source,
            })?;
        Ok(decode_instrument(&raw))
    }

    /// Write one instrument, then reset the engine so active voices pick it up.
    pub fn set_instrument(
        &mut self,
        bank_id: BankId,
        program: Program,
        instrument: &Instrument,
    ) -> Result<(), SessionError> {
        let program = program & 0x7F;
        let engine = self.engine.as_mut();
        let bank = engine
            .get_bank(bank_id, true)
            .map_err(|source| SessionError::BankUnavailable { bank_id, source })?;

        let raw = encode_instrument(instrument);
        engine
            .set_instrument(bank, program, &raw)
            .map_err(|source| SessionError::InstrumentUnavailable {
                bank_id,
                program,
                source,
            })?;
        engine.reset();
        Ok(())
    }
}

impl Drop for SynthesisSession {
    fn drop(&mut self) {
        self.scratch.release(self.engine.as_mut());
        if self.playback.is_file() {
            warn!("synthesis session closed during file playback");
        }
        info!("synthesis session closed");
    }
}
