use fmbridge_domain_codec::{decode_instrument, default_instrument, encode_instrument};
use fmbridge_ports::engine::{ChannelAllocMode, VolumeModel};
use fmbridge_ports::midi::{RealtimeEvent, PITCH_BEND_CENTER};
use fmbridge_ports::types::{BankId, INSTRUMENT_SIZE, MIDI_CHANNELS, PROGRAMS_PER_BANK};
use std::f32::consts::{FRAC_PI_2, TAU};

pub const VOICES_PER_CHIP: usize = 18;
pub const PERCUSSION_CHANNEL: u8 = 9;

const BEND_RANGE_SEMITONES: f32 = 2.0;
const RELEASE_SECONDS: f32 = 0.05;
const VOICE_AMPLITUDE: f32 = 0.25;
const TREMOLO_HZ: f32 = 3.7;
const VIBRATO_HZ: f32 = 6.1;
const LFO_WRAP_SECONDS: f32 = 1000.0;

#[derive(Clone, Copy, Debug)]
struct ChannelState {
    program: u8,
    bank_msb: u8,
    bank_lsb: u8,
    volume: u8,
    pan: u8,
    bend: u16,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            program: 0,
            bank_msb: 0,
            bank_lsb: 0,
            volume: 100,
            pan: 64,
            bend: PITCH_BEND_CENTER,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Voice {
    channel: u8,
    note: u8,
    program: u8,
    freq: f32,
    phase: f32,
    gain: f32,
    am: bool,
    vibrato: bool,
    release_left: Option<u32>,
    age: u64,
}

pub struct Bank {
    pub id: BankId,
    pub instruments: Vec<[u8; INSTRUMENT_SIZE]>,
}

impl Bank {
    fn blank(id: BankId) -> Self {
        let blank = encode_instrument(&default_instrument());
        Self {
            id,
            instruments: vec![blank; PROGRAMS_PER_BANK],
        }
    }
}

/// Sine-voice stand-in for the FM chips. One voice per sounding note, level
/// taken from the carrier of the channel's instrument.
pub struct Synth {
    sample_rate_hz: f32,
    max_voices: usize,
    channels: [ChannelState; MIDI_CHANNELS as usize],
    voices: Vec<Voice>,
    voice_counter: u64,
    lfo_time: f32,
    pub banks: Vec<Bank>,
    pub soft_pan: bool,
    pub deep_vibrato: bool,
    pub deep_tremolo: bool,
    pub volume_model: VolumeModel,
    pub alloc_mode: ChannelAllocMode,
}

impl Synth {
    pub fn new(sample_rate_hz: u32, chips: u32) -> Self {
        let max_voices = chips as usize * VOICES_PER_CHIP;
        Self {
            sample_rate_hz: sample_rate_hz as f32,
            max_voices,
            channels: [ChannelState::default(); MIDI_CHANNELS as usize],
            voices: Vec::with_capacity(max_voices),
            voice_counter: 0,
            lfo_time: 0.0,
            banks: Vec::new(),
            soft_pan: true,
            deep_vibrato: false,
            deep_tremolo: false,
            volume_model: VolumeModel::Auto,
            alloc_mode: ChannelAllocMode::Auto,
        }
    }

    pub fn set_chips(&mut self, chips: u32) {
        self.max_voices = chips as usize * VOICES_PER_CHIP;
        self.voices.truncate(self.max_voices);
        self.voices
            .reserve(self.max_voices.saturating_sub(self.voices.len()));
    }

    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn bank_index(&self, id: BankId) -> Option<usize> {
        self.banks.iter().position(|bank| bank.id == id)
    }

    pub fn create_bank(&mut self, id: BankId) -> usize {
        self.banks.push(Bank::blank(id));
        self.banks.len() - 1
    }

    pub fn handle(&mut self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::NoteOn {
                channel,
                note,
                velocity,
            } => self.note_on(channel, note, velocity),
            RealtimeEvent::NoteOff { channel, note } => self.note_off(channel, note),
            RealtimeEvent::ControllerChange {
                channel,
                controller,
                value,
            } => self.controller(channel, controller, value),
            RealtimeEvent::ProgramChange { channel, program } => {
                self.channel_mut(channel).program = program & 0x7F;
            }
            RealtimeEvent::PitchBend { channel, value } => self.pitch_bend(channel, value),
            RealtimeEvent::BankChange { channel, bank } => {
                let state = self.channel_mut(channel);
                state.bank_msb = ((bank >> 7) & 0x7F) as u8;
                state.bank_lsb = (bank & 0x7F) as u8;
            }
            // no pressure response
            RealtimeEvent::NoteAftertouch { .. } | RealtimeEvent::ChannelAftertouch { .. } => {}
        }
    }

    /// Cut every voice immediately.
    pub fn panic(&mut self) {
        self.voices.clear();
    }

    pub fn release_all(&mut self) {
        let release = self.release_samples();
        for voice in &mut self.voices {
            voice.release_left.get_or_insert(release);
        }
    }

    pub fn reset_controllers(&mut self) {
        self.channels = [ChannelState::default(); MIDI_CHANNELS as usize];
        for voice in &mut self.voices {
            voice.freq = note_freq(voice.note, PITCH_BEND_CENTER);
        }
    }

    pub fn reset(&mut self) {
        self.panic();
        self.reset_controllers();
        self.lfo_time = 0.0;
    }

    pub fn next_frame(&mut self) -> (f32, f32) {
        let dt = 1.0 / self.sample_rate_hz;
        self.lfo_time = (self.lfo_time + dt) % LFO_WRAP_SECONDS;

        let tremolo_depth = if self.deep_tremolo { 0.3 } else { 0.12 };
        let vibrato_cents = if self.deep_vibrato { 14.0 } else { 7.0 };
        let tremolo =
            1.0 - tremolo_depth * 0.5 * (1.0 + (TAU * TREMOLO_HZ * self.lfo_time).sin());
        let vibrato = 2.0_f32.powf(vibrato_cents / 1200.0 * (TAU * VIBRATO_HZ * self.lfo_time).sin());
        let release_total = self.release_samples() as f32;

        let mut left = 0.0;
        let mut right = 0.0;
        for voice in &mut self.voices {
            let channel = self.channels[voice.channel as usize];
            let mut gain = voice.gain * channel.volume as f32 / 127.0;
            if let Some(remaining) = voice.release_left {
                gain *= remaining as f32 / release_total;
                voice.release_left = Some(remaining.saturating_sub(1));
            }
            if voice.am {
                gain *= tremolo;
            }

            let sample = voice.phase.sin() * gain * VOICE_AMPLITUDE;
            let (pan_l, pan_r) = pan_gains(channel.pan, self.soft_pan);
            left += sample * pan_l;
            right += sample * pan_r;

            let freq = if voice.vibrato {
                voice.freq * vibrato
            } else {
                voice.freq
            };
            voice.phase += TAU * freq / self.sample_rate_hz;
            if voice.phase >= TAU {
                voice.phase -= TAU;
            }
        }

        self.voices.retain(|voice| voice.release_left != Some(0));
        (left, right)
    }

    fn channel_mut(&mut self, channel: u8) -> &mut ChannelState {
        &mut self.channels[(channel & 0x0F) as usize]
    }

    fn release_samples(&self) -> u32 {
        ((self.sample_rate_hz * RELEASE_SECONDS) as u32).max(1)
    }

    fn note_on(&mut self, channel: u8, note: u8, velocity: u8) {
        let channel = channel & 0x0F;
        if velocity == 0 {
            self.note_off(channel, note);
            return;
        }

        let state = self.channels[channel as usize];
        let (bank_id, program) = if channel == PERCUSSION_CHANNEL {
            (BankId::percussion(state.bank_msb, state.bank_lsb), note)
        } else {
            (BankId::melodic(state.bank_msb, state.bank_lsb), state.program)
        };

        let (level, am, vibrato) = self.carrier(bank_id, program);
        if level <= 0.0 {
            return;
        }
        if self.voices.len() >= self.max_voices && !self.steal_voice(channel, program) {
            return;
        }

        self.voice_counter = self.voice_counter.wrapping_add(1);
        self.voices.push(Voice {
            channel,
            note,
            program,
            freq: note_freq(note, state.bend),
            phase: 0.0,
            gain: self.velocity_gain(velocity) * level,
            am,
            vibrato,
            release_left: None,
            age: self.voice_counter,
        });
    }

    fn note_off(&mut self, channel: u8, note: u8) {
        let release = self.release_samples();
        for voice in &mut self.voices {
            if voice.channel == channel & 0x0F && voice.note == note && voice.release_left.is_none()
            {
                voice.release_left = Some(release);
            }
        }
    }

    fn controller(&mut self, channel: u8, controller: u8, value: u8) {
        let channel = channel & 0x0F;
        match controller {
            0 => self.channel_mut(channel).bank_msb = value & 0x7F,
            32 => self.channel_mut(channel).bank_lsb = value & 0x7F,
            7 => self.channel_mut(channel).volume = value & 0x7F,
            10 => self.channel_mut(channel).pan = value & 0x7F,
            // all sound off
            120 => self.voices.retain(|voice| voice.channel != channel),
            121 => {
                let program = self.channels[channel as usize].program;
                *self.channel_mut(channel) = ChannelState {
                    program,
                    ..ChannelState::default()
                };
                self.pitch_bend(channel, PITCH_BEND_CENTER);
            }
            // all notes off
            123 => {
                let release = self.release_samples();
                for voice in self.voices.iter_mut().filter(|v| v.channel == channel) {
                    voice.release_left.get_or_insert(release);
                }
            }
            _ => {}
        }
    }

    fn pitch_bend(&mut self, channel: u8, value: u16) {
        let channel = channel & 0x0F;
        self.channel_mut(channel).bend = value;
        for voice in self.voices.iter_mut().filter(|v| v.channel == channel) {
            voice.freq = note_freq(voice.note, value);
        }
    }

    /// Level, tremolo and vibrato flags of the program's carrier. Blank
    /// programs play at full level.
    fn carrier(&self, bank_id: BankId, program: u8) -> (f32, bool, bool) {
        let raw = self
            .bank_index(bank_id)
            .and_then(|idx| self.banks[idx].instruments.get(program as usize));
        let Some(raw) = raw else {
            return (1.0, false, false);
        };

        let instrument = decode_instrument(raw);
        if instrument.is_blank {
            return (1.0, false, false);
        }
        let carrier = instrument.operators[0];
        let level = (63.0 - carrier.total_level.min(63) as f32) / 63.0;
        (level, carrier.am, carrier.vibrato)
    }

    fn velocity_gain(&self, velocity: u8) -> f32 {
        let linear = (velocity & 0x7F) as f32 / 127.0;
        match self.volume_model {
            VolumeModel::Auto | VolumeModel::Generic | VolumeModel::NativeOpl3 => linear,
            _ => linear * linear,
        }
    }

    fn steal_voice(&mut self, channel: u8, program: u8) -> bool {
        let released = oldest(&self.voices, |v| v.release_left.is_some());
        let victim = match self.alloc_mode {
            ChannelAllocMode::AnyReleased => released,
            ChannelAllocMode::SameInst => {
                oldest(&self.voices, |v| v.channel == channel && v.program == program)
                    .or(released)
                    .or_else(|| oldest(&self.voices, |_| true))
            }
            ChannelAllocMode::Auto | ChannelAllocMode::OffDelay => {
                released.or_else(|| oldest(&self.voices, |_| true))
            }
        };

        match victim {
            Some(idx) => {
                self.voices.swap_remove(idx);
                true
            }
            None => false,
        }
    }
}

fn oldest(voices: &[Voice], pick: impl Fn(&Voice) -> bool) -> Option<usize> {
    voices
        .iter()
        .enumerate()
        .filter(|(_, voice)| pick(voice))
        .min_by_key(|(_, voice)| voice.age)
        .map(|(idx, _)| idx)
}

fn note_freq(note: u8, bend: u16) -> f32 {
    let bend = (bend as f32 - PITCH_BEND_CENTER as f32) / PITCH_BEND_CENTER as f32;
    let semitones = note as f32 - 69.0 + bend * BEND_RANGE_SEMITONES;
    440.0 * 2.0_f32.powf(semitones / 12.0)
}

fn pan_gains(pan: u8, soft: bool) -> (f32, f32) {
    if soft {
        let angle = pan.min(127) as f32 / 127.0 * FRAC_PI_2;
        return (angle.cos(), angle.sin());
    }
    match pan {
        0..=47 => (1.0, 0.0),
        81..=127 => (0.0, 1.0),
        _ => (1.0, 1.0),
    }
}
