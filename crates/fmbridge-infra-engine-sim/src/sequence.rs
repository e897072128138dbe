use fmbridge_ports::midi::RealtimeEvent;
use midly::{Fps, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::BTreeMap;

const DEFAULT_US_PER_QUARTER: u32 = 500_000;

#[derive(thiserror::Error, Debug)]
pub enum SequenceError {
    #[error("parse error: {0}")]
    Parse(String),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimedEvent {
    pub seconds: f64,
    pub event: RealtimeEvent,
}

/// Standard MIDI file flattened into one time-ordered event list.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sequence {
    events: Vec<TimedEvent>,
    length_seconds: f64,
}

impl Sequence {
    pub fn parse(data: &[u8]) -> Result<Self, SequenceError> {
        let smf = Smf::parse(data).map_err(|e| SequenceError::Parse(e.to_string()))?;
        let (ppq, tempo_override) = match smf.header.timing {
            Timing::Metrical(ticks) => (ticks.as_int().max(1), None),
            Timing::Timecode(fps, ticks_per_frame) => {
                let (ppq, us_per_quarter) = timecode_ppq_and_tempo(fps, ticks_per_frame);
                (ppq, Some(us_per_quarter))
            }
        };

        let mut tempo_points: BTreeMap<u64, u32> = BTreeMap::new();
        let mut raw: Vec<(u64, RealtimeEvent)> = Vec::new();
        let mut last_tick = 0u64;

        for track in &smf.tracks {
            let mut tick = 0u64;
            for event in track {
                tick += event.delta.as_int() as u64;
                last_tick = last_tick.max(tick);
                match &event.kind {
                    TrackEventKind::Midi { channel, message } => {
                        raw.push((tick, convert(channel.as_int(), *message)));
                    }
                    TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter)) => {
                        tempo_points.insert(tick, us_per_quarter.as_int());
                    }
                    _ => {}
                }
            }
        }

        let tempo = TempoMap::new(ppq, tempo_points, tempo_override);
        raw.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| rank(&a.1).cmp(&rank(&b.1))));

        let events = raw
            .into_iter()
            .map(|(tick, event)| TimedEvent {
                seconds: tempo.seconds_at(tick),
                event,
            })
            .collect();

        Ok(Self {
            events,
            length_seconds: tempo.seconds_at(last_tick),
        })
    }

    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    pub fn length_seconds(&self) -> f64 {
        self.length_seconds
    }
}

fn convert(channel: u8, message: MidiMessage) -> RealtimeEvent {
    match message {
        MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => RealtimeEvent::NoteOff {
            channel,
            note: key.as_int(),
        },
        MidiMessage::NoteOn { key, vel } => RealtimeEvent::NoteOn {
            channel,
            note: key.as_int(),
            velocity: vel.as_int(),
        },
        MidiMessage::NoteOff { key, .. } => RealtimeEvent::NoteOff {
            channel,
            note: key.as_int(),
        },
        MidiMessage::Aftertouch { key, vel } => RealtimeEvent::NoteAftertouch {
            channel,
            note: key.as_int(),
            pressure: vel.as_int(),
        },
        MidiMessage::Controller { controller, value } => RealtimeEvent::ControllerChange {
            channel,
            controller: controller.as_int(),
            value: value.as_int(),
        },
        MidiMessage::ProgramChange { program } => RealtimeEvent::ProgramChange {
            channel,
            program: program.as_int(),
        },
        MidiMessage::ChannelAftertouch { vel } => RealtimeEvent::ChannelAftertouch {
            channel,
            pressure: vel.as_int(),
        },
        MidiMessage::PitchBend { bend } => RealtimeEvent::PitchBend {
            channel,
            value: bend.0.as_int(),
        },
    }
}

// Releases before attacks on the same tick, so repeated notes retrigger.
fn rank(event: &RealtimeEvent) -> u8 {
    match event {
        RealtimeEvent::ControllerChange { .. }
        | RealtimeEvent::ProgramChange { .. }
        | RealtimeEvent::BankChange { .. }
        | RealtimeEvent::PitchBend { .. } => 0,
        RealtimeEvent::NoteOff { .. } => 1,
        RealtimeEvent::NoteOn { .. } => 2,
        RealtimeEvent::NoteAftertouch { .. } | RealtimeEvent::ChannelAftertouch { .. } => 3,
    }
}

fn timecode_ppq_and_tempo(fps: Fps, ticks_per_frame: u8) -> (u16, u32) {
    let ticks_per_frame = ticks_per_frame.max(1) as u16;
    match fps {
        Fps::Fps24 => (24 * ticks_per_frame, 1_000_000),
        Fps::Fps25 => (25 * ticks_per_frame, 1_000_000),
        Fps::Fps30 => (30 * ticks_per_frame, 1_000_000),
        Fps::Fps29 => (30 * ticks_per_frame, 1_001_000),
    }
}

#[derive(Clone, Copy, Debug)]
struct TempoSegment {
    start_tick: u64,
    start_us: i64,
    us_per_quarter: u32,
}

struct TempoMap {
    ppq: u16,
    segments: Vec<TempoSegment>,
}

impl TempoMap {
    fn new(ppq: u16, points: BTreeMap<u64, u32>, tempo_override: Option<u32>) -> Self {
        let mut points: Vec<(u64, u32)> = match tempo_override {
            Some(us_per_quarter) => vec![(0, us_per_quarter)],
            None => points.into_iter().collect(),
        };
        if points.first().map_or(true, |(tick, _)| *tick != 0) {
            points.insert(0, (0, DEFAULT_US_PER_QUARTER));
        }

        let mut segments: Vec<TempoSegment> = Vec::with_capacity(points.len());
        let mut current_us = 0i64;
        for (tick, us_per_quarter) in points {
            if let Some(prev) = segments.last() {
                current_us += ticks_to_us(tick - prev.start_tick, prev.us_per_quarter, ppq);
            }
            segments.push(TempoSegment {
                start_tick: tick,
                start_us: current_us,
                us_per_quarter,
            });
        }

        Self { ppq, segments }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        let seg = self
            .segments
            .iter()
            .take_while(|seg| seg.start_tick <= tick)
            .last()
            .copied()
            .unwrap_or(self.segments[0]);
        let micros = seg.start_us + ticks_to_us(tick - seg.start_tick, seg.us_per_quarter, self.ppq);
        micros as f64 / 1_000_000.0
    }
}

fn ticks_to_us(ticks: u64, us_per_quarter: u32, ppq: u16) -> i64 {
    let ticks = ticks as i128;
    let us_per_quarter = us_per_quarter as i128;
    let ppq = ppq.max(1) as i128;
    ((ticks * us_per_quarter) / ppq) as i64
}
