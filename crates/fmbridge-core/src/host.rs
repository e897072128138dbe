use crate::ipc::{ReadyInfo, Request, Response, VersionInfo};
use crate::session::{SessionError, SynthesisSession};
use fmbridge_ports::audio::RenderCallback;
use fmbridge_ports::engine::EngineLoader;
use fmbridge_ports::storage::BridgeConfig;
use rtrb::{Consumer, Producer};
use std::collections::VecDeque;
use tracing::warn;

/// Render-path end of the control channel.
pub struct RenderLink {
    requests: Consumer<Request>,
    responses: Producer<Response>,
}

impl RenderLink {
    pub(crate) fn new(requests: Consumer<Request>, responses: Producer<Response>) -> Self {
        Self {
            requests,
            responses,
        }
    }

    pub fn pop_request(&mut self) -> Option<Request> {
        self.requests.pop().ok()
    }

    /// Hands the response back when the queue is full.
    pub fn push_response(&mut self, response: Response) -> Result<(), Response> {
        self.responses.push(response).map_err(|err| match err {
            rtrb::PushError::Full(response) => response,
        })
    }
}

/// Owns the session on the render thread and pumps the control channel at
/// block boundaries.
pub struct RenderHost {
    session: SynthesisSession,
    link: RenderLink,
    /// Answers waiting for room in the response queue, oldest first.
    overflow: VecDeque<Response>,
}

impl RenderHost {
    /// Acquire the engine and answer the handshake.
    ///
    /// On failure the client receives `Response::Error` and `None` is
    /// returned; the link is dropped with it.
    pub fn start(
        loader: &dyn EngineLoader,
        config: &BridgeConfig,
        mut link: RenderLink,
    ) -> Option<Self> {
        let session = SynthesisSession::init(loader, config.sample_rate_hz, config.settings.clone())
            .and_then(|mut session| {
                session.reserve_frames(config.block_frames as usize)?;
                Ok(session)
            });

        match session {
            Ok(session) => {
                let ready = Response::Ready(ReadyInfo {
                    sample_rate_hz: session.sample_rate_hz(),
                    engine_version: session.engine_version(),
                });
                let mut host = Self {
                    session,
                    link,
                    overflow: VecDeque::with_capacity(config.response_queue_capacity.max(1)),
                };
                host.respond(ready);
                Some(host)
            }
            Err(err) => {
                warn!(error = %err, "engine initialization failed");
                if link
                    .push_response(Response::Error {
                        message: err.to_string(),
                    })
                    .is_err()
                {
                    warn!("response queue full, initialization error lost");
                }
                None
            }
        }
    }

    pub fn session(&self) -> &SynthesisSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SynthesisSession {
        &mut self.session
    }

    /// Responses held back because the response queue was full.
    pub fn pending_responses(&self) -> usize {
        self.overflow.len()
    }

    /// Apply every queued request in order. Returns how many were applied.
    pub fn drain_commands(&mut self) -> usize {
        self.flush_responses();
        let mut applied = 0;
        while let Some(request) = self.link.pop_request() {
            self.handle_request(request);
            applied += 1;
        }
        applied
    }

    /// Move held-back responses into the queue while it has room.
    pub fn flush_responses(&mut self) -> usize {
        let mut flushed = 0;
        while let Some(response) = self.overflow.pop_front() {
            if let Err(response) = self.link.push_response(response) {
                self.overflow.push_front(response);
                break;
            }
            flushed += 1;
        }
        flushed
    }

    pub fn handle_request(&mut self, request: Request) {
        if let Some(event) = request.as_realtime() {
            self.session.handle_event(event);
            return;
        }

        let session = &mut self.session;
        let response = match request {
            Request::Panic => {
                session.panic();
                None
            }
            Request::ResetRealtime => {
                session.reset_realtime();
                None
            }
            Request::Reset => {
                session.reset();
                None
            }
            Request::Configure { settings } => {
                report(session.apply_settings(&settings), "configure")
            }
            Request::Play => report(session.play(), "play"),
            Request::Stop => {
                session.stop();
                None
            }
            Request::Seek { seconds } => {
                session.seek(seconds);
                None
            }
            Request::SetLoop { enabled } => {
                session.set_loop_enabled(enabled);
                None
            }
            Request::SetTempo { tempo } => report(session.set_tempo(tempo), "set tempo"),
            Request::LoadBank { data } => {
                let (success, error) = outcome(session.load_bank(&data), "load bank");
                Some(Response::LoadBank { success, error })
            }
            Request::SetBank { bank } => {
                let (success, error) = outcome(session.set_bank(bank), "set bank");
                Some(Response::SetBank {
                    success,
                    bank,
                    error,
                })
            }
            Request::GetInstrument { bank_id, program } => {
                Some(match session.get_instrument(bank_id, program) {
                    Ok(instrument) => Response::GetInstrument {
                        success: true,
                        bank_id,
                        program,
                        instrument: Some(instrument),
                        error: None,
                    },
                    Err(err) => {
                        warn!(error = %err, "get instrument failed");
                        Response::GetInstrument {
                            success: false,
                            bank_id,
                            program,
                            instrument: None,
                            error: Some(err.to_string()),
                        }
                    }
                })
            }
            Request::SetInstrument {
                bank_id,
                program,
                instrument,
            } => {
                let (success, error) = outcome(
                    session.set_instrument(bank_id, program, &instrument),
                    "set instrument",
                );
                Some(Response::SetInstrument { success, error })
            }
            Request::SwitchEmulator { emulator } => {
                let (success, error) =
                    outcome(session.switch_emulator(emulator), "switch emulator");
                Some(Response::SwitchEmulator {
                    success,
                    emulator,
                    error,
                })
            }
            Request::GetVersion => Some(Response::GetVersion(VersionInfo {
                bridge: env!("CARGO_PKG_VERSION").to_string(),
                engine: session.engine_version(),
                emulator: session.emulator_name(),
            })),
            Request::GetState => Some(Response::GetState(session.state())),
            Request::LoadMidi { data } => Some(match session.load_midi(&data) {
                Ok(duration) => Response::LoadMidi {
                    success: true,
                    duration_seconds: Some(duration),
                    error: None,
                },
                Err(err) => {
                    warn!(error = %err, "load MIDI failed");
                    Response::LoadMidi {
                        success: false,
                        duration_seconds: None,
                        error: Some(err.to_string()),
                    }
                }
            }),
            // realtime events were handled above
            Request::NoteOn { .. }
            | Request::NoteOff { .. }
            | Request::NoteAftertouch { .. }
            | Request::ChannelAftertouch { .. }
            | Request::ControllerChange { .. }
            | Request::ProgramChange { .. }
            | Request::PitchBend { .. }
            | Request::BankChange { .. } => None,
        };

        if let Some(response) = response {
            self.respond(response);
        }
    }

    /// Drain the channel, then fill one planar stereo block.
    pub fn process(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.drain_commands();

        let frames = out_l.len().min(out_r.len());
        let mut ended = false;
        let mut failure = None;

        match self.session.render(frames) {
            Ok(rendered) => {
                ended = rendered.playback_ended;
                for (i, frame) in rendered.samples.chunks_exact(2).enumerate() {
                    out_l[i] = frame[0];
                    out_r[i] = frame[1];
                }
            }
            Err(err) => {
                out_l[..frames].fill(0.0);
                out_r[..frames].fill(0.0);
                failure = Some(err);
            }
        }
        out_l[frames..].fill(0.0);
        out_r[frames..].fill(0.0);

        if let Some(err) = failure {
            warn!(error = %err, "render failed, block silenced");
            self.respond(Response::Diagnostic {
                message: format!("render failed: {err}"),
            });
        }
        if ended {
            self.respond(Response::PlaybackEnded);
        }
    }

    /// Answers are never dropped: once the queue is full they wait in
    /// `overflow`, keeping their order, until the next flush.
    fn respond(&mut self, response: Response) {
        let response = if self.overflow.is_empty() {
            match self.link.push_response(response) {
                Ok(()) => return,
                Err(response) => response,
            }
        } else {
            response
        };
        if self.overflow.len() == self.overflow.capacity() {
            warn!(held = self.overflow.len(), "response queue full, overflow growing");
        }
        self.overflow.push_back(response);
    }
}

impl RenderCallback for RenderHost {
    fn render(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.process(out_l, out_r);
    }
}

fn outcome(result: Result<(), SessionError>, what: &str) -> (bool, Option<String>) {
    match result {
        Ok(()) => (true, None),
        Err(err) => {
            warn!(error = %err, "{what} failed");
            (false, Some(err.to_string()))
        }
    }
}

/// Fire-and-forget failures surface as diagnostics.
fn report(result: Result<(), SessionError>, what: &str) -> Option<Response> {
    match result {
        Ok(()) => None,
        Err(err) => {
            warn!(error = %err, "{what} failed");
            Some(Response::Diagnostic {
                message: format!("{what} failed: {err}"),
            })
        }
    }
}
