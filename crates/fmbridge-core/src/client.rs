use crate::host::RenderLink;
use crate::ipc::{Event, ReadyInfo, Request, Response, ResponseKind, StateSnapshot, VersionInfo};
use crate::registry::{HandlerId, HandlerRegistry};
use fmbridge_domain_codec::Instrument;
use fmbridge_ports::engine::Emulator;
use fmbridge_ports::settings::SettingsPatch;
use fmbridge_ports::storage::BridgeConfig;
use fmbridge_ports::types::{BankId, Program};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const RECENT_DIAGNOSTICS: usize = 20;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("command queue is full")]
    QueueFull,
    #[error("render side is gone")]
    Disconnected,
    #[error("request {0:?} has no response")]
    NoResponseExpected(&'static str),
    #[error("initialization already in progress")]
    InitInProgress,
    #[error("initialization timed out after {0:?}")]
    InitTimeout(Duration),
    #[error("engine initialization failed: {0}")]
    InitFailed(String),
    #[error("request rejected: {0}")]
    Rejected(String),
    #[error("unexpected response {0:?}")]
    Unexpected(ResponseKind),
}

enum Slot<T> {
    Pending,
    Settled(Result<T, ProtocolError>),
    Taken,
}

/// Outcome of a request, filled in by its one-shot handler.
///
/// The first outcome wins; anything settled afterwards is ignored.
pub struct PendingReply<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for PendingReply<T> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
        }
    }
}

impl<T> PendingReply<T> {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot::Pending)),
        }
    }

    fn settle(&self, outcome: Result<T, ProtocolError>) -> bool {
        let mut slot = self.slot.lock();
        if !matches!(*slot, Slot::Pending) {
            return false;
        }
        *slot = Slot::Settled(outcome);
        true
    }

    pub fn is_settled(&self) -> bool {
        !matches!(*self.slot.lock(), Slot::Pending)
    }

    /// Take the outcome once it is available.
    pub fn try_take(&self) -> Option<Result<T, ProtocolError>> {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Taken) {
            Slot::Settled(outcome) => Some(outcome),
            Slot::Pending => {
                *slot = Slot::Pending;
                None
            }
            Slot::Taken => None,
        }
    }
}

struct InitWatch {
    deadline: Instant,
    timeout: Duration,
    reply: PendingReply<ReadyInfo>,
    on_ready: HandlerId,
    on_error: HandlerId,
}

/// Build both ends of the control channel.
pub fn channel(command_capacity: usize, response_capacity: usize) -> (SynthClient, RenderLink) {
    let (request_tx, request_rx) = RingBuffer::new(command_capacity.max(1));
    let (response_tx, response_rx) = RingBuffer::new(response_capacity.max(1));
    let client = SynthClient::new(request_tx, response_rx);
    let link = RenderLink::new(request_rx, response_tx);
    (client, link)
}

pub fn channel_for(config: &BridgeConfig) -> (SynthClient, RenderLink) {
    channel(config.command_queue_capacity, config.response_queue_capacity)
}

/// Control-path end of the channel. Never blocks unless asked to wait.
pub struct SynthClient {
    requests: Producer<Request>,
    responses: Consumer<Response>,
    registry: HandlerRegistry<ResponseKind, Response>,
    init: Option<InitWatch>,
    events: VecDeque<Event>,
    recent_diagnostics: VecDeque<String>,
}

impl SynthClient {
    fn new(requests: Producer<Request>, responses: Consumer<Response>) -> Self {
        Self {
            requests,
            responses,
            registry: HandlerRegistry::new(),
            init: None,
            events: VecDeque::new(),
            recent_diagnostics: VecDeque::with_capacity(RECENT_DIAGNOSTICS),
        }
    }

    /// Fire-and-forget.
    pub fn send(&mut self, request: Request) -> Result<(), ProtocolError> {
        if self.requests.is_abandoned() {
            return Err(ProtocolError::Disconnected);
        }
        self.requests
            .push(request)
            .map_err(|_| ProtocolError::QueueFull)
    }

    /// Register a one-shot handler for `kind`.
    pub fn once(
        &mut self,
        kind: ResponseKind,
        handler: impl FnOnce(Response) + Send + 'static,
    ) -> HandlerId {
        self.registry.once(kind, handler)
    }

    pub fn cancel(&mut self, kind: ResponseKind, id: HandlerId) -> bool {
        self.registry.cancel(kind, id)
    }

    /// Send a request and correlate its answer by response kind.
    ///
    /// The handler is registered before the request is queued and withdrawn
    /// again if queueing fails.
    pub fn request<T, F>(
        &mut self,
        request: Request,
        extract: F,
    ) -> Result<PendingReply<T>, ProtocolError>
    where
        T: Send + 'static,
        F: FnOnce(Response) -> Result<T, ProtocolError> + Send + 'static,
    {
        let Some(kind) = request.response_kind() else {
            return Err(ProtocolError::NoResponseExpected(request_name(&request)));
        };

        let reply = PendingReply::new();
        let slot = reply.clone();
        let id = self.registry.once(kind, move |response| {
            slot.settle(extract(response));
        });

        if let Err(err) = self.send(request) {
            self.registry.cancel(kind, id);
            return Err(err);
        }
        Ok(reply)
    }

    pub fn configure(&mut self, settings: SettingsPatch) -> Result<(), ProtocolError> {
        self.send(Request::Configure { settings })
    }

    pub fn load_bank(&mut self, data: Vec<u8>) -> Result<PendingReply<()>, ProtocolError> {
        self.request(Request::LoadBank { data }, |response| match response {
            Response::LoadBank { success: true, .. } => Ok(()),
            other => Err(rejection(other)),
        })
    }

    pub fn set_bank(&mut self, bank: u32) -> Result<PendingReply<u32>, ProtocolError> {
        self.request(Request::SetBank { bank }, |response| match response {
            Response::SetBank {
                success: true,
                bank,
                ..
            } => Ok(bank),
            other => Err(rejection(other)),
        })
    }

    pub fn get_instrument(
        &mut self,
        bank_id: BankId,
        program: Program,
    ) -> Result<PendingReply<Instrument>, ProtocolError> {
        self.request(
            Request::GetInstrument { bank_id, program },
            |response| match response {
                Response::GetInstrument {
                    success: true,
                    instrument: Some(instrument),
                    ..
                } => Ok(instrument),
                other => Err(rejection(other)),
            },
        )
    }

    pub fn set_instrument(
        &mut self,
        bank_id: BankId,
        program: Program,
        instrument: Instrument,
    ) -> Result<PendingReply<()>, ProtocolError> {
        self.request(
            Request::SetInstrument {
                bank_id,
                program,
                instrument,
            },
            |response| match response {
                Response::SetInstrument { success: true, .. } => Ok(()),
                other => Err(rejection(other)),
            },
        )
    }

    pub fn switch_emulator(
        &mut self,
        emulator: Emulator,
    ) -> Result<PendingReply<Emulator>, ProtocolError> {
        self.request(Request::SwitchEmulator { emulator }, |response| match response {
            Response::SwitchEmulator {
                success: true,
                emulator,
                ..
            } => Ok(emulator),
            other => Err(rejection(other)),
        })
    }

    pub fn query_version(&mut self) -> Result<PendingReply<VersionInfo>, ProtocolError> {
        self.request(Request::GetVersion, |response| match response {
            Response::GetVersion(info) => Ok(info),
            other => Err(rejection(other)),
        })
    }

    pub fn query_state(&mut self) -> Result<PendingReply<StateSnapshot>, ProtocolError> {
        self.request(Request::GetState, |response| match response {
            Response::GetState(state) => Ok(state),
            other => Err(rejection(other)),
        })
    }

    /// Resolves to the file length in seconds.
    pub fn load_midi(&mut self, data: Vec<u8>) -> Result<PendingReply<f64>, ProtocolError> {
        self.request(Request::LoadMidi { data }, |response| match response {
            Response::LoadMidi {
                success: true,
                duration_seconds,
                ..
            } => Ok(duration_seconds.unwrap_or_default()),
            other => Err(rejection(other)),
        })
    }

    /// Arm the initialization handshake: first of ready, error or timeout
    /// settles the returned reply.
    pub fn begin_init(
        &mut self,
        timeout: Duration,
    ) -> Result<PendingReply<ReadyInfo>, ProtocolError> {
        if self.init.is_some() {
            return Err(ProtocolError::InitInProgress);
        }

        let reply = PendingReply::new();
        let ready_slot = reply.clone();
        let on_ready = self.registry.once(ResponseKind::Ready, move |response| {
            ready_slot.settle(match response {
                Response::Ready(info) => Ok(info),
                other => Err(ProtocolError::Unexpected(other.kind())),
            });
        });
        let error_slot = reply.clone();
        let on_error = self.registry.once(ResponseKind::Error, move |response| {
            let message = response.error_message().unwrap_or("unknown error").to_string();
            error_slot.settle(Err(ProtocolError::InitFailed(message)));
        });

        self.init = Some(InitWatch {
            deadline: Instant::now() + timeout,
            timeout,
            reply: reply.clone(),
            on_ready,
            on_error,
        });
        Ok(reply)
    }

    pub fn init_pending(&self) -> bool {
        self.init.is_some()
    }

    /// Check the init deadline, dispatch every queued response, then check
    /// the deadline again. Returns the number of responses drained.
    pub fn poll(&mut self) -> usize {
        // an expired handshake must not be settled by what is queued now
        self.check_init_deadline();
        let mut drained = 0;
        while let Ok(response) = self.responses.pop() {
            drained += 1;
            let kind = response.kind();
            match &response {
                Response::PlaybackEnded => self.events.push_back(Event::PlaybackEnded),
                Response::Diagnostic { message } => {
                    self.record_diagnostic(message);
                    self.events.push_back(Event::Diagnostic {
                        message: message.clone(),
                    });
                }
                _ => {}
            }

            if self.registry.fire(kind, response).is_err() && !kind.is_notification() {
                debug!(?kind, "response without a waiting caller dropped");
            }
        }

        self.check_init_deadline();
        drained
    }

    /// Poll until `reply` settles.
    ///
    /// Only the init handshake has a deadline; any other reply waits for as
    /// long as the render side takes to answer.
    pub fn wait<T>(
        &mut self,
        reply: &PendingReply<T>,
        poll_interval: Duration,
    ) -> Result<T, ProtocolError> {
        loop {
            self.poll();
            if let Some(outcome) = reply.try_take() {
                return outcome;
            }
            if self.requests.is_abandoned() && !reply.is_settled() {
                return Err(ProtocolError::Disconnected);
            }
            thread::sleep(poll_interval);
        }
    }

    /// Handshake and wait for its outcome.
    pub fn connect(&mut self, timeout: Duration) -> Result<ReadyInfo, ProtocolError> {
        let reply = self.begin_init(timeout)?;
        self.wait(&reply, Duration::from_millis(1))
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    pub fn recent_diagnostics(&self) -> Vec<String> {
        self.recent_diagnostics.iter().cloned().collect()
    }

    /// Disarm the handshake once it settled; time it out once the deadline
    /// passed. Leftover handlers are withdrawn either way, so a late answer
    /// is treated as an orphan.
    fn check_init_deadline(&mut self) {
        let Some(watch) = self.init.take() else {
            return;
        };
        if !watch.reply.is_settled() {
            if Instant::now() < watch.deadline {
                self.init = Some(watch);
                return;
            }
            warn!(timeout = ?watch.timeout, "engine initialization timed out");
            watch.reply.settle(Err(ProtocolError::InitTimeout(watch.timeout)));
        }
        self.registry.cancel(ResponseKind::Ready, watch.on_ready);
        self.registry.cancel(ResponseKind::Error, watch.on_error);
    }

    fn record_diagnostic(&mut self, message: &str) {
        if self.recent_diagnostics.len() >= RECENT_DIAGNOSTICS {
            self.recent_diagnostics.pop_front();
        }
        self.recent_diagnostics.push_back(message.to_string());
    }
}

fn rejection(response: Response) -> ProtocolError {
    match response.error_message() {
        Some(message) => ProtocolError::Rejected(message.to_string()),
        None => ProtocolError::Unexpected(response.kind()),
    }
}

fn request_name(request: &Request) -> &'static str {
    match request {
        Request::NoteOn { .. } => "NoteOn",
        Request::NoteOff { .. } => "NoteOff",
        Request::NoteAftertouch { .. } => "NoteAftertouch",
        Request::ChannelAftertouch { .. } => "ChannelAftertouch",
        Request::ControllerChange { .. } => "ControllerChange",
        Request::ProgramChange { .. } => "ProgramChange",
        Request::PitchBend { .. } => "PitchBend",
        Request::BankChange { .. } => "BankChange",
        Request::Panic => "Panic",
        Request::ResetRealtime => "ResetRealtime",
        Request::Reset => "Reset",
        Request::Configure { .. } => "Configure",
        Request::LoadBank { .. } => "LoadBank",
        Request::SetBank { .. } => "SetBank",
        Request::GetInstrument { .. } => "GetInstrument",
        Request::SetInstrument { .. } => "SetInstrument",
        Request::SwitchEmulator { .. } => "SwitchEmulator",
        Request::GetVersion => "GetVersion",
        Request::GetState => "GetState",
        Request::LoadMidi { .. } => "LoadMidi",
        Request::Play => "Play",
        Request::Stop => "Stop",
        Request::Seek { .. } => "Seek",
        Request::SetLoop { .. } => "SetLoop",
        Request::SetTempo { .. } => "SetTempo",
    }
}
