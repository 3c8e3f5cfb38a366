//! Channel lifecycle
//!
//! ```text
//!  Uninitialized ──start──► AwaitingChannel ──created──► Ready
//!                                 │                        │
//!                                 │ peer shutdown          │ close intent, peer shutdown,
//!                                 ▼                        ▼ channel deleted
//!                              Closed ◄────shutdown──── CloseRequested
//! ```
//!
//! Transitions only move forward. Transport callbacks run in interrupt context and never touch
//! the state directly: they post an [`Event`] to a single-slot mailbox and wake the waiter.
//! The [`Manager`] applies pending events in thread context whenever it is asked for the state.

use core::cell::{Cell, RefCell};
use core::future::Future;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

use crate::config::Config;
use crate::core::{ChannelId, OpCode};
use crate::error::Error;
use crate::retarget::Retarget;
use crate::sync::SyncSignal;
use crate::time::{Duration, with_timeout};
use crate::transport::adapter::{Callbacks, Transport};
use crate::transport::internal::DynamicCallbacks;
use crate::wire::{self, CLOSE_INTENT_TOKEN, Message, RESPONSE_FLAG};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    Uninitialized,
    AwaitingChannel,
    Ready,
    CloseRequested,
    Closed,
}

/// Notification posted by the transport callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Created(ChannelId),
    Deleted(ChannelId),
    PeerShutdown,
}

impl Event {
    fn is_terminal(&self) -> bool {
        !matches!(self, Event::Created(_))
    }
}

pub(crate) enum Inbound {
    Message(Message),
    Oversized(usize),
    Closing,
}

/// State shared between the transport callbacks and the [`Manager`]
///
/// Create one per session, typically as a `static`, and keep it alive while the transport may
/// still call back.
///
/// # Examples:
///
/// ```
/// use amprpc::lifecycle::Session;
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
///
/// static SESSION: Session<CriticalSectionRawMutex> = Session::new();
/// ```
pub struct Session<M: RawMutex> {
    sync: SyncSignal<M>,
    mailbox: Mutex<M, Cell<Option<Event>>>,
    channel: Mutex<M, Cell<Option<ChannelId>>>,
    pending: Mutex<M, Cell<Option<OpCode>>>,
    abandoned: Mutex<M, Cell<Option<OpCode>>>,
    inbox: Signal<M, Inbound>,
}

impl<M: RawMutex> Session<M> {
    pub const fn new() -> Self {
        Self {
            sync: SyncSignal::new(),
            mailbox: Mutex::new(Cell::new(None)),
            channel: Mutex::new(Cell::new(None)),
            pending: Mutex::new(Cell::new(None)),
            abandoned: Mutex::new(Cell::new(None)),
            inbox: Signal::new(),
        }
    }

    /// Signal released once the channel is announced
    pub fn sync(&self) -> &SyncSignal<M> {
        &self.sync
    }

    /// Channel currently bound by the transport
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel.lock(|cell| cell.get())
    }

    /// Operation of the request waiting for its response
    pub fn pending(&self) -> Option<OpCode> {
        self.pending.lock(|cell| cell.get())
    }

    /// Operation of a sent request that gave up waiting before its response arrived
    ///
    /// The next response carrying this operation is discarded.
    pub fn abandoned(&self) -> Option<OpCode> {
        self.abandoned.lock(|cell| cell.get())
    }

    /// Event posted but not yet applied by the manager
    pub fn peek_event(&self) -> Option<Event> {
        self.mailbox.lock(|cell| cell.get())
    }

    // A terminal event is never overwritten by a channel announcement
    fn post(&self, event: Event) {
        self.mailbox.lock(|cell| {
            let keep = cell.get().is_some_and(|posted| posted.is_terminal());
            if event.is_terminal() || !keep {
                cell.set(Some(event));
            }
        });
    }

    fn take_event(&self) -> Option<Event> {
        self.mailbox.lock(|cell| cell.take())
    }

    fn reset(&self) {
        self.sync.lock();
        self.mailbox.lock(|cell| cell.set(None));
        self.channel.lock(|cell| cell.set(None));
        self.pending.lock(|cell| cell.set(None));
        self.abandoned.lock(|cell| cell.set(None));
        self.inbox.reset();
    }

    /// Marks `opcode` as outstanding and clears stale inbound data.
    pub(crate) fn begin(&self, opcode: OpCode) -> Result<PendingGuard<'_, M>, Error> {
        self.pending.lock(|cell| {
            if cell.get().is_some() {
                return Err(Error::ConcurrentRequestViolation);
            }
            self.inbox.reset();
            cell.set(Some(opcode));
            Ok(())
        })?;
        Ok(PendingGuard {
            session: self,
            awaiting: false,
        })
    }

    pub(crate) async fn inbound(&self) -> Inbound {
        self.inbox.wait().await
    }

    // The peer answers in order, so a late response to an abandoned request arrives before
    // any other. Returns whether the payload was that response.
    fn discard_abandoned(&self, payload: &[u8]) -> bool {
        self.abandoned.lock(|cell| {
            let Some(opcode) = cell.take() else {
                return false;
            };
            if wire::peek_id(payload) == Some(opcode.into_u32() | RESPONSE_FLAG) {
                debug!("Discarding late response to {:?}", opcode);
                return true;
            }
            warn!("Response to abandoned {:?} request never arrived", opcode);
            false
        })
    }

    // Wakes the outstanding request, if any, with a closing notice
    fn interrupt(&self) {
        self.pending.lock(|cell| {
            if cell.get().is_some() {
                self.inbox.signal(Inbound::Closing);
            }
        });
    }
}

impl<M: RawMutex> Default for Session<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: RawMutex> DynamicCallbacks for Session<M> {
    fn on_created(&self, channel: ChannelId) {
        let bound = self.channel.lock(|cell| match cell.get() {
            Some(bound) => bound == channel,
            None => {
                cell.set(Some(channel));
                true
            }
        });
        if !bound {
            warn!("Ignoring announcement of channel {:?}", channel);
            return;
        }
        self.post(Event::Created(channel));
        self.sync.release();
    }

    fn on_deleted(&self, channel: ChannelId) {
        let bound = self.channel.lock(|cell| {
            let bound = cell.get() == Some(channel);
            if bound {
                cell.set(None);
            }
            bound
        });
        if !bound {
            warn!("Ignoring deletion of unbound channel {:?}", channel);
            return;
        }
        self.post(Event::Deleted(channel));
        self.interrupt();
    }

    fn on_received(&self, channel: ChannelId, payload: &[u8]) {
        if self.channel() != Some(channel) {
            warn!("Dropping payload from unbound channel {:?}", channel);
            return;
        }
        if wire::is_terminate(payload) {
            self.post(Event::PeerShutdown);
            self.interrupt();
            return;
        }
        if self.discard_abandoned(payload) {
            return;
        }
        self.pending.lock(|cell| {
            if cell.get().is_none() {
                warn!("Dropping unsolicited payload of {} bytes", payload.len());
                return;
            }
            let inbound = match Message::from_slice(payload) {
                Ok(message) => Inbound::Message(message),
                Err(()) => Inbound::Oversized(payload.len()),
            };
            self.inbox.signal(inbound);
        });
    }
}

/// Clears the outstanding request marker on drop
///
/// A request dropped after it was sent and before its response arrived is recorded as
/// abandoned, so its late response cannot be taken for the next request's.
pub(crate) struct PendingGuard<'s, M: RawMutex> {
    session: &'s Session<M>,
    awaiting: bool,
}

impl<M: RawMutex> PendingGuard<'_, M> {
    pub(crate) fn sent(&mut self) {
        self.awaiting = true;
    }

    pub(crate) fn settled(&mut self) {
        self.awaiting = false;
    }
}

impl<M: RawMutex> Drop for PendingGuard<'_, M> {
    fn drop(&mut self) {
        let session = self.session;
        session.pending.lock(|cell| {
            // A response delivered but not yet taken still settles the request
            if self.awaiting && !session.inbox.signaled() {
                session.abandoned.lock(|abandoned| abandoned.set(cell.get()));
            }
            cell.set(None);
        });
    }
}

pub(crate) async fn bounded<F: Future>(
    timeout: Option<Duration>,
    future: F,
) -> Result<F::Output, Error> {
    match timeout {
        Some(timeout) => with_timeout(timeout, future)
            .await
            .map_err(|_| Error::Timeout),
        None => Ok(future.await),
    }
}

/// Owns the transport binding and the channel lifecycle
///
/// The manager is used from thread context only. Requests are issued through the [`Retarget`]
/// handle returned by [`Manager::retarget`].
///
/// # Examples:
///
/// ```no_run
/// use amprpc::config::Config;
/// use amprpc::lifecycle::{Manager, Session};
/// use amprpc::transport::adapter::Transport;
/// use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
///
/// static SESSION: Session<CriticalSectionRawMutex> = Session::new();
///
/// async fn connect(transport: impl Transport<'static>) -> Result<(), amprpc::error::Error> {
///     let mut manager = Manager::new(&SESSION, transport, Config::default());
///     manager.start()?;
///     manager.wait_ready().await?;
///     let retarget = manager.retarget();
///     retarget.console_write(b"hello\r\n").await?;
///     retarget.send_close_intent()?;
///     manager.shutdown()
/// }
/// ```
pub struct Manager<'a, M: RawMutex, T> {
    session: &'a Session<M>,
    transport: RefCell<T>,
    config: Config,
    state: Cell<ChannelState>,
    channel: Cell<Option<ChannelId>>,
}

impl<'a, M: RawMutex + Sync + 'a, T: Transport<'a>> Manager<'a, M, T> {
    pub fn new(session: &'a Session<M>, transport: T, config: Config) -> Self {
        Self {
            session,
            transport: RefCell::new(transport),
            config: config.validated(),
            state: Cell::new(ChannelState::Uninitialized),
            channel: Cell::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &'a Session<M> {
        self.session
    }

    /// Current state, after applying pending events.
    pub fn state(&self) -> ChannelState {
        self.process_events()
    }

    /// Channel bound to the session, if ready.
    pub fn channel(&self) -> Option<ChannelId> {
        self.channel.get()
    }

    /// Registers the session callbacks with the transport.
    ///
    /// On failure the state stays `Uninitialized`.
    pub fn start(&mut self) -> Result<(), Error> {
        let state = self.state.get();
        if state != ChannelState::Uninitialized {
            return Err(Error::InvalidState(state));
        }

        self.session.reset();
        let callbacks = Callbacks::new(self.session);
        if let Err(err) = self.transport.get_mut().register(callbacks) {
            error!("Transport setup failed: {:?}", err);
            return Err(Error::PlatformInitFailure);
        }
        self.set_state(ChannelState::AwaitingChannel);
        debug!("Waiting for channel announcement");
        Ok(())
    }

    /// Waits until the peer acknowledges the channel.
    ///
    /// Fails with `Timeout` if the handshake timeout expires first.
    pub async fn wait_ready(&self) -> Result<ChannelId, Error> {
        loop {
            match self.process_events() {
                ChannelState::Uninitialized => {
                    return Err(Error::InvalidState(ChannelState::Uninitialized));
                }
                ChannelState::AwaitingChannel => {
                    bounded(self.config.handshake_timeout, self.session.sync.acquire()).await?;
                }
                ChannelState::Ready => {
                    return self.channel.get().ok_or(Error::ChannelNotReady);
                }
                ChannelState::CloseRequested | ChannelState::Closed => {
                    return Err(Error::ChannelClosing);
                }
            }
        }
    }

    /// Blocking version of [`Manager::wait_ready`]. Must not be called from interrupt context.
    pub fn wait_ready_blocking(&self) -> Result<ChannelId, Error> {
        embassy_futures::block_on(self.wait_ready())
    }

    /// Applies the event posted by the transport callbacks, if any.
    pub fn process_events(&self) -> ChannelState {
        let state = self.state.get();
        let Some(event) = self.session.take_event() else {
            return state;
        };

        match (state, event) {
            (ChannelState::AwaitingChannel, Event::Created(channel)) => {
                info!("Channel {:?} ready", channel);
                self.channel.set(Some(channel));
                self.set_state(ChannelState::Ready);
            }
            (ChannelState::AwaitingChannel | ChannelState::Ready, Event::PeerShutdown) => {
                info!("Peer requested shutdown");
                self.set_state(ChannelState::CloseRequested);
            }
            (ChannelState::Ready, Event::Deleted(channel)) => {
                warn!("Channel {:?} deleted by peer", channel);
                self.set_state(ChannelState::CloseRequested);
            }
            (state, event) => {
                debug!("Ignoring {:?} in {:?} state", event, state);
            }
        }
        self.state.get()
    }

    /// Sends the close-intent token and stops accepting requests.
    ///
    /// An outstanding request fails with `ChannelClosing`. Repeated calls have no effect.
    pub fn request_close(&self) -> Result<(), Error> {
        match self.process_events() {
            ChannelState::Ready => (),
            ChannelState::CloseRequested | ChannelState::Closed => return Ok(()),
            ChannelState::Uninitialized | ChannelState::AwaitingChannel => {
                return Err(Error::ChannelNotReady);
            }
        }

        self.set_state(ChannelState::CloseRequested);
        self.session.interrupt();
        let channel = self.channel.get().ok_or(Error::ChannelNotReady)?;
        info!("Sending close intent on channel {:?}", channel);
        self.transport
            .borrow_mut()
            .send(channel, CLOSE_INTENT_TOKEN)
            .map_err(Error::from)
    }

    /// Releases the transport binding.
    ///
    /// A ready channel is asked to close first. Fails with `InvalidState` if already closed.
    pub fn shutdown(&mut self) -> Result<(), Error> {
        match self.process_events() {
            ChannelState::Closed => return Err(Error::InvalidState(ChannelState::Closed)),
            ChannelState::Uninitialized => {
                self.set_state(ChannelState::Closed);
                return Ok(());
            }
            ChannelState::Ready => {
                if let Err(err) = self.request_close() {
                    warn!("Close intent not delivered: {:?}", err);
                }
            }
            ChannelState::AwaitingChannel | ChannelState::CloseRequested => (),
        }

        self.transport.get_mut().unregister();
        self.session.interrupt();
        self.channel.set(None);
        self.set_state(ChannelState::Closed);
        info!("Session closed");
        Ok(())
    }

    /// Handle for issuing requests over the channel.
    pub fn retarget(&self) -> Retarget<'_, 'a, M, T> {
        Retarget::new(self)
    }

    /// Returns the transport after the session is over.
    pub fn into_transport(self) -> T {
        self.transport.into_inner()
    }

    /// Fails unless the channel accepts requests.
    pub(crate) fn ensure_ready(&self) -> Result<ChannelId, Error> {
        match self.process_events() {
            ChannelState::Ready => self.channel.get().ok_or(Error::ChannelNotReady),
            ChannelState::Uninitialized | ChannelState::AwaitingChannel => {
                Err(Error::ChannelNotReady)
            }
            ChannelState::CloseRequested | ChannelState::Closed => Err(Error::ChannelClosing),
        }
    }

    pub(crate) fn send(&self, channel: ChannelId, payload: &[u8]) -> Result<(), Error> {
        self.transport
            .borrow_mut()
            .send(channel, payload)
            .map_err(Error::from)
    }

    fn set_state(&self, state: ChannelState) {
        debug_assert!(state >= self.state.get());
        self.state.set(state);
    }
}
