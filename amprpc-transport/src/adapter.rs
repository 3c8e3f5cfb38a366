//! Contract between a shared-memory transport and the amprpc session

use amprpc_core::ChannelId;

use crate::internal;

/// Size of a single shared-memory message buffer
pub const BUFFER_SIZE: usize = 512;

/// Transport header placed by the framework in front of every payload
pub const HEADER_SIZE: usize = 16;

/// Largest payload a single `send` or `received` call can carry
pub const MAX_PAYLOAD_LEN: usize = BUFFER_SIZE - HEADER_SIZE;

/// Failure reported by the messaging framework during setup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SetupError {
    /// The framework rejected the resource table or the shared memory layout.
    ResourceTable,
    /// Virtio device or queue creation failed.
    Device,
    /// The adapter is already bound to a session.
    AlreadyRegistered,
}

/// Failure reported by the messaging framework while sending
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError {
    /// The payload exceeds `MAX_PAYLOAD_LEN`.
    PayloadTooLarge,
    /// No free shared buffer is available.
    NoBuffer,
    /// The channel does not exist on the transport.
    UnknownChannel,
    /// The adapter was not registered or was already released.
    NotRegistered,
}

/// Notification sink handed to the transport on registration
///
/// The handle is cheap to copy and may be stored by the adapter for the lifetime of the binding.
/// All methods are safe to call from interrupt context.
#[derive(Clone, Copy)]
pub struct Callbacks<'a>(&'a (dyn internal::DynamicCallbacks + Sync));

impl<'a> Callbacks<'a> {
    pub fn new(access: &'a (dyn internal::DynamicCallbacks + Sync)) -> Self {
        Self(access)
    }

    /// Reports that the remote side acknowledged the channel announcement.
    pub fn channel_created(&self, channel: ChannelId) {
        self.0.on_created(channel);
    }

    /// Reports that the remote side destroyed the channel.
    pub fn channel_deleted(&self, channel: ChannelId) {
        self.0.on_deleted(channel);
    }

    /// Delivers a received payload.
    ///
    /// The payload is copied before the call returns, so the adapter may recycle the shared
    /// buffer right after.
    pub fn received(&self, channel: ChannelId, payload: &[u8]) {
        self.0.on_received(channel, payload);
    }
}

/// Shared-memory messaging framework binding
///
/// `register` corresponds to the framework initialization: it creates the virtio device,
/// announces the channel and starts delivering notifications to `callbacks`.
/// `unregister` tears the binding down; no callback may fire after it returns.
pub trait Transport<'a> {
    fn register(&mut self, callbacks: Callbacks<'a>) -> Result<(), SetupError>;

    fn send(&mut self, channel: ChannelId, payload: &[u8]) -> Result<(), SendError>;

    fn unregister(&mut self);
}

impl<'a, T: Transport<'a> + ?Sized> Transport<'a> for &mut T {
    fn register(&mut self, callbacks: Callbacks<'a>) -> Result<(), SetupError> {
        (**self).register(callbacks)
    }

    fn send(&mut self, channel: ChannelId, payload: &[u8]) -> Result<(), SendError> {
        (**self).send(channel, payload)
    }

    fn unregister(&mut self) {
        (**self).unregister()
    }
}
