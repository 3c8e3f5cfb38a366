//! amprpc transport interface
//!
//! The crate provides an interface between a shared-memory messaging framework (an RPMsg/virtio
//! style queue pair) and the amprpc stack. Limited scope facilitates compatibility across
//! versions. Transport adapters should depend on this crate. amprpc users should depend on the
//! `amprpc` crate instead.
//!
//! An adapter exposes three notifications through [`adapter::Callbacks`]:
//! * `channel_created` when the remote side acknowledges the channel announcement
//! * `channel_deleted` when the remote side destroys the channel
//! * `received` for every message addressed to the channel
//!
//! The adapter calls them from its own delivery context, typically the inter-processor
//! interrupt handler that services the virtqueues. Callbacks never block and keep their critical
//! sections bounded to a payload copy, so they are safe to call from an ISR.
//!
//! Sending is synchronous: `Transport::send` places a payload into a free shared buffer and
//! notifies the remote side. The stack never keeps more than one request in flight, so an
//! adapter does not need to queue outgoing messages.
//!
//! [`platform::Platform`] is the leaf service that must run before the transport is set up:
//! mapping the shared memory region and connecting the interrupt vectors.

#![no_std]

pub mod adapter;
pub mod internal;
pub mod platform;

pub use amprpc_core::ChannelId;
