//! # amprpc
//!
//! This library lets firmware on the remote core of an asymmetric multiprocessing (AMP) system
//! perform file and console I/O on the host core. Requests travel as RPC messages over a
//! shared-memory messaging channel and are served by a proxy process on the host. It runs in
//! no_std environments and needs no dynamic memory allocation.
//!
//! ## Architecture
//!
//! ```text
//!                  ┌──────────┐
//!                  │ Platform │ interrupt vectors, shared memory
//!                  └────┬─────┘
//!                       ▼
//! ┌───────────┐    ┌─────────┐    ┌──────────┐    ┌─────────┐
//! │ Transport ├───►│ Session │◄───┤ Manager  │◄───┤  Demo   │
//! └─────▲─────┘    └─────────┘    └────┬─────┘    └────┬────┘
//!       │        callbacks (ISR)       │               │
//!       │                         ┌────▼─────┐    ┌────▼────┐
//!       └─────────────────────────┤ Retarget │◄───┤ Console │
//!               requests          └──────────┘    └─────────┘
//! ```
//! Components:
//! * _Transport_ is the shared-memory messaging framework binding. It announces the channel,
//!   sends payloads and reports channel events and received payloads through callbacks.
//! * _Session_ is the state the callbacks share with the application: the handshake signal,
//!   a single-slot event mailbox and the response slot.
//! * _Manager_ owns the transport and drives the channel lifecycle.
//! * _Retarget_ turns file and console operations into request/response exchanges.
//! * _Console_ provides formatted output and token input on top of the console operations.
//! * _Demo_ is the scripted session: file I/O, an interactive dialogue and an orderly shutdown.
//!
//! ## Concurrency model
//!
//! Transport callbacks may run in interrupt context. They never block and only touch cells
//! guarded by a blocking mutex, so their critical sections are bounded by a payload copy.
//! The application side runs in a single thread context:
//! * _CriticalSectionRawMutex_ is required when callbacks run in a real interrupt handler.
//! * _ThreadModeRawMutex_ or _NoopRawMutex_ suffice when the transport is polled from thread
//!   mode.
//!
//! The protocol pairs requests and responses strictly. At most one request is outstanding per
//! session; a concurrent attempt fails with `ConcurrentRequestViolation`.
//!
//! Waits are asynchronous. Entry points without an executor use the `*_blocking` variants,
//! which poll the same futures with `embassy_futures::block_on`.
//!
//! ## Limitations
//!
//! * A single channel per session.
//! * One outstanding request at a time.
//! * The transport framework itself (virtqueues, name service, vring layout) is external.
#![no_std]

pub use amprpc_core as core;
pub use amprpc_transport as transport;
pub use embassy_time as time;

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod config;
pub mod console;
pub mod demo;
pub mod error;
pub mod lifecycle;
pub mod retarget;
pub mod sync;
pub mod wire;
