//! Binary wake-up signal shared between interrupt and thread context

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LockState {
    Locked,
    Unlocked,
}

/// Binary signal used to wait for the channel handshake
///
/// `release` may be called from an interrupt handler. `acquire` suspends the caller until the
/// signal is released and locks it again on return.
///
/// The signal does not count: releasing an unlocked signal has no effect, so two releases
/// followed by one acquire leave it locked.
pub struct SyncSignal<M: RawMutex> {
    signal: Signal<M, ()>,
}

impl<M: RawMutex> SyncSignal<M> {
    /// Creates a locked signal.
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    pub fn with_state(state: LockState) -> Self {
        let signal = Self::new();
        if state == LockState::Unlocked {
            signal.release();
        }
        signal
    }

    /// Unlocks the signal and wakes the waiter, if any.
    pub fn release(&self) {
        self.signal.signal(());
    }

    /// Waits until the signal is unlocked, then locks it.
    pub async fn acquire(&self) {
        self.signal.wait().await
    }

    /// Blocks the caller until the signal is unlocked, then locks it.
    ///
    /// Must not be called from interrupt context.
    pub fn acquire_blocking(&self) {
        embassy_futures::block_on(self.acquire())
    }

    /// Locks the signal if it is unlocked. Returns whether it was unlocked.
    pub fn try_acquire(&self) -> bool {
        self.signal.try_take().is_some()
    }

    /// Whether the signal is unlocked. Does not consume the release.
    pub fn is_unlocked(&self) -> bool {
        self.signal.signaled()
    }

    pub fn state(&self) -> LockState {
        match self.is_unlocked() {
            true => LockState::Unlocked,
            false => LockState::Locked,
        }
    }

    /// Forces the signal into the locked state without waiting.
    pub fn lock(&self) {
        self.signal.reset();
    }
}

impl<M: RawMutex> Default for SyncSignal<M> {
    fn default() -> Self {
        Self::new()
    }
}
