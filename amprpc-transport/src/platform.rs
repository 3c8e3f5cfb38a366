//! Platform services required before the transport starts

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PlatformError {
    /// The shared memory region could not be mapped.
    MemoryMap,
    /// The interrupt controller could not be configured.
    InterruptController,
    /// An interrupt vector could not be connected.
    Vector(u32),
}

/// Board-specific initialization
///
/// `init` maps the shared memory region and wires the inter-processor interrupt vectors to the
/// transport's handler. It is called exactly once, before the session starts.
pub trait Platform {
    fn init(&mut self) -> Result<(), PlatformError>;
}

impl<P: Platform + ?Sized> Platform for &mut P {
    fn init(&mut self) -> Result<(), PlatformError> {
        (**self).init()
    }
}
