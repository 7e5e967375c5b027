//! BLE event dispatch independent of the radio stack.
//!
//! The radio stack glue translates its native events into [`Event`]s and hands them to a
//! [`Dispatcher`], which calls every handler registered for the event's [`EventKind`]. Handlers
//! are plain functions that receive a mutable context, for example a [`DeviceManager`].

mod device_manager;

pub use device_manager::{DeviceManager, IoCapabilities, Reply, SecuritySettings};

use arrayvec::ArrayVec;

pub type ConnHandle = u16;

#[derive(Clone, Copy, Debug, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    #[display("event handler table is full")]
    HandlerTableFull,
    #[display("invalid encryption key size range")]
    InvalidKeySize,
}

/// What timed out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimeoutSource {
    Advertising,
    Connection,
    Security,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    Connected {
        conn_handle: ConnHandle,
        peer: [u8; 6],
    },
    Disconnected {
        conn_handle: ConnHandle,
        reason: u8,
    },
    /// The peer asks for pairing; answered with the local security parameters.
    SecurityParamsRequest { conn_handle: ConnHandle },
    /// Pairing finished. `status` is zero on success.
    AuthStatus {
        conn_handle: ConnHandle,
        status: u8,
        bonded: bool,
    },
    ConnSecurityUpdate {
        conn_handle: ConnHandle,
        level: u8,
    },
    Timeout {
        conn_handle: ConnHandle,
        source: TimeoutSource,
    },
}

/// The tag of an [`Event`], used as the key of the handler table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EventKind {
    Connected,
    Disconnected,
    SecurityParamsRequest,
    AuthStatus,
    ConnSecurityUpdate,
    Timeout,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Connected { .. } => EventKind::Connected,
            Event::Disconnected { .. } => EventKind::Disconnected,
            Event::SecurityParamsRequest { .. } => EventKind::SecurityParamsRequest,
            Event::AuthStatus { .. } => EventKind::AuthStatus,
            Event::ConnSecurityUpdate { .. } => EventKind::ConnSecurityUpdate,
            Event::Timeout { .. } => EventKind::Timeout,
        }
    }

    pub fn conn_handle(&self) -> ConnHandle {
        match *self {
            Event::Connected { conn_handle, .. }
            | Event::Disconnected { conn_handle, .. }
            | Event::SecurityParamsRequest { conn_handle }
            | Event::AuthStatus { conn_handle, .. }
            | Event::ConnSecurityUpdate { conn_handle, .. }
            | Event::Timeout { conn_handle, .. } => conn_handle,
        }
    }
}

pub type Handler<C> = fn(&mut C, &Event);

/// A fixed-capacity table of event handlers over a context `C`.
pub struct Dispatcher<C, const N: usize> {
    handlers: ArrayVec<(EventKind, Handler<C>), N>,
}

impl<C, const N: usize> Dispatcher<C, N> {
    pub const fn new() -> Self {
        Self {
            handlers: ArrayVec::new_const(),
        }
    }

    /// Registers `handler` for events of `kind`. Handlers run in registration order.
    pub fn register(&mut self, kind: EventKind, handler: Handler<C>) -> Result<(), Error> {
        self.handlers
            .try_push((kind, handler))
            .map_err(|_| Error::HandlerTableFull)
    }

    /// Calls every handler registered for the kind of `event` and returns how many ran.
    pub fn dispatch(&self, context: &mut C, event: &Event) -> usize {
        let kind = event.kind();
        let mut handled = 0;
        for (_, handler) in self.handlers.iter().filter(|(k, _)| *k == kind) {
            handler(context, event);
            handled += 1;
        }
        handled
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C, const N: usize> Default for Dispatcher<C, N> {
    fn default() -> Self {
        Self::new()
    }
}
