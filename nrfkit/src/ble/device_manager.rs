use super::{ConnHandle, Dispatcher, Error, Event, EventKind, TimeoutSource};
use crate::util::{debug, info, warn};
use arrayvec::ArrayVec;
use core::ops::RangeInclusive;

/// Input and output capabilities announced during pairing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum IoCapabilities {
    DisplayOnly,
    DisplayYesNo,
    KeyboardOnly,
    #[default]
    None,
    KeyboardDisplay,
}

/// Pairing and bonding parameters of the local device.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SecuritySettings {
    /// Deletes all stored bonds when the device manager starts.
    pub clear_bonds: bool,
    /// Security request timeout in seconds.
    pub timeout_secs: u8,
    pub bond: bool,
    /// Man-in-the-middle protection.
    pub mitm: bool,
    pub io_capabilities: IoCapabilities,
    /// Out-of-band data available.
    pub oob: bool,
    /// Allowed encryption key sizes in bytes.
    pub key_size: RangeInclusive<u8>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            clear_bonds: true,
            timeout_secs: 30,
            bond: true,
            mitm: false,
            io_capabilities: IoCapabilities::None,
            oob: false,
            key_size: 7..=16,
        }
    }
}

impl SecuritySettings {
    /// Key sizes permitted by Bluetooth.
    pub const KEY_SIZE_LIMITS: RangeInclusive<u8> = 7..=16;

    pub fn validate(&self) -> Result<(), Error> {
        let (min, max) = (*self.key_size.start(), *self.key_size.end());
        if min > max
            || !Self::KEY_SIZE_LIMITS.contains(&min)
            || !Self::KEY_SIZE_LIMITS.contains(&max)
        {
            return Err(Error::InvalidKeySize);
        }
        Ok(())
    }
}

/// A request the device manager wants the radio stack to carry out.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Reply {
    /// Delete all stored bonds.
    ClearBonds,
    /// Answer a pairing request with these parameters.
    SecurityParams {
        conn_handle: ConnHandle,
        settings: SecuritySettings,
    },
    Disconnect { conn_handle: ConnHandle },
}

const REPLY_QUEUE: usize = 4;

/// Tracks the connection and bond state of a peripheral and answers security requests.
///
/// Handlers are installed on a [`Dispatcher`] with [`register`](Self::register). Requests for the
/// radio stack are queued and drained with [`take_reply`](Self::take_reply).
pub struct DeviceManager {
    settings: SecuritySettings,
    connection: Option<ConnHandle>,
    bonded: bool,
    security_level: u8,
    replies: ArrayVec<Reply, REPLY_QUEUE>,
}

impl DeviceManager {
    pub fn new(settings: SecuritySettings) -> Result<Self, Error> {
        settings.validate()?;
        let mut replies = ArrayVec::new();
        if settings.clear_bonds {
            replies.push(Reply::ClearBonds);
        }
        Ok(Self {
            settings,
            connection: None,
            bonded: false,
            security_level: 0,
            replies,
        })
    }

    /// Installs the device manager's handlers. Needs six free handler slots.
    pub fn register<const N: usize>(dispatcher: &mut Dispatcher<Self, N>) -> Result<(), Error> {
        dispatcher.register(EventKind::Connected, Self::on_connected)?;
        dispatcher.register(EventKind::Disconnected, Self::on_disconnected)?;
        dispatcher.register(EventKind::SecurityParamsRequest, Self::on_security_request)?;
        dispatcher.register(EventKind::AuthStatus, Self::on_auth_status)?;
        dispatcher.register(EventKind::ConnSecurityUpdate, Self::on_security_update)?;
        dispatcher.register(EventKind::Timeout, Self::on_timeout)
    }

    pub fn settings(&self) -> &SecuritySettings {
        &self.settings
    }

    pub fn connection(&self) -> Option<ConnHandle> {
        self.connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether the current peer completed bonding.
    pub fn is_bonded(&self) -> bool {
        self.bonded
    }

    /// Security level of the current link, `0` when not connected.
    pub fn security_level(&self) -> u8 {
        self.security_level
    }

    /// Takes the oldest pending request for the radio stack.
    pub fn take_reply(&mut self) -> Option<Reply> {
        if self.replies.is_empty() {
            None
        } else {
            Some(self.replies.remove(0))
        }
    }

    fn queue(&mut self, reply: Reply) {
        if self.replies.try_push(reply).is_err() {
            warn!("Device manager reply queue is full");
        }
    }

    fn is_current(&self, conn_handle: ConnHandle) -> bool {
        self.connection == Some(conn_handle)
    }

    fn on_connected(&mut self, event: &Event) {
        let conn_handle = event.conn_handle();
        info!("Connected ({})", conn_handle);
        self.connection = Some(conn_handle);
        self.bonded = false;
        self.security_level = 1;
    }

    fn on_disconnected(&mut self, event: &Event) {
        let Event::Disconnected {
            conn_handle,
            reason,
        } = *event
        else {
            return;
        };
        if !self.is_current(conn_handle) {
            return;
        }
        info!("Disconnected ({}), reason {:#x}", conn_handle, reason);
        self.connection = None;
        self.bonded = false;
        self.security_level = 0;
    }

    fn on_security_request(&mut self, event: &Event) {
        let conn_handle = event.conn_handle();
        if !self.is_current(conn_handle) {
            return;
        }
        debug!("Answering security parameters request");
        let settings = self.settings.clone();
        self.queue(Reply::SecurityParams {
            conn_handle,
            settings,
        });
    }

    fn on_auth_status(&mut self, event: &Event) {
        let Event::AuthStatus {
            conn_handle,
            status,
            bonded,
        } = *event
        else {
            return;
        };
        if !self.is_current(conn_handle) {
            return;
        }
        if status == 0 {
            self.bonded = bonded && self.settings.bond;
            debug!("Pairing succeeded, bonded: {}", self.bonded);
        } else {
            warn!("Pairing failed with status {:#x}", status);
            self.bonded = false;
        }
    }

    fn on_security_update(&mut self, event: &Event) {
        if let Event::ConnSecurityUpdate { conn_handle, level } = *event {
            if self.is_current(conn_handle) {
                self.security_level = level;
            }
        }
    }

    fn on_timeout(&mut self, event: &Event) {
        let Event::Timeout {
            conn_handle,
            source,
        } = *event
        else {
            return;
        };
        if source == TimeoutSource::Security && self.is_current(conn_handle) {
            warn!("Security procedure timed out");
            self.queue(Reply::Disconnect { conn_handle });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (Dispatcher<DeviceManager, 8>, DeviceManager) {
        let mut dispatcher = Dispatcher::new();
        DeviceManager::register(&mut dispatcher).unwrap();
        let manager = DeviceManager::new(SecuritySettings::default()).unwrap();
        (dispatcher, manager)
    }

    #[test]
    fn default_settings() {
        let settings = SecuritySettings::default();
        assert!(settings.clear_bonds);
        assert_eq!(settings.timeout_secs, 30);
        assert!(settings.bond);
        assert!(!settings.mitm);
        assert_eq!(settings.io_capabilities, IoCapabilities::None);
        assert!(!settings.oob);
        assert_eq!(settings.key_size, 7..=16);
        assert_eq!(settings.validate(), Ok(()));
    }

    #[test]
    fn rejects_bad_key_sizes() {
        for key_size in [6..=16, 7..=17, RangeInclusive::new(12, 8)] {
            let settings = SecuritySettings {
                key_size,
                ..SecuritySettings::default()
            };
            assert_eq!(settings.validate(), Err(Error::InvalidKeySize));
            assert!(DeviceManager::new(settings).is_err());
        }
    }

    #[test]
    fn clears_bonds_on_start() {
        let (_, mut manager) = manager();
        assert_eq!(manager.take_reply(), Some(Reply::ClearBonds));
        assert_eq!(manager.take_reply(), None);

        let settings = SecuritySettings {
            clear_bonds: false,
            ..SecuritySettings::default()
        };
        let mut manager = DeviceManager::new(settings).unwrap();
        assert_eq!(manager.take_reply(), None);
    }

    #[test]
    fn needs_enough_handler_slots() {
        let mut dispatcher = Dispatcher::<DeviceManager, 3>::new();
        assert_eq!(
            DeviceManager::register(&mut dispatcher),
            Err(Error::HandlerTableFull)
        );
    }

    #[test]
    fn connection_lifecycle() {
        let (dispatcher, mut manager) = manager();
        manager.take_reply();

        dispatcher.dispatch(
            &mut manager,
            &Event::Connected {
                conn_handle: 3,
                peer: [1, 2, 3, 4, 5, 6],
            },
        );
        assert_eq!(manager.connection(), Some(3));
        assert_eq!(manager.security_level(), 1);

        dispatcher.dispatch(&mut manager, &Event::SecurityParamsRequest { conn_handle: 3 });
        assert_eq!(
            manager.take_reply(),
            Some(Reply::SecurityParams {
                conn_handle: 3,
                settings: SecuritySettings::default(),
            })
        );

        dispatcher.dispatch(
            &mut manager,
            &Event::AuthStatus {
                conn_handle: 3,
                status: 0,
                bonded: true,
            },
        );
        dispatcher.dispatch(
            &mut manager,
            &Event::ConnSecurityUpdate {
                conn_handle: 3,
                level: 2,
            },
        );
        assert!(manager.is_bonded());
        assert_eq!(manager.security_level(), 2);

        // Events for other links are ignored.
        dispatcher.dispatch(
            &mut manager,
            &Event::Disconnected {
                conn_handle: 9,
                reason: 0x13,
            },
        );
        assert!(manager.is_connected());

        dispatcher.dispatch(
            &mut manager,
            &Event::Disconnected {
                conn_handle: 3,
                reason: 0x13,
            },
        );
        assert!(!manager.is_connected());
        assert!(!manager.is_bonded());
        assert_eq!(manager.security_level(), 0);
    }

    #[test]
    fn failed_pairing_does_not_bond() {
        let (dispatcher, mut manager) = manager();
        dispatcher.dispatch(
            &mut manager,
            &Event::Connected {
                conn_handle: 1,
                peer: [0; 6],
            },
        );
        dispatcher.dispatch(
            &mut manager,
            &Event::AuthStatus {
                conn_handle: 1,
                status: 0x85,
                bonded: true,
            },
        );
        assert!(!manager.is_bonded());
    }

    #[test]
    fn security_timeout_disconnects() {
        let (dispatcher, mut manager) = manager();
        manager.take_reply();
        dispatcher.dispatch(
            &mut manager,
            &Event::Connected {
                conn_handle: 4,
                peer: [0; 6],
            },
        );
        dispatcher.dispatch(
            &mut manager,
            &Event::Timeout {
                conn_handle: 4,
                source: TimeoutSource::Connection,
            },
        );
        assert_eq!(manager.take_reply(), None);
        dispatcher.dispatch(
            &mut manager,
            &Event::Timeout {
                conn_handle: 4,
                source: TimeoutSource::Security,
            },
        );
        assert_eq!(manager.take_reply(), Some(Reply::Disconnect { conn_handle: 4 }));
    }
}
