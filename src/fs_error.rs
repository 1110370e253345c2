//! Classification of filesystem errors into the engine's error taxonomy

use std::fs::Metadata;
use std::io;
use std::time::SystemTime;

/// How the engine reacts to an I/O error on a drop-directory file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoClass {
    /// Source is gone: another consumer took it first
    Vanished,
    /// Still held open by its producer; retry after a back-off
    Locked,
    /// Share or mount unavailable; discovery should be rebuilt
    Network,
    Other,
}

#[cfg(windows)]
mod win {
    pub const ERROR_SHARING_VIOLATION: i32 = 32;
    pub const ERROR_LOCK_VIOLATION: i32 = 33;
    pub const ERROR_BAD_NETPATH: i32 = 53;
    pub const ERROR_UNEXP_NET_ERR: i32 = 59;
    pub const ERROR_NETNAME_DELETED: i32 = 64;
    pub const ERROR_BAD_NET_NAME: i32 = 67;
}

pub fn classify(err: &io::Error) -> IoClass {
    #[cfg(windows)]
    if let Some(code) = err.raw_os_error() {
        match code {
            win::ERROR_SHARING_VIOLATION | win::ERROR_LOCK_VIOLATION => return IoClass::Locked,
            win::ERROR_BAD_NETPATH
            | win::ERROR_UNEXP_NET_ERR
            | win::ERROR_NETNAME_DELETED
            | win::ERROR_BAD_NET_NAME => return IoClass::Network,
            _ => {}
        }
    }

    match err.kind() {
        io::ErrorKind::NotFound => IoClass::Vanished,
        io::ErrorKind::ResourceBusy | io::ErrorKind::ExecutableFileBusy => IoClass::Locked,
        io::ErrorKind::NotConnected
        | io::ErrorKind::NetworkDown
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::StaleNetworkFileHandle => IoClass::Network,
        _ => IoClass::Other,
    }
}

/// Most recent of access, modification and (on Unix) status-change time
///
/// Renames update only the status-change time, so a freshly claimed file
/// does not look stale on platforms that expose it.
pub fn last_touched(metadata: &Metadata) -> Option<SystemTime> {
    let mut latest = [metadata.accessed().ok(), metadata.modified().ok()]
        .into_iter()
        .flatten()
        .max();

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        use std::time::Duration;

        if let Ok(secs) = u64::try_from(metadata.ctime()) {
            let nanos = u32::try_from(metadata.ctime_nsec()).unwrap_or(0);
            let changed = SystemTime::UNIX_EPOCH + Duration::new(secs, nanos);
            latest = latest.max(Some(changed));
        }
    }

    latest
}

/// Whether the entry was last touched before `cutoff`
pub fn is_older_than(metadata: &Metadata, cutoff: SystemTime) -> bool {
    last_touched(metadata).is_some_and(|touched| touched < cutoff)
}
