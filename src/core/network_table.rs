use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::{Arc, Mutex, MutexGuard};

/// Value of a networked entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntryValue {
    Boolean(bool),
    Double(f64),
    String(String),
}

impl EntryValue {
    pub fn as_double(&self) -> Option<f64> {
        match self {
            EntryValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            EntryValue::String(s) => Some(s),
            _ => None,
        }
    }
}

/// Which events a listener wants; combine with `|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerFlags(u32);

impl ListenerFlags {
    /// Fire once during registration if the entry already has a value.
    pub const IMMEDIATE: ListenerFlags = ListenerFlags(0x01);
    pub const NEW: ListenerFlags = ListenerFlags(0x04);
    pub const UPDATE: ListenerFlags = ListenerFlags(0x10);

    pub fn contains(self, other: ListenerFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ListenerFlags {
    type Output = ListenerFlags;

    fn bitor(self, rhs: ListenerFlags) -> ListenerFlags {
        ListenerFlags(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone)]
pub struct EntryNotification {
    pub key: String,
    pub value: EntryValue,
    /// The single event kind that caused this call.
    pub flags: ListenerFlags,
}

pub type EntryListener = Arc<dyn Fn(&EntryNotification) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(u64);

impl fmt::Display for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMode {
    Stopped,
    Server,
    Client { team: i32 },
}

/// The replicated key-value table shared with the robot.
///
/// Listeners may be called from whichever thread delivers the update, so they
/// must not block.
pub trait EntryStore: Send + Sync {
    fn start_server(&self);

    fn start_client_team(&self, team: i32);

    fn add_listener(&self, key: &str, flags: ListenerFlags, listener: EntryListener) -> ListenerHandle;

    fn remove_listener(&self, handle: ListenerHandle);
}

/// Addresses a client tries for the robot of `team`, in order.
pub fn team_server_addresses(team: i32) -> Vec<String> {
    vec![
        format!("10.{}.{}.2", team / 100, team % 100),
        format!("roborio-{}-frc.local", team),
        "172.22.11.2".to_string(),
        format!("roborio-{}-frc.lan", team),
        format!("roborio-{}-frc.frc-field.local", team),
    ]
}

struct Registration {
    handle: ListenerHandle,
    key: String,
    flags: ListenerFlags,
    listener: EntryListener,
}

struct TableState {
    mode: NetworkMode,
    values: HashMap<String, EntryValue>,
    listeners: Vec<Registration>,
    next_handle: u64,
}

/// Entry table living in this process. Listeners run on the thread calling `set_value`.
#[derive(Clone)]
pub struct LocalEntryStore {
    state: Arc<Mutex<TableState>>,
}

impl Default for LocalEntryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalEntryStore {
    pub fn new() -> Self {
        LocalEntryStore {
            state: Arc::new(Mutex::new(TableState {
                mode: NetworkMode::Stopped,
                values: HashMap::new(),
                listeners: Vec::new(),
                next_handle: 1,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TableState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn mode(&self) -> NetworkMode {
        self.lock().mode.clone()
    }

    pub fn get_value(&self, key: &str) -> Option<EntryValue> {
        self.lock().values.get(key).cloned()
    }

    /// Stores `value` and notifies listeners on `key`. Writing the current value again
    /// is not a change and notifies nobody.
    pub fn set_value(&self, key: &str, value: EntryValue) {
        let (event, listeners) = {
            let mut state = self.lock();
            let event = match state.values.get(key) {
                Some(current) if *current == value => return,
                Some(_) => ListenerFlags::UPDATE,
                None => ListenerFlags::NEW,
            };
            state.values.insert(key.to_string(), value.clone());
            let listeners: Vec<EntryListener> = state
                .listeners
                .iter()
                .filter(|r| r.key == key && r.flags.contains(event))
                .map(|r| r.listener.clone())
                .collect();
            (event, listeners)
        };

        debug!("Entry '{}' = {:?}, notifying {} listeners", key, value, listeners.len());
        let notification = EntryNotification {
            key: key.to_string(),
            value,
            flags: event,
        };
        for listener in listeners {
            listener(&notification);
        }
    }
}

impl EntryStore for LocalEntryStore {
    fn start_server(&self) {
        info!("🌐 Setting up network table server");
        self.lock().mode = NetworkMode::Server;
    }

    fn start_client_team(&self, team: i32) {
        info!(
            "🌐 Setting up network table client for team {} ({})",
            team,
            team_server_addresses(team).join(", ")
        );
        self.lock().mode = NetworkMode::Client { team };
    }

    fn add_listener(&self, key: &str, flags: ListenerFlags, listener: EntryListener) -> ListenerHandle {
        let (handle, current) = {
            let mut state = self.lock();
            let handle = ListenerHandle(state.next_handle);
            state.next_handle += 1;
            state.listeners.push(Registration {
                handle,
                key: key.to_string(),
                flags,
                listener: listener.clone(),
            });
            (handle, state.values.get(key).cloned())
        };
        debug!("Registered {} on '{}'", handle, key);

        if flags.contains(ListenerFlags::IMMEDIATE) {
            if let Some(value) = current {
                listener(&EntryNotification {
                    key: key.to_string(),
                    value,
                    flags: ListenerFlags::IMMEDIATE,
                });
            }
        }
        handle
    }

    fn remove_listener(&self, handle: ListenerHandle) {
        self.lock().listeners.retain(|r| r.handle != handle);
    }
}
