//! Simulated native library for testing without a broker.
//!
//! `MockLibrary` hands out mock connections, Jobs clients and tunnels that
//! record every call and expose `fire_*` methods to drive native events
//! synchronously on the test thread. Faults can be injected per step, and
//! a live-object counter tracks construction/destruction so tests can check
//! that failed constructions leak nothing.

mod connection;
mod jobs;
mod tunnel;

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub use connection::{MockConnection, PublishedMessage};
pub use jobs::MockJobsClient;
pub use tunnel::{MockSecureTunnel, MockTunnelingClient};

use crate::error::{NativeError, NativeResult};
use crate::jobs::{JobsClient, Subscription};
use crate::library::NativeLibrary;
use crate::mqtt::{ConnectionConfig, MqttConnection};
use crate::tunnel::{SecureTunnel, SecureTunnelBuilder, TunnelingClient};

/// A failure the mock library can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    /// `new_connection` returns an error.
    NewConnection,
    /// `connect` returns `false`.
    Connect,
    /// The given Jobs subscription returns `false`.
    Subscribe(Subscription),
    /// `jobs_client` returns an error.
    JobsClient,
    /// `tunneling_client` returns `None`.
    TunnelingClient,
    /// `subscribe_to_tunnels_notify` returns `false`.
    NotifySubscribe,
    /// `secure_tunnel` returns `None`.
    TunnelBuild,
    /// Operations on live objects fail synchronously.
    OperationsRejected,
}

/// Fault set shared by the library and every object it created.
#[derive(Debug, Default)]
pub(crate) struct Faults(Mutex<HashSet<Fault>>);

impl Faults {
    pub(crate) fn is_set(&self, fault: Fault) -> bool {
        self.0.lock().unwrap().contains(&fault)
    }
}

/// Counts one live native object; decrements when dropped.
#[derive(Debug)]
pub(crate) struct LiveToken(Arc<AtomicUsize>);

impl LiveToken {
    fn new(live: &Arc<AtomicUsize>) -> Self {
        live.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(live))
    }
}

impl Drop for LiveToken {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Mock implementation of [`NativeLibrary`].
///
/// Created objects are tracked by weak reference only, so the library never
/// keeps an object alive on its own.
#[derive(Default)]
pub struct MockLibrary {
    faults: Arc<Faults>,
    live: Arc<AtomicUsize>,
    created: AtomicUsize,
    connections: Mutex<Vec<Weak<MockConnection>>>,
    jobs_clients: Mutex<Vec<Weak<MockJobsClient>>>,
    tunneling_clients: Mutex<Vec<Weak<MockTunnelingClient>>>,
    tunnels: Mutex<Vec<Weak<MockSecureTunnel>>>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later matching step fail.
    pub fn inject(&self, fault: Fault) {
        self.faults.0.lock().unwrap().insert(fault);
    }

    pub fn clear(&self, fault: Fault) {
        self.faults.0.lock().unwrap().remove(&fault);
    }

    pub fn clear_faults(&self) {
        self.faults.0.lock().unwrap().clear();
    }

    /// Native objects currently alive.
    pub fn live_objects(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Native objects created since the library was built.
    pub fn created_objects(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// The most recently created connection still alive.
    pub fn connection(&self) -> Option<Arc<MockConnection>> {
        latest(&self.connections)
    }

    pub fn connections(&self) -> Vec<Arc<MockConnection>> {
        alive(&self.connections)
    }

    /// The most recently created Jobs client still alive.
    pub fn jobs(&self) -> Option<Arc<MockJobsClient>> {
        latest(&self.jobs_clients)
    }

    pub fn jobs_clients(&self) -> Vec<Arc<MockJobsClient>> {
        alive(&self.jobs_clients)
    }

    pub fn tunneling(&self) -> Option<Arc<MockTunnelingClient>> {
        latest(&self.tunneling_clients)
    }

    pub fn tunnel(&self) -> Option<Arc<MockSecureTunnel>> {
        latest(&self.tunnels)
    }

    fn token(&self) -> LiveToken {
        self.created.fetch_add(1, Ordering::SeqCst);
        LiveToken::new(&self.live)
    }
}

fn alive<T>(list: &Mutex<Vec<Weak<T>>>) -> Vec<Arc<T>> {
    list.lock().unwrap().iter().filter_map(Weak::upgrade).collect()
}

fn latest<T>(list: &Mutex<Vec<Weak<T>>>) -> Option<Arc<T>> {
    list.lock().unwrap().iter().rev().find_map(Weak::upgrade)
}

impl NativeLibrary for MockLibrary {
    fn new_connection(&self, config: ConnectionConfig) -> NativeResult<Arc<dyn MqttConnection>> {
        if self.faults.is_set(Fault::NewConnection) {
            return Err(NativeError::Connection("injected new_connection failure".into()));
        }

        let connection = Arc::new(MockConnection::new(
            config,
            Arc::clone(&self.faults),
            self.token(),
        ));
        self.connections
            .lock()
            .unwrap()
            .push(Arc::downgrade(&connection));
        Ok(connection)
    }

    fn jobs_client(&self, _connection: &Arc<dyn MqttConnection>) -> NativeResult<Arc<dyn JobsClient>> {
        if self.faults.is_set(Fault::JobsClient) {
            return Err(NativeError::Other("injected jobs client failure".into()));
        }

        let client = Arc::new(MockJobsClient::new(Arc::clone(&self.faults), self.token()));
        self.jobs_clients
            .lock()
            .unwrap()
            .push(Arc::downgrade(&client));
        Ok(client)
    }

    fn tunneling_client(&self, _connection: &Arc<dyn MqttConnection>) -> Option<Arc<dyn TunnelingClient>> {
        if self.faults.is_set(Fault::TunnelingClient) {
            return None;
        }

        let client = Arc::new(MockTunnelingClient::new(
            Arc::clone(&self.faults),
            self.token(),
        ));
        self.tunneling_clients
            .lock()
            .unwrap()
            .push(Arc::downgrade(&client));
        Some(client)
    }

    fn secure_tunnel(&self, builder: SecureTunnelBuilder) -> Option<Arc<dyn SecureTunnel>> {
        if self.faults.is_set(Fault::TunnelBuild) {
            return None;
        }

        let tunnel = Arc::new(MockSecureTunnel::new(
            builder,
            Arc::clone(&self.faults),
            self.token(),
        ));
        self.tunnels.lock().unwrap().push(Arc::downgrade(&tunnel));
        Some(tunnel)
    }
}
