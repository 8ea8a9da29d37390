//! Obtains and reuses the live connection to one datacenter.

use crate::core::{
    domain::{
        error::{VirtualizationError, VirtualizationResult},
        model::datacenter_endpoint::DatacenterEndpoint,
        port::{Connector, DatacenterHandle},
        value_object::{DatacenterPassword, DatacenterUri, DatacenterUsername},
    },
    infrastructure::interrupt::Interrupt,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Owns the cached connection handle of one datacenter.
///
/// Checking whether the cached handle is open, reconnecting and storing the
/// new handle happen under one lock, so concurrent callers share a single
/// connection attempt.
pub struct ConnectionManager {
    endpoint: Arc<DatacenterEndpoint>,
    connector: Arc<dyn Connector>,
    handle: Mutex<Option<Arc<dyn DatacenterHandle>>>,
}

impl ConnectionManager {
    pub fn new(endpoint: Arc<DatacenterEndpoint>, connector: Arc<dyn Connector>) -> Self {
        Self {
            endpoint,
            connector,
            handle: Mutex::new(None),
        }
    }

    pub fn endpoint(&self) -> &Arc<DatacenterEndpoint> {
        &self.endpoint
    }

    /// Returns the cached handle if it is still open, otherwise connects.
    ///
    /// # Errors
    /// `VirtualizationError::Connection` if the backend refuses or cannot be
    /// reached, `VirtualizationError::Interrupted` if `interrupt` fires first.
    pub async fn get_connection(
        &self,
        interrupt: &Interrupt,
    ) -> VirtualizationResult<Arc<dyn DatacenterHandle>> {
        let uri = self.endpoint.uri();
        debug!(datacenter = %uri, "checking for connection");

        let mut cached = tokio::select! {
            biased;
            _ = interrupt.interrupted() => {
                return Err(VirtualizationError::Interrupted(format!(
                    "waiting for the connection to datacenter {}",
                    uri
                )));
            }
            guard = self.handle.lock() => guard,
        };

        if let Some(handle) = cached.as_ref() {
            if handle.is_open() {
                return Ok(Arc::clone(handle));
            }
        }

        info!(datacenter = %uri, "reconnecting");
        *cached = None;
        let handle = connect(
            &self.connector,
            uri,
            self.endpoint.username(),
            self.endpoint.password(),
            interrupt,
        )
        .await?;
        *cached = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Closes and forgets the cached handle, if any.
    pub async fn close(&self) {
        let handle = self.handle.lock().await.take();
        if let Some(handle) = handle {
            handle.close().await;
        }
    }
}

/// Runs one connection attempt as its own task so an interrupt can abort it.
pub(crate) async fn connect(
    connector: &Arc<dyn Connector>,
    uri: &DatacenterUri,
    username: &DatacenterUsername,
    password: &DatacenterPassword,
    interrupt: &Interrupt,
) -> VirtualizationResult<Arc<dyn DatacenterHandle>> {
    info!(datacenter = %uri, username = %username, "trying to establish a connection to datacenter");

    let mut attempt = {
        let connector = Arc::clone(connector);
        let uri = uri.clone();
        let username = username.clone();
        let password = password.clone();
        tokio::spawn(async move {
            connector
                .connect(&uri, &username, password.expose())
                .await
        })
    };

    tokio::select! {
        biased;
        _ = interrupt.interrupted() => {
            attempt.abort();
            warn!(datacenter = %uri, username = %username, "connection attempt interrupted");
            Err(VirtualizationError::Interrupted(format!(
                "connecting to datacenter {}",
                uri
            )))
        }
        joined = &mut attempt => match joined {
            Ok(Ok(handle)) => {
                info!(datacenter = %uri, username = %username, "established connection to datacenter");
                Ok(handle)
            }
            Ok(Err(e)) => {
                warn!(datacenter = %uri, username = %username, error = %e, "failed to establish connection to datacenter");
                Err(VirtualizationError::connection(uri.as_str(), username.as_str(), e.to_string()))
            }
            Err(e) => Err(VirtualizationError::connection(
                uri.as_str(),
                username.as_str(),
                format!("connection attempt did not complete: {}", e),
            )),
        },
    }
}

/// Checks that a datacenter accepts the given credentials.
///
/// The connection is closed straight away and never cached. Returns a
/// human-readable message either way, suitable for a configuration form.
pub async fn test_connection(
    connector: &Arc<dyn Connector>,
    datacenter_uri: Option<&str>,
    username: Option<&str>,
    password: Option<&str>,
) -> Result<String, String> {
    let Some(datacenter_uri) = datacenter_uri else {
        return Err("Datacenter URI is not specified".to_string());
    };
    let uri = DatacenterUri::new(datacenter_uri).map_err(|e| e.to_string())?;
    let Some(username) = username else {
        return Err("Username is not specified".to_string());
    };
    let username = DatacenterUsername::new(username).map_err(|e| e.to_string())?;
    let Some(password) = password else {
        return Err("Password is not specified".to_string());
    };
    let password = DatacenterPassword::new(password).map_err(|e| e.to_string())?;

    match connect(connector, &uri, &username, &password, &Interrupt::never()).await {
        Ok(handle) => {
            handle.close().await;
            Ok("Connected successfully".to_string())
        }
        Err(e) => {
            warn!(datacenter = %uri, username = %username, error = %e, "failed to check datacenter connection");
            Err(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::{
        error::BackendError,
        port::{MockConnector, MockDatacenterHandle},
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn endpoint() -> Arc<DatacenterEndpoint> {
        Arc::new(DatacenterEndpoint::parse("vcc+vbox://dc1", "builder", "secret", 60).unwrap())
    }

    fn open_handle(open: bool) -> Arc<dyn DatacenterHandle> {
        let mut handle = MockDatacenterHandle::new();
        handle.expect_is_open().return_const(open);
        handle.expect_close().return_const(());
        Arc::new(handle)
    }

    #[tokio::test]
    async fn test_open_handle_is_reused() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_, _, _| Ok(open_handle(true)));
        let manager = ConnectionManager::new(endpoint(), Arc::new(connector));

        let first = manager.get_connection(&Interrupt::never()).await.unwrap();
        let second = manager.get_connection(&Interrupt::never()).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_closed_handle_triggers_reconnect() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(2)
            .returning(|_, _, _| Ok(open_handle(false)));
        let manager = ConnectionManager::new(endpoint(), Arc::new(connector));

        manager.get_connection(&Interrupt::never()).await.unwrap();
        manager.get_connection(&Interrupt::never()).await.unwrap();
    }

    #[tokio::test]
    async fn test_password_reaches_connector_in_plaintext() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .withf(|uri, username, password| {
                uri.as_str() == "vcc+vbox://dc1" && username.as_str() == "builder" && password == "secret"
            })
            .times(1)
            .returning(|_, _, _| Ok(open_handle(true)));
        let manager = ConnectionManager::new(endpoint(), Arc::new(connector));

        assert!(manager.get_connection(&Interrupt::never()).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_attempt_surfaces_error_and_caches_nothing() {
        let mut connector = MockConnector::new();
        let mut calls = 0;
        connector.expect_connect().times(2).returning(move |_, _, _| {
            calls += 1;
            if calls == 1 {
                Err(BackendError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "connection refused",
                )))
            } else {
                Ok(open_handle(true))
            }
        });
        let manager = ConnectionManager::new(endpoint(), Arc::new(connector));

        let err = manager.get_connection(&Interrupt::never()).await.err().unwrap();
        match err {
            VirtualizationError::Connection { uri, username, message } => {
                assert_eq!(uri, "vcc+vbox://dc1");
                assert_eq!(username, "builder");
                assert!(message.contains("connection refused"));
                assert!(!message.contains("secret"));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        assert!(manager.get_connection(&Interrupt::never()).await.is_ok());
    }

    struct HangingConnector;

    #[async_trait]
    impl Connector for HangingConnector {
        async fn connect(
            &self,
            _uri: &DatacenterUri,
            _username: &DatacenterUsername,
            _password: &str,
        ) -> Result<Arc<dyn DatacenterHandle>, BackendError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_interrupt_aborts_connection_attempt() {
        let manager = ConnectionManager::new(endpoint(), Arc::new(HangingConnector));
        let (trigger, interrupt) = Interrupt::new();

        let attempt = tokio::spawn(async move { manager.get_connection(&interrupt).await.err() });
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.interrupt();

        let err = tokio::time::timeout(Duration::from_secs(1), attempt)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(err, Some(VirtualizationError::Interrupted(_))));
    }

    /// Holds every attempt until a permit is released.
    struct GatedConnector {
        gate: Semaphore,
        connects: AtomicUsize,
    }

    #[async_trait]
    impl Connector for GatedConnector {
        async fn connect(
            &self,
            _uri: &DatacenterUri,
            _username: &DatacenterUsername,
            _password: &str,
        ) -> Result<Arc<dyn DatacenterHandle>, BackendError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            let permit = self.gate.acquire().await;
            permit.map_err(|e| BackendError::Backend(e.to_string()))?.forget();
            Ok(open_handle(true))
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_attempt() {
        let connector = Arc::new(GatedConnector {
            gate: Semaphore::new(0),
            connects: AtomicUsize::new(0),
        });
        let manager = Arc::new(ConnectionManager::new(
            endpoint(),
            Arc::clone(&connector) as Arc<dyn Connector>,
        ));

        let callers: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.get_connection(&Interrupt::never()).await })
            })
            .collect();
        tokio::time::sleep(Duration::from_millis(20)).await;
        connector.gate.add_permits(1);

        let mut handles = Vec::new();
        for caller in callers {
            let handle = tokio::time::timeout(Duration::from_secs(1), caller)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            handles.push(handle);
        }
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
        assert!(handles.iter().all(|handle| Arc::ptr_eq(handle, &handles[0])));
    }

    #[tokio::test]
    async fn test_fired_interrupt_always_wins() {
        let mut connector = MockConnector::new();
        connector
            .expect_connect()
            .times(1)
            .returning(|_, _, _| Ok(open_handle(true)));
        let manager = ConnectionManager::new(endpoint(), Arc::new(connector));
        manager.get_connection(&Interrupt::never()).await.unwrap();

        let (trigger, interrupt) = Interrupt::new();
        trigger.interrupt();
        for _ in 0..50 {
            assert!(matches!(
                manager.get_connection(&interrupt).await,
                Err(VirtualizationError::Interrupted(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_test_connection_closes_and_reports() {
        let mut connector = MockConnector::new();
        connector.expect_connect().times(1).returning(|_, _, _| {
            let mut handle = MockDatacenterHandle::new();
            handle.expect_close().times(1).return_const(());
            Ok(Arc::new(handle) as Arc<dyn DatacenterHandle>)
        });
        let connector: Arc<dyn Connector> = Arc::new(connector);

        let result =
            test_connection(&connector, Some("vcc+vbox://dc1"), Some("builder"), Some("secret")).await;
        assert_eq!(result, Ok("Connected successfully".to_string()));
    }

    #[tokio::test]
    async fn test_test_connection_validates_input() {
        let connector: Arc<dyn Connector> = Arc::new(MockConnector::new());

        assert_eq!(
            test_connection(&connector, None, Some("builder"), Some("secret")).await,
            Err("Datacenter URI is not specified".to_string())
        );
        assert!(
            test_connection(&connector, Some("https://dc1"), Some("builder"), Some("secret"))
                .await
                .unwrap_err()
                .contains("vcc-api")
        );
        assert_eq!(
            test_connection(&connector, Some("vcc+vbox://dc1"), None, Some("secret")).await,
            Err("Username is not specified".to_string())
        );
        assert_eq!(
            test_connection(&connector, Some("vcc+vbox://dc1"), Some("builder"), None).await,
            Err("Password is not specified".to_string())
        );
    }
}
