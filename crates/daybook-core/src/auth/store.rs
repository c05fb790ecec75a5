use std::sync::Arc;

use tokio::sync::watch;

use super::Credential;

/// In-memory holder of the current access credential.
///
/// Clone is cheap: clones share the same cell. Writes should go through
/// `SessionManager::set_credential` so the proactive refresh timer stays in
/// step with the stored value.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    tx: Arc<watch::Sender<Option<Credential>>>,
}

impl CredentialStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the current credential
    pub fn set(&self, credential: Option<Credential>) {
        self.tx.send_replace(credential);
    }

    pub fn get(&self) -> Option<Credential> {
        self.tx.borrow().clone()
    }

    pub fn is_present(&self) -> bool {
        self.tx.borrow().is_some()
    }

    pub fn clear(&self) {
        self.set(None);
    }

    /// Observe every credential change
    pub fn subscribe(&self) -> watch::Receiver<Option<Credential>> {
        self.tx.subscribe()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}
