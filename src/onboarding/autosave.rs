//! Debounced organization-profile autosave with server-error retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::model::OrgProfile;
use crate::config::AutosaveConfig;
use crate::error::ServiceError;
use crate::services::OrgProfileService;
use crate::store::KeyValueStore;

/// What the autosave indicator shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AutosaveStatus {
    #[default]
    Idle,
    Saving,
    Saved,
    /// Server error; retry `attempt` is scheduled.
    Retrying { attempt: u32 },
    Failed { reason: String },
    /// Offline: kept locally, saved once back online.
    PendingOffline,
}

pub struct ProfileAutosaver {
    inner: Arc<Inner>,
}

struct Inner {
    profiles: Arc<dyn OrgProfileService>,
    store: Arc<dyn KeyValueStore>,
    /// Store key for this owner's local draft.
    draft_key: String,
    config: AutosaveConfig,
    offline: AtomicBool,
    latest: Mutex<Option<OrgProfile>>,
    tx: watch::Sender<AutosaveStatus>,
    current: Mutex<CancellationToken>,
}

impl Inner {
    fn publish(&self, token: &CancellationToken, status: AutosaveStatus) -> bool {
        let _guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if token.is_cancelled() {
            return false;
        }
        self.tx.send_replace(status);
        true
    }

    async fn write_local(&self, profile: &OrgProfile) {
        let json = match serde_json::to_string(profile) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Failed to serialize profile draft");
                return;
            }
        };
        if let Err(e) = self.store.set(&self.draft_key, &json).await {
            warn!(key = %self.draft_key, error = %e, "Failed to store profile draft");
        }
    }
}

impl ProfileAutosaver {
    /// `draft_key` scopes the local draft to one owner, see
    /// [`crate::store::keys::org_profile_draft`].
    pub fn new(
        profiles: Arc<dyn OrgProfileService>,
        store: Arc<dyn KeyValueStore>,
        draft_key: String,
        config: AutosaveConfig,
    ) -> Self {
        let (tx, _rx) = watch::channel(AutosaveStatus::default());
        Self {
            inner: Arc::new(Inner {
                profiles,
                store,
                draft_key,
                config,
                offline: AtomicBool::new(false),
                latest: Mutex::new(None),
                tx,
                current: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AutosaveStatus> {
        self.inner.tx.subscribe()
    }

    pub fn status(&self) -> AutosaveStatus {
        self.inner.tx.borrow().clone()
    }

    /// Record an edit. Restarts the debounce and supersedes any save in flight.
    pub fn update_draft(&self, profile: OrgProfile) -> tokio::task::JoinHandle<()> {
        *self.inner.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(profile.clone());
        let token = self.next_token();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Profile autosave superseded during debounce");
                    return;
                }
                _ = tokio::time::sleep(inner.config.debounce) => {}
            }
            save(&inner, &token, &profile).await;
        })
    }

    /// Switch connectivity. Coming back online flushes a pending draft.
    pub fn set_offline(&self, offline: bool) -> Option<tokio::task::JoinHandle<()>> {
        let was_offline = self.inner.offline.swap(offline, Ordering::SeqCst);
        if offline || !was_offline || self.status() != AutosaveStatus::PendingOffline {
            return None;
        }
        let profile = self
            .inner
            .latest
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()?;
        info!("Back online, flushing pending profile draft");
        let token = self.next_token();
        let inner = Arc::clone(&self.inner);
        Some(tokio::spawn(async move {
            save(&inner, &token, &profile).await;
        }))
    }

    pub fn is_offline(&self) -> bool {
        self.inner.offline.load(Ordering::SeqCst)
    }

    /// Stop any pending or in-flight save.
    pub fn cancel(&self) {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    fn next_token(&self) -> CancellationToken {
        let mut current = self.inner.current.lock().unwrap_or_else(|e| e.into_inner());
        current.cancel();
        let token = CancellationToken::new();
        *current = token.clone();
        token
    }
}

impl Drop for ProfileAutosaver {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn save(inner: &Inner, token: &CancellationToken, profile: &OrgProfile) {
    if inner.offline.load(Ordering::SeqCst) {
        inner.write_local(profile).await;
        inner.publish(token, AutosaveStatus::PendingOffline);
        return;
    }

    if !inner.publish(token, AutosaveStatus::Saving) {
        return;
    }

    let mut retries = 0u32;
    loop {
        let result = tokio::select! {
            _ = token.cancelled() => return,
            result = inner.profiles.save_profile(profile) => result,
        };

        match result {
            Ok(()) => {
                inner.write_local(profile).await;
                if inner.publish(token, AutosaveStatus::Saved) {
                    info!(retries, "Profile draft autosaved");
                }
                return;
            }
            Err(ServiceError::ServerError { .. }) if retries < inner.config.max_retries => {
                let delay = Duration::from_secs(1u64 << retries);
                retries += 1;
                warn!(attempt = retries, ?delay, "Profile autosave failed, retrying");
                if !inner.publish(token, AutosaveStatus::Retrying { attempt: retries }) {
                    return;
                }
                tokio::select! {
                    _ = token.cancelled() => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            Err(e) => {
                warn!(error = %e, retries, "Profile autosave failed");
                inner.publish(
                    token,
                    AutosaveStatus::Failed {
                        reason: e.to_string(),
                    },
                );
                return;
            }
        }
    }
}

/// Restore a previously autosaved draft stored under `draft_key`.
pub async fn load_draft(store: &dyn KeyValueStore, draft_key: &str) -> Option<OrgProfile> {
    let raw = match store.get(draft_key).await {
        Ok(raw) => raw?,
        Err(e) => {
            warn!(key = %draft_key, error = %e, "Failed to read profile draft");
            return None;
        }
    };
    match serde_json::from_str(&raw) {
        Ok(profile) => Some(profile),
        Err(e) => {
            warn!(error = %e, "Discarding unreadable profile draft");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use tokio::time::Instant;

    use super::*;
    use crate::store::{MemoryStore, keys};

    const OWNER: &str = "founder@acme.com";

    /// Replays scripted results, then succeeds.
    struct ScriptedProfiles {
        script: Mutex<VecDeque<Result<(), ServiceError>>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProfiles {
        fn new(script: Vec<Result<(), ServiceError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn gaps_secs(&self) -> Vec<u64> {
            let calls = self.calls.lock().unwrap();
            calls.windows(2).map(|w| (w[1] - w[0]).as_secs()).collect()
        }

        fn count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl OrgProfileService for ScriptedProfiles {
        async fn save_profile(&self, _profile: &OrgProfile) -> Result<(), ServiceError> {
            self.calls.lock().unwrap().push(Instant::now());
            self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
        }
    }

    fn server_error() -> Result<(), ServiceError> {
        Err(ServiceError::ServerError {
            service: "org-profile".into(),
        })
    }

    fn draft(name: &str) -> OrgProfile {
        OrgProfile {
            org_name: name.into(),
            ..OrgProfile::default()
        }
    }

    fn autosaver(profiles: Arc<ScriptedProfiles>) -> (ProfileAutosaver, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            ProfileAutosaver::new(
                profiles,
                store.clone(),
                keys::org_profile_draft(OWNER),
                AutosaveConfig::default(),
            ),
            store,
        )
    }

    async fn stored(store: &MemoryStore) -> Option<OrgProfile> {
        load_draft(store, &keys::org_profile_draft(OWNER)).await
    }

    #[tokio::test(start_paused = true)]
    async fn debounce_saves_latest_draft_once() {
        let profiles = ScriptedProfiles::new(vec![]);
        let (saver, store) = autosaver(profiles.clone());

        saver.update_draft(draft("A"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        saver.update_draft(draft("Ac")).await.unwrap();

        assert_eq!(profiles.count(), 1);
        assert_eq!(saver.status(), AutosaveStatus::Saved);
        assert_eq!(stored(&store).await.unwrap().org_name, "Ac");
    }

    #[tokio::test(start_paused = true)]
    async fn server_errors_back_off_exponentially() {
        let profiles = ScriptedProfiles::new(vec![server_error(), server_error(), server_error()]);
        let (saver, _) = autosaver(profiles.clone());

        saver.update_draft(draft("Acme")).await.unwrap();

        assert_eq!(profiles.count(), 4);
        assert_eq!(profiles.gaps_secs(), vec![1, 2, 4]);
        assert_eq!(saver.status(), AutosaveStatus::Saved);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let profiles = ScriptedProfiles::new(vec![server_error(); 4]);
        let (saver, store) = autosaver(profiles.clone());

        saver.update_draft(draft("Acme")).await.unwrap();

        assert_eq!(profiles.count(), 4);
        assert!(matches!(saver.status(), AutosaveStatus::Failed { .. }));
        assert!(stored(&store).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn non_server_errors_are_not_retried() {
        let profiles = ScriptedProfiles::new(vec![Err(ServiceError::Rejected {
            service: "org-profile".into(),
            reason: "invalid".into(),
        })]);
        let (saver, _) = autosaver(profiles.clone());

        saver.update_draft(draft("Acme")).await.unwrap();

        assert_eq!(profiles.count(), 1);
        assert!(matches!(saver.status(), AutosaveStatus::Failed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn offline_keeps_draft_locally_until_reconnect() {
        let profiles = ScriptedProfiles::new(vec![]);
        let (saver, store) = autosaver(profiles.clone());

        saver.set_offline(true);
        saver.update_draft(draft("Offline Co")).await.unwrap();

        assert_eq!(saver.status(), AutosaveStatus::PendingOffline);
        assert_eq!(profiles.count(), 0);
        assert_eq!(stored(&store).await.unwrap().org_name, "Offline Co");

        saver.set_offline(false).unwrap().await.unwrap();
        assert_eq!(profiles.count(), 1);
        assert_eq!(saver.status(), AutosaveStatus::Saved);
    }

    #[tokio::test]
    async fn unreadable_draft_is_ignored() {
        let store = MemoryStore::new();
        let key = keys::org_profile_draft(OWNER);
        store.set(&key, "{not json").await.unwrap();
        assert!(load_draft(&store, &key).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn drafts_are_scoped_to_their_owner() {
        let profiles = ScriptedProfiles::new(vec![]);
        let (saver, store) = autosaver(profiles);

        saver.update_draft(draft("Acme")).await.unwrap();

        assert!(
            load_draft(store.as_ref(), &keys::org_profile_draft("other@beta.com"))
                .await
                .is_none()
        );
        assert_eq!(
            stored(&store).await.unwrap().org_name,
            "Acme"
        );
    }
}
