//! Per-project cache of authenticated Firebase connections.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::config::Endpoints;
use crate::credential::Credential;
use crate::FirebaseApp;

/// Holds at most one [`FirebaseApp`] per project id.
///
/// A later credential for an already cached project id reuses the existing
/// connection.
#[derive(Default)]
pub struct AppRegistry {
    apps: RwLock<HashMap<String, Arc<FirebaseApp>>>,
}

impl AppRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_init(&self, credential: &Credential, endpoints: &Endpoints) -> Arc<FirebaseApp> {
        self.get_or_init_with(credential.project_id(), || FirebaseApp::new(credential, endpoints))
            .await
    }

    /// Returns the cached app for `project_id`, creating it with `init` if absent.
    pub async fn get_or_init_with<F>(&self, project_id: &str, init: F) -> Arc<FirebaseApp>
    where
        F: FnOnce() -> FirebaseApp,
    {
        {
            let apps = self.apps.read().await;
            if let Some(app) = apps.get(project_id) {
                return app.clone();
            }
        }

        // Re-checked under the write lock so racing callers share one app.
        let mut apps = self.apps.write().await;
        apps.entry(project_id.to_string())
            .or_insert_with(|| {
                info!(project_id = %project_id, "Initializing Firebase app");
                Arc::new(init())
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.apps.read().await.len()
    }
}
