//! Provisioning controller
//!
//! One-shot, strictly sequential start-up routine:
//!
//! ```text
//! Connecting -> Inspecting -> CreatingBucket -> AwaitingReadiness -+
//!                          \-> UpdatingBucket ---------------------+
//!                                                                  v
//!                      Ready <- PublishingViews <- OpeningClient <-+
//! ```
//!
//! The bucket is created when absent and updated in place when present; it
//! is never deleted. Design documents are pushed with replace semantics, so
//! running the controller twice with the same configuration converges to the
//! same cluster state. The admin session is closed on every exit path.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use docbus_core::{
    Cluster, ClusterManager, DesignRegistry, StoreClient, StoreError,
};

use crate::adapter::{StoreAdapter, Timeouts};
use crate::config::PersistorConfig;

/// Step of the provisioning state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionState {
    /// Opening the admin session
    Connecting,
    /// Listing buckets
    Inspecting,
    /// Creating the missing bucket
    CreatingBucket,
    /// Polling a new bucket until it accepts clients
    AwaitingReadiness,
    /// Updating the existing bucket in place
    UpdatingBucket,
    /// Opening the data client
    OpeningClient,
    /// Pushing design documents
    PublishingViews,
    /// Adapter usable
    Ready,
}

impl fmt::Display for ProvisionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProvisionState::Connecting => "connecting",
            ProvisionState::Inspecting => "inspecting buckets",
            ProvisionState::CreatingBucket => "creating bucket",
            ProvisionState::AwaitingReadiness => "awaiting bucket readiness",
            ProvisionState::UpdatingBucket => "updating bucket",
            ProvisionState::OpeningClient => "opening client",
            ProvisionState::PublishingViews => "publishing views",
            ProvisionState::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Fatal start-up failure.
#[derive(Debug, Error)]
#[error("provisioning failed while {state}: {source}")]
pub struct ProvisionError {
    /// Step that failed
    pub state: ProvisionState,
    /// Underlying store or admin error
    #[source]
    pub source: StoreError,
}

/// Result alias for provisioning
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;

struct Provisioner<'a> {
    cluster: &'a dyn Cluster,
    config: &'a PersistorConfig,
    state: ProvisionState,
}

impl<'a> Provisioner<'a> {
    fn enter(&mut self, state: ProvisionState) {
        debug!(target: "docbus::provision", from = %self.state, to = %state, "Provisioning step");
        self.state = state;
    }

    fn fail(&self, source: StoreError) -> ProvisionError {
        ProvisionError {
            state: self.state,
            source,
        }
    }

    async fn ensure_bucket(&mut self, admin: &dyn ClusterManager) -> ProvisionResult<()> {
        self.enter(ProvisionState::Inspecting);
        let bucket = self.config.bucket_descriptor();
        let existing = admin.list_buckets().await.map_err(|e| self.fail(e))?;

        if existing.iter().any(|b| *b == bucket.name) {
            self.enter(ProvisionState::UpdatingBucket);
            admin
                .update_bucket(&bucket)
                .await
                .map_err(|e| self.fail(e))?;
            info!(target: "docbus::provision", bucket = %bucket.name, "Bucket updated");
            return Ok(());
        }

        self.enter(ProvisionState::CreatingBucket);
        admin
            .create_bucket(&bucket)
            .await
            .map_err(|e| self.fail(e))?;
        info!(
            target: "docbus::provision",
            bucket = %bucket.name,
            quota_mb = bucket.memory_quota_mb,
            "Bucket created"
        );

        self.enter(ProvisionState::AwaitingReadiness);
        self.await_ready(admin, &bucket.name).await
    }

    async fn await_ready(&self, admin: &dyn ClusterManager, bucket: &str) -> ProvisionResult<()> {
        let limit = Duration::from_millis(self.config.bucket_ready_timeout);
        let interval = Duration::from_millis(self.config.bucket_ready_poll_interval);
        let deadline = Instant::now() + limit;
        loop {
            if admin.bucket_ready(bucket).await.map_err(|e| self.fail(e))? {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(self.fail(StoreError::BucketNotReady {
                    bucket: bucket.to_string(),
                }));
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    async fn open(&mut self) -> ProvisionResult<StoreAdapter> {
        self.enter(ProvisionState::OpeningClient);
        let tuning = self.config.client_tuning();
        let client: Arc<dyn StoreClient> = self
            .cluster
            .open_bucket(
                &self.config.endpoint(),
                &self.config.bucket_name,
                self.config.bucket_password.as_deref(),
                &tuning,
            )
            .await
            .map_err(|e| self.fail(e))?;
        Ok(StoreAdapter::new(client, Timeouts::from(&tuning)))
    }

    async fn publish(&mut self, adapter: &StoreAdapter, registry: &DesignRegistry) -> ProvisionResult<()> {
        self.enter(ProvisionState::PublishingViews);
        for document in registry.documents() {
            adapter
                .create_design_doc(document)
                .await
                .map_err(|e| self.fail(e))?;
            info!(
                target: "docbus::provision",
                design = %document.name,
                views = document.views.len(),
                "Design document published"
            );
        }
        Ok(())
    }

    async fn run(mut self) -> ProvisionResult<StoreAdapter> {
        let endpoint = self.config.endpoint();
        info!(
            target: "docbus::provision",
            url = %endpoint.url(),
            user = self.config.username.as_deref().unwrap_or(""),
            "Connecting to cluster"
        );
        let admin = self
            .cluster
            .connect_admin(&endpoint, &self.config.credentials())
            .await
            .map_err(|e| self.fail(e))?;

        let ensured = self.ensure_bucket(admin.as_ref()).await;
        admin.shutdown().await;
        ensured?;

        let adapter = self.open().await?;
        let registry = DesignRegistry::build(self.config.view_definitions());
        if !registry.is_empty() {
            if let Err(e) = self.publish(&adapter, &registry).await {
                adapter.shutdown().await;
                return Err(e);
            }
        }

        self.enter(ProvisionState::Ready);
        Ok(adapter)
    }
}

/// Ensure the bucket and views exist, then return the adapter.
pub async fn provision(
    cluster: &dyn Cluster,
    config: &PersistorConfig,
) -> ProvisionResult<StoreAdapter> {
    Provisioner {
        cluster,
        config,
        state: ProvisionState::Connecting,
    }
    .run()
    .await
}

/// Open the configured bucket without touching cluster state.
pub async fn open_client(
    cluster: &dyn Cluster,
    config: &PersistorConfig,
) -> ProvisionResult<StoreAdapter> {
    let mut provisioner = Provisioner {
        cluster,
        config,
        state: ProvisionState::OpeningClient,
    };
    let adapter = provisioner.open().await?;
    provisioner.enter(ProvisionState::Ready);
    Ok(adapter)
}
