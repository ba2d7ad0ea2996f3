use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

use super::detector::Detector;
use super::device::FrameFeed;
use super::engine::{CaptureEngine, ScanSettings};
use crate::models::scan::{DeviceInfo, ScanMode};

/// One browser's scanner: the frame feed it uploads into and the engine reading it.
pub struct ScanSession {
    pub id: Uuid,
    pub company_id: Uuid,
    pub feed: FrameFeed,
    pub engine: CaptureEngine,
    created_at: Instant,
}

/// In-memory registry of scan sessions, scoped by tenant.
pub struct ScanSessions {
    sessions: RwLock<HashMap<Uuid, Arc<ScanSession>>>,
    settings: ScanSettings,
    ttl: Duration,
    barcode: Arc<dyn Detector>,
    ocr: Option<Arc<dyn Detector>>,
}

impl ScanSessions {
    pub fn new(
        settings: ScanSettings,
        ttl: Duration,
        barcode: Arc<dyn Detector>,
        ocr: Option<Arc<dyn Detector>>,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            settings,
            ttl,
            barcode,
            ocr,
        }
    }

    pub fn ocr_available(&self) -> bool {
        self.ocr.is_some()
    }

    pub async fn create(
        &self,
        company_id: Uuid,
        devices: Vec<DeviceInfo>,
        mode: Option<ScanMode>,
    ) -> Arc<ScanSession> {
        self.prune().await;

        let settings = ScanSettings {
            mode: mode.unwrap_or(self.settings.mode),
            ..self.settings.clone()
        };
        let feed = FrameFeed::new(devices);
        let mut engine =
            CaptureEngine::new(Arc::new(feed.clone()), settings).with_barcode(self.barcode.clone());
        if let Some(ocr) = &self.ocr {
            engine = engine.with_ocr(ocr.clone());
        }

        let session = Arc::new(ScanSession {
            id: Uuid::new_v4(),
            company_id,
            feed,
            engine,
            created_at: Instant::now(),
        });

        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session.clone());
        metrics::gauge!("vin_scan_sessions_active").set(sessions.len() as f64);
        tracing::info!(session_id = %session.id, %company_id, "Scan session created");

        session
    }

    /// The session, unless it belongs to another tenant.
    pub async fn get(&self, company_id: Uuid, id: Uuid) -> Option<Arc<ScanSession>> {
        self.sessions
            .read()
            .await
            .get(&id)
            .filter(|s| s.company_id == company_id)
            .cloned()
    }

    /// Stop and forget a session.
    pub async fn remove(&self, company_id: Uuid, id: Uuid) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            let owned = sessions.get(&id).is_some_and(|s| s.company_id == company_id);
            let removed = if owned { sessions.remove(&id) } else { None };
            metrics::gauge!("vin_scan_sessions_active").set(sessions.len() as f64);
            removed
        };

        match removed {
            Some(session) => {
                session.engine.stop().await;
                tracing::info!(session_id = %id, "Scan session closed");
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop sessions past their TTL that are no longer scanning.
    async fn prune(&self) {
        let expired: Vec<Arc<ScanSession>> = {
            let mut sessions = self.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .values()
                .filter(|s| {
                    s.created_at.elapsed() > self.ttl && !s.engine.snapshot().state.is_active()
                })
                .map(|s| s.id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in expired {
            session.engine.stop().await;
            tracing::debug!(session_id = %session.id, "Expired scan session pruned");
        }
    }
}
