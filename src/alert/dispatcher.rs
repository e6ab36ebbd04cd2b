//! Per-entity cooldown + bounded FIFO queue in front of an [`AlertBackend`].
//!
//! `notify` never blocks the caller: it either accepts the alert onto the
//! queue or drops it. A single worker task drains the queue in order,
//! persisting the snapshot, uploading it, pushing the message and removing
//! the file again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::AlertConfig;
use crate::error::AlertError;
use crate::tracking::EntityId;

use super::backend::AlertBackend;
use super::AlertSink;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub cooldown: Duration,
    pub queue_capacity: usize,
    pub upload_timeout: Duration,
    pub push_timeout: Duration,
    pub snapshot_dir: PathBuf,
}

impl DispatcherConfig {
    pub fn from_config(config: &AlertConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(config.cooldown_secs),
            queue_capacity: config.queue_capacity,
            upload_timeout: Duration::from_secs(config.upload_timeout_secs),
            push_timeout: Duration::from_secs(config.push_timeout_secs),
            snapshot_dir: config.snapshot_dir.clone(),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from_config(&AlertConfig::default())
    }
}

/// キューに積まれた1件の通知
#[derive(Debug, Clone)]
pub struct AlertJob {
    pub entity_id: EntityId,
    /// JPEGエンコード済みスナップショット。空なら画像なし
    pub snapshot: Vec<u8>,
    pub risk_score: f32,
    pub created_at: DateTime<Local>,
}

/// 通知本文
pub fn compose_message(entity_id: EntityId, risk_score: f32) -> String {
    format!("⚠️ EMERGENCY!\nID: {entity_id} has fallen!\nRisk: {risk_score:.2}")
}

/// スナップショットの保存ファイル名 `fall_{id}_{HHMMSS}.jpg`
pub fn snapshot_file_name(entity_id: EntityId, at: &DateTime<Local>) -> String {
    format!("fall_{}_{}.jpg", entity_id, at.format("%H%M%S"))
}

/// 転倒通知の受付口
///
/// ビジョン側スレッドから同期的に呼ばれ、送信はワーカータスクが行う。
pub struct AlertDispatcher {
    tx: mpsc::Sender<AlertJob>,
    cooldown: Duration,
    last_sent: Mutex<HashMap<EntityId, Instant>>,
}

/// 送信ワーカー側の受信口
pub struct AlertQueue {
    rx: mpsc::Receiver<AlertJob>,
    config: DispatcherConfig,
}

impl AlertDispatcher {
    /// ワーカーを起動せずにディスパッチャとキューを作る
    pub fn new(config: DispatcherConfig) -> (Self, AlertQueue) {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let dispatcher = Self {
            tx,
            cooldown: config.cooldown,
            last_sent: Mutex::new(HashMap::new()),
        };
        (dispatcher, AlertQueue { rx, config })
    }

    /// 現在のtokioランタイム上でワーカーを起動する
    ///
    /// ディスパッチャ（と全てのクローン元）がdropされるとキューを送り切ってワーカーが終了する。
    pub fn spawn(config: DispatcherConfig, backend: Arc<dyn AlertBackend>) -> (Self, JoinHandle<()>) {
        let (dispatcher, queue) = Self::new(config);
        let handle = tokio::spawn(queue.run(backend));
        (dispatcher, handle)
    }

    /// 送信時刻を記録する。IDは再利用されないので期限切れの記録はここで捨てる
    fn record_sent(&self, entity_id: EntityId, now: Instant) {
        let mut last_sent = self.last_sent.lock();
        last_sent.retain(|_, last| now.duration_since(*last) < self.cooldown);
        last_sent.insert(entity_id, now);
    }

    fn in_cooldown(&self, entity_id: EntityId, now: Instant) -> bool {
        self.last_sent
            .lock()
            .get(&entity_id)
            .is_some_and(|last| now.duration_since(*last) < self.cooldown)
    }
}

impl AlertSink for AlertDispatcher {
    fn notify(&self, entity_id: EntityId, snapshot: Vec<u8>, risk_score: f32) -> bool {
        let now = Instant::now();
        if self.in_cooldown(entity_id, now) {
            return false;
        }

        let job = AlertJob {
            entity_id,
            snapshot,
            risk_score,
            created_at: Local::now(),
        };
        match self.tx.try_send(job) {
            Ok(()) => {
                self.record_sent(entity_id, now);
                tracing::info!(entity = %entity_id, risk = risk_score, "alert queued");
                true
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(entity = %entity_id, "alert queue full, dropping alert");
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(entity = %entity_id, "alert worker stopped, dropping alert");
                false
            }
        }
    }
}

impl AlertQueue {
    /// キューが閉じるまで1件ずつ送信する
    pub async fn run(mut self, backend: Arc<dyn AlertBackend>) {
        tracing::info!(backend = backend.name(), "alert worker started");
        while let Some(job) = self.rx.recv().await {
            deliver(backend.as_ref(), &self.config, job).await;
        }
        tracing::info!("alert worker stopped");
    }
}

async fn deliver(backend: &dyn AlertBackend, config: &DispatcherConfig, job: AlertJob) {
    let snapshot_path = if backend.supports_images() && !job.snapshot.is_empty() {
        match persist_snapshot(&config.snapshot_dir, &job).await {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(entity = %job.entity_id, error = %e, "failed to save snapshot");
                None
            }
        }
    } else {
        None
    };

    let image_url = match &snapshot_path {
        Some(path) => match with_timeout(config.upload_timeout, backend.upload_image(path)).await {
            Ok(url) => Some(url),
            Err(e) => {
                tracing::warn!(entity = %job.entity_id, error = %e, "snapshot upload failed");
                None
            }
        },
        None => None,
    };

    let text = compose_message(job.entity_id, job.risk_score);
    match with_timeout(config.push_timeout, backend.push_message(&text, image_url.as_deref())).await {
        Ok(()) => tracing::info!(entity = %job.entity_id, image = image_url.is_some(), "alert sent"),
        Err(e) => tracing::error!(entity = %job.entity_id, error = %e, "alert push failed"),
    }

    if let Some(path) = snapshot_path {
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove snapshot");
        }
    }
}

async fn persist_snapshot(dir: &Path, job: &AlertJob) -> Result<PathBuf, AlertError> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(snapshot_file_name(job.entity_id, &job.created_at));
    tokio::fs::write(&path, &job.snapshot).await?;
    Ok(path)
}

async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, AlertError>
where
    F: std::future::Future<Output = Result<T, AlertError>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AlertError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;

    #[derive(Default)]
    struct MockBackend {
        fail_upload: bool,
        slow_push: bool,
        /// アップロード時にファイルが存在したか
        uploads: Mutex<Vec<(PathBuf, bool)>>,
        pushes: Mutex<Vec<(String, Option<String>)>>,
    }

    #[async_trait]
    impl AlertBackend for MockBackend {
        fn name(&self) -> &str {
            "mock"
        }

        async fn upload_image(&self, path: &Path) -> Result<String, AlertError> {
            self.uploads.lock().push((path.to_path_buf(), path.exists()));
            if self.fail_upload {
                return Err(AlertError::Response {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok("https://img.example/fall.jpg".to_string())
        }

        async fn push_message(&self, text: &str, image_url: Option<&str>) -> Result<(), AlertError> {
            if self.slow_push {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.pushes.lock().push((text.to_string(), image_url.map(str::to_string)));
            Ok(())
        }
    }

    fn config(dir: &Path) -> DispatcherConfig {
        DispatcherConfig {
            cooldown: Duration::from_secs(30),
            queue_capacity: 8,
            upload_timeout: Duration::from_secs(1),
            push_timeout: Duration::from_secs(1),
            snapshot_dir: dir.to_path_buf(),
        }
    }

    #[test]
    fn test_compose_message() {
        let text = compose_message(EntityId(3), 0.4567);
        assert_eq!(text, "⚠️ EMERGENCY!\nID: 3 has fallen!\nRisk: 0.46");
    }

    #[test]
    fn test_snapshot_file_name() {
        let at = Local.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap();
        assert_eq!(snapshot_file_name(EntityId(12), &at), "fall_12_090507.jpg");
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat_alerts() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let (dispatcher, handle) = AlertDispatcher::spawn(config(dir.path()), backend.clone());

        assert!(dispatcher.notify(EntityId(1), vec![1, 2, 3], 0.4));
        assert!(!dispatcher.notify(EntityId(1), vec![1, 2, 3], 0.3));
        // 別エンティティはクールダウンの対象外
        assert!(dispatcher.notify(EntityId(2), vec![4], 0.2));

        drop(dispatcher);
        handle.await.unwrap();

        let pushes = backend.pushes.lock();
        assert_eq!(pushes.len(), 2);
        assert!(pushes[0].0.contains("ID: 1"));
        assert!(pushes[1].0.contains("ID: 2"));
        assert_eq!(pushes[0].1.as_deref(), Some("https://img.example/fall.jpg"));
    }

    #[tokio::test]
    async fn test_zero_cooldown_delivers_every_alert() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let mut cfg = config(dir.path());
        cfg.cooldown = Duration::ZERO;
        let (dispatcher, handle) = AlertDispatcher::spawn(cfg, backend.clone());

        for _ in 0..3 {
            assert!(dispatcher.notify(EntityId(1), Vec::new(), 0.4));
        }
        drop(dispatcher);
        handle.await.unwrap();
        assert_eq!(backend.pushes.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_upload_failure_still_pushes_text() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend {
            fail_upload: true,
            ..Default::default()
        });
        let (dispatcher, handle) = AlertDispatcher::spawn(config(dir.path()), backend.clone());

        assert!(dispatcher.notify(EntityId(5), vec![0xFF, 0xD8, 0xFF], 0.41));
        drop(dispatcher);
        handle.await.unwrap();

        let pushes = backend.pushes.lock();
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].1, None);
        assert!(pushes[0].0.contains("Risk: 0.41"));
    }

    #[tokio::test]
    async fn test_snapshot_persisted_then_removed() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let (dispatcher, handle) = AlertDispatcher::spawn(config(dir.path()), backend.clone());

        dispatcher.notify(EntityId(7), vec![0xFF, 0xD8, 0xFF, 0xD9], 0.3);
        drop(dispatcher);
        handle.await.unwrap();

        let uploads = backend.uploads.lock();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].1, "snapshot must exist during upload");
        let name = uploads[0].0.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("fall_7_") && name.ends_with(".jpg"));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_empty_snapshot_skips_upload() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend::default());
        let (dispatcher, handle) = AlertDispatcher::spawn(config(dir.path()), backend.clone());

        dispatcher.notify(EntityId(1), Vec::new(), 0.3);
        drop(dispatcher);
        handle.await.unwrap();

        assert!(backend.uploads.lock().is_empty());
        assert_eq!(backend.pushes.lock()[0].1, None);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.queue_capacity = 1;
        // ワーカー未起動なのでキューは消費されない
        let (dispatcher, queue) = AlertDispatcher::new(cfg);

        assert!(dispatcher.notify(EntityId(1), Vec::new(), 0.4));
        assert!(!dispatcher.notify(EntityId(2), Vec::new(), 0.4));

        let backend = Arc::new(MockBackend::default());
        let worker = tokio::spawn(queue.run(backend.clone()));
        tokio::task::yield_now().await;

        // 破棄された通知はクールダウンを記録しない
        let mut accepted = false;
        for _ in 0..100 {
            if dispatcher.notify(EntityId(2), Vec::new(), 0.4) {
                accepted = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(accepted);

        drop(dispatcher);
        worker.await.unwrap();
        assert_eq!(backend.pushes.lock().len(), 2);
    }

    #[test]
    fn test_expired_cooldowns_are_forgotten() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.cooldown = Duration::from_millis(50);
        cfg.queue_capacity = 200;
        let (dispatcher, _queue) = AlertDispatcher::new(cfg);

        for id in 0..100 {
            assert!(dispatcher.notify(EntityId(id), Vec::new(), 0.4));
        }
        assert_eq!(dispatcher.last_sent.lock().len(), 100);

        std::thread::sleep(Duration::from_millis(120));
        assert!(dispatcher.notify(EntityId(1000), Vec::new(), 0.4));
        assert_eq!(dispatcher.last_sent.lock().len(), 1);

        // クールダウン中の記録は残る
        assert!(dispatcher.notify(EntityId(1001), Vec::new(), 0.4));
        assert_eq!(dispatcher.last_sent.lock().len(), 2);
        assert!(!dispatcher.notify(EntityId(1000), Vec::new(), 0.4));
    }

    #[tokio::test]
    async fn test_push_timeout_is_reported_and_worker_continues() {
        let dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(MockBackend {
            slow_push: true,
            ..Default::default()
        });
        let mut cfg = config(dir.path());
        cfg.push_timeout = Duration::from_millis(20);
        let (dispatcher, handle) = AlertDispatcher::spawn(cfg, backend.clone());

        dispatcher.notify(EntityId(1), Vec::new(), 0.3);
        dispatcher.notify(EntityId(2), Vec::new(), 0.3);
        drop(dispatcher);
        handle.await.unwrap();

        // どちらもタイムアウトしたがワーカーは最後まで処理した
        assert!(backend.pushes.lock().is_empty());
    }
}
