use anyhow::{Context, Result};
use clap::Parser;
use medicine_robot::alert::{
    AlertBackend, AlertDispatcher, AlertSink, DispatcherConfig, LineBackend, LogBackend, NullSink,
};
use medicine_robot::config::{AlertConfig, Config, MedicineConfig};
use medicine_robot::medicine::{describe, MedicineReminder, MedicineStore};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio::task::JoinHandle;

/// 通知キューを送り切るまでの待ち時間の上限
const ALERT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "medicine-robot", version = env!("GIT_VERSION"), about = "Medicine reminders, fall detection and face recognition")]
struct Cli {
    /// 設定ファイル
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// 検出結果をウィンドウに表示（config の debug.view より優先）
    #[arg(long)]
    view: bool,
    /// 薬リマインダーを無効化
    #[arg(long)]
    no_reminder: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_or_default(&cli.config);
    if cli.view {
        config.debug.view = true;
    }
    tracing::info!(version = env!("GIT_VERSION"), config = %cli.config.display(), "medicine-robot starting");

    let shutdown = Arc::new(AtomicBool::new(false));
    let (alerts, alert_worker) = build_alerts(&config.alert)?;

    let reminder = if cli.no_reminder {
        None
    } else {
        Some(spawn_reminder(&config.medicine, shutdown.clone())?)
    };

    let vision = {
        let config = config.clone();
        let alerts = alerts.clone();
        let shutdown = shutdown.clone();
        tokio::task::spawn_blocking(move || vision::run(&config, alerts, &shutdown))
    };

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    tracing::info!("shutdown requested");
    shutdown.store(true, Ordering::Relaxed);

    if vision.await.is_err() {
        tracing::error!("vision task panicked");
    }
    if let Some(handle) = reminder {
        if tokio::task::spawn_blocking(move || handle.join()).await.map_or(true, |r| r.is_err()) {
            tracing::error!("reminder thread panicked");
        }
    }

    // 最後の送信口を閉じるとワーカーは残りを送ってから終了する
    drop(alerts);
    if let Some(worker) = alert_worker {
        match tokio::time::timeout(ALERT_DRAIN_TIMEOUT, worker).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "alert worker failed"),
            Err(_) => tracing::warn!("pending alerts not delivered before exit"),
        }
    }

    tracing::info!("medicine-robot stopped");
    Ok(())
}

fn build_alerts(config: &AlertConfig) -> Result<(Arc<dyn AlertSink>, Option<JoinHandle<()>>)> {
    if !config.enabled {
        tracing::info!("fall alerts disabled");
        return Ok((Arc::new(NullSink), None));
    }

    let backend: Arc<dyn AlertBackend> = if LineBackend::is_configured(config) {
        Arc::new(LineBackend::from_config(config).context("Failed to build LINE client")?)
    } else {
        tracing::warn!("LINE credentials missing, alerts will only be logged");
        Arc::new(LogBackend)
    };

    let (dispatcher, worker) = AlertDispatcher::spawn(DispatcherConfig::from_config(config), backend);
    Ok((Arc::new(dispatcher), Some(worker)))
}

fn spawn_reminder(config: &MedicineConfig, shutdown: Arc<AtomicBool>) -> Result<thread::JoinHandle<()>> {
    let store = MedicineStore::open(&config.data_path);
    let interval = Duration::from_secs(config.check_interval_secs.max(1));

    thread::Builder::new()
        .name("reminder".to_string())
        .spawn(move || {
            let mut reminder = MedicineReminder::new(store);
            reminder.run(&shutdown, interval, |due| {
                for medicine in due {
                    tracing::warn!(id = medicine.id, "time to take medicine: {}", describe(medicine));
                }
            });
        })
        .context("Failed to spawn reminder thread")
}

#[cfg(feature = "desktop")]
mod vision {
    use super::*;
    use medicine_robot::camera::{run_frame_loop, FrameSource, ThreadedCamera};
    use medicine_robot::face::{FacePipeline, FaceRecognizer, HaarFaceDetector, OnnxFaceEmbedder};
    use medicine_robot::fall::{FallDetector, FallMonitor};
    use medicine_robot::pose::YoloPoseDetector;
    use medicine_robot::render::{draw_face_overlay, draw_fall_overlay, encode_jpeg, PreviewWindow};

    /// 新フレーム待ちのスリープ
    const IDLE: Duration = Duration::from_millis(10);

    /// カメラを開いて転倒検知・顔認識のスレッドを走らせる
    ///
    /// どちらかの初期化に失敗しても他方と薬リマインダーは動き続ける。
    pub fn run(config: &Config, alerts: Arc<dyn AlertSink>, shutdown: &AtomicBool) {
        if !config.fall.enabled && !config.face.enabled {
            return;
        }

        let mut camera = ThreadedCamera::new(&config.camera);
        if let Err(e) = camera.start() {
            tracing::error!(error = %e, "camera unavailable, vision subsystems disabled");
            return;
        }

        thread::scope(|s| {
            if config.fall.enabled {
                let camera = &camera;
                let alerts = alerts.as_ref();
                s.spawn(move || {
                    if let Err(e) = run_fall(camera, config, alerts, shutdown) {
                        tracing::error!(error = %e, "fall detection stopped");
                    }
                });
            }
            if config.face.enabled {
                let camera = &camera;
                s.spawn(move || {
                    if let Err(e) = run_face(camera, config, shutdown) {
                        tracing::error!(error = %e, "face recognition stopped");
                    }
                });
            }
        });

        camera.stop();
    }

    fn run_fall(camera: &ThreadedCamera, config: &Config, alerts: &dyn AlertSink, shutdown: &AtomicBool) -> Result<()> {
        let estimator = YoloPoseDetector::new(
            &config.fall.model_path,
            config.fall.input_size,
            config.fall.detection_confidence,
        )?;
        let mut detector = FallDetector::new(estimator, FallMonitor::from_config(&config.fall));
        let mut window = if config.debug.view {
            Some(PreviewWindow::new("Fall Detection")?)
        } else {
            None
        };
        tracing::info!("fall detection started");

        let processed = run_frame_loop(camera, shutdown, IDLE, |_, frame| {
            let observations = match detector.process_frame(frame, alerts, encode_jpeg) {
                Ok(observations) => observations,
                Err(e) => {
                    tracing::warn!(error = %e, "pose estimation failed, frame skipped");
                    return;
                }
            };
            let keep_window = match &window {
                Some(preview) => {
                    let mut canvas = frame.clone();
                    let shown = draw_fall_overlay(&mut canvas, &observations, config.fall.keypoint_confidence)
                        .and_then(|_| preview.show(&canvas));
                    matches!(shown, Ok(true))
                }
                None => true,
            };
            if !keep_window {
                window = None;
            }
        });

        tracing::info!(frames = processed, "fall detection stopped");
        Ok(())
    }

    fn run_face(camera: &ThreadedCamera, config: &Config, shutdown: &AtomicBool) -> Result<()> {
        let detector = HaarFaceDetector::new(&config.face.cascade_path, config.face.min_face_size)?;
        let mut identifier = OnnxFaceEmbedder::new(&config.face.model_path, config.face.similarity_threshold)?;
        identifier.load_gallery(&config.face.db_path)?;

        let recognizer = FaceRecognizer::from_config(&config.face);
        let confirm_frames = recognizer.confirm_frames();
        let mut pipeline = FacePipeline::new(detector, identifier, recognizer);
        let mut window = if config.debug.view {
            Some(PreviewWindow::new("Face Recognition")?)
        } else {
            None
        };
        tracing::info!("face recognition started");

        let processed = run_frame_loop(camera, shutdown, IDLE, |_, frame| {
            let observations = match pipeline.process_frame(frame) {
                Ok((observations, _locks)) => observations,
                Err(e) => {
                    tracing::warn!(error = %e, "face detection failed, frame skipped");
                    return;
                }
            };
            let keep_window = match &window {
                Some(preview) => {
                    let mut canvas = frame.clone();
                    let shown = draw_face_overlay(&mut canvas, &observations, confirm_frames)
                        .and_then(|_| preview.show(&canvas));
                    matches!(shown, Ok(true))
                }
                None => true,
            };
            if !keep_window {
                window = None;
            }
        });

        tracing::info!(frames = processed, "face recognition stopped");
        Ok(())
    }
}

#[cfg(not(feature = "desktop"))]
mod vision {
    use super::*;

    pub fn run(config: &Config, _alerts: Arc<dyn AlertSink>, _shutdown: &AtomicBool) {
        if config.fall.enabled || config.face.enabled {
            tracing::warn!("built without the desktop feature, fall detection and face recognition disabled");
        }
    }
}
