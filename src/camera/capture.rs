use anyhow::{Context, Result};
use opencv::{
    core::Mat,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureAPIs, VideoCaptureTrait},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::frame::{FrameSource, LatestFrame};
use crate::config::CameraConfig;

/// OpenCVを使用したカメラキャプチャ
pub struct OpenCvCamera {
    capture: VideoCapture,
    width: u32,
    height: u32,
}

impl OpenCvCamera {
    /// 解像度を指定してカメラを開く
    pub fn open(index: i32, width: u32, height: u32) -> Result<Self> {
        let mut capture =
            VideoCapture::new(index, VideoCaptureAPIs::CAP_ANY as i32).context("Failed to open camera")?;

        if !capture.is_opened()? {
            anyhow::bail!("Camera {} is not available", index);
        }

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        capture.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;

        let actual_width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)? as u32;
        let actual_height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)? as u32;
        tracing::info!(index, width = actual_width, height = actual_height, "camera opened");

        Ok(Self {
            capture,
            width: actual_width,
            height: actual_height,
        })
    }

    pub fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// フレームを読み込む（BGR形式）
    pub fn read_frame(&mut self) -> Result<Mat> {
        let mut frame = Mat::default();
        self.capture
            .read(&mut frame)
            .context("Failed to read frame")?;

        if frame.empty() {
            anyhow::bail!("Empty frame received");
        }

        Ok(frame)
    }
}

/// 別スレッドでカメラキャプチャを行い、最新フレームを提供する
///
/// 転倒検知と顔認識の処理スレッドが同じインスタンスを共有する。
pub struct ThreadedCamera {
    config: CameraConfig,
    latest: Arc<LatestFrame<Mat>>,
    running: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
    resolution: (u32, u32),
}

impl ThreadedCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
            latest: Arc::new(LatestFrame::new()),
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
            resolution: (config.width, config.height),
        }
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }
}

impl FrameSource for ThreadedCamera {
    type Frame = Mat;

    fn start(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let mut camera = OpenCvCamera::open(self.config.index, self.config.width, self.config.height)?;
        self.resolution = camera.resolution();

        self.running.store(true, Ordering::Release);
        let latest = self.latest.clone();
        let running = self.running.clone();

        let handle = thread::Builder::new()
            .name("camera".to_string())
            .spawn(move || {
                let mut consecutive_errors = 0u32;
                while running.load(Ordering::Acquire) {
                    match camera.read_frame() {
                        Ok(frame) => {
                            latest.publish(frame);
                            consecutive_errors = 0;
                        }
                        Err(e) => {
                            consecutive_errors += 1;
                            if consecutive_errors == 1 || consecutive_errors % 100 == 0 {
                                tracing::warn!(error = %e, count = consecutive_errors, "camera read failed");
                            }
                            thread::sleep(Duration::from_millis(10));
                        }
                    }
                }
                tracing::info!("camera thread stopped");
            })
            .context("Failed to spawn camera thread")?;

        self.handle = Some(handle);
        Ok(())
    }

    fn latest_frame(&self) -> Option<(u64, Mat)> {
        self.latest.latest()
    }

    fn frame_id(&self) -> u64 {
        self.latest.frame_id()
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("camera thread panicked");
            }
        }
        self.latest.clear();
    }
}

impl Drop for ThreadedCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
