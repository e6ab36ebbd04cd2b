use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

/// フレーム供給元（カメラなど）
pub trait FrameSource {
    type Frame: Clone;

    fn start(&mut self) -> anyhow::Result<()>;

    /// 最新フレームとそのIDを同じロックの下で読んだもの。初回フレーム到着前または停止後はNone
    fn latest_frame(&self) -> Option<(u64, Self::Frame)>;

    /// 最新フレームのコピー
    fn get_frame(&self) -> Option<Self::Frame> {
        self.latest_frame().map(|(_, frame)| frame)
    }

    /// 最新フレームのID。新フレームが到着するたびに増える
    fn frame_id(&self) -> u64;

    fn stop(&mut self);
}

/// キャプチャスレッドと処理スレッドで共有する最新フレーム
///
/// 書き込みは上書きのみ。読み出しはクローンを返すので処理中に差し替わらない。
/// IDはスロットと一緒にロック内で更新するので、`latest` のIDとフレームは常に対応する。
pub struct LatestFrame<F> {
    slot: Mutex<Option<(u64, F)>>,
    frame_id: AtomicU64,
}

impl<F: Clone> LatestFrame<F> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            frame_id: AtomicU64::new(0),
        }
    }

    pub fn publish(&self, frame: F) {
        let mut slot = self.slot.lock();
        let id = self.frame_id.fetch_add(1, Ordering::AcqRel) + 1;
        *slot = Some((id, frame));
    }

    pub fn latest(&self) -> Option<(u64, F)> {
        self.slot.lock().clone()
    }

    pub fn get(&self) -> Option<F> {
        self.latest().map(|(_, frame)| frame)
    }

    pub fn frame_id(&self) -> u64 {
        self.frame_id.load(Ordering::Acquire)
    }

    pub fn clear(&self) {
        *self.slot.lock() = None;
    }
}

impl<F: Clone> Default for LatestFrame<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// 新しいフレームが来るたびに `on_frame` を呼ぶ処理ループ
///
/// `shutdown` は1周に1回確認する。フレームが無い・更新されていない場合は `idle` だけ待つ。
/// 処理済みかどうかはフレームと一緒に読んだIDで判定する。戻り値は処理したフレーム数。
pub fn run_frame_loop<S, F>(source: &S, shutdown: &AtomicBool, idle: Duration, mut on_frame: F) -> u64
where
    S: FrameSource + ?Sized,
    F: FnMut(u64, &S::Frame),
{
    let mut last_id = 0;
    let mut processed = 0;

    while !shutdown.load(Ordering::Relaxed) {
        if source.frame_id() == last_id {
            std::thread::sleep(idle);
            continue;
        }
        match source.latest_frame() {
            Some((id, frame)) if id != last_id => {
                last_id = id;
                on_frame(processed, &frame);
                processed += 1;
            }
            _ => std::thread::sleep(idle),
        }
    }

    processed
}

/// 共有スロットを介したFrameSource。テストや外部キャプチャとの接続用
pub struct SharedFrameSource<F> {
    latest: Arc<LatestFrame<F>>,
    running: bool,
}

impl<F: Clone> SharedFrameSource<F> {
    pub fn new(latest: Arc<LatestFrame<F>>) -> Self {
        Self { latest, running: false }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

impl<F: Clone> FrameSource for SharedFrameSource<F> {
    type Frame = F;

    fn start(&mut self) -> anyhow::Result<()> {
        self.running = true;
        Ok(())
    }

    fn latest_frame(&self) -> Option<(u64, F)> {
        if !self.running {
            return None;
        }
        self.latest.latest()
    }

    fn frame_id(&self) -> u64 {
        self.latest.frame_id()
    }

    fn stop(&mut self) {
        self.running = false;
        self.latest.clear();
    }
}
