use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use quanta::{Clock, Instant as QuantaInstant};

/// Point-in-time copy of the fill-callback counters (non-RT).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerformanceSnapshot {
    pub callback_count: u64,
    pub frames_processed: u64,
    pub bytes_submitted: u64,
    /// Callbacks answered with silence because the fill slot was busy.
    pub underrun_count: u64,
    /// Requests refused because their size was not a whole number of frames.
    pub rejected_count: u64,
    pub min_callback_nanos: Option<u64>,
    pub max_callback_nanos: Option<u64>,
    pub ema_callback_nanos: f64,
    /// EMA callback time relative to the audio time one average callback covers.
    pub avg_load_percent: f64,
}

impl fmt::Display for PerformanceSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} callbacks, {} frames, {} bytes, {} underruns, {} rejected, load {:.2}%",
            self.callback_count,
            self.frames_processed,
            self.bytes_submitted,
            self.underrun_count,
            self.rejected_count,
            self.avg_load_percent
        )
    }
}

/// Real-time-safe counters for the fill callback.
///
/// The `add_*`/`increment_*` methods and `scoped_callback()` only touch atomics
/// and may be called from the audio thread. `snapshot` is for other threads.
pub struct PerformanceMonitor {
    clock: Clock,
    sample_rate: f64,

    callback_count: AtomicU64,
    frames_processed: AtomicU64,
    bytes_submitted: AtomicU64,
    underrun_count: AtomicU64,
    rejected_count: AtomicU64,

    min_callback_nanos: AtomicU64,
    max_callback_nanos: AtomicU64,
    /// f64 bits
    ema_callback_bits: AtomicU64,
    ema_alpha: f64,
}

impl PerformanceMonitor {
    /// `ema_alpha` must lie in `(0, 1]`; out-of-range values are clamped.
    pub fn new(sample_rate: u32, ema_alpha: f64) -> Self {
        Self {
            clock: Clock::new(),
            sample_rate: sample_rate as f64,
            callback_count: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            bytes_submitted: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
            rejected_count: AtomicU64::new(0),
            min_callback_nanos: AtomicU64::new(u64::MAX),
            max_callback_nanos: AtomicU64::new(0),
            ema_callback_bits: AtomicU64::new(0),
            ema_alpha: ema_alpha.clamp(f64::EPSILON, 1.0),
        }
    }

    #[inline(always)]
    pub fn add_frames_processed(&self, n: u64) {
        self.frames_processed.fetch_add(n, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_bytes_submitted(&self, n: u64) {
        self.bytes_submitted.fetch_add(n, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_callback_count(&self) {
        self.callback_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_underrun_count(&self) {
        self.underrun_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn increment_rejected_count(&self) {
        self.rejected_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Updates min, max and EMA without taking a lock.
    #[inline(always)]
    pub fn record_callback_duration_nanos(&self, nanos: u64) {
        self.min_callback_nanos.fetch_min(nanos, Ordering::Relaxed);
        self.max_callback_nanos.fetch_max(nanos, Ordering::Relaxed);

        // EMA_new = alpha * x + (1 - alpha) * EMA_old
        let alpha = self.ema_alpha;
        let mut old_bits = self.ema_callback_bits.load(Ordering::Relaxed);
        loop {
            let old = f64::from_bits(old_bits);
            let new = alpha * (nanos as f64) + (1.0 - alpha) * old;
            match self.ema_callback_bits.compare_exchange_weak(
                old_bits,
                new.to_bits(),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(found) => old_bits = found,
            }
        }
    }

    #[inline(always)]
    pub fn record_callback_duration(&self, d: Duration) {
        self.record_callback_duration_nanos(u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Count a callback now and record its duration when the guard drops.
    #[inline(always)]
    pub fn scoped_callback(&self) -> RealtimeGuard<'_> {
        self.increment_callback_count();
        RealtimeGuard {
            monitor: self,
            start: self.clock.now(),
        }
    }

    pub fn snapshot(&self) -> PerformanceSnapshot {
        let callback_count = self.callback_count.load(Ordering::Relaxed);
        let frames_processed = self.frames_processed.load(Ordering::Relaxed);
        let min_raw = self.min_callback_nanos.load(Ordering::Relaxed);
        let max_raw = self.max_callback_nanos.load(Ordering::Relaxed);
        let ema = f64::from_bits(self.ema_callback_bits.load(Ordering::Relaxed));

        let avg_load_percent = if callback_count > 0 && frames_processed > 0 {
            let frames_per_callback = frames_processed as f64 / callback_count as f64;
            let expected_nanos = frames_per_callback / self.sample_rate * 1_000_000_000.0;
            ema / expected_nanos * 100.0
        } else {
            0.0
        };

        PerformanceSnapshot {
            callback_count,
            frames_processed,
            bytes_submitted: self.bytes_submitted.load(Ordering::Relaxed),
            underrun_count: self.underrun_count.load(Ordering::Relaxed),
            rejected_count: self.rejected_count.load(Ordering::Relaxed),
            min_callback_nanos: (min_raw != u64::MAX).then_some(min_raw),
            max_callback_nanos: (callback_count > 0).then_some(max_raw),
            ema_callback_nanos: ema,
            avg_load_percent,
        }
    }
}

/// Records the callback's elapsed time on drop.
pub struct RealtimeGuard<'a> {
    monitor: &'a PerformanceMonitor,
    start: QuantaInstant,
}

impl Drop for RealtimeGuard<'_> {
    fn drop(&mut self) {
        let elapsed = self.monitor.clock.now().saturating_duration_since(self.start);
        self.monitor.record_callback_duration(elapsed);
    }
}
