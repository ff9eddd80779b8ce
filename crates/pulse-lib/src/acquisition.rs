use crate::error::AcquisitionError;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Default sensor sampling frequency (Hz).
pub const DEFAULT_SAMPLE_RATE_HZ: f64 = 250.0;
/// Default depth of the sample queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// Analog-to-digital converter read once per sample tick.
pub trait Adc: Send + 'static {
    fn read_u16(&mut self) -> u16;
}

impl<F> Adc for F
where
    F: FnMut() -> u16 + Send + 'static,
{
    fn read_u16(&mut self) -> u16 {
        self()
    }
}

/// Reject a sampling rate that is zero, negative or not finite.
pub fn check_rate(sample_rate_hz: f64) -> Result<(), AcquisitionError> {
    if sample_rate_hz.is_finite() && sample_rate_hz > 0.0 {
        Ok(())
    } else {
        Err(AcquisitionError::InvalidRate(sample_rate_hz))
    }
}

/// Bounded producer/consumer queue between the sample clock and the
/// detection loop. Pushing never blocks: when the queue is full the new
/// sample is dropped and counted.
#[derive(Clone)]
pub struct SampleQueue {
    tx: Sender<u16>,
    rx: Receiver<u16>,
    dropped: Arc<AtomicU64>,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            tx,
            rx,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Non-blocking enqueue. Returns `false` if the sample was dropped.
    pub fn push(&self, sample: u16) -> bool {
        match self.tx.try_send(sample) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    pub fn try_pop(&self) -> Option<u16> {
        self.rx.try_recv().ok()
    }

    /// Wait up to `timeout` for the next sample.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<u16> {
        match self.rx.recv_timeout(timeout) {
            Ok(sample) => Some(sample),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Discard everything queued; returns how many samples were discarded.
    pub fn reset(&self) -> usize {
        self.rx.try_iter().count()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Periodic timer thread reading the ADC once per tick.
struct SampleTimer {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<Box<dyn Adc>>,
}

impl SampleTimer {
    fn spawn(
        mut adc: Box<dyn Adc>,
        queue: SampleQueue,
        period: Duration,
    ) -> Result<Self, AcquisitionError> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        let handle = std::thread::Builder::new()
            .name("pulse-sample-timer".into())
            .spawn(move || {
                let mut next = Instant::now() + period;
                while !stop_flag.load(Ordering::Acquire) {
                    let now = Instant::now();
                    if next > now {
                        std::thread::sleep(next - now);
                    }
                    queue.push(adc.read_u16());
                    next += period;
                }
                adc
            })?;
        Ok(Self { stop, handle })
    }

    fn deinit(self) -> Option<Box<dyn Adc>> {
        self.stop.store(true, Ordering::Release);
        self.handle.join().ok()
    }
}

/// Timer-driven acquisition of one ADC channel into a [`SampleQueue`].
pub struct SampleSource {
    queue: SampleQueue,
    period: Duration,
    sample_rate_hz: f64,
    adc: Option<Box<dyn Adc>>,
    timer: Option<SampleTimer>,
}

impl SampleSource {
    pub fn new<A: Adc>(
        adc: A,
        sample_rate_hz: f64,
        capacity: usize,
    ) -> Result<Self, AcquisitionError> {
        check_rate(sample_rate_hz)?;
        Ok(Self {
            queue: SampleQueue::new(capacity),
            period: Duration::from_secs_f64(1.0 / sample_rate_hz),
            sample_rate_hz,
            adc: Some(Box::new(adc)),
            timer: None,
        })
    }

    /// Start the sample clock.
    pub fn start(&mut self) -> Result<(), AcquisitionError> {
        if self.timer.is_some() {
            return Err(AcquisitionError::AlreadyRunning);
        }
        // A failed spawn drops the ADC along with the thread closure.
        let adc = self.adc.take().ok_or(AcquisitionError::NoAdc)?;
        let timer = SampleTimer::spawn(adc, self.queue.clone(), self.period)?;
        debug!("sample timer started at {:.1} Hz", self.sample_rate_hz);
        self.timer = Some(timer);
        Ok(())
    }

    /// Stop the sample clock and wait for the timer thread to exit. Calling
    /// this on a stopped source does nothing.
    pub fn stop(&mut self) {
        if let Some(timer) = self.timer.take() {
            match timer.deinit() {
                Some(adc) => self.adc = Some(adc),
                None => warn!("sample timer panicked; ADC lost"),
            }
            debug!("sample timer stopped");
        }
    }

    /// Discard queued samples so a new session starts clean.
    pub fn reset(&self) -> usize {
        self.queue.reset()
    }

    pub fn queue(&self) -> &SampleQueue {
        &self.queue
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_some()
    }

    pub fn sample_rate_hz(&self) -> f64 {
        self.sample_rate_hz
    }
}

impl Drop for SampleSource {
    fn drop(&mut self) {
        self.stop();
    }
}
