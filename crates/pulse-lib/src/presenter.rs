use crate::{
    buffer::RingBuffer,
    session::{LiveSnapshot, SessionMode, StopHandle, StopReason},
    sink::{ControlInput, DisplaySink},
};
use log::debug;
use std::time::Duration;

pub const DEFAULT_FRAME_PERIOD: Duration = Duration::from_millis(40);
/// Points kept in the scrolling waveform.
pub const WAVE_POINTS: usize = 64;
const WAVE_REST_Y: i32 = 32;
const WAVE_BOTTOM_Y: f64 = 60.0;
const WAVE_HEIGHT: f64 = 52.0;
const BAR_Y: i32 = 60;
const BAR_HEIGHT: i32 = 3;
const BAR_WIDTH: f64 = 127.0;
const READY_X: i32 = 87;

/// Per-frame renderer and stop-input poller for a running session.
pub struct Presenter<D, C> {
    display: D,
    control: C,
    mode: SessionMode,
    deadline_ms: u64,
    frame_period: Duration,
    wave: RingBuffer<i32>,
    frames: u64,
}

impl<D: DisplaySink, C: ControlInput> Presenter<D, C> {
    pub fn new(display: D, control: C, mode: SessionMode, deadline_ms: u64) -> Self {
        let mut wave = RingBuffer::new(WAVE_POINTS);
        for _ in 0..WAVE_POINTS {
            wave.put(WAVE_REST_Y);
        }
        Self {
            display,
            control,
            mode,
            deadline_ms: deadline_ms.max(1),
            frame_period: DEFAULT_FRAME_PERIOD,
            wave,
            frames: 0,
        }
    }

    pub fn with_frame_period(mut self, period: Duration) -> Self {
        self.frame_period = period;
        self
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn into_display(self) -> D {
        self.display
    }

    fn progress(&self, snapshot: &LiveSnapshot) -> f64 {
        (snapshot.elapsed_ms as f64 / self.deadline_ms as f64).min(1.0)
    }

    fn ready(&self, snapshot: &LiveSnapshot) -> bool {
        self.mode.is_timed() && snapshot.elapsed_ms >= self.deadline_ms
    }

    /// Draw one frame. Returns `false` and draws nothing until the detector
    /// has published a smoothed sample.
    pub fn render(&mut self, snapshot: &LiveSnapshot) -> bool {
        let Some(smoothed) = snapshot.smoothed else {
            return false;
        };
        self.display.clear();
        if self.ready(snapshot) {
            self.display.draw_text("READY", READY_X, 0);
        }
        let bpm = snapshot.bpm.unwrap_or(0);
        self.display.draw_text(&format!("BPM:{bpm}"), 0, 0);

        let y = (WAVE_BOTTOM_Y - WAVE_HEIGHT * smoothed) as i32;
        self.wave.put(y);
        let mut previous: Option<(i32, i32)> = None;
        for (i, y) in self.wave.iter().enumerate() {
            let x = i as i32 * 2;
            if let Some((px, py)) = previous {
                self.display.draw_line(px, py, x, y);
            }
            previous = Some((x, y));
        }

        if self.mode.is_timed() {
            let width = (BAR_WIDTH * self.progress(snapshot)) as i32;
            if width > 0 {
                for row in 0..BAR_HEIGHT {
                    self.display.draw_line(0, BAR_Y + row, width - 1, BAR_Y + row);
                }
            }
        }
        self.display.present();
        self.frames += 1;
        true
    }

    /// Render until the session stops. Each frame polls the control input and,
    /// in timed modes, the recording deadline; either stops the session.
    pub fn run(&mut self, session: &StopHandle) -> StopReason {
        loop {
            let snapshot = session.live().snapshot();
            if !snapshot.running {
                let reason = session.reason().unwrap_or(StopReason::Requested);
                debug!("presenter exiting after {} frames ({reason:?})", self.frames);
                return reason;
            }
            self.render(&snapshot);
            // The deadline wins over a press in the same frame.
            if self.ready(&snapshot) {
                session.stop(StopReason::Deadline);
            } else if self.control.stop_requested() {
                session.stop(StopReason::Requested);
            }
            std::thread::sleep(self.frame_period);
        }
    }
}
