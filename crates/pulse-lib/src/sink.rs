//! Narrow interfaces to the collaborators around the detection core.

use crate::record::MeasurementRecord;
use anyhow::Result;
use crossbeam_channel::Receiver;
use log::debug;

/// Monochrome frame buffer the presenter draws into.
pub trait DisplaySink {
    fn clear(&mut self);
    fn draw_text(&mut self, text: &str, x: i32, y: i32);
    fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32);
    fn present(&mut self);
}

/// Source of the single logical event the core consumes: "stop requested".
pub trait ControlInput {
    fn stop_requested(&mut self) -> bool;
}

/// Receives finished measurements (history file, publish topic, ...).
pub trait MeasurementSink {
    fn name(&self) -> &str;
    fn submit(&mut self, record: &MeasurementRecord) -> Result<()>;
}

impl ControlInput for Receiver<()> {
    fn stop_requested(&mut self) -> bool {
        self.try_recv().is_ok()
    }
}

/// Turns a level-sampled, active-low momentary button into a stop request
/// on the press → release edge.
pub struct ButtonRelease<F> {
    read_level: F,
    pressed: bool,
}

impl<F: FnMut() -> bool> ButtonRelease<F> {
    /// `read_level` returns the raw pin level; `false` means pressed.
    pub fn new(read_level: F) -> Self {
        Self {
            read_level,
            pressed: false,
        }
    }
}

impl<F: FnMut() -> bool> ControlInput for ButtonRelease<F> {
    fn stop_requested(&mut self) -> bool {
        let level = (self.read_level)();
        if !level {
            self.pressed = true;
            false
        } else if self.pressed {
            self.pressed = false;
            true
        } else {
            false
        }
    }
}

/// Never requests a stop; sessions end on their deadline.
pub struct NoInput;

impl ControlInput for NoInput {
    fn stop_requested(&mut self) -> bool {
        false
    }
}

/// Display that writes each frame's text to the log.
#[derive(Default)]
pub struct LogDisplay {
    text: Vec<String>,
    lines: usize,
    frames: u64,
}

impl LogDisplay {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl DisplaySink for LogDisplay {
    fn clear(&mut self) {
        self.text.clear();
        self.lines = 0;
    }

    fn draw_text(&mut self, text: &str, _x: i32, _y: i32) {
        self.text.push(text.to_string());
    }

    fn draw_line(&mut self, _x0: i32, _y0: i32, _x1: i32, _y1: i32) {
        self.lines += 1;
    }

    fn present(&mut self) {
        self.frames += 1;
        debug!(
            "frame {}: {} ({} segments)",
            self.frames,
            self.text.join(" | "),
            self.lines
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn button_fires_on_release_only() {
        let levels = [true, false, false, true, true, false, true];
        let mut idx = 0;
        let mut button = ButtonRelease::new(move || {
            let level = levels[idx];
            idx += 1;
            level
        });
        let fired: Vec<bool> = (0..levels.len()).map(|_| button.stop_requested()).collect();
        assert_eq!(fired, vec![false, false, false, true, false, false, true]);
    }

    #[test]
    fn channel_is_a_control_input() {
        let (tx, mut rx) = bounded(1);
        assert!(!rx.stop_requested());
        tx.send(()).unwrap();
        assert!(rx.stop_requested());
        assert!(!rx.stop_requested());
    }
}
