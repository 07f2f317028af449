use std::sync::{Arc, Mutex, PoisonError};

pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// One finished 160x144 picture.
///
/// On DMG each value is a shade index 0..=3 after palette mapping (0 is the
/// lightest). On CGB each value is a 15-bit BGR colour as stored in palette
/// RAM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pixels: Box<[u16]>,
    number: u64,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            pixels: vec![0; SCREEN_WIDTH * SCREEN_HEIGHT].into_boxed_slice(),
            number: 0,
        }
    }
}

impl Frame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pixels(&self) -> &[u16] {
        &self.pixels
    }

    pub fn pixel(&self, x: usize, y: usize) -> u16 {
        self.pixels[y * SCREEN_WIDTH + x]
    }

    pub fn row(&self, y: usize) -> &[u16] {
        &self.pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
    }

    pub(crate) fn row_mut(&mut self, y: usize) -> &mut [u16] {
        &mut self.pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
    }

    pub(crate) fn fill(&mut self, value: u16) {
        self.pixels.fill(value);
    }

    /// Count of frames completed before this one since power-on.
    pub fn number(&self) -> u64 {
        self.number
    }

    pub(crate) fn set_number(&mut self, number: u64) {
        self.number = number;
    }

    fn copy_from(&mut self, other: &Frame) {
        self.pixels.copy_from_slice(&other.pixels);
        self.number = other.number;
    }
}

struct Slot {
    frame: Frame,
    fresh: bool,
}

/// Create a latest-frame mailbox between the emulation thread and a
/// presentation thread. Publishing replaces any frame not yet taken.
pub fn frame_channel() -> (FramePublisher, FrameReceiver) {
    let slot = Arc::new(Mutex::new(Slot {
        frame: Frame::new(),
        fresh: false,
    }));
    (
        FramePublisher {
            slot: Arc::clone(&slot),
        },
        FrameReceiver { slot },
    )
}

pub struct FramePublisher {
    slot: Arc<Mutex<Slot>>,
}

impl FramePublisher {
    pub fn publish(&self, frame: &Frame) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.frame.copy_from(frame);
        slot.fresh = true;
    }
}

pub struct FrameReceiver {
    slot: Arc<Mutex<Slot>>,
}

impl FrameReceiver {
    /// Copy the newest unseen frame into `out`. Returns `false` when nothing
    /// new has been published since the last call.
    pub fn take_latest(&self, out: &mut Frame) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if !slot.fresh {
            return false;
        }
        out.copy_from(&slot.frame);
        slot.fresh = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_sees_only_the_newest_frame() {
        let (tx, rx) = frame_channel();
        let mut out = Frame::new();
        assert!(!rx.take_latest(&mut out));

        let mut f = Frame::new();
        f.fill(1);
        f.set_number(1);
        tx.publish(&f);
        f.fill(2);
        f.set_number(2);
        tx.publish(&f);

        assert!(rx.take_latest(&mut out));
        assert_eq!(out.number(), 2);
        assert!(out.pixels().iter().all(|&p| p == 2));
        assert!(!rx.take_latest(&mut out));
    }

    #[test]
    fn rows_are_contiguous() {
        let mut f = Frame::new();
        f.row_mut(3)[5] = 7;
        assert_eq!(f.pixel(5, 3), 7);
        assert_eq!(f.row(3)[5], 7);
    }
}
