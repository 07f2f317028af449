use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Single-producer / single-consumer ring of stereo `i16` frames.
///
/// The sound unit pushes from the emulation thread; an audio callback pops on
/// another thread. Each frame is packed into one `AtomicU32` slot so neither
/// side needs a lock. The queue is lossy: pushing into a full queue drops the
/// new frame and reports it.
pub fn audio_queue(capacity_frames: usize) -> (AudioProducer, AudioConsumer) {
    // One spare slot keeps head == tail unambiguous.
    let slots = capacity_frames.saturating_add(1).max(2);
    let ring = Arc::new(Ring {
        slots: (0..slots).map(|_| AtomicU32::new(0)).collect(),
        head: AtomicUsize::new(0),
        tail: AtomicUsize::new(0),
    });
    (
        AudioProducer {
            ring: Arc::clone(&ring),
        },
        AudioConsumer { ring },
    )
}

struct Ring {
    slots: Box<[AtomicU32]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

impl Ring {
    fn advance(&self, idx: usize) -> usize {
        if idx + 1 == self.slots.len() { 0 } else { idx + 1 }
    }

    fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        (head + self.slots.len() - tail) % self.slots.len()
    }
}

fn pack(left: i16, right: i16) -> u32 {
    (u32::from(left as u16) << 16) | u32::from(right as u16)
}

fn unpack(v: u32) -> (i16, i16) {
    ((v >> 16) as u16 as i16, v as u16 as i16)
}

/// Writing half, owned by the sound unit.
pub struct AudioProducer {
    ring: Arc<Ring>,
}

impl AudioProducer {
    /// Returns `false` if the queue was full and the frame was dropped.
    #[inline]
    pub fn push_stereo(&self, left: i16, right: i16) -> bool {
        let head = self.ring.head.load(Ordering::Relaxed);
        let next = self.ring.advance(head);
        if next == self.ring.tail.load(Ordering::Acquire) {
            return false;
        }
        self.ring.slots[head].store(pack(left, right), Ordering::Relaxed);
        self.ring.head.store(next, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity_frames(&self) -> usize {
        self.ring.slots.len() - 1
    }
}

/// Reading half, handed to the host's audio sink.
pub struct AudioConsumer {
    ring: Arc<Ring>,
}

impl AudioConsumer {
    #[inline]
    pub fn pop_stereo(&self) -> Option<(i16, i16)> {
        let tail = self.ring.tail.load(Ordering::Relaxed);
        if tail == self.ring.head.load(Ordering::Acquire) {
            return None;
        }
        let frame = unpack(self.ring.slots[tail].load(Ordering::Relaxed));
        self.ring.tail.store(self.ring.advance(tail), Ordering::Release);
        Some(frame)
    }

    /// Fill `out` with interleaved left/right samples; returns frames written.
    pub fn pop_interleaved(&self, out: &mut [i16]) -> usize {
        let mut frames = 0;
        for pair in out.chunks_exact_mut(2) {
            let Some((l, r)) = self.pop_stereo() else {
                break;
            };
            pair[0] = l;
            pair[1] = r;
            frames += 1;
        }
        frames
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity_frames(&self) -> usize {
        self.ring.slots.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_queue_drops_newest() {
        let (tx, rx) = audio_queue(2);
        assert!(tx.push_stereo(1, -1));
        assert!(tx.push_stereo(2, -2));
        assert!(!tx.push_stereo(3, -3));
        assert_eq!(rx.len(), 2);
        assert_eq!(rx.pop_stereo(), Some((1, -1)));
        assert_eq!(rx.pop_stereo(), Some((2, -2)));
        assert_eq!(rx.pop_stereo(), None);
    }

    #[test]
    fn wraps_around_the_ring() {
        let (tx, rx) = audio_queue(3);
        for i in 0..10i16 {
            assert!(tx.push_stereo(i, i16::MIN + i));
            assert_eq!(rx.pop_stereo(), Some((i, i16::MIN + i)));
        }
        assert!(rx.is_empty());
    }

    #[test]
    fn pop_interleaved_stops_when_empty() {
        let (tx, rx) = audio_queue(8);
        tx.push_stereo(10, 20);
        tx.push_stereo(30, 40);
        let mut out = [0i16; 8];
        assert_eq!(rx.pop_interleaved(&mut out), 2);
        assert_eq!(&out[..4], &[10, 20, 30, 40]);
    }

    #[test]
    fn crosses_threads() {
        let (tx, rx) = audio_queue(64);
        let handle = std::thread::spawn(move || {
            let mut sent = 0i16;
            while sent < 1000 {
                if tx.push_stereo(sent, -sent) {
                    sent += 1;
                }
            }
        });
        let mut expected = 0i16;
        while expected < 1000 {
            if let Some((l, r)) = rx.pop_stereo() {
                assert_eq!((l, r), (expected, -expected));
                expected += 1;
            }
        }
        handle.join().unwrap();
    }
}
