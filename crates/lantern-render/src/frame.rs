/// Identifies one frame-in-flight slot. Doubles as a debug label: slot 0 is
/// `A`, slot 1 is `B` and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLabel(pub usize);

impl FrameLabel {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }

    pub fn name(self) -> char {
        (b'A' + self.0 as u8) as char
    }
}

impl std::fmt::Display for FrameLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Tracks which of the N frame slots is current, and a monotonically
/// increasing frame id for diagnostics.
///
/// Exactly one slot is current at any time. The slot advances only after a
/// successful present; a stale acquire or present leaves it where it was so
/// the retried frame reuses the same synchronization objects.
pub struct FrameCounter {
    frames_in_flight: usize,
    slot: usize,
    frame_id: u64,
}

impl FrameCounter {
    pub fn new(frames_in_flight: usize) -> Self {
        assert!(frames_in_flight >= 1);
        Self {
            frames_in_flight,
            slot: 0,
            frame_id: 0,
        }
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    #[inline]
    pub fn current(&self) -> FrameLabel {
        FrameLabel(self.slot)
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// Called after a successful present only.
    pub fn advance(&mut self) {
        self.slot = (self.slot + 1) % self.frames_in_flight;
        self.frame_id += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slots_rotate_modulo_n() {
        let mut counter = FrameCounter::new(3);
        let seen: Vec<usize> = (0..7)
            .map(|_| {
                let slot = counter.current().index();
                counter.advance();
                slot
            })
            .collect();
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(counter.frame_id(), 7);
    }

    #[test]
    fn single_slot_never_moves() {
        let mut counter = FrameCounter::new(1);
        counter.advance();
        counter.advance();
        assert_eq!(counter.current().index(), 0);
        assert_eq!(counter.frame_id(), 2);
    }

    #[test]
    fn labels_read_as_letters() {
        assert_eq!(FrameLabel(0).name(), 'A');
        assert_eq!(FrameLabel(2).name(), 'C');
        assert_eq!(format!("{}", FrameLabel(1)), "B");
    }
}
