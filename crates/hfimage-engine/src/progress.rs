/// Turns received byte counts into download percentages.
///
/// Percentages never regress, and 100 is only reported once the whole
/// declared length has arrived.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressTracker {
    declared: u64,
    received: u64,
    last: u8,
}

impl ProgressTracker {
    pub fn new(declared: u64) -> Self {
        Self {
            declared,
            received: 0,
            last: 0,
        }
    }

    pub fn declared(&self) -> u64 {
        self.declared
    }

    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn is_complete(&self) -> bool {
        self.received >= self.declared
    }

    pub fn advance(&mut self, chunk_len: usize) -> u8 {
        self.received = self.received.saturating_add(chunk_len as u64);
        let percent = if self.is_complete() {
            100
        } else {
            let scaled = (u128::from(self.received) * 100 + u128::from(self.declared) / 2)
                / u128::from(self.declared.max(1));
            scaled.min(99) as u8
        };
        self.last = self.last.max(percent);
        self.last
    }
}
