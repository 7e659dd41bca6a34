pub mod mouse;

use anyhow::Result;

/// Relative pointer motion in whole pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointerDelta {
    pub dx: i32,
    pub dy: i32,
}

impl PointerDelta {
    pub fn new(dx: i32, dy: i32) -> Self {
        Self { dx, dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// Destination for pointer motion, e.g. a virtual mouse device.
///
/// Emission is fire-and-forget; there is no acknowledgment channel.
pub trait PointerSink: Send {
    fn emit(&mut self, delta: PointerDelta) -> Result<()>;
}

/// Sink that only logs and accumulates the emitted motion.
#[derive(Debug, Default)]
pub struct LogSink {
    /// Sum of every emitted delta.
    pub total: (i64, i64),
    pub emitted: u64,
}

impl PointerSink for LogSink {
    fn emit(&mut self, delta: PointerDelta) -> Result<()> {
        self.total.0 += i64::from(delta.dx);
        self.total.1 += i64::from(delta.dy);
        self.emitted += 1;
        tracing::debug!(dx = delta.dx, dy = delta.dy, "Pointer move");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sink_accumulates() {
        let mut sink = LogSink::default();
        sink.emit(PointerDelta::new(3, -1)).unwrap();
        sink.emit(PointerDelta::new(-5, 4)).unwrap();
        assert_eq!(sink.total, (-2, 3));
        assert_eq!(sink.emitted, 2);
    }
}
