//! Event loop integration
//!
//! Wraps calloop for the server's single-threaded dispatch. The wrapper is
//! generic over the dispatch state so the server can thread itself through
//! every event source, and `dispatch` takes an explicit timeout so the
//! caller can bound a turn by the transaction deadline.

use std::time::Duration;

use calloop::{EventLoop as CalLoop, LoopHandle, LoopSignal};
use log::debug;

/// Event loop wrapper
pub struct EventLoop<T: 'static> {
    /// Calloop event loop
    event_loop: CalLoop<'static, T>,
    /// Loop signal for waking/stopping
    signal: LoopSignal,
}

impl<T> EventLoop<T> {
    /// Create a new event loop
    pub fn new() -> anyhow::Result<Self> {
        let event_loop = CalLoop::try_new()?;
        let signal = event_loop.get_signal();

        Ok(Self { event_loop, signal })
    }

    /// Get a handle to register event sources
    pub fn handle(&self) -> LoopHandle<'static, T> {
        self.event_loop.handle()
    }

    /// Get the loop signal for waking
    pub fn signal(&self) -> LoopSignal {
        self.signal.clone()
    }

    /// Run one iteration of the event loop
    ///
    /// Returns after the timeout even if no source fired.
    pub fn dispatch(&mut self, timeout: Option<Duration>, state: &mut T) -> anyhow::Result<()> {
        self.event_loop.dispatch(timeout, state)?;
        Ok(())
    }

    /// Stop the event loop
    pub fn stop(&self) {
        debug!("Stopping event loop");
        self.signal.stop();
    }

    /// Wake the event loop
    pub fn wake(&self) {
        self.signal.wakeup();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_loop_new() {
        let event_loop = EventLoop::<()>::new();
        assert!(event_loop.is_ok());
    }

    #[test]
    fn test_event_loop_dispatch() {
        let mut event_loop = EventLoop::<u32>::new().unwrap();
        let mut state = 0u32;
        // Dispatch with zero timeout should return immediately
        let result = event_loop.dispatch(Some(Duration::ZERO), &mut state);
        assert!(result.is_ok());
    }
}
