//! # Heartbeat Overlay
//!
//! Wraps any poster with an idle keep-alive: when neither an outgoing post
//! nor an inbound data frame has been seen within the timeout, a zero-filled
//! instance of a named schema message is posted. The timer itself belongs to
//! the host; it calls [`Heartbeat::tick_at`] at whatever cadence it likes
//! (half the timeout matches the reference setup).
//!
//! All state transitions take an explicit `Instant`, so tests drive the
//! clock; the `_now` convenience wrappers use the wall clock.

use crate::bridge::{Bridge, Frame};
use crate::scheme::Scheme;
use eyre::{eyre, Result};
use std::time::{Duration, Instant};
use tracing::debug;

/// Anything frames can be posted into.
pub trait Poster {
    fn post(&mut self, frame: &Frame) -> Result<()>;
}

impl Poster for Bridge {
    fn post(&mut self, frame: &Frame) -> Result<()> {
        Bridge::post(self, frame)
    }
}

pub struct Heartbeat<P> {
    inner: P,
    timeout: Duration,
    last: Instant,
    template: Frame,
}

impl<P: Poster> Heartbeat<P> {
    /// Resolves the keep-alive message in the scheme and arms the timer.
    pub fn new(
        inner: P,
        timeout: Duration,
        message: &str,
        scheme: &Scheme,
        now: Instant,
    ) -> Result<Self> {
        let message = scheme
            .lookup_name(message)
            .ok_or_else(|| eyre!("message {} not found in the scheme", message))?;
        let template = Frame::data(message.id(), 0, vec![0u8; message.size()]);
        Ok(Self {
            inner,
            timeout,
            last: now,
            template,
        })
    }

    /// Posts through to the wrapped channel, resetting the idle timer.
    pub fn post_at(&mut self, frame: &Frame, now: Instant) -> Result<()> {
        self.last = now;
        self.inner.post(frame)
    }

    pub fn post(&mut self, frame: &Frame) -> Result<()> {
        self.post_at(frame, Instant::now())
    }

    /// Inbound data also counts as traffic.
    pub fn on_data_at(&mut self, now: Instant) {
        self.last = now;
    }

    pub fn on_data(&mut self) {
        self.on_data_at(Instant::now());
    }

    /// Timer callback: posts the keep-alive when the channel has been idle
    /// for the full timeout. Returns true when a heartbeat was sent.
    pub fn tick_at(&mut self, now: Instant) -> Result<bool> {
        if now < self.last + self.timeout {
            return Ok(false);
        }
        self.last = now;
        debug!(msgid = self.template.msgid, "posting heartbeat");
        self.inner.post(&self.template)?;
        Ok(true)
    }

    pub fn tick(&mut self) -> Result<bool> {
        self.tick_at(Instant::now())
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut P {
        &mut self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{Field, FieldType, Message, Scheme};

    struct Sink(Vec<Frame>);

    impl Poster for Sink {
        fn post(&mut self, frame: &Frame) -> Result<()> {
            self.0.push(frame.clone());
            Ok(())
        }
    }

    fn scheme() -> Scheme {
        let msg = Message::builder("Data", 10)
            .field(Field::scalar("f0", FieldType::Int8))
            .build()
            .unwrap();
        Scheme::new(vec![msg]).unwrap()
    }

    #[test]
    fn idle_channel_heartbeats_once_per_timeout() {
        let t0 = Instant::now();
        let scheme = scheme();
        let mut hb =
            Heartbeat::new(Sink(Vec::new()), Duration::from_millis(50), "Data", &scheme, t0)
                .unwrap();

        assert!(!hb.tick_at(t0 + Duration::from_millis(25)).unwrap());
        assert!(hb.tick_at(t0 + Duration::from_millis(50)).unwrap());
        // The send itself reset the timer.
        assert!(!hb.tick_at(t0 + Duration::from_millis(75)).unwrap());

        let frames = &hb.inner().0;
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].msgid, 10);
        assert_eq!(frames[0].data, vec![0u8; 1], "heartbeat SHOULD be zero-filled");
    }

    #[test]
    fn outgoing_posts_suppress_the_heartbeat() {
        let t0 = Instant::now();
        let scheme = scheme();
        let mut hb =
            Heartbeat::new(Sink(Vec::new()), Duration::from_millis(50), "Data", &scheme, t0)
                .unwrap();

        let frame = Frame::data(10, 0, vec![7]);
        for i in 1..=4 {
            hb.post_at(&frame, t0 + Duration::from_millis(25 * i)).unwrap();
            assert!(!hb
                .tick_at(t0 + Duration::from_millis(25 * i + 10))
                .unwrap());
        }
        assert_eq!(hb.inner().0.len(), 4, "only the explicit posts went out");
    }

    #[test]
    fn inbound_data_suppresses_the_heartbeat() {
        let t0 = Instant::now();
        let scheme = scheme();
        let mut hb =
            Heartbeat::new(Sink(Vec::new()), Duration::from_millis(50), "Data", &scheme, t0)
                .unwrap();

        hb.on_data_at(t0 + Duration::from_millis(40));
        assert!(!hb.tick_at(t0 + Duration::from_millis(60)).unwrap());
        assert!(hb.tick_at(t0 + Duration::from_millis(90)).unwrap());
    }

    #[test]
    fn unknown_message_fails_construction() {
        let scheme = scheme();
        let err = Heartbeat::new(
            Sink(Vec::new()),
            Duration::from_millis(50),
            "Nope",
            &scheme,
            Instant::now(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("not found"));
    }
}
