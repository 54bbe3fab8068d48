use std::time::Duration;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use log::{debug, warn};
use tokio::spawn;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::device::events::EventBus;
use crate::device::types::{DeviceEvent, Gesture, GestureEvent};

/// Running sum of rotation deltas inside the current throttle window.
#[derive(Debug, Clone, Default)]
pub struct ThrottleAccumulator {
    sum: i32,
    deadline: Option<Instant>,
}

impl ThrottleAccumulator {
    pub fn new() -> Self {
        ThrottleAccumulator::default()
    }

    /// Feeds one gesture into the accumulator. Rotations are accumulated (the first one arms
    /// the window, later ones never move the deadline); any other gesture is handed back for
    /// immediate forwarding.
    pub fn push(&mut self, event: GestureEvent, now: Instant, period: Duration) -> Option<GestureEvent> {
        if !event.is_rotation() {
            return Some(event);
        }

        if self.deadline.is_none() {
            self.deadline = Some(now + period);
        }
        self.sum = self.sum.saturating_add(event.value);
        None
    }

    /// Emits the accumulated rotation if the window has expired.
    pub fn poll(&mut self, now: Instant) -> Option<GestureEvent> {
        match self.deadline {
            Some(deadline) if deadline <= now => {
                let event = GestureEvent::new(Gesture::Rotate, self.sum);
                self.reset();
                Some(event)
            },
            _ => None,
        }
    }

    /// Emits the accumulated rotation right away if a window is open.
    pub fn flush(&mut self) -> Option<GestureEvent> {
        if !self.is_armed() {
            return None;
        }

        let event = GestureEvent::new(Gesture::Rotate, self.sum);
        self.reset();
        Some(event)
    }

    pub fn reset(&mut self) {
        self.sum = 0;
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn sum(&self) -> i32 {
        self.sum
    }
}

#[derive(Debug)]
enum ThrottleCommand {
    Gesture(GestureEvent),
    SetPeriod(Duration),
    Flush,
}

/// Coalesces rotation gestures into one [`DeviceEvent::ThrottledGesture`] per throttle period.
/// Every other gesture is published as a throttled gesture right away.
pub struct RotationThrottle {
    sender: UnboundedSender<ThrottleCommand>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RotationThrottle {
    pub fn spawn(cancel: CancellationToken, period: Duration, bus: EventBus) -> Self {
        let (sender, mut receiver) = unbounded::<ThrottleCommand>();
        let task_cancel = cancel.clone();

        let handle = spawn(async move {
            let mut accumulator = ThrottleAccumulator::new();
            let mut period = period;

            'mainloop: loop {
                let deadline = accumulator.deadline();

                tokio::select! {
                    _ = task_cancel.cancelled() => {
                        break 'mainloop;
                    },
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        if let Some(event) = accumulator.poll(Instant::now()) {
                            bus.publish(DeviceEvent::ThrottledGesture(event));
                        }
                    },
                    command = receiver.next() => match command {
                        Some(ThrottleCommand::Gesture(event)) => {
                            if let Some(event) = accumulator.push(event, Instant::now(), period) {
                                bus.publish(DeviceEvent::ThrottledGesture(event));
                            }
                        },
                        Some(ThrottleCommand::SetPeriod(new_period)) => {
                            debug!("Throttle period set to {:?}", new_period);
                            period = new_period;
                        },
                        Some(ThrottleCommand::Flush) => {
                            if let Some(event) = accumulator.flush() {
                                bus.publish(DeviceEvent::ThrottledGesture(event));
                            }
                        },
                        None => break 'mainloop,
                    },
                }
            }
        });

        RotationThrottle { sender, cancel, handle }
    }

    pub fn push(&self, event: GestureEvent) {
        self.send(ThrottleCommand::Gesture(event));
    }

    /// Applies to the next window; an armed window keeps its deadline.
    pub fn set_period(&self, period: Duration) {
        self.send(ThrottleCommand::SetPeriod(period));
    }

    /// Closes a pending window early, emitting its sum.
    pub fn flush(&self) {
        self.send(ThrottleCommand::Flush);
    }

    fn send(&self, command: ThrottleCommand) {
        if let Err(err) = self.sender.unbounded_send(command) {
            warn!("Throttle task is not running: {:?}", err.into_inner());
        }
    }

    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(err) = self.handle.await {
            warn!("Failed to join throttle task: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::channel::mpsc::UnboundedReceiver;
    use tokio::time::{advance, timeout};

    const PERIOD: Duration = Duration::from_millis(700);

    fn rotate(value: i32) -> GestureEvent {
        GestureEvent::new(Gesture::Rotate, value)
    }

    async fn next_throttled(receiver: &mut UnboundedReceiver<DeviceEvent>) -> GestureEvent {
        match receiver.next().await {
            Some(DeviceEvent::ThrottledGesture(event)) => event,
            other => panic!("Expected a throttled gesture, got {:?}", other),
        }
    }

    #[test]
    fn test_accumulator_window() {
        let start = Instant::now();
        let mut accumulator = ThrottleAccumulator::new();

        assert!(accumulator.push(rotate(3), start, PERIOD).is_none());
        assert!(accumulator.push(rotate(2), start + Duration::from_millis(300), PERIOD).is_none());
        assert!(accumulator.push(rotate(-1), start + Duration::from_millis(600), PERIOD).is_none());
        assert_eq!(accumulator.deadline(), Some(start + PERIOD));
        assert_eq!(accumulator.sum(), 4);

        assert!(accumulator.poll(start + Duration::from_millis(699)).is_none());
        assert_eq!(accumulator.poll(start + PERIOD), Some(rotate(4)));
        assert!(!accumulator.is_armed());
        assert_eq!(accumulator.sum(), 0);
        assert!(accumulator.poll(start + PERIOD * 2).is_none());
    }

    #[test]
    fn test_accumulator_flush() {
        let start = Instant::now();
        let mut accumulator = ThrottleAccumulator::new();
        assert!(accumulator.flush().is_none());

        accumulator.push(rotate(5), start, PERIOD);
        assert_eq!(accumulator.flush(), Some(rotate(5)));
        assert!(!accumulator.is_armed());
        assert!(accumulator.poll(start + PERIOD).is_none());
    }

    #[test]
    fn test_accumulator_passes_other_gestures() {
        let start = Instant::now();
        let mut accumulator = ThrottleAccumulator::new();
        let press = GestureEvent::new(Gesture::ButtonPress, 1);

        accumulator.push(rotate(5), start, PERIOD);
        assert_eq!(accumulator.push(press, start, PERIOD), Some(press));
        assert_eq!(accumulator.sum(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotations_are_coalesced() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let throttle = RotationThrottle::spawn(CancellationToken::new(), PERIOD, bus.clone());

        throttle.push(rotate(3));
        throttle.push(rotate(2));
        throttle.push(rotate(-1));

        assert!(timeout(Duration::from_millis(650), receiver.next()).await.is_err());
        assert_eq!(next_throttled(&mut receiver).await, rotate(4));

        // the next rotation opens a new window
        throttle.push(rotate(7));
        assert!(timeout(Duration::from_millis(650), receiver.next()).await.is_err());
        assert_eq!(next_throttled(&mut receiver).await, rotate(7));

        throttle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_gestures_bypass_the_window() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let throttle = RotationThrottle::spawn(CancellationToken::new(), PERIOD, bus.clone());
        let swipe = GestureEvent::new(Gesture::SwipeLeft, 0);

        throttle.push(rotate(3));
        throttle.push(swipe);
        throttle.push(rotate(2));

        assert_eq!(next_throttled(&mut receiver).await, swipe);
        let started = Instant::now();
        assert_eq!(next_throttled(&mut receiver).await, rotate(5));
        assert!(Instant::now() - started <= PERIOD);
        assert!(timeout(Duration::from_secs(5), receiver.next()).await.is_err());

        throttle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_emits_pending_window() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();
        let throttle = RotationThrottle::spawn(CancellationToken::new(), PERIOD, bus.clone());

        throttle.push(rotate(3));
        throttle.push(rotate(2));
        throttle.flush();
        let started = Instant::now();
        assert_eq!(next_throttled(&mut receiver).await, rotate(5));
        assert!(Instant::now() - started < PERIOD);

        // nothing left for the timer, and flushing an empty window emits nothing
        throttle.flush();
        advance(Duration::from_millis(10)).await;
        assert!(timeout(Duration::from_secs(2), receiver.next()).await.is_err());

        throttle.set_period(Duration::from_millis(100));
        throttle.push(rotate(1));
        assert!(timeout(Duration::from_millis(90), receiver.next()).await.is_err());
        assert_eq!(next_throttled(&mut receiver).await, rotate(1));

        throttle.stop().await;
    }
}
