//! Background polling of one input device
//!
//! A session is either idle or running a single poll thread. The thread owns
//! the device, samples it on a fixed tick, publishes the normalized triple and
//! calls the handlers. `stop` cancels the loop and waits for it, and once it
//! returns no handler runs again.
//!
//! Handlers run on the poll thread while the callback gate is held, so they
//! must not call back into `stop` or `start` of the same session.

use crate::device::{DeviceOpener, InputDevice};
use crate::mapping::InputMapping;
use crate::normalizer::{detect_edges, normalize, AxisValues, ButtonEvent, ButtonStates};
use crate::{InputError, InputResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Called every tick with the latest normalized values
pub type ValueHandler = Arc<dyn Fn(AxisValues) + Send + Sync>;
/// Called once per button transition
pub type ButtonHandler = Arc<dyn Fn(ButtonEvent) + Send + Sync>;

/// Poll loop timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub tick_interval: Duration,
    /// How long `stop` waits for the loop, or a timed-out open, to exit
    pub join_timeout: Duration,
    /// How long `start` waits for the device to open
    pub open_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            join_timeout: Duration::from_secs(1),
            open_timeout: Duration::from_secs(1),
        }
    }
}

struct Running {
    cancel: Arc<AtomicBool>,
    gate: Arc<Mutex<bool>>,
    done: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
    device_name: String,
}

/// A poll thread whose device open timed out. It is cancelled and exits as
/// soon as the opener returns.
struct PendingOpen {
    done: mpsc::Receiver<()>,
    thread: JoinHandle<()>,
}

impl PendingOpen {
    /// Join the thread if it finishes within `wait`; otherwise hand it back
    fn reap(self, wait: Duration) -> Option<Self> {
        match self.done.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = self.thread.join();
                debug!("Reaped timed-out device open");
                None
            }
            Err(RecvTimeoutError::Timeout) => Some(self),
        }
    }
}

/// Shared state between the session handle and its poll thread
struct Shared {
    mapping: RwLock<InputMapping>,
    values: RwLock<AxisValues>,
}

pub struct InputPollingSession {
    config: PollConfig,
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
    pending_open: Mutex<Option<PendingOpen>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InputPollingSession {
    pub fn new(config: PollConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                mapping: RwLock::new(InputMapping::default()),
                values: RwLock::new(AxisValues::ZERO),
            }),
            running: Mutex::new(None),
            pending_open: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        lock(&self.running).is_some()
    }

    /// Name of the device being polled
    pub fn device_name(&self) -> Option<String> {
        lock(&self.running).as_ref().map(|r| r.device_name.clone())
    }

    /// Latest normalized values. Never waits for the poll loop.
    pub fn get_values(&self) -> AxisValues {
        *self
            .shared
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn mapping(&self) -> InputMapping {
        self.shared
            .mapping
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the mapping; a running loop picks it up on its next tick
    pub fn set_mapping(&self, mapping: InputMapping) {
        *self
            .shared
            .mapping
            .write()
            .unwrap_or_else(PoisonError::into_inner) = mapping.sanitized();
    }

    /// Open a device on a new poll thread and start ticking.
    ///
    /// Any running loop is stopped first. Fails while an earlier open that
    /// timed out is still blocked in its opener. Returns the device name.
    pub fn start(
        &self,
        opener: DeviceOpener,
        mapping: InputMapping,
        on_values: ValueHandler,
        on_button: ButtonHandler,
    ) -> InputResult<String> {
        let mut running = lock(&self.running);
        if let Some(previous) = running.take() {
            self.shutdown(previous);
        }
        if !self.reap_pending_open(self.config.join_timeout) {
            warn!("Earlier input device open is still blocked");
            return Err(InputError::DeviceUnavailable(
                "an earlier device open is still pending".into(),
            ));
        }
        self.set_mapping(mapping);

        let cancel = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Mutex::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<InputResult<String>>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let poll = PollLoop {
            shared: Arc::clone(&self.shared),
            cancel: Arc::clone(&cancel),
            gate: Arc::clone(&gate),
            tick: self.config.tick_interval,
            on_values,
            on_button,
        };
        let thread = thread::Builder::new()
            .name("gamepad-poll".into())
            .spawn(move || {
                let device = match opener() {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(device.name().to_string()));
                        device
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                poll.run(device);
                let _ = done_tx.send(());
            })?;

        match ready_rx.recv_timeout(self.config.open_timeout) {
            Ok(Ok(device_name)) => {
                info!("Polling {} every {:?}", device_name, self.config.tick_interval);
                *running = Some(Running {
                    cancel,
                    gate,
                    done: done_rx,
                    thread,
                    device_name: device_name.clone(),
                });
                Ok(device_name)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                warn!("Could not open input device: {}", e);
                Err(match e {
                    InputError::DeviceUnavailable(_) => e,
                    other => InputError::DeviceUnavailable(other.to_string()),
                })
            }
            Err(RecvTimeoutError::Timeout) => {
                cancel.store(true, Ordering::SeqCst);
                *lock(&gate) = false;
                *lock(&self.pending_open) = Some(PendingOpen {
                    done: done_rx,
                    thread,
                });
                warn!("Input device did not open within {:?}", self.config.open_timeout);
                Err(InputError::OpenTimeout(
                    self.config.open_timeout.as_millis() as u64,
                ))
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = thread.join();
                Err(InputError::Backend("poll thread exited during open".into()))
            }
        }
    }

    /// Stop the loop. No handler runs after this returns.
    pub fn stop(&self) {
        if let Some(running) = lock(&self.running).take() {
            self.shutdown(running);
        }
        self.reap_pending_open(self.config.join_timeout);
    }

    /// Join a timed-out open if it has finished. Returns `false` while it is
    /// still blocked.
    fn reap_pending_open(&self, wait: Duration) -> bool {
        let mut pending = lock(&self.pending_open);
        match pending.take() {
            Some(open) => {
                *pending = open.reap(wait);
                pending.is_none()
            }
            None => true,
        }
    }

    fn shutdown(&self, running: Running) {
        running.cancel.store(true, Ordering::SeqCst);
        // Waits out an in-flight callback
        *lock(&running.gate) = false;

        match running.done.recv_timeout(self.config.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                let _ = running.thread.join();
                info!("Stopped polling {}", running.device_name);
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Poll thread for {} did not exit within {:?}; detaching",
                    running.device_name, self.config.join_timeout
                );
            }
        }
    }
}

impl Default for InputPollingSession {
    fn default() -> Self {
        Self::new(PollConfig::default())
    }
}

impl Drop for InputPollingSession {
    fn drop(&mut self) {
        self.stop();
    }
}

struct PollLoop {
    shared: Arc<Shared>,
    cancel: Arc<AtomicBool>,
    gate: Arc<Mutex<bool>>,
    tick: Duration,
    on_values: ValueHandler,
    on_button: ButtonHandler,
}

impl PollLoop {
    fn run(self, mut device: Box<dyn InputDevice>) {
        let mut previous = ButtonStates::new();
        let mut connected = true;

        while !self.cancel.load(Ordering::SeqCst) {
            let available = device.pump();
            if available != connected {
                if available {
                    info!("{} is back", device.name());
                } else {
                    warn!("{} unavailable, reporting zeros", device.name());
                }
                connected = available;
            }

            let (values, events) = {
                let mapping = self
                    .shared
                    .mapping
                    .read()
                    .unwrap_or_else(PoisonError::into_inner);
                if available {
                    let values = normalize(|i| device.axis(i), &mapping);
                    let (events, next) =
                        detect_edges(|i| device.button(i), &mapping.buttons, &previous);
                    previous = next;
                    (values, events)
                } else {
                    (AxisValues::ZERO, Vec::new())
                }
            };

            *self
                .shared
                .values
                .write()
                .unwrap_or_else(PoisonError::into_inner) = values;

            {
                let open = lock(&self.gate);
                if !*open {
                    break;
                }
                (self.on_values)(values);
                for event in events {
                    let edge = if event.pressed { "pressed" } else { "released" };
                    debug!("{} {}", event.action, edge);
                    (self.on_button)(event);
                }
            }

            thread::sleep(self.tick);
        }
        debug!("Poll loop for {} exiting", device.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::scripted::PadControl;
    use crate::mapping::ButtonAction;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn fast() -> PollConfig {
        PollConfig {
            tick_interval: Duration::from_millis(2),
            join_timeout: Duration::from_secs(1),
            open_timeout: Duration::from_secs(1),
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        false
    }

    fn opener_for(pad: &PadControl) -> DeviceOpener {
        let pad = pad.clone();
        Box::new(move || Ok(Box::new(pad.device("Test Pad")) as Box<dyn InputDevice>))
    }

    fn ignore_values() -> ValueHandler {
        Arc::new(|_| {})
    }

    fn ignore_buttons() -> ButtonHandler {
        Arc::new(|_| {})
    }

    #[test]
    fn test_idle_values_are_zero() {
        let session = InputPollingSession::new(fast());
        assert!(!session.is_active());
        assert_eq!(session.get_values(), AxisValues::ZERO);
    }

    #[test]
    fn test_values_published_and_kept_after_stop() {
        let pad = PadControl::new(4, 4);
        pad.set_axis(0, 0.5);
        pad.set_axis(3, -0.75);
        let session = InputPollingSession::new(fast());
        let name = session
            .start(opener_for(&pad), InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap();
        assert_eq!(name, "Test Pad");
        assert!(session.is_active());

        assert!(wait_until(|| session.get_values().as_tuple() == (0.5, 0.0, -0.75)));
        session.stop();
        assert!(!session.is_active());
        assert_eq!(session.get_values().as_tuple(), (0.5, 0.0, -0.75));
    }

    #[test]
    fn test_no_callbacks_after_stop() {
        let pad = PadControl::new(4, 4);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let session = InputPollingSession::new(fast());
        session
            .start(
                opener_for(&pad),
                InputMapping::default(),
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                ignore_buttons(),
            )
            .unwrap();

        assert!(wait_until(|| ticks.load(Ordering::SeqCst) >= 5));
        session.stop();
        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_mapping_swap_takes_effect_live() {
        let pad = PadControl::new(4, 4);
        pad.set_axis(0, 0.3);
        pad.set_axis(2, 0.9);
        let session = InputPollingSession::new(fast());
        session
            .start(opener_for(&pad), InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap();
        assert!(wait_until(|| session.get_values().pan == 0.3));

        session.set_mapping(InputMapping {
            pan_axis: 2,
            ..InputMapping::default()
        });
        assert!(wait_until(|| session.get_values().pan == 0.9));
        assert_eq!(session.mapping().pan_axis, 2);
    }

    #[test]
    fn test_disconnect_reports_zeros_and_keeps_ticking() {
        let pad = PadControl::new(4, 4);
        pad.set_axis(1, -1.0);
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ticks);
        let session = InputPollingSession::new(fast());
        session
            .start(
                opener_for(&pad),
                InputMapping::default(),
                Arc::new(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
                ignore_buttons(),
            )
            .unwrap();
        assert!(wait_until(|| session.get_values().tilt == -1.0));

        pad.set_connected(false);
        assert!(wait_until(|| session.get_values() == AxisValues::ZERO));
        let seen = ticks.load(Ordering::SeqCst);
        assert!(wait_until(|| ticks.load(Ordering::SeqCst) > seen + 3));
        assert!(session.is_active());
    }

    #[test]
    fn test_button_edges_reach_handler() {
        let pad = PadControl::new(4, 4);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let session = InputPollingSession::new(fast());
        session
            .start(
                opener_for(&pad),
                InputMapping::default(),
                ignore_values(),
                Arc::new(move |event| sink.lock().unwrap().push(event)),
            )
            .unwrap();

        pad.set_button(1, true);
        assert!(wait_until(|| events.lock().unwrap().len() == 1));
        thread::sleep(Duration::from_millis(20));
        pad.set_button(1, false);
        assert!(wait_until(|| events.lock().unwrap().len() == 2));
        session.stop();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                ButtonEvent {
                    action: ButtonAction::ZoomOut,
                    pressed: true
                },
                ButtonEvent {
                    action: ButtonAction::ZoomOut,
                    pressed: false
                },
            ]
        );
    }

    #[test]
    fn test_open_failure_leaves_session_idle() {
        let session = InputPollingSession::new(fast());
        let opener: DeviceOpener =
            Box::new(|| Err(InputError::Backend("permission denied".into())));
        let err = session
            .start(opener, InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap_err();
        assert!(matches!(err, InputError::DeviceUnavailable(_)));
        assert!(!session.is_active());
    }

    #[test]
    fn test_timed_out_open_blocks_restart_until_reaped() {
        let config = PollConfig {
            open_timeout: Duration::from_millis(50),
            join_timeout: Duration::from_millis(200),
            ..fast()
        };
        let session = InputPollingSession::new(config);
        let pad = PadControl::new(4, 4);

        let (release_tx, release_rx) = mpsc::channel::<()>();
        let slow_pad = pad.clone();
        let slow: DeviceOpener = Box::new(move || {
            let _ = release_rx.recv();
            Ok(Box::new(slow_pad.device("Slow Pad")) as Box<dyn InputDevice>)
        });
        let err = session
            .start(slow, InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap_err();
        assert!(matches!(err, InputError::OpenTimeout(50)));

        // The first opener still holds the device
        let opened = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&opened);
        let second_pad = pad.clone();
        let second: DeviceOpener = Box::new(move || {
            flag.store(true, Ordering::SeqCst);
            Ok(Box::new(second_pad.device("Test Pad")) as Box<dyn InputDevice>)
        });
        assert!(session
            .start(second, InputMapping::default(), ignore_values(), ignore_buttons())
            .is_err());
        assert!(!opened.load(Ordering::SeqCst));
        assert!(!session.is_active());

        release_tx.send(()).unwrap();
        let name = session
            .start(opener_for(&pad), InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap();
        assert_eq!(name, "Test Pad");
        assert!(lock(&session.pending_open).is_none());
    }

    #[test]
    fn test_restart_replaces_running_loop() {
        let first = PadControl::new(4, 4);
        first.set_axis(0, 0.4);
        let second = PadControl::new(4, 4);
        second.set_axis(0, -0.4);
        let session = InputPollingSession::new(fast());

        session
            .start(opener_for(&first), InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap();
        assert!(wait_until(|| session.get_values().pan == 0.4));
        session
            .start(opener_for(&second), InputMapping::default(), ignore_values(), ignore_buttons())
            .unwrap();
        assert!(wait_until(|| session.get_values().pan == -0.4));
        // Old loop is gone: nothing overwrites the new values
        thread::sleep(Duration::from_millis(20));
        assert_eq!(session.get_values().pan, -0.4);
    }
}
