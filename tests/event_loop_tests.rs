//! Event notification contracts, driven by a scripted mock driver.
//!
//! The mock latches signaled conditions and wakes like the native
//! primitive does, and flags any two device commands it ever sees
//! overlap, which is how the serialization contract is asserted.

use ft232x_d2xx::driver::{Capabilities, DeviceDetails, Driver, DriverPort};
use ft232x_d2xx::{
    BitMode, ConfigRecord, Error, Event, EventListener, EventMask, Ft232x, Result, WaiterState,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

// --- Mock driver ---

#[derive(Default)]
struct MockState {
    rx: VecDeque<u8>,
    /// Latched raw condition bits, cleared when a wait consumes them.
    pending: u32,
    /// Latched wake request, so a wake just before the wait parks is
    /// not lost.
    wake_latch: bool,
    fail_next_wait: bool,
    bit_mask: u8,
    bit_mode: BitMode,
    config: ConfigRecord,
}

struct MockPort {
    state: Mutex<MockState>,
    signaled: Condvar,
    /// Set while one command is in flight; a second entrant trips
    /// `overlap`.
    busy: AtomicBool,
    overlap: AtomicBool,
}

impl MockPort {
    fn new() -> Arc<Self> {
        Arc::new(MockPort {
            state: Mutex::new(MockState {
                config: ConfigRecord::default(),
                ..MockState::default()
            }),
            signaled: Condvar::new(),
            busy: AtomicBool::new(false),
            overlap: AtomicBool::new(false),
        })
    }

    /// Signals raw condition bits the way the device would.
    fn signal(&self, bits: EventMask) {
        let mut state = self.state.lock().unwrap();
        state.pending |= bits.raw();
        self.signaled.notify_all();
    }

    /// Queues received data and signals RXCHAR.
    fn signal_rx(&self, data: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.rx.extend(data);
        state.pending |= EventMask::RXCHAR.raw();
        self.signaled.notify_all();
    }

    /// Makes the next (or current) wait fail with a transport error.
    fn fail_wait(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_next_wait = true;
        self.signaled.notify_all();
    }

    fn saw_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    /// Brackets a command the way the single-command transport would:
    /// two in-flight commands are a contract violation.
    fn command<T>(&self, f: impl FnOnce(&mut MockState) -> T) -> T {
        if self.busy.swap(true, Ordering::SeqCst) {
            self.overlap.store(true, Ordering::SeqCst);
        }
        // Widen the race window so an unserialized caller actually trips
        // the overlap flag instead of sneaking through.
        thread::sleep(Duration::from_micros(500));
        let result = f(&mut self.state.lock().unwrap());
        self.busy.store(false, Ordering::SeqCst);
        result
    }
}

struct PortHandle(Arc<MockPort>);

impl DriverPort for PortHandle {
    fn details(&self) -> DeviceDetails {
        DeviceDetails {
            vendor_id: ft232x_d2xx::FTDI_VID,
            product_id: ft232x_d2xx::FT232R_PID,
            serial_number: Some("MOCK0001".to_string()),
            description: Some("Mock FT232R".to_string()),
        }
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn read_bytes(&self, len: usize) -> Result<Vec<u8>> {
        self.0.command(|state| {
            let take = len.min(state.rx.len());
            Ok(state.rx.drain(..take).collect())
        })
    }

    fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        self.0.command(|_| Ok(data.len()))
    }

    fn queued_bytes(&self) -> Result<usize> {
        self.0.command(|state| Ok(state.rx.len()))
    }

    fn set_bit_mode(&self, mask: u8, mode: BitMode) -> Result<()> {
        self.0.command(|state| {
            state.bit_mask = mask;
            state.bit_mode = mode;
            Ok(())
        })
    }

    fn bit_mode(&self) -> Result<u8> {
        self.0
            .command(|state| Ok(state.bit_mask & state.bit_mode.readback_mask()))
    }

    fn read_config(&self) -> Result<ConfigRecord> {
        self.0.command(|state| Ok(state.config.clone()))
    }

    fn write_config(&self, record: &ConfigRecord) -> Result<()> {
        self.0.command(|state| {
            state.config = record.clone();
            Ok(())
        })
    }

    fn wait_for_event(&self, _enabled: EventMask) -> Result<EventMask> {
        let mut state = self.0.state.lock().unwrap();
        loop {
            if state.fail_next_wait {
                state.fail_next_wait = false;
                return Err(Error::Io {
                    message: "wait primitive lost the device".to_string(),
                });
            }
            if state.pending != 0 {
                let raw = state.pending;
                state.pending = 0;
                return Ok(EventMask::from_raw(raw));
            }
            if state.wake_latch {
                state.wake_latch = false;
                return Ok(EventMask::empty());
            }
            state = self.0.signaled.wait(state).unwrap();
        }
    }

    fn wake(&self) {
        let mut state = self.0.state.lock().unwrap();
        state.wake_latch = true;
        self.0.signaled.notify_all();
    }
}

struct MockDriver(Arc<MockPort>);

impl Driver for MockDriver {
    fn open(&self, index: usize) -> Result<Box<dyn DriverPort>> {
        if index != 0 {
            return Err(Error::DeviceNotFoundByIndex {
                index,
                message: "mock driver exposes a single device".to_string(),
            });
        }
        Ok(Box::new(PortHandle(Arc::clone(&self.0))))
    }
}

fn open_mock() -> (Ft232x, Arc<MockPort>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let port = MockPort::new();
    let device = Ft232x::open(&MockDriver(Arc::clone(&port)), 0).expect("open mock device");
    (device, port)
}

/// Polls the waiter state with a deadline; dispatch latency in these
/// tests is a scheduling tick, not seconds.
fn wait_for_state(device: &Ft232x, wanted: WaiterState, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if device.event_state() == wanted {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    device.event_state() == wanted
}

// --- Listeners ---

struct Recorder {
    tx: Mutex<Sender<Event>>,
}

impl Recorder {
    fn new() -> (Arc<Self>, std::sync::mpsc::Receiver<Event>) {
        let (tx, rx) = channel();
        (Arc::new(Recorder { tx: Mutex::new(tx) }), rx)
    }
}

impl EventListener for Recorder {
    fn on_event(&self, _device: &Ft232x, event: &Event) -> Result<()> {
        self.tx.lock().unwrap().send(*event).ok();
        Ok(())
    }
}

// --- Tests ---

#[test]
fn start_with_empty_mask_is_rejected() {
    let (device, _port) = open_mock();
    match device.event_start() {
        Err(Error::InvalidArgument(_)) => {}
        other => panic!("expected InvalidArgument, got {other:?}"),
    }
    assert_eq!(device.event_state(), WaiterState::Idle);
}

#[test]
fn triggered_mask_is_filtered_by_enabled_mask() {
    let (device, port) = open_mock();
    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    // The device signals more than we asked for; only the enabled
    // class may appear in the descriptor.
    port.signal(EventMask::RXCHAR | EventMask::MODEM_STATUS);
    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.triggered, EventMask::RXCHAR);

    device.close();
}

#[test]
fn wake_for_disabled_class_is_discarded() {
    let (device, port) = open_mock();
    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    // Nothing of this is enabled: the waiter must swallow the wake and
    // go straight back to waiting.
    port.signal(EventMask::MODEM_STATUS | EventMask::LINE_STATUS);
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
    assert!(wait_for_state(&device, WaiterState::Waiting, Duration::from_secs(2)));

    // The loop is still alive for the class we do care about.
    port.signal(EventMask::RXCHAR);
    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.triggered, EventMask::RXCHAR);

    device.close();
}

#[test]
fn enable_disable_are_idempotent_on_the_mask() {
    let (device, _port) = open_mock();
    device
        .event_enable(EventMask::RXCHAR | EventMask::LINE_STATUS)
        .unwrap();
    device.event_disable(EventMask::LINE_STATUS);
    let once = device.event_mask();
    device.event_disable(EventMask::LINE_STATUS);
    assert_eq!(device.event_mask(), once);
    assert_eq!(once, EventMask::RXCHAR);
}

#[test]
fn reserved_bits_cannot_be_enabled() {
    let (device, _port) = open_mock();
    assert!(matches!(
        device.event_enable(EventMask::WAIT_FAULT),
        Err(Error::InvalidArgument(_))
    ));
    assert!(device.event_mask().is_empty());
}

#[test]
fn listeners_run_in_registration_order_with_duplicates() {
    struct Tagged {
        tag: &'static str,
        log: Arc<Mutex<Vec<&'static str>>>,
    }
    impl EventListener for Tagged {
        fn on_event(&self, _device: &Ft232x, _event: &Event) -> Result<()> {
            self.log.lock().unwrap().push(self.tag);
            Ok(())
        }
    }

    let (device, port) = open_mock();
    let log = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::new(Tagged {
        tag: "first",
        log: Arc::clone(&log),
    });
    device.event_add_listener(first.clone());
    device.event_add_listener(Arc::new(Tagged {
        tag: "second",
        log: Arc::clone(&log),
    }));
    // Same listener registered again: invoked once per registration.
    device.event_add_listener(first);

    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    port.signal(EventMask::RXCHAR);
    events.recv_timeout(Duration::from_secs(2)).unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "first"]);
    device.close();
}

#[test]
fn failing_listener_does_not_block_the_next_one() {
    struct Faulty;
    impl EventListener for Faulty {
        fn on_event(&self, _device: &Ft232x, _event: &Event) -> Result<()> {
            Err(Error::Io {
                message: "listener blew up".to_string(),
            })
        }
    }

    let (device, port) = open_mock();
    device.event_add_listener(Arc::new(Faulty));
    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    port.signal(EventMask::RXCHAR);
    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(event.triggered, EventMask::RXCHAR);
    assert_eq!(device.event_fault_count(), 1);

    device.close();
}

#[test]
fn panicking_listener_is_isolated_and_counted() {
    struct Bomb;
    impl EventListener for Bomb {
        fn on_event(&self, _device: &Ft232x, _event: &Event) -> Result<()> {
            panic!("listener panic");
        }
    }

    let (device, port) = open_mock();
    device.event_add_listener(Arc::new(Bomb));
    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    port.signal(EventMask::RXCHAR);
    events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(device.event_fault_count(), 1);
    // The waiter survived the panic and keeps dispatching.
    port.signal(EventMask::RXCHAR);
    events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(device.event_fault_count(), 2);

    device.close();
}

#[test]
fn disable_all_unparks_a_blocked_waiter() {
    let (device, _port) = open_mock();
    device.event_enable(EventMask::ALL).unwrap();
    device.event_start().unwrap();
    assert!(wait_for_state(&device, WaiterState::Waiting, Duration::from_secs(2)));

    // No device event arrives; the drained mask alone must unpark it.
    device.event_disable(EventMask::ALL);
    assert!(wait_for_state(&device, WaiterState::Idle, Duration::from_secs(2)));
}

#[test]
fn explicit_stop_reaches_stopped_and_restart_works() {
    let (device, port) = open_mock();
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();
    assert!(wait_for_state(&device, WaiterState::Waiting, Duration::from_secs(2)));

    device.event_stop();
    assert_eq!(device.event_state(), WaiterState::Stopped);

    // Restart is an explicit caller action and must yield a live loop.
    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_start().unwrap();
    port.signal(EventMask::RXCHAR);
    events.recv_timeout(Duration::from_secs(2)).unwrap();

    device.close();
}

#[test]
fn wait_fault_is_reported_once_then_waiter_halts() {
    let (device, port) = open_mock();
    let (recorder, events) = Recorder::new();
    device.event_add_listener(recorder);
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();
    assert!(wait_for_state(&device, WaiterState::Waiting, Duration::from_secs(2)));

    port.fail_wait();
    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(event.is_fault());
    assert!(wait_for_state(&device, WaiterState::Stopped, Duration::from_secs(2)));
    // No retry, no second fault descriptor.
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());
}

#[test]
fn listener_may_stop_the_waiter_from_dispatch() {
    struct StopOnEvent;
    impl EventListener for StopOnEvent {
        fn on_event(&self, device: &Ft232x, _event: &Event) -> Result<()> {
            device.event_stop();
            Ok(())
        }
    }

    let (device, port) = open_mock();
    device.event_add_listener(Arc::new(StopOnEvent));
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    port.signal(EventMask::RXCHAR);
    // Must not deadlock on a self-join; the loop winds down once the
    // callback returns.
    assert!(wait_for_state(&device, WaiterState::Stopped, Duration::from_secs(2)));
}

#[test]
fn rx_listener_reads_queued_bytes_under_concurrent_commands() {
    struct RxReader {
        tx: Mutex<Sender<Vec<u8>>>,
    }
    impl EventListener for RxReader {
        fn on_event(&self, device: &Ft232x, event: &Event) -> Result<()> {
            if event.triggered.contains(EventMask::RXCHAR) {
                let queued = device.queue_status()?;
                let data = device.read(queued)?;
                self.tx.lock().unwrap().send(data).ok();
            }
            Ok(())
        }
    }

    let (device, port) = open_mock();
    let (tx, rx) = channel();
    device.event_add_listener(Arc::new(RxReader { tx: Mutex::new(tx) }));
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();

    // Hammer the session with bit-mode traffic from another thread
    // while the listener reads from inside dispatch.
    let noisy = {
        let device = device.clone();
        thread::spawn(move || {
            for i in 0..50u8 {
                device
                    .set_bit_mode(i % 16, BitMode::CbusBitbang)
                    .expect("bit mode");
            }
        })
    };

    port.signal_rx(&[0xDE, 0xAD, 0xBE, 0xEF]);
    let data = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(data, vec![0xDE, 0xAD, 0xBE, 0xEF]);

    noisy.join().unwrap();
    assert!(
        !port.saw_overlap(),
        "two device commands overlapped on the session"
    );
    device.close();
}

#[test]
fn close_stops_the_waiter_and_fails_commands() {
    let (device, _port) = open_mock();
    device.event_enable(EventMask::RXCHAR).unwrap();
    device.event_start().unwrap();
    assert!(wait_for_state(&device, WaiterState::Waiting, Duration::from_secs(2)));

    device.close();
    assert_eq!(device.event_state(), WaiterState::Stopped);
    assert!(matches!(device.read(1), Err(Error::Io { .. })));
    assert!(matches!(device.queue_status(), Err(Error::Io { .. })));
    assert!(matches!(device.event_start(), Err(Error::Io { .. })));
    // Closing again is a no-op.
    device.close();
}
