// Serial communication loop
//
// Runs on its own thread at roughly 50 iterations per second, independent of
// the host tick. Every iteration sends the latest motion frame; the display
// frame is only sent when the emoticon changed. A failed write marks the link
// faulted, after which the loop backs off and reopens until it works again.
// A failed *initial* open disables the loop for good.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::config::{COMM_PERIOD, REOPEN_BACKOFF, SERIAL_FORMAT};
use crate::emoticon::Emoticon;
use crate::protocol::{display_frame, motion_frame, PREAMBLE};
use crate::serial::{LinkError, LinkOpener, SerialFormat, SerialLink};
use crate::shared::SharedState;

/// Where the loop is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No device configured, or the first open failed
    Disabled,
    /// Not opened yet
    Opening,
    Running,
    /// Last write failed; reopen pending
    Faulted,
}

/// Cooperative stop flag that also cuts sleeps short
#[derive(Debug, Default)]
pub struct StopSignal {
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        if let Ok(mut stopped) = self.stopped.lock() {
            *stopped = true;
        }
        self.wake.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.lock().map(|s| *s).unwrap_or(true)
    }

    /// Sleep for `duration` unless stopped first; returns true if stopped
    pub fn pause(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let Ok(mut stopped) = self.stopped.lock() else {
            return true;
        };
        while !*stopped {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            match self.wake.wait_timeout(stopped, deadline - now) {
                Ok((guard, _)) => stopped = guard,
                Err(_) => return true,
            }
        }
        *stopped
    }
}

/// Owns the serial link and pushes frames built from the shared state
pub struct CommDriver<O: LinkOpener> {
    opener: O,
    device: Option<String>,
    format: String,
    shared: Arc<SharedState>,
    stop: Arc<StopSignal>,
    link: Option<O::Link>,
    state: LinkState,
    last_emoticon: Option<Emoticon>,
    period: Duration,
    backoff: Duration,
}

impl<O: LinkOpener> CommDriver<O> {
    pub fn new(
        opener: O,
        device: Option<String>,
        shared: Arc<SharedState>,
        stop: Arc<StopSignal>,
    ) -> Self {
        Self {
            opener,
            device,
            format: SERIAL_FORMAT.to_string(),
            shared,
            stop,
            link: None,
            state: LinkState::Opening,
            last_emoticon: None,
            period: COMM_PERIOD,
            backoff: REOPEN_BACKOFF,
        }
    }

    /// Override loop pacing and reopen backoff
    pub fn with_timing(mut self, period: Duration, backoff: Duration) -> Self {
        self.period = period;
        self.backoff = backoff;
        self
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// First open; failure disables the loop permanently
    pub fn start(&mut self) -> Result<(), LinkError> {
        let Some(device) = self.device.clone() else {
            warn!("No serial device configured, disabling serial");
            self.state = LinkState::Disabled;
            return Ok(());
        };

        match self.connect() {
            Ok(()) => {
                info!("Serial link open on {}", device);
                Ok(())
            }
            Err(e) => {
                warn!("{}, disabling serial", e);
                self.state = LinkState::Disabled;
                Err(e)
            }
        }
    }

    /// One loop iteration, without the trailing pause
    pub fn iterate(&mut self) {
        match self.state {
            LinkState::Disabled | LinkState::Opening => return,
            LinkState::Faulted => {
                warn!("Serial port problem, re-opening...");
                if self.stop.pause(self.backoff) {
                    return;
                }
                match self.connect() {
                    Ok(()) => info!("Serial link recovered"),
                    Err(e) => {
                        warn!("Reopen failed: {}", e);
                        return;
                    }
                }
            }
            LinkState::Running => {}
        }

        let actuator = self.shared.actuator();
        if let Err(e) = self.write(&motion_frame(&actuator)) {
            self.fault(e);
            return;
        }

        let icon = self.shared.emoticon();
        if self.last_emoticon != Some(icon) {
            debug!("Display -> {:?}", icon);
            if let Err(e) = self.write(&display_frame(icon)) {
                self.fault(e);
                return;
            }
            self.last_emoticon = Some(icon);
        }
    }

    /// Run until stopped or disabled
    pub fn run(mut self) {
        if self.start().is_err() || self.state == LinkState::Disabled {
            return;
        }

        while !self.stop.is_stopped() {
            self.iterate();
            if self.stop.pause(self.period) {
                break;
            }
        }

        self.link = None;
        info!("Serial loop stopped");
    }

    /// Close any open link, then open, configure and send the preamble
    fn connect(&mut self) -> Result<(), LinkError> {
        self.link = None;
        let device = self.device.as_deref().unwrap_or_default();
        let format = SerialFormat::parse(&self.format)?;
        let mut link = self.opener.open(device, &format)?;

        // Device may have been power-cycled: start neutral, redraw the display
        link.write_frame(&PREAMBLE)?;
        self.link = Some(link);
        self.last_emoticon = None;
        self.state = LinkState::Running;
        Ok(())
    }

    fn write(&mut self, frame: &[u8]) -> Result<(), LinkError> {
        match self.link.as_mut() {
            Some(link) => link.write_frame(frame),
            None => Err(LinkError::ShortWrite {
                written: 0,
                expected: frame.len(),
            }),
        }
    }

    fn fault(&mut self, err: LinkError) {
        warn!("Serial write failed: {}", err);
        self.state = LinkState::Faulted;
    }
}

/// Handle to a running serial loop thread
pub struct CommHandle {
    stop: Arc<StopSignal>,
    thread: Option<JoinHandle<()>>,
}

impl CommHandle {
    /// Start the serial loop on its own thread
    pub fn spawn<O>(
        opener: O,
        device: String,
        shared: Arc<SharedState>,
    ) -> std::io::Result<Self>
    where
        O: LinkOpener + 'static,
    {
        let stop = Arc::new(StopSignal::new());
        let driver = CommDriver::new(opener, Some(device), shared, stop.clone());
        let thread = thread::Builder::new()
            .name("kiwiray-comm".to_string())
            .spawn(move || driver.run())?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Signal the loop and wait for it to release the port
    pub fn stop(&mut self) {
        self.stop.stop();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Serial loop thread panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }
}

impl Drop for CommHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::messages::ActuatorState;
    use crate::protocol::{DISPLAY_FRAME_LEN, MOTION_FRAME_LEN};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// In-memory link recording every frame
    pub struct FakeLink {
        frames: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: Arc<AtomicBool>,
    }

    impl SerialLink for FakeLink {
        fn write_frame(&mut self, frame: &[u8]) -> crate::serial::Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(LinkError::ShortWrite {
                    written: 0,
                    expected: frame.len(),
                });
            }
            self.frames.lock().unwrap().push(frame.to_vec());
            Ok(())
        }
    }

    /// Opener that can be told to refuse a number of opens
    #[derive(Clone, Default)]
    pub struct FakeOpener {
        pub frames: Arc<Mutex<Vec<Vec<u8>>>>,
        pub fail_writes: Arc<AtomicBool>,
        pub opens: Arc<AtomicUsize>,
        pub refuse: Arc<AtomicUsize>,
    }

    impl LinkOpener for FakeOpener {
        type Link = FakeLink;

        fn open(&mut self, _path: &str, _format: &SerialFormat) -> crate::serial::Result<FakeLink> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if self.refuse.load(Ordering::SeqCst) > 0 {
                self.refuse.fetch_sub(1, Ordering::SeqCst);
                return Err(LinkError::Io(std::io::Error::other("unplugged")));
            }
            Ok(FakeLink {
                frames: self.frames.clone(),
                fail: self.fail_writes.clone(),
            })
        }
    }

    impl FakeOpener {
        pub fn take_frames(&self) -> Vec<Vec<u8>> {
            std::mem::take(&mut *self.frames.lock().unwrap())
        }
    }

    fn driver(opener: &FakeOpener, shared: &Arc<SharedState>) -> CommDriver<FakeOpener> {
        CommDriver::new(
            opener.clone(),
            Some("/dev/fake".to_string()),
            shared.clone(),
            Arc::new(StopSignal::new()),
        )
        .with_timing(Duration::ZERO, Duration::ZERO)
    }

    #[test]
    fn test_start_sends_preamble() {
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut comm = driver(&opener, &shared);

        comm.start().unwrap();
        assert_eq!(comm.state(), LinkState::Running);
        assert_eq!(opener.take_frames(), vec![PREAMBLE.to_vec()]);
    }

    #[test]
    fn test_display_frame_only_on_change() {
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut comm = driver(&opener, &shared);
        comm.start().unwrap();
        opener.take_frames();

        comm.iterate();
        let frames = opener.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), MOTION_FRAME_LEN);
        assert_eq!(frames[1].len(), DISPLAY_FRAME_LEN);

        comm.iterate();
        assert_eq!(opener.take_frames().len(), 1);

        shared.publish_emoticon(Emoticon::Happy);
        comm.iterate();
        let frames = opener.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1], display_frame(Emoticon::Happy).to_vec());
    }

    #[test]
    fn test_motion_frame_follows_shared_state() {
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut comm = driver(&opener, &shared);
        comm.start().unwrap();
        opener.take_frames();

        let state = ActuatorState {
            strafe: 12,
            forward: -4,
            rotate: 9,
            pitch: 10,
        };
        shared.publish_actuator(&state);
        comm.iterate();
        assert_eq!(opener.take_frames()[0], motion_frame(&state).to_vec());
    }

    #[test]
    fn test_initial_open_failure_disables() {
        let opener = FakeOpener::default();
        opener.refuse.store(1, Ordering::SeqCst);
        let shared = Arc::new(SharedState::new());
        let mut comm = driver(&opener, &shared);

        assert!(comm.start().is_err());
        assert_eq!(comm.state(), LinkState::Disabled);

        // No retry, no writes
        comm.iterate();
        comm.iterate();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);
        assert!(opener.take_frames().is_empty());
    }

    #[test]
    fn test_no_device_is_disabled() {
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut comm = CommDriver::new(
            opener.clone(),
            None,
            shared,
            Arc::new(StopSignal::new()),
        );

        assert!(comm.start().is_ok());
        assert_eq!(comm.state(), LinkState::Disabled);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_write_failure_reopens_once_per_backoff() {
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut comm = driver(&opener, &shared);
        comm.start().unwrap();
        comm.iterate();
        opener.take_frames();

        // Unplug: next write fails
        opener.fail_writes.store(true, Ordering::SeqCst);
        comm.iterate();
        assert_eq!(comm.state(), LinkState::Faulted);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 1);

        // Device still gone for two attempts
        opener.fail_writes.store(false, Ordering::SeqCst);
        opener.refuse.store(2, Ordering::SeqCst);
        comm.iterate();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 2);
        assert_eq!(comm.state(), LinkState::Faulted);
        comm.iterate();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 3);
        assert_eq!(comm.state(), LinkState::Faulted);
        assert!(opener.take_frames().is_empty());

        // Back: preamble, then motion and a fresh display frame
        comm.iterate();
        assert_eq!(opener.opens.load(Ordering::SeqCst), 4);
        assert_eq!(comm.state(), LinkState::Running);
        let frames = opener.take_frames();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0], PREAMBLE.to_vec());
        assert_eq!(frames[1].len(), MOTION_FRAME_LEN);
        assert_eq!(frames[2].len(), DISPLAY_FRAME_LEN);

        // Motion frames resume every iteration
        for _ in 0..3 {
            comm.iterate();
            assert_eq!(opener.take_frames().len(), 1);
        }
        assert_eq!(opener.opens.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_faulted_waits_out_backoff_before_reopen() {
        let backoff = Duration::from_millis(50);
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut comm = driver(&opener, &shared).with_timing(Duration::ZERO, backoff);
        comm.start().unwrap();

        opener.fail_writes.store(true, Ordering::SeqCst);
        comm.iterate();
        assert_eq!(comm.state(), LinkState::Faulted);
        opener.fail_writes.store(false, Ordering::SeqCst);
        opener.refuse.store(2, Ordering::SeqCst);

        // Each faulted iteration sleeps the full backoff, then tries once
        for expected_opens in 2..=3 {
            let started = Instant::now();
            comm.iterate();
            assert!(started.elapsed() >= backoff);
            assert_eq!(opener.opens.load(Ordering::SeqCst), expected_opens);
            assert_eq!(comm.state(), LinkState::Faulted);
        }

        let started = Instant::now();
        comm.iterate();
        assert!(started.elapsed() >= backoff);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 4);
        assert_eq!(comm.state(), LinkState::Running);

        // Running again: no backoff, no reopen
        opener.take_frames();
        comm.iterate();
        assert_eq!(opener.take_frames().len(), 1);
        assert_eq!(opener.opens.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_pause_cut_short_by_stop() {
        let stop = Arc::new(StopSignal::new());
        let waiter = stop.clone();
        let handle = thread::spawn(move || waiter.pause(Duration::from_secs(30)));
        thread::sleep(Duration::from_millis(20));
        stop.stop();
        assert!(handle.join().unwrap());
        assert!(stop.is_stopped());
    }

    #[test]
    fn test_handle_stops_thread() {
        let opener = FakeOpener::default();
        let shared = Arc::new(SharedState::new());
        let mut handle = CommHandle::spawn(opener.clone(), "/dev/fake".to_string(), shared).unwrap();

        thread::sleep(Duration::from_millis(100));
        handle.stop();
        assert!(handle.is_finished());

        let frames = opener.take_frames();
        assert_eq!(frames[0], PREAMBLE.to_vec());
        assert!(frames.len() >= 2);
    }
}
