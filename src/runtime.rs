// Zenoh host bridge: stands in for the host process
//
// Ticks the KiwiRay core at a fixed rate, feeds it control samples, text,
// connection changes and glitches from Zenoh topics, and publishes whatever
// the core sends back (client replies, speech, voice selection, capability
// toggles) plus a health status.
// Control samples go stale after CMD_TIMEOUT: the core then sees a zero sample
// so the robot coasts to a stop instead of replaying the last input.

use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{info, warn};

use crate::config::{
    DriverConfig, CMD_TIMEOUT, TOPIC_CAP, TOPIC_CONNECTED, TOPIC_CONTROL, TOPIC_HEALTH,
    TOPIC_REPLY, TOPIC_SAY, TOPIC_STILL, TOPIC_TEXT, TOPIC_VOICE,
};
use crate::messages::{BridgeHealth, ControlSample};
use crate::plugin::{Host, KiwiRay, Plugin, VOICE_CURRENT};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Something the core asked the host to do
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Reply(Vec<u8>),
    Say(String),
    Voice(i32),
    Capability(u32),
}

/// Host implementation backed by queued Zenoh publications
pub struct ZenohHost {
    sample: ControlSample,
    voices: Vec<String>,
    voice: usize,
    outbox: Vec<Outbound>,
}

impl ZenohHost {
    pub fn new(voices: Vec<String>) -> Self {
        Self {
            sample: ControlSample::default(),
            voices,
            voice: 0,
            outbox: Vec::new(),
        }
    }

    pub fn set_sample(&mut self, sample: ControlSample) {
        self.sample = sample;
    }

    /// Take everything queued since the last drain
    pub fn drain(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbox)
    }
}

impl Host for ZenohHost {
    fn control_sample(&self) -> ControlSample {
        self.sample
    }

    fn client_send(&mut self, data: &[u8]) {
        self.outbox.push(Outbound::Reply(data.to_vec()));
    }

    fn speak_text(&mut self, text: &str) {
        self.outbox.push(Outbound::Say(text.to_string()));
    }

    fn speak_voice(&mut self, index: i32) -> String {
        if index != VOICE_CURRENT {
            match usize::try_from(index) {
                Ok(i) if i < self.voices.len() => {
                    self.voice = i;
                    self.outbox.push(Outbound::Voice(index));
                }
                _ => warn!("No voice {}, keeping current", index),
            }
        }
        self.voices.get(self.voice).cloned().unwrap_or_default()
    }

    fn toggle_capability(&mut self, cap: u32) {
        self.outbox.push(Outbound::Capability(cap));
    }
}

/// Replaces stale control samples with a zero sample
pub struct SampleWatchdog {
    latest: Option<ControlSample>,
    received_at: Instant,
    timeout: Duration,
    health: BridgeHealth,
}

impl SampleWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            latest: None,
            received_at: Instant::now(),
            timeout,
            health: BridgeHealth::CmdStale, // Stale until first sample
        }
    }

    pub fn on_sample(&mut self, sample: ControlSample) {
        self.latest = Some(sample);
        self.received_at = Instant::now();
    }

    pub fn health(&self) -> BridgeHealth {
        self.health
    }

    /// Sample to hand to the core this tick
    pub fn current(&mut self, connected: bool) -> ControlSample {
        let age = self.received_at.elapsed();

        if !connected {
            self.health = BridgeHealth::Disconnected;
            ControlSample::default()
        } else if age > self.timeout {
            if self.health != BridgeHealth::CmdStale {
                warn!("Control input stale ({:?} old), zeroing", age);
            }
            self.health = BridgeHealth::CmdStale;
            ControlSample::default()
        } else if let Some(sample) = self.latest {
            self.health = BridgeHealth::Ok;
            sample
        } else {
            self.health = BridgeHealth::CmdStale;
            ControlSample::default()
        }
    }
}

/// Tick period for a host rate; rates above 1 kHz round up to 1 ms
pub fn tick_period(tick_hz: u64) -> Duration {
    Duration::from_micros(1_000_000 / tick_hz.max(1)).max(Duration::from_millis(1))
}

/// Stop the serial loop without stalling other tasks on this worker
///
/// Needs the multi-threaded runtime (`#[tokio::main]` default).
pub fn close_blocking<P: Plugin>(plugin: &mut P) {
    tokio::task::block_in_place(|| plugin.close());
}

/// Publish queued host actions
async fn flush(
    outbox: Vec<Outbound>,
    reply: &zenoh::pubsub::Publisher<'_>,
    say: &zenoh::pubsub::Publisher<'_>,
    voice: &zenoh::pubsub::Publisher<'_>,
    cap: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), BoxError> {
    for item in outbox {
        match item {
            Outbound::Reply(bytes) => reply.put(bytes).await?,
            Outbound::Say(text) => say.put(text).await?,
            Outbound::Voice(index) => voice.put(serde_json::to_string(&index)?).await?,
            Outbound::Capability(id) => {
                let msg = serde_json::json!({ "cap": id, "op": "toggle" });
                cap.put(msg.to_string()).await?
            }
        }
    }
    Ok(())
}

pub async fn run(config: DriverConfig, voices: Vec<String>, tick_hz: u64) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_control = session.declare_subscriber(TOPIC_CONTROL).await?;
    let sub_text = session.declare_subscriber(TOPIC_TEXT).await?;
    let sub_connected = session.declare_subscriber(TOPIC_CONNECTED).await?;
    let sub_still = session.declare_subscriber(TOPIC_STILL).await?;
    let pub_reply = session.declare_publisher(TOPIC_REPLY).await?;
    let pub_say = session.declare_publisher(TOPIC_SAY).await?;
    let pub_voice = session.declare_publisher(TOPIC_VOICE).await?;
    let pub_cap = session.declare_publisher(TOPIC_CAP).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let mut kiwi = KiwiRay::new(ZenohHost::new(voices));
    kiwi.init(config)?;

    let mut watchdog = SampleWatchdog::new(CMD_TIMEOUT);
    let mut connected = false;
    let mut tick = interval(tick_period(tick_hz));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!("Bridge started: {}Hz tick, {}ms watchdog", tick_hz, CMD_TIMEOUT.as_millis());

    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down");
                break;
            }
        }

        // 1. Connection changes and glitches
        while let Ok(Some(sample)) = sub_connected.try_recv() {
            match serde_json::from_slice::<bool>(&sample.payload().to_bytes()) {
                Ok(status) if status != connected => {
                    connected = status;
                    kiwi.connection_status(status);
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to parse connection status: {}", e),
            }
        }
        while let Ok(Some(_)) = sub_still.try_recv() {
            kiwi.still();
        }

        // 2. Control input, keep latest
        while let Ok(Some(sample)) = sub_control.try_recv() {
            match serde_json::from_slice::<ControlSample>(&sample.payload().to_bytes()) {
                Ok(input) => watchdog.on_sample(input),
                Err(e) => warn!("Failed to parse control sample: {}", e),
            }
        }

        // 3. Commands and speech
        while let Ok(Some(sample)) = sub_text.try_recv() {
            if let Err(e) = kiwi.receive(&sample.payload().to_bytes()) {
                warn!("Rejected text: {}", e);
            }
        }

        // 4. Tick the core
        let input = watchdog.current(connected);
        kiwi.host_mut().set_sample(input);
        kiwi.tick();

        // 5. Publish what the core asked for, then health
        let outbox = kiwi.host_mut().drain();
        flush(outbox, &pub_reply, &pub_say, &pub_voice, &pub_cap).await?;
        pub_health
            .put(serde_json::to_string(&watchdog.health())?)
            .await?;
    }

    close_blocking(&mut kiwi);
    Ok(())
}
