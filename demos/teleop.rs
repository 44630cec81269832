// Keyboard teleop: WASD move, Z/X rotate, R/F camera pitch, T say hello, Q quit
//
// Publishes control samples and connection status to the kiwiray bridge.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use kiwiray_driver::config::{TOPIC_CONNECTED, TOPIC_CONTROL, TOPIC_TEXT};
use kiwiray_driver::messages::{ControlSample, KeyMask};
use std::time::{Duration, Instant};
use tracing::info;

const ROTATE_DELTA: i32 = 40; // per sample while Z/X held
const PITCH_DELTA: i32 = 10; // per sample while R/F held
const INPUT_TIMEOUT_MS: u64 = 100; // Release keys after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let control = session.declare_publisher(TOPIC_CONTROL).await?;
    let connected = session.declare_publisher(TOPIC_CONNECTED).await?;
    let text = session.declare_publisher(TOPIC_TEXT).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=pitch, T=hello, Q=quit");
    connected.put("true").await?;

    enable_raw_mode()?;
    let result = run_teleop(&control, &text).await;
    disable_raw_mode()?;

    connected.put("false").await?;
    result
}

async fn run_teleop(
    control: &zenoh::pubsub::Publisher<'_>,
    text: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut keys = KeyMask::NONE;
    let mut last_movement_input = Instant::now();

    loop {
        // Look deltas are per sample, not held
        let mut sample = ControlSample::default();

        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Movement - latch direction and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        keys = KeyMask::UP;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        keys = KeyMask::DOWN;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        keys = KeyMask::LEFT;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        keys = KeyMask::RIGHT;
                        last_movement_input = Instant::now();
                    }

                    // Look
                    KeyCode::Char('z') if pressed => sample.mx = -ROTATE_DELTA,
                    KeyCode::Char('x') if pressed => sample.mx = ROTATE_DELTA,
                    KeyCode::Char('r') if pressed => sample.my = -PITCH_DELTA,
                    KeyCode::Char('f') if pressed => sample.my = PITCH_DELTA,

                    KeyCode::Char('t') if pressed => text.put("Hello :)").await?,

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release keys if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            keys = KeyMask::NONE;
        }

        // Always publish at ~50Hz
        sample.keys = keys;
        control.put(serde_json::to_string(&sample)?).await?;
    }

    Ok(())
}
