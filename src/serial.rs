// Serial link to the KiwiRay controller board
//
// The link is write-only from our side: fixed-size frames, no responses.
// Failures are detected by write errors or short writes.

use serialport::{DataBits, Parity, SerialPort, StopBits};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// Write timeout for the underlying port
pub const DEFAULT_TIMEOUT_MS: u64 = 100;

/// Error types for the serial link
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Unable to open {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("Unable to configure {path}: {source}")]
    Configure {
        path: String,
        #[source]
        source: serialport::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("Invalid serial format '{0}'")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, LinkError>;

/// Line settings in the classic `baud,parity,bits,stop` notation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialFormat {
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
}

impl SerialFormat {
    /// Parse e.g. `"115200,n,8,1"`
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || LinkError::Format(spec.to_string());
        let fields: Vec<&str> = spec.split(',').map(str::trim).collect();
        let [baud, parity, bits, stop] = fields.as_slice() else {
            return Err(invalid());
        };

        let baud_rate = baud.parse::<u32>().map_err(|_| invalid())?;
        let parity = match parity.to_ascii_lowercase().as_str() {
            "n" => Parity::None,
            "o" => Parity::Odd,
            "e" => Parity::Even,
            _ => return Err(invalid()),
        };
        let data_bits = match *bits {
            "5" => DataBits::Five,
            "6" => DataBits::Six,
            "7" => DataBits::Seven,
            "8" => DataBits::Eight,
            _ => return Err(invalid()),
        };
        let stop_bits = match *stop {
            "1" => StopBits::One,
            "2" => StopBits::Two,
            _ => return Err(invalid()),
        };

        Ok(Self {
            baud_rate,
            parity,
            data_bits,
            stop_bits,
        })
    }
}

/// A byte-stream link that accepts whole frames
pub trait SerialLink: Send {
    /// Write one frame; anything short of the full frame is an error
    fn write_frame(&mut self, frame: &[u8]) -> Result<()>;
}

/// Opens and configures links; lets the comm loop reopen after a fault
pub trait LinkOpener: Send {
    type Link: SerialLink;

    fn open(&mut self, path: &str, format: &SerialFormat) -> Result<Self::Link>;
}

/// Link backed by a real serial port
pub struct PortLink {
    port: Box<dyn SerialPort>,
}

impl PortLink {
    /// Open the device, then apply the line settings
    pub fn open(path: &str, format: &SerialFormat) -> Result<Self> {
        let mut port = serialport::new(path, format.baud_rate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()
            .map_err(|source| LinkError::Open {
                path: path.to_string(),
                source,
            })?;

        configure(port.as_mut(), format).map_err(|source| LinkError::Configure {
            path: path.to_string(),
            source,
        })?;

        debug!("Opened {} at {:?}", path, format);
        Ok(Self { port })
    }
}

fn configure(port: &mut dyn SerialPort, format: &SerialFormat) -> serialport::Result<()> {
    port.set_baud_rate(format.baud_rate)?;
    port.set_parity(format.parity)?;
    port.set_data_bits(format.data_bits)?;
    port.set_stop_bits(format.stop_bits)?;
    port.set_flow_control(serialport::FlowControl::None)
}

impl SerialLink for PortLink {
    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let written = self.port.write(frame)?;
        if written != frame.len() {
            return Err(LinkError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }
        self.port.flush()?;
        Ok(())
    }
}

/// Opener for real serial devices
#[derive(Debug, Default, Clone, Copy)]
pub struct PortOpener;

impl LinkOpener for PortOpener {
    type Link = PortLink;

    fn open(&mut self, path: &str, format: &SerialFormat) -> Result<PortLink> {
        PortLink::open(path, format)
    }
}
