//! Serial-port links.
use super::{Connector, Link, LinkError, LinkEvent, LinkWriter};
use log::{debug, trace, warn};
use serialport::SerialPort;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct SerialConnector {
    port: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }
}

struct SerialWriter(Box<dyn SerialPort>);

impl LinkWriter for SerialWriter {
    fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.0.write_all(bytes)?;
        self.0.flush()
    }
}

impl Connector for SerialConnector {
    fn open(&self) -> Result<Link, LinkError> {
        debug!("Opening serial port {} at {} baud", self.port, self.baud_rate);
        let open_err = |e: serialport::Error| LinkError::Open {
            port: self.port.clone(),
            reason: e.to_string(),
        };

        let mut builder =
            serialport::new(&self.port, self.baud_rate).timeout(Duration::from_millis(200));
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder.open().map_err(open_err)?;
        // Discard whatever the panel sent before we opened.
        let _ = port.clear(serialport::ClearBuffer::Input);
        let reader = port.try_clone().map_err(open_err)?;

        let (tx, events) = mpsc::unbounded_channel();
        let name = self.port.clone();
        std::thread::Builder::new()
            .name(format!("serial-rx {}", name))
            .spawn(move || read_loop(reader, name, tx))?;

        Ok(Link {
            events,
            writer: Box::new(SerialWriter(port)),
        })
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

/// Blocking reader. Ends when the port fails or the actor drops the link.
fn read_loop(mut port: Box<dyn SerialPort>, name: String, tx: mpsc::UnboundedSender<LinkEvent>) {
    let mut buffer = [0u8; 1024];
    while !tx.is_closed() {
        match port.read(&mut buffer) {
            Ok(0) => {
                let _ = tx.send(LinkEvent::Closed);
                break;
            }
            Ok(n) => {
                trace!("{}: read {} bytes", name, n);
                if tx.send(LinkEvent::Data(buffer[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!("{}: read failed: {}", name, e);
                let _ = tx.send(LinkEvent::Error(e.to_string()));
                break;
            }
        }
    }
    debug!("{}: reader thread exiting", name);
}
