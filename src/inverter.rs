use std::net::SocketAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::timeout;
use tokio_modbus::prelude::*;

use crate::error::TransportError;

const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// One instantaneous power reading from the inverter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSample {
    pub at: DateTime<Utc>,
    pub watts: f64,
}

/// Modbus TCP client for the inverter's instantaneous output register.
///
/// The inverter exposes output power as a pair of input registers; the watt
/// value lives in the second word. The connection is lazy and is dropped on
/// any read failure so the next cycle reconnects fresh - the caller gets the
/// error and skips the cycle, there is no retry here.
pub struct InverterReader {
    target: SocketAddr,
    register: u16,
    io_timeout: Duration,
    connection: Option<client::Context>,
}

impl InverterReader {
    pub fn new(target: SocketAddr, register: u16) -> Self {
        Self::with_timeout(target, register, DEFAULT_IO_TIMEOUT)
    }

    pub fn with_timeout(target: SocketAddr, register: u16, io_timeout: Duration) -> Self {
        Self {
            target,
            register,
            io_timeout,
            connection: None,
        }
    }

    /// Reads the current output power, reconnecting first if needed. Both
    /// the connect and the register read are bounded by the I/O timeout so
    /// a black-holed inverter cannot stall the poll cycle.
    pub async fn read(&mut self) -> Result<PowerSample, TransportError> {
        let ctx = match self.connection.as_mut() {
            Some(ctx) => ctx,
            None => {
                let ctx = timeout(self.io_timeout, tcp::connect(self.target))
                    .await
                    .map_err(|_| TransportError::Timeout(self.io_timeout))?
                    .map_err(|err| TransportError::Connect(err.to_string()))?;
                self.connection.insert(ctx)
            }
        };

        match timeout(self.io_timeout, ctx.read_input_registers(self.register, 2)).await {
            Ok(Ok(Ok(words))) => {
                if words.len() < 2 {
                    return Err(TransportError::ShortRead(words.len()));
                }
                Ok(PowerSample {
                    at: Utc::now(),
                    watts: f64::from(words[1]),
                })
            }
            Ok(Ok(Err(exception))) => {
                self.connection = None;
                Err(TransportError::Exception(format!("{exception:?}")))
            }
            Ok(Err(err)) => {
                self.connection = None;
                Err(TransportError::Read(err.to_string()))
            }
            Err(_) => {
                self.connection = None;
                Err(TransportError::Timeout(self.io_timeout))
            }
        }
    }
}
