//! Serial ports backed by the `serialport` crate.

use std::io::{self, Read, Write};
use std::time::Duration;

use log::{debug, trace};
use serialport::{ClearBuffer, SerialPort, SerialPortType};

use crate::error::{Error, Result};
use crate::port::{Port, PortEnumerator, PortInfo, SerialConfig};

/// An open host serial device.
pub struct NativePort {
    inner: Option<Box<dyn SerialPort>>,
    name: String,
    timeout: Duration,
}

impl NativePort {
    /// Open the device at 8N1 with no flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        debug!(
            "Opening {} at {} baud, reply timeout {:?}",
            config.port_name, config.baud_rate, config.timeout
        );
        let inner = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()?;

        Ok(Self {
            inner: Some(inner),
            name: config
                .port_name
                .clone(),
            timeout: config.timeout,
        })
    }

    fn device(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "serial port closed"))
    }
}

impl Port for NativePort {
    fn read_timeout(&self) -> Duration {
        self.timeout
    }

    fn set_read_limit(&mut self, limit: Duration) -> Result<()> {
        match &mut self.inner {
            Some(inner) => Ok(inner.set_timeout(limit)?),
            None => Err(Error::NotOpen(self.name.clone())),
        }
    }

    fn pending(&self) -> Result<u32> {
        match &self.inner {
            Some(inner) => Ok(inner.bytes_to_read()?),
            None => Err(Error::NotOpen(self.name.clone())),
        }
    }

    fn discard_input(&mut self) -> Result<()> {
        trace!("Clearing input buffer of {}", self.name);
        match &mut self.inner {
            Some(inner) => Ok(inner.clear(ClearBuffer::Input)?),
            None => Err(Error::NotOpen(self.name.clone())),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(_) => {
                debug!("Closed {}", self.name);
                Ok(())
            },
            None => Err(Error::NotOpen(self.name.clone())),
        }
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.device()?
            .read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.device()?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.device()?
            .flush()
    }
}

/// Lists the host's serial devices.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports()?
            .into_iter()
            .map(|p| match p.port_type {
                SerialPortType::UsbPort(usb) => PortInfo {
                    name: p.port_name,
                    vid: Some(usb.vid),
                    pid: Some(usb.pid),
                    manufacturer: usb.manufacturer,
                    product: usb.product,
                },
                _ => PortInfo {
                    name: p.port_name,
                    vid: None,
                    pid: None,
                    manufacturer: None,
                    product: None,
                },
            })
            .collect();
        Ok(ports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports_does_not_panic() {
        let _ = NativePortEnumerator::list_ports();
    }

    #[test]
    fn test_open_missing_port_fails() {
        let config = SerialConfig::new("/dev/rwc5020x-does-not-exist");
        assert!(NativePort::open(&config).is_err());
    }
}
