//! Serial NMEA receiver.
//!
//! The device node is opened as a plain file. On Linux the line speed is
//! applied through termios; a handle that is not a terminal (for example a
//! replay file) is read as-is. Every read waits at most the configured
//! timeout for the receiver to produce data.

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

use super::nmea::parse_gga;
use super::Location;

pub(super) struct SerialGps {
    port: String,
    reader: Option<BufReader<File>>,
    timeout: Duration,
    /// Bytes of a sentence whose line ending has not arrived yet.
    pending: Vec<u8>,
}

impl SerialGps {
    pub(super) fn open(port: &str, baud_rate: u32, timeout: Duration) -> Result<Self> {
        let path = Path::new(port);
        let file = File::options()
            .read(true)
            .open(path)
            .with_context(|| format!("failed to open serial device {}", path.display()))?;
        configure_line(&file, port, baud_rate)?;
        Ok(Self {
            port: port.to_string(),
            reader: Some(BufReader::new(file)),
            timeout,
            pending: Vec::new(),
        })
    }

    /// Read one line. Non-`GGA` sentences, fix-less `GGA` and a receiver that
    /// stays silent for the whole timeout yield `Ok(None)`.
    pub(super) fn read_location(&mut self) -> Result<Option<Location>> {
        let Some(raw) = self.read_line()? else {
            log::debug!(
                "serial GPS {}: no sentence within {:?}",
                self.port,
                self.timeout
            );
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&raw);
        if line.trim().is_empty() {
            return Ok(None);
        }

        let Some(fix) = parse_gga(&line)? else {
            return Ok(None);
        };
        Ok(Some(Location {
            latitude: fix.latitude,
            longitude: fix.longitude,
            altitude: fix.altitude,
            // GGA carries no ground speed.
            speed: 0.0,
            timestamp: Local::now(),
            fix_quality: fix.fix_quality,
            satellite_count: fix.satellite_count,
        }))
    }

    /// Next complete line, or `None` when the timeout elapses first.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>> {
        let Self {
            port,
            reader,
            timeout,
            pending,
        } = self;
        let reader = reader
            .as_mut()
            .ok_or_else(|| anyhow!("serial device {} is closed", port))?;
        let deadline = Instant::now() + *timeout;
        loop {
            if reader.buffer().is_empty() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if !wait_readable(reader.get_ref(), remaining)
                    .with_context(|| format!("wait for serial device {}", port))?
                {
                    return Ok(None);
                }
            }
            let available = reader
                .fill_buf()
                .with_context(|| format!("read serial device {}", port))?;
            if available.is_empty() {
                return Err(anyhow!("serial device {} reached end of input", port));
            }
            match available.iter().position(|byte| *byte == b'\n') {
                Some(end) => {
                    pending.extend_from_slice(&available[..=end]);
                    reader.consume(end + 1);
                    return Ok(Some(std::mem::take(pending)));
                }
                None => {
                    let len = available.len();
                    pending.extend_from_slice(available);
                    reader.consume(len);
                }
            }
        }
    }

    pub(super) fn close(&mut self) {
        self.pending.clear();
        if self.reader.take().is_some() {
            log::debug!("serial GPS {} closed", self.port);
        }
    }
}

#[cfg(target_os = "linux")]
fn configure_line(file: &File, port: &str, baud_rate: u32) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let speed = match baud_rate {
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        other => return Err(anyhow!("unsupported serial baud rate {}", other)),
    };

    let fd = file.as_raw_fd();
    // SAFETY: `fd` is a valid open descriptor for the lifetime of `file`, and
    // `termios` is fully initialized by `tcgetattr` before it is read.
    unsafe {
        let mut termios: libc::termios = std::mem::zeroed();
        if libc::tcgetattr(fd, &mut termios) != 0 {
            log::debug!("{} is not a terminal; reading without line setup", port);
            return Ok(());
        }
        if libc::cfsetispeed(&mut termios, speed) != 0
            || libc::cfsetospeed(&mut termios, speed) != 0
            || libc::tcsetattr(fd, libc::TCSANOW, &termios) != 0
        {
            return Err(anyhow!(
                "failed to set {} baud on {}: {}",
                baud_rate,
                port,
                std::io::Error::last_os_error()
            ));
        }
    }
    Ok(())
}

/// Wait until `file` has data (or hangs up). `false` means the wait timed out.
#[cfg(target_os = "linux")]
fn wait_readable(file: &File, timeout: Duration) -> std::io::Result<bool> {
    use std::os::unix::io::AsRawFd;

    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let millis = remaining.as_millis().min(i32::MAX as u128) as libc::c_int;
        let mut fds = libc::pollfd {
            fd: file.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        };
        // SAFETY: `fds` points to exactly one initialized pollfd whose
        // descriptor stays open for the lifetime of `file`.
        let ready = unsafe { libc::poll(&mut fds, 1, millis) };
        if ready > 0 {
            return Ok(true);
        }
        if ready == 0 {
            return Ok(false);
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn wait_readable(_file: &File, _timeout: Duration) -> std::io::Result<bool> {
    Ok(true)
}

#[cfg(not(target_os = "linux"))]
fn configure_line(_file: &File, port: &str, baud_rate: u32) -> Result<()> {
    log::debug!(
        "{}: line speed {} not applied on this platform",
        port,
        baud_rate
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_gga_and_skips_other_sentences() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A"
        )?;
        writeln!(
            file,
            "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47"
        )?;
        let port = file.path().to_string_lossy().to_string();

        let mut gps = SerialGps::open(&port, 9600, Duration::from_millis(200))?;
        assert!(gps.read_location()?.is_none());
        let location = gps.read_location()?.expect("fix");
        assert_eq!(location.satellite_count, 8);
        assert_eq!(location.speed, 0.0);
        assert!(gps.read_location().is_err());
        Ok(())
    }

    #[test]
    fn missing_device_fails_to_open() {
        assert!(SerialGps::open("/nonexistent/ttyGPS", 9600, Duration::from_secs(1)).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn silent_receiver_times_out_then_delivers_sentence() -> Result<()> {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;
        use std::sync::mpsc;

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("ttyGPS");
        let c_path = CString::new(path.as_os_str().as_bytes())?;
        // SAFETY: `c_path` is a valid NUL-terminated path.
        assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) }, 0);

        let (send_line, line_requested) = mpsc::channel::<()>();
        let writer_path = path.clone();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            let mut fifo = File::options().write(true).open(writer_path)?;
            if line_requested.recv().is_ok() {
                // Split across two writes so the sentence arrives in pieces.
                fifo.write_all(b"$GPGGA,123519,4807.038,N,01131.000,E,")?;
                fifo.flush()?;
                std::thread::sleep(Duration::from_millis(50));
                fifo.write_all(b"1,08,0.9,545.4,M,46.9,M,,*47\n")?;
            }
            Ok(())
        });

        let port = path.to_string_lossy().to_string();
        let mut gps = SerialGps::open(&port, 9600, Duration::from_millis(200))?;

        let started = Instant::now();
        assert!(gps.read_location()?.is_none());
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(150), "waited {:?}", waited);
        assert!(waited < Duration::from_secs(2), "waited {:?}", waited);

        gps.timeout = Duration::from_secs(2);
        send_line.send(())?;
        let location = gps.read_location()?.expect("fix after silence");
        assert_eq!(location.satellite_count, 8);

        writer.join().expect("writer thread")?;
        Ok(())
    }
}
