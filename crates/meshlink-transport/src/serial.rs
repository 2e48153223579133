use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::flow::FlowControl;
use crate::traits::ByteChannel;

/// Line settings for a serial radio.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Baud rate. Default: 9600 (radio factory setting).
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { baud_rate: 9600 }
    }
}

/// State shared by every handle onto one tty.
struct Line {
    path: PathBuf,
    flow: AtomicU8,
    shut_down: AtomicBool,
}

/// A radio attached to a serial tty.
///
/// The line is put into raw 8N1 mode on open. Timeouts are implemented with
/// `poll(2)` per handle, so the reading thread and writing callers can use
/// different timeouts. Termios only has a single RTS/CTS switch: any non-empty
/// [`FlowControl`] mask enables it.
pub struct SerialChannel {
    file: File,
    line: Arc<Line>,
    read_timeout: Mutex<Option<Duration>>,
    write_timeout: Mutex<Option<Duration>>,
}

impl SerialChannel {
    /// Open a tty with default line settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_config(path, &SerialConfig::default())
    }

    /// Open a tty with explicit line settings.
    pub fn open_with_config(path: impl AsRef<Path>, config: &SerialConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let speed = baud_to_speed(config.baud_rate)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY)
            .open(&path)
            .map_err(|source| TransportError::Open {
                path: path.clone(),
                source,
            })?;

        let fd = file.as_raw_fd();
        let mut tio = get_termios(fd)?;
        // SAFETY: `tio` is a valid, initialized termios obtained from tcgetattr.
        unsafe {
            libc::cfmakeraw(&mut tio);
            if libc::cfsetispeed(&mut tio, speed) != 0 || libc::cfsetospeed(&mut tio, speed) != 0 {
                return Err(TransportError::Configure {
                    what: "baud rate",
                    source: std::io::Error::last_os_error(),
                });
            }
        }
        tio.c_cflag |= libc::CLOCAL | libc::CREAD;
        tio.c_cflag &= !libc::CRTSCTS;
        tio.c_cc[libc::VMIN] = 1;
        tio.c_cc[libc::VTIME] = 0;
        set_termios(fd, &tio, "line settings")?;

        info!(path = %path.display(), baud = config.baud_rate, "opened serial radio");

        Ok(Self {
            file,
            line: Arc::new(Line {
                path,
                flow: AtomicU8::new(FlowControl::NONE.bits()),
                shut_down: AtomicBool::new(false),
            }),
            read_timeout: Mutex::new(None),
            write_timeout: Mutex::new(None),
        })
    }

    /// Device path this channel was opened on.
    pub fn path(&self) -> &Path {
        &self.line.path
    }

    fn fd(&self) -> RawFd {
        self.file.as_raw_fd()
    }

    fn is_shut_down(&self) -> bool {
        self.line.shut_down.load(Ordering::SeqCst)
    }
}

impl Read for SerialChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.is_shut_down() {
            return Ok(0);
        }
        let timeout = *self
            .read_timeout
            .lock()
            .map_err(|_| std::io::Error::other("serial read timeout lock poisoned"))?;
        if let Some(timeout) = timeout {
            wait_ready(self.fd(), libc::POLLIN, timeout)?;
            if self.is_shut_down() {
                return Ok(0);
            }
        }
        self.file.read(buf)
    }
}

impl Write for SerialChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.is_shut_down() {
            return Err(std::io::Error::from(ErrorKind::BrokenPipe));
        }
        let timeout = *self
            .write_timeout
            .lock()
            .map_err(|_| std::io::Error::other("serial write timeout lock poisoned"))?;
        if let Some(timeout) = timeout {
            wait_ready(self.fd(), libc::POLLOUT, timeout)?;
        }
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

impl ByteChannel for SerialChannel {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let mut slot = self
            .read_timeout
            .lock()
            .map_err(|_| std::io::Error::other("serial read timeout lock poisoned"))?;
        *slot = timeout;
        Ok(())
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        let mut slot = self
            .write_timeout
            .lock()
            .map_err(|_| std::io::Error::other("serial write timeout lock poisoned"))?;
        *slot = timeout;
        Ok(())
    }

    fn set_flow_control(&self, mask: FlowControl) -> Result<()> {
        let fd = self.fd();
        let mut tio = get_termios(fd)?;
        if mask.is_empty() {
            tio.c_cflag &= !libc::CRTSCTS;
        } else {
            tio.c_cflag |= libc::CRTSCTS;
        }
        set_termios(fd, &tio, "flow control")?;
        self.line.flow.store(mask.bits(), Ordering::SeqCst);
        debug!(path = %self.line.path.display(), flow = %mask, "applied flow control");
        Ok(())
    }

    fn flow_control(&self) -> FlowControl {
        FlowControl::from_bits_truncate(self.line.flow.load(Ordering::SeqCst))
    }

    fn drain_input(&mut self) -> Result<usize> {
        // SAFETY: `fd` is an open tty descriptor owned by `self.file`.
        let rc = unsafe { libc::tcflush(self.fd(), libc::TCIFLUSH) };
        if rc != 0 {
            return Err(TransportError::Configure {
                what: "input flush",
                source: std::io::Error::last_os_error(),
            });
        }
        // tcflush does not report how much it discarded.
        Ok(0)
    }

    fn try_clone_channel(&self) -> Result<Box<dyn ByteChannel>> {
        let file = self.file.try_clone()?;
        let read_timeout = *self
            .read_timeout
            .lock()
            .map_err(|_| std::io::Error::other("serial read timeout lock poisoned"))?;
        let write_timeout = *self
            .write_timeout
            .lock()
            .map_err(|_| std::io::Error::other("serial write timeout lock poisoned"))?;
        Ok(Box::new(SerialChannel {
            file,
            line: Arc::clone(&self.line),
            read_timeout: Mutex::new(read_timeout),
            write_timeout: Mutex::new(write_timeout),
        }))
    }

    fn shutdown(&self) -> Result<()> {
        self.line.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for SerialChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialChannel")
            .field("path", &self.line.path)
            .field("flow", &self.flow_control())
            .finish()
    }
}

fn get_termios(fd: RawFd) -> Result<libc::termios> {
    // SAFETY: termios is plain old data; tcgetattr fully initializes it on success.
    let mut tio: libc::termios = unsafe { std::mem::zeroed() };
    // SAFETY: `fd` is an open descriptor and `tio` is a valid writable termios.
    let rc = unsafe { libc::tcgetattr(fd, &mut tio) };
    if rc != 0 {
        return Err(TransportError::Configure {
            what: "terminal attributes",
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(tio)
}

fn set_termios(fd: RawFd, tio: &libc::termios, what: &'static str) -> Result<()> {
    // SAFETY: `fd` is an open descriptor and `tio` points to a valid termios.
    let rc = unsafe { libc::tcsetattr(fd, libc::TCSANOW, tio) };
    if rc != 0 {
        return Err(TransportError::Configure {
            what,
            source: std::io::Error::last_os_error(),
        });
    }
    Ok(())
}

fn wait_ready(fd: RawFd, events: libc::c_short, timeout: Duration) -> std::io::Result<()> {
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        // SAFETY: `pfd` is a valid pollfd and the count matches.
        let rc = unsafe { libc::poll(&mut pfd, 1, millis) };
        if rc > 0 {
            return Ok(());
        }
        if rc == 0 {
            return Err(std::io::Error::from(ErrorKind::TimedOut));
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

fn baud_to_speed(baud: u32) -> Result<libc::speed_t> {
    let speed = match baud {
        1200 => libc::B1200,
        2400 => libc::B2400,
        4800 => libc::B4800,
        9600 => libc::B9600,
        19200 => libc::B19200,
        38400 => libc::B38400,
        57600 => libc::B57600,
        115200 => libc::B115200,
        230400 => libc::B230400,
        other => return Err(TransportError::UnsupportedBaudRate(other)),
    };
    Ok(speed)
}
