use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, warn};

use crate::commands::Command;

const MAX_COMMAND_BYTES: usize = 1024;
const ACCEPT_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("address {0} is already in use; is another tube-remote running?")]
    AddressInUse(String),
}

/// Accepts one command name per connection and forwards it to the dispatcher.
pub struct Listener {
    addr: SocketAddr,
    shutdown: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Listener {
    pub fn bind(listen_addr: &str, commands: Sender<Command>) -> Result<Self> {
        let listener = TcpListener::bind(listen_addr).map_err(|err| {
            if err.kind() == ErrorKind::AddrInUse {
                anyhow::Error::new(RemoteError::AddressInUse(listen_addr.to_string()))
            } else {
                anyhow::Error::new(err).context(format!("listen on {listen_addr}"))
            }
        })?;
        listener
            .set_nonblocking(true)
            .context("set command listener non-blocking")?;
        let addr = listener.local_addr().context("read listener address")?;

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let thread = thread::spawn(move || loop {
            if shutdown_rx.try_recv().is_ok() {
                break;
            }
            match listener.accept() {
                Ok((stream, peer)) => match read_command(stream) {
                    Ok(Some(command)) => {
                        debug!(%peer, %command, "command received");
                        if commands.send(command).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => warn!(%peer, error = %err, "ignoring command"),
                },
                Err(err) if err.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(err) => {
                    warn!(error = %err, "accepting command connection failed");
                    thread::sleep(ACCEPT_POLL);
                }
            }
        });

        Ok(Self {
            addr,
            shutdown: shutdown_tx,
            thread: Some(thread),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn close(&mut self) {
        let _ = self.shutdown.try_send(());
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.close();
    }
}

fn read_command(mut stream: TcpStream) -> Result<Option<Command>> {
    stream
        .set_nonblocking(false)
        .context("set command stream blocking")?;
    stream
        .set_read_timeout(Some(Duration::from_secs(1)))
        .context("set command read timeout")?;
    let mut buf = [0u8; MAX_COMMAND_BYTES];
    let read = stream.read(&mut buf).context("read command")?;
    if read == 0 {
        return Ok(None);
    }
    let name = std::str::from_utf8(&buf[..read]).context("command is not UTF-8")?;
    Ok(Some(name.parse::<Command>()?))
}

/// Sends a single command name to a running daemon.
pub fn send(listen_addr: &str, command: Command) -> Result<()> {
    let mut stream = TcpStream::connect(listen_addr)
        .with_context(|| format!("connect to tube-remote at {listen_addr}"))?;
    stream
        .write_all(command.as_str().as_bytes())
        .context("send command")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn commands_round_trip_through_the_socket() {
        let (tx, rx) = unbounded();
        let mut listener = Listener::bind("127.0.0.1:0", tx).unwrap();
        let addr = listener.local_addr().to_string();

        send(&addr, Command::NavigatorDown).unwrap();
        send(&addr, Command::SkipForward).unwrap();

        let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(first, Command::NavigatorDown);
        assert_eq!(second, Command::SkipForward);
        listener.close();
    }

    #[test]
    fn unknown_names_are_dropped() {
        let (tx, rx) = unbounded();
        let listener = Listener::bind("127.0.0.1:0", tx).unwrap();
        let mut stream = TcpStream::connect(listener.local_addr()).unwrap();
        stream.write_all(b"quality_up").unwrap();
        drop(stream);
        send(&listener.local_addr().to_string(), Command::Exit).unwrap();

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), Command::Exit);
    }

    #[test]
    fn second_bind_reports_address_in_use() {
        let (tx, _rx) = unbounded();
        let listener = Listener::bind("127.0.0.1:0", tx.clone()).unwrap();
        let err = Listener::bind(&listener.local_addr().to_string(), tx)
            .err()
            .unwrap();
        assert!(err.downcast_ref::<RemoteError>().is_some());
    }
}
