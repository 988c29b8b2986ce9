use std::collections::HashMap;
use std::env;
use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::OwnedFd;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::eval::{Executor, FatalError, Streams};
use crate::global::State;
use crate::session::{Flow, Session};

const ACCEPT_POLL: Duration = Duration::from_millis(100);

pub const WELCOME: &str = "\
Welcome to nsh.
Type `help` for the command language, `quit` to leave.
";

pub const TIMED_OUT: &str = "connection timed out\n";

type Connections = Arc<Mutex<HashMap<u64, TcpStream>>>;

fn lock(connections: &Connections) -> MutexGuard<'_, HashMap<u64, TcpStream>> {
	// a poisoned map still holds valid sockets
	connections.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `[user@host:cwd]$ `
pub fn prompt() -> String {
	let user = env::var("USER").unwrap_or_else(|_| "nsh".to_owned());
	let host = nix::unistd::gethostname()
		.map(|name| name.to_string_lossy().into_owned())
		.unwrap_or_else(|_| "localhost".to_owned());
	let cwd = env::current_dir().map(|dir| dir.display().to_string()).unwrap_or_default();
	format!("[{}@{}:{}]$ ", user, host, cwd)
}

pub struct Server {
	listener: TcpListener,
	state: State,
	idle_timeout: Option<Duration>,
	connections: Connections,
}

impl Server {
	pub fn bind(config: &ServerConfig, state: State) -> Result<Server> {
		let listener = TcpListener::bind((config.host.as_str(), config.port))
			.with_context(|| format!("cannot listen on {}:{}", config.host, config.port))?;
		listener.set_nonblocking(true).context("cannot make the listener non-blocking")?;
		Ok(Server {
			listener: listener,
			state: state,
			idle_timeout: config.idle_timeout,
			connections: Arc::default(),
		})
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	/// Accepts connections until the running flag is cleared, then shuts
	/// down every open connection.
	pub fn serve(&self) -> Result<()> {
		info!(addr = %self.local_addr()?, "listening");
		let mut next_id = 0u64;
		while self.state.is_running() {
			match self.listener.accept() {
				Ok((stream, peer)) => {
					if let Err(e) = self.start_session(next_id, stream, peer) {
						warn!(%peer, error = %format!("{:#}", e), "cannot start session");
					}
					next_id += 1;
				},
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {},
				Err(e) => warn!(error = %e, "cannot accept connection"),
			}
		}

		info!("shutting down");
		for (id, stream) in lock(&self.connections).drain() {
			debug!(id, "closing connection");
			let _ = stream.shutdown(Shutdown::Both);
		}
		Ok(())
	}

	fn start_session(&self, id: u64, stream: TcpStream, peer: SocketAddr) -> Result<()> {
		info!(id, %peer, "accepted connection");
		stream.set_nonblocking(false)?;
		lock(&self.connections).insert(id, stream.try_clone()?);

		let state = self.state.clone();
		let connections = Arc::clone(&self.connections);
		let idle_timeout = self.idle_timeout;
		let spawned = thread::Builder::new().name(format!("session-{}", id)).spawn(move || {
			match handle_client(stream, &state, idle_timeout) {
				Ok(()) => {},
				Err(e) if e.is::<FatalError>() => {
					error!(id, %peer, error = %e, "job table is unusable");
					std::process::exit(1);
				},
				Err(e) => warn!(id, %peer, error = %format!("{:#}", e), "session failed"),
			}
			lock(&connections).remove(&id);
			info!(id, %peer, "connection closed");
		});
		if let Err(e) = spawned {
			if let Some(stream) = lock(&self.connections).remove(&id) {
				let _ = stream.shutdown(Shutdown::Both);
			}
			return Err(e).context("cannot spawn session thread");
		}
		Ok(())
	}
}

fn session_streams(stream: &TcpStream) -> io::Result<Streams> {
	Ok(Streams {
		stdin: Some(OwnedFd::from(stream.try_clone()?)),
		stdout: Some(OwnedFd::from(stream.try_clone()?)),
		stderr: Some(OwnedFd::from(stream.try_clone()?)),
	})
}

/// Runs one session over `stream` until the client quits, disconnects or
/// stays idle past `idle_timeout`.
pub fn handle_client(stream: TcpStream, state: &State, idle_timeout: Option<Duration>) -> Result<()> {
	stream.set_read_timeout(idle_timeout)?;
	let executor = Executor::new(Arc::clone(&state.jobs)).streams(session_streams(&stream)?);
	let mut session = Session::new(executor);
	let mut out = stream.try_clone()?;
	let mut err = stream.try_clone()?;
	let mut reader = BufReader::new(stream);

	out.write_all(WELCOME.as_bytes())?;
	let mut line = String::new();
	while state.is_running() {
		out.write_all(prompt().as_bytes())?;
		out.flush()?;
		line.clear();
		match reader.read_line(&mut line) {
			Ok(0) => {
				debug!("client hung up");
				break;
			},
			Ok(_) => {},
			Err(ref e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
				info!("idle timeout");
				let _ = out.write_all(TIMED_OUT.as_bytes());
				break;
			},
			Err(e) => return Err(e).context("cannot read from client"),
		}

		let command = line.trim_end_matches(&['\r', '\n'][..]);
		info!(command, "received");
		match session.run_line(command, &mut out, &mut err)? {
			Flow::Continue => {},
			Flow::Quit => break,
			Flow::Halt => {
				info!("halt requested");
				state.halt();
				break;
			},
		}
	}
	let _ = out.shutdown(Shutdown::Both);
	Ok(())
}
