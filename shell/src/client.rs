use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::config::ClientConfig;

/// Typed alone on a line, ends the relay without forwarding the line.
pub const EXIT: &str = "exit";

/// Relays `input` lines to the server on a writer thread and copies
/// everything the server sends to `output` until either side closes.
pub fn relay<R, W>(stream: TcpStream, input: R, output: &mut W) -> Result<()>
where R: BufRead + Send + 'static, W: Write {
	let mut writer = stream.try_clone().context("cannot clone connection")?;
	thread::Builder::new().name("relay".into()).spawn(move || -> io::Result<()> {
		for line in input.lines() {
			let line = line?;
			if line.trim() == EXIT {
				debug!("relay stopped by user");
				return writer.shutdown(Shutdown::Both);
			}
			writer.write_all(line.as_bytes())?;
			writer.write_all(b"\n")?;
		}
		// let the server finish the session and close
		writer.shutdown(Shutdown::Write)
	}).context("cannot spawn relay thread")?;

	let mut reader = stream;
	let mut buf = [0u8; 4096];
	loop {
		let n = match reader.read(&mut buf) {
			Ok(n) => n,
			Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(e).context("cannot receive from server"),
		};
		if n == 0 {
			break;
		}
		output.write_all(&buf[.. n])?;
		output.flush()?;
	}
	Ok(())
}

pub fn run(config: &ClientConfig) -> Result<()> {
	let stream = TcpStream::connect((config.host.as_str(), config.port))
		.with_context(|| format!("cannot connect to {}:{}", config.host, config.port))?;
	info!(host = %config.host, port = config.port, "connected");
	relay(stream, BufReader::new(io::stdin()), &mut io::stdout())?;
	info!("disconnected");
	Ok(())
}
