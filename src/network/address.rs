//! Canonical `host:port` normalization for peer and trusted node addresses.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};
use tracing::error;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
	#[error("empty address")]
	Empty,

	#[error("invalid host in address {0:?}")]
	InvalidHost(String),

	#[error("invalid port in address {0:?}")]
	InvalidPort(String),
}

/// Normalize `addr` to `host:port`, appending `default_port` when no port is given.
///
/// Hosts must be IP literals, `localhost`, or dotted DNS names.
pub fn normalize_address(addr: &str, default_port: u16) -> Result<String, AddressError> {
	let addr = addr.trim();
	if addr.is_empty() {
		return Err(AddressError::Empty);
	}

	if let Ok(socket) = addr.parse::<SocketAddr>() {
		return finish(socket.ip(), socket.port(), addr);
	}
	// Bare IPv6 literal without brackets.
	if let Ok(ip) = addr.parse::<Ipv6Addr>() {
		return finish(IpAddr::V6(ip), default_port, addr);
	}

	let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
		let (host, tail) = rest
			.split_once(']')
			.ok_or_else(|| AddressError::InvalidHost(addr.to_string()))?;
		let ip = host
			.parse::<Ipv6Addr>()
			.map_err(|_| AddressError::InvalidHost(addr.to_string()))?;
		let port = match tail {
			"" => default_port,
			tail => parse_port(tail.strip_prefix(':').unwrap_or(tail), addr)?,
		};
		return finish(IpAddr::V6(ip), port, addr);
	} else {
		match addr.rsplit_once(':') {
			Some((host, port)) => (host, parse_port(port, addr)?),
			None => (addr, default_port),
		}
	};

	if port == 0 {
		return Err(AddressError::InvalidPort(addr.to_string()));
	}
	if let Ok(ip) = host.parse::<IpAddr>() {
		return finish(ip, port, addr);
	}
	if !is_valid_hostname(host) {
		return Err(AddressError::InvalidHost(addr.to_string()));
	}
	Ok(format!("{}:{}", host.to_ascii_lowercase(), port))
}

/// Normalize a `;`-separated peer list, logging and dropping invalid entries.
pub fn normalize_peer_addresses(list: &str, default_port: u16) -> Vec<String> {
	let mut valid = Vec::new();
	for entry in list.split(';').map(str::trim).filter(|e| !e.is_empty()) {
		match normalize_address(entry, default_port) {
			Ok(address) => {
				if !valid.contains(&address) {
					valid.push(address);
				}
			}
			Err(e) => error!("SPV peer address invalid: {}", e),
		}
	}
	valid
}

fn finish(ip: IpAddr, port: u16, original: &str) -> Result<String, AddressError> {
	if port == 0 {
		return Err(AddressError::InvalidPort(original.to_string()));
	}
	Ok(SocketAddr::new(ip, port).to_string())
}

fn parse_port(port: &str, original: &str) -> Result<u16, AddressError> {
	port.parse::<u16>()
		.map_err(|_| AddressError::InvalidPort(original.to_string()))
}

fn is_valid_hostname(host: &str) -> bool {
	if host.eq_ignore_ascii_case("localhost") {
		return true;
	}
	if host.len() > 253 || !host.contains('.') {
		return false;
	}
	host.split('.').all(|label| {
		!label.is_empty()
			&& label.len() <= 63
			&& !label.starts_with('-')
			&& !label.ends_with('-')
			&& label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
	})
}
