// SPDX-FileCopyrightText: 2025-2026 The vperf contributors
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::TransportError;

/// Wildcard context id, accept connections from any peer
pub const VMADDR_CID_ANY: u32 = u32::MAX;

// sun_path is 108 bytes, one of them goes to the terminating NUL
const SUN_PATH_MAX: usize = 107;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Purpose {
    Listen,
    Dial,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    Vsock { cid: u32, port: u32 },
    // VSOCK emulated over AF_UNIX, as done by hypervisor vsock muxers
    UnixRendezvous { path: PathBuf, port: u32 },
}

impl Endpoint {
    #[must_use]
    pub fn port(&self) -> u32 {
        match self {
            Self::Vsock { port, .. } | Self::UnixRendezvous { port, .. } => *port,
        }
    }

    #[must_use]
    pub fn unix_path(&self) -> Option<&Path> {
        match self {
            Self::UnixRendezvous { path, .. } => Some(path.as_path()),
            Self::Vsock { .. } => None,
        }
    }

    #[must_use]
    pub fn is_unix(&self) -> bool {
        matches!(self, Self::UnixRendezvous { .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vsock { cid, port } => write!(f, "vsock:{cid}:{port}"),
            Self::UnixRendezvous { path, .. } => write!(f, "unix:{}", path.display()),
        }
    }
}

// Same acceptance as strtol(3) with a full match: leading C whitespace, an
// optional sign, then digits up to the end of the string
fn decimal_digits(spec: &str) -> Option<&str> {
    let number = spec.trim_start_matches([' ', '\t', '\n', '\x0b', '\x0c', '\r']);
    let digits = number.strip_prefix(['+', '-']).unwrap_or(number);
    (!digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())).then_some(number)
}

fn parse_cid(spec: &str, number: &str) -> Result<u32, TransportError> {
    let value: i64 = number
        .parse()
        .map_err(|_| TransportError::resolution(spec, "context id out of range"))?;
    if value == -1 {
        return Ok(VMADDR_CID_ANY);
    }
    u32::try_from(value).map_err(|_| TransportError::resolution(spec, "context id out of range"))
}

/// Map an endpoint string onto a VSOCK or Unix rendezvous address.
///
/// A string made only of decimal digits is a context id, anything else is the
/// path of a Unix rendezvous socket. Listening paths get a `_<port>` suffix, so
/// several listeners can share a base path.
///
/// # Errors
/// Return `Err` on missing dial target, out-of-range context id, or a path
/// too long for `sockaddr_un`
pub fn resolve(spec: Option<&str>, port: u32, purpose: Purpose) -> Result<Endpoint, TransportError> {
    let spec = match (spec.filter(|s| !s.is_empty()), purpose) {
        (Some(spec), _) => spec,
        (None, Purpose::Listen) => {
            return Ok(Endpoint::Vsock {
                cid: VMADDR_CID_ANY,
                port,
            });
        }
        (None, Purpose::Dial) => {
            return Err(TransportError::resolution(
                spec.unwrap_or_default(),
                "missing target",
            ));
        }
    };

    if let Some(number) = decimal_digits(spec) {
        let cid = parse_cid(spec, number)?;
        return Ok(Endpoint::Vsock { cid, port });
    }

    let path = match purpose {
        Purpose::Listen => format!("{spec}_{port}"),
        Purpose::Dial => spec.to_owned(),
    };
    if path.len() > SUN_PATH_MAX {
        return Err(TransportError::resolution(spec, "path too long for a unix socket"));
    }
    Ok(Endpoint::UnixRendezvous {
        path: PathBuf::from(path),
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use rstest::rstest;

    #[rstest]
    #[case("7", 7)]
    #[case("3", 3)]
    #[case("0", 0)]
    #[case("+42", 42)]
    #[case("4294967294", 4_294_967_294)]
    #[case("-1", VMADDR_CID_ANY)]
    #[case(" 7", 7)]
    #[case("\t\n3", 3)]
    fn decimal_strings_are_context_ids(#[case] spec: &str, #[case] cid: u32) {
        for purpose in [Purpose::Listen, Purpose::Dial] {
            let ep = resolve(Some(spec), 5201, purpose).unwrap();
            assert_eq!(ep, Endpoint::Vsock { cid, port: 5201 });
        }
    }

    #[rstest]
    #[case("-2")]
    #[case("4294967296")]
    #[case("99999999999999999999999")]
    fn out_of_range_context_ids_fail(#[case] spec: &str) {
        let err = resolve(Some(spec), 5201, Purpose::Dial).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AddressResolution);
    }

    #[rstest]
    #[case("/tmp/vm.sock")]
    #[case("vm.sock")]
    #[case("7a")]
    #[case("7 ")]
    #[case(" ")]
    #[case("-")]
    #[case(" +")]
    fn other_strings_are_paths(#[case] spec: &str) {
        let dial = resolve(Some(spec), 5201, Purpose::Dial).unwrap();
        assert_eq!(
            dial,
            Endpoint::UnixRendezvous {
                path: PathBuf::from(spec),
                port: 5201
            }
        );

        let listen = resolve(Some(spec), 5201, Purpose::Listen).unwrap();
        assert_eq!(
            listen.unix_path(),
            Some(Path::new(&format!("{spec}_5201")))
        );
    }

    #[test]
    fn scenario_from_documentation() {
        assert_eq!(
            resolve(Some("7"), 5201, Purpose::Dial).unwrap(),
            Endpoint::Vsock { cid: 7, port: 5201 }
        );
        assert_eq!(
            resolve(Some("/tmp/vm.sock"), 5201, Purpose::Dial)
                .unwrap()
                .unix_path(),
            Some(Path::new("/tmp/vm.sock"))
        );
        assert_eq!(
            resolve(Some("/tmp/vm.sock"), 5201, Purpose::Listen)
                .unwrap()
                .unix_path(),
            Some(Path::new("/tmp/vm.sock_5201"))
        );
    }

    #[test]
    fn absent_listen_address_is_wildcard() {
        let wildcard = Endpoint::Vsock {
            cid: VMADDR_CID_ANY,
            port: 5201,
        };
        assert_eq!(resolve(None, 5201, Purpose::Listen).unwrap(), wildcard);
        assert_eq!(resolve(Some(""), 5201, Purpose::Listen).unwrap(), wildcard);
    }

    #[test]
    fn absent_dial_target_fails() {
        for spec in [None, Some("")] {
            let err = resolve(spec, 5201, Purpose::Dial).unwrap_err();
            assert_eq!(err.code(), ErrorCode::AddressResolution);
        }
    }

    #[test]
    fn overlong_path_is_rejected() {
        let long = format!("/tmp/{}", "x".repeat(100));
        // fits for dialing, but not once the port suffix is appended
        assert!(resolve(Some(&long), 5201, Purpose::Dial).is_ok());
        let err = resolve(Some(&long), 5201, Purpose::Listen).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AddressResolution);
    }

    #[test]
    fn display_names_the_family() {
        let ep = resolve(Some("3"), 1024, Purpose::Dial).unwrap();
        assert_eq!(ep.to_string(), "vsock:3:1024");
        assert_eq!(ep.port(), 1024);
        assert!(!ep.is_unix());

        let ep = resolve(Some("/run/vm.sock"), 1024, Purpose::Dial).unwrap();
        assert_eq!(ep.to_string(), "unix:/run/vm.sock");
        assert!(ep.is_unix());
    }
}
