//! Request routing and response bodies for the status responder.
//!
//! Socket handling lives in the firmware; everything here works on byte
//! slices so it can be exercised on the host.

use core::fmt::{self, Write};

use heapless::String;
use log::debug;

use crate::occupancy::OccupancySnapshot;
use crate::shared::SharedStatus;

pub const MAX_RESPONSE: usize = 256;

pub type Response = String<MAX_RESPONSE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Status,
    /// Locate request for a zero based spot index.
    Locate(usize),
    NotFound,
}

impl Route {
    /// Routes on the request line only; headers and body are ignored.
    pub fn parse(request: &[u8]) -> Self {
        let line_end = request
            .iter()
            .position(|b| *b == b'\r' || *b == b'\n')
            .unwrap_or(request.len());
        let Ok(line) = core::str::from_utf8(&request[..line_end]) else {
            return Route::NotFound;
        };

        let mut parts = line.split_ascii_whitespace();
        let (Some("GET"), Some(path)) = (parts.next(), parts.next()) else {
            return Route::NotFound;
        };
        let path = path.split('?').next().unwrap_or(path);

        match path {
            "/status" => Route::Status,
            "/locate1" => Route::Locate(0),
            "/locate2" => Route::Locate(1),
            _ => Route::NotFound,
        }
    }
}

/// Renders `{"spot1":{"occupied":..,"seconds":..},"spot2":{..}}`.
pub fn write_status_json<W: Write>(out: &mut W, snapshot: &OccupancySnapshot) -> fmt::Result {
    out.write_char('{')?;
    for (idx, spot) in snapshot.spots.iter().enumerate() {
        if idx > 0 {
            out.write_char(',')?;
        }
        write!(
            out,
            "\"spot{}\":{{\"occupied\":{},\"seconds\":{}}}",
            idx + 1,
            spot.occupied,
            spot.occupied_duration_seconds
        )?;
    }
    out.write_char('}')
}

/// Handles one request against the shared state and builds the full reply.
pub fn respond(request: &[u8], shared: &SharedStatus) -> Result<Response, fmt::Error> {
    let route = Route::parse(request);
    debug!("http {:?}", route);

    let mut out = Response::new();
    match route {
        Route::Status => {
            out.write_str("HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n")?;
            write_status_json(&mut out, &shared.snapshot())?;
        }
        Route::Locate(spot) => {
            shared.request_locate(spot);
            out.write_str("HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nOK")?;
        }
        Route::NotFound => {
            out.write_str("HTTP/1.1 404 Not Found\r\nConnection: close\r\n\r\n")?;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::occupancy::SpotSnapshot;

    #[test]
    fn routes_request_lines() {
        assert_eq!(Route::parse(b"GET /status HTTP/1.1\r\nHost: x\r\n\r\n"), Route::Status);
        assert_eq!(Route::parse(b"GET /locate1 HTTP/1.1\r\n"), Route::Locate(0));
        assert_eq!(Route::parse(b"GET /locate2?t=1 HTTP/1.1\r\n"), Route::Locate(1));
        assert_eq!(Route::parse(b"POST /locate1 HTTP/1.1\r\n"), Route::NotFound);
        assert_eq!(Route::parse(b"GET /locate3 HTTP/1.1\r\n"), Route::NotFound);
        assert_eq!(Route::parse(b""), Route::NotFound);
        assert_eq!(Route::parse(&[0xff, 0xfe]), Route::NotFound);
    }

    #[test]
    fn status_json_shape() {
        let snapshot = OccupancySnapshot {
            spots: [
                SpotSnapshot {
                    occupied: true,
                    occupied_duration_seconds: 75,
                },
                SpotSnapshot::default(),
            ],
        };
        let mut body: String<128> = String::new();
        write_status_json(&mut body, &snapshot).unwrap();
        assert_eq!(
            body.as_str(),
            r#"{"spot1":{"occupied":true,"seconds":75},"spot2":{"occupied":false,"seconds":0}}"#
        );
    }

    #[test]
    fn locate_route_sets_flag() {
        let shared = SharedStatus::new();
        let reply = respond(b"GET /locate2 HTTP/1.1\r\n\r\n", &shared).unwrap();
        assert!(reply.starts_with("HTTP/1.1 200 OK"));
        assert!(reply.ends_with("OK"));
        assert_eq!(shared.take_locate_requests(), [false, true]);
    }

    #[test]
    fn status_route_serves_published_snapshot() {
        let shared = SharedStatus::new();
        shared.publish(OccupancySnapshot {
            spots: [
                SpotSnapshot::default(),
                SpotSnapshot {
                    occupied: true,
                    occupied_duration_seconds: 4_294_967,
                },
            ],
        });
        let reply = respond(b"GET /status HTTP/1.1\r\n\r\n", &shared).unwrap();
        assert!(reply.contains("application/json"));
        assert!(reply.ends_with(r#""spot2":{"occupied":true,"seconds":4294967}}"#));
    }

    #[test]
    fn unknown_route_is_404_and_touches_nothing() {
        let shared = SharedStatus::new();
        let reply = respond(b"GET / HTTP/1.1\r\n\r\n", &shared).unwrap();
        assert!(reply.starts_with("HTTP/1.1 404"));
        assert_eq!(shared.take_locate_requests(), [false, false]);
    }
}
