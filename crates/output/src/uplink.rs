// Copyright 2025-2026 CEMAXECUTER LLC

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::cache::{Position, SharedCache};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Granularity of the publisher thread's shutdown check
const POLL_STEP: Duration = Duration::from_millis(200);

#[derive(Serialize)]
struct Envelope<'a> {
    protocol: &'static str,
    encodetime: String,
    groups: Vec<Group<'a>>,
}

#[derive(Serialize)]
struct Group<'a> {
    path: Vec<PathEntry<'a>>,
    msgs: Vec<Msg>,
}

#[derive(Serialize)]
struct PathEntry<'a> {
    name: &'a str,
}

#[derive(Serialize)]
struct Msg {
    mmsi: u32,
    lat: f64,
    lon: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    course: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    heading: Option<u16>,
    rxtime: String,
}

fn timestamp(t: DateTime<Utc>) -> String {
    t.format("%Y%m%d%H%M%S").to_string()
}

/// Encode positions as one jsonais document.
pub fn encode_jsonais(station: &str, positions: &[Position], now: DateTime<Utc>) -> String {
    let msgs = positions
        .iter()
        .map(|p| Msg {
            mmsi: p.mmsi,
            lat: p.latitude,
            lon: p.longitude,
            course: p.course,
            speed: p.speed,
            heading: p.heading,
            rxtime: Utc
                .timestamp_opt(p.received_at, 0)
                .single()
                .map(timestamp)
                .unwrap_or_default(),
        })
        .collect();

    let env = Envelope {
        protocol: "jsonais",
        encodetime: timestamp(now),
        groups: vec![Group {
            path: vec![PathEntry { name: station }],
            msgs,
        }],
    };
    // Serializing plain structs cannot fail
    serde_json::to_string(&env).unwrap_or_default()
}

/// Where uplink documents go
enum Transport {
    /// Newline-delimited JSON over TCP, reconnecting on demand
    Tcp {
        addr: String,
        stream: Option<TcpStream>,
    },
    #[cfg(feature = "zmq")]
    Zmq(crate::zmq_pub::ZmqPublisher),
}

impl Transport {
    fn parse(url: &str) -> Result<Self, String> {
        if let Some(addr) = url.strip_prefix("tcp://") {
            if addr.rsplit_once(':').map_or(true, |(_, port)| port.parse::<u16>().is_err()) {
                return Err(format!("invalid uplink address: {} (expected tcp://host:port)", url));
            }
            return Ok(Transport::Tcp {
                addr: addr.to_string(),
                stream: None,
            });
        }
        if let Some(endpoint) = url.strip_prefix("zmq+") {
            #[cfg(feature = "zmq")]
            {
                return Ok(Transport::Zmq(crate::zmq_pub::ZmqPublisher::new(endpoint)?));
            }
            #[cfg(not(feature = "zmq"))]
            {
                return Err(format!(
                    "uplink {} needs zmq support (built without the zmq feature)",
                    endpoint
                ));
            }
        }
        Err(format!("unsupported uplink url: {}", url))
    }

    fn send(&mut self, doc: &str) -> Result<(), String> {
        match self {
            Transport::Tcp { addr, stream } => {
                if stream.is_none() {
                    let sock = addr
                        .to_socket_addrs()
                        .map_err(|e| format!("resolve {}: {}", addr, e))?
                        .next()
                        .ok_or_else(|| format!("no address for {}", addr))?;
                    let s = TcpStream::connect_timeout(&sock, CONNECT_TIMEOUT)
                        .map_err(|e| format!("connect to {}: {}", addr, e))?;
                    *stream = Some(s);
                }
                let result = match stream.as_mut() {
                    Some(s) => s
                        .write_all(doc.as_bytes())
                        .and_then(|_| s.write_all(b"\n"))
                        .map_err(|e| format!("write to {}: {}", addr, e)),
                    None => Ok(()),
                };
                if result.is_err() {
                    *stream = None;
                }
                result
            }
            #[cfg(feature = "zmq")]
            Transport::Zmq(publisher) => {
                publisher.send_json(doc);
                Ok(())
            }
        }
    }
}

/// Timed JSON uplink: a publisher thread drains the position cache every
/// `interval` and sends the result as one document.
pub struct JsonUplink {
    url: String,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl JsonUplink {
    pub fn init(
        url: &str,
        station: &str,
        interval: Duration,
        cache: SharedCache,
    ) -> Result<Self, String> {
        if interval.is_zero() {
            return Err("uplink interval must be nonzero".to_string());
        }
        let mut transport = Transport::parse(url)?;
        let running = Arc::new(AtomicBool::new(true));
        let running_bg = running.clone();
        let station = station.to_string();
        let url_bg = url.to_string();

        let handle = thread::Builder::new()
            .name("jsonout".to_string())
            .spawn(move || {
                let mut last_flush = Instant::now();
                while running_bg.load(Ordering::Relaxed) {
                    thread::sleep(POLL_STEP);
                    if last_flush.elapsed() < interval {
                        continue;
                    }
                    last_flush = Instant::now();

                    let now = Utc::now();
                    let positions = cache
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .drain(now.timestamp());
                    if positions.is_empty() {
                        continue;
                    }
                    let doc = encode_jsonais(&station, &positions, now);
                    match transport.send(&doc) {
                        Ok(()) => log::debug!(
                            "uplink: sent {} positions to {}",
                            positions.len(),
                            url_bg
                        ),
                        Err(e) => log::warn!("uplink: {}", e),
                    }
                }
                log::debug!("uplink thread exiting");
            })
            .map_err(|e| format!("uplink thread: {}", e))?;

        log::info!("JSON uplink to {} every {} s", url, interval.as_secs());
        Ok(Self {
            url: url.to_string(),
            running,
            handle: Some(handle),
        })
    }

    /// Stop the publisher thread. Returns false if already stopped.
    pub fn deinit(&mut self) -> bool {
        match self.handle.take() {
            Some(h) => {
                self.running.store(false, Ordering::Relaxed);
                let _ = h.join();
                log::debug!("uplink to {} stopped", self.url);
                true
            }
            None => false,
        }
    }
}

impl Drop for JsonUplink {
    fn drop(&mut self) {
        self.deinit();
    }
}
