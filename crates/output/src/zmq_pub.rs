// Copyright 2025-2026 CEMAXECUTER LLC

/// Topic frame prepended to every uplink document
pub const UPLINK_TOPIC: &str = "ais:";

/// ZMQ publisher for the JSON uplink.
/// Our PUB socket connects out; the collector's SUB socket binds.
pub struct ZmqPublisher {
    socket: zmq::Socket,
    _ctx: zmq::Context,
}

impl ZmqPublisher {
    pub fn new(endpoint: &str) -> Result<Self, String> {
        let ctx = zmq::Context::new();
        let socket = ctx
            .socket(zmq::PUB)
            .map_err(|e| format!("zmq PUB socket: {}", e))?;

        socket
            .set_sndhwm(100)
            .map_err(|e| format!("zmq set_sndhwm: {}", e))?;

        socket
            .connect(endpoint)
            .map_err(|e| format!("zmq connect to {}: {}", endpoint, e))?;

        log::info!("ZMQ PUB: connected to {}", endpoint);

        Ok(Self { socket, _ctx: ctx })
    }

    /// Publish a JSON document (multipart: topic, body). Drops when the
    /// high-water mark is reached.
    pub fn send_json(&self, doc: &str) {
        let _ = self.socket.send(UPLINK_TOPIC, zmq::DONTWAIT | zmq::SNDMORE);
        let _ = self.socket.send(doc.as_bytes(), zmq::DONTWAIT);
    }
}
