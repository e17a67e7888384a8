pub mod cache;
pub mod ipc;
pub mod serial;
pub mod uplink;

#[cfg(feature = "zmq")]
pub mod zmq_pub;
