//! Shared protocol constants for the p2pshare wire format

// Every connection starts with a fixed-width command code
pub const CODE_LEN: usize = 3;

// Unit of streaming and acknowledgment. Both peers must agree on it.
pub const CHUNK_SIZE: usize = 1024;

// Single-receive payloads (PUT destination, CWD/MKD paths)
pub const RECV_BUFFER_SIZE: usize = 4096;

pub const DEFAULT_PORT: u16 = 12345;

// 3-byte protocol signals
pub mod sentinel {
    pub const ACK: &[u8; 3] = b"ACK";
    pub const ERR: &[u8; 3] = b"ERR";
    // Terminates a LST stream
    pub const EOF: &[u8; 3] = b"EOF";
}

// Command codes of the built-in verbs
pub mod code {
    pub const GET: &[u8; 3] = b"GET";
    pub const PUT: &[u8; 3] = b"PUT";
    pub const LIST: &[u8; 3] = b"LST";
    pub const CHANGE_DIR: &[u8; 3] = b"CWD";
    pub const MAKE_DIR: &[u8; 3] = b"MKD";
    pub const PRINT_DIR: &[u8; 3] = b"PWD";
}

// Fixed field widths of the packet layouts
pub mod field {
    pub const FILENAME: usize = 128;
    pub const FILEHASH: usize = 64;
}

pub mod timeouts {
    // How often the accept loop re-checks the stop flag (ms)
    pub const ACCEPT_POLL_MS: u64 = 250;

    // Connection establishment timeout for clients (ms)
    pub const CONNECT_MS: u64 = 5_000;
}
