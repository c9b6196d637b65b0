//! Control Protocol Constants

// Control token that requests a full snapshot
pub const SYNC_TOKEN: &[u8] = b"sync";

// Token delimiter within a single read chunk
pub const TOKEN_DELIMITER: u8 = b' ';

// Receive buffer capacity per connection
pub const DEFAULT_BUFFER_SIZE: usize = 8192;

// Stub snapshot segment sizes
pub const DEFAULT_EXECUTION_BYTES: usize = 1024;
pub const DEFAULT_ORDERS_BYTES: usize = 13312;
pub const DEFAULT_POSITIONS_BYTES: usize = 8192;
pub const DEFAULT_SYNC_DONE_BYTES: usize = 24576;

// Stub snapshot fill bytes
pub const EXECUTION_FILL: u8 = b'E';
pub const ORDERS_FILL: u8 = b'O';
pub const POSITIONS_FILL: u8 = b'P';
pub const SYNC_DONE_FILL: u8 = b'C';
