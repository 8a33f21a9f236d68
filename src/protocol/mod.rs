//! Wire protocol shared by the server and the client driver.
//!
//! One exchange per TCP connection, strictly sequential:
//!
//! ```text
//! Client:  <size>\n
//! Server:  <exactly size bytes of payload>
//! Client:  <checksum hex>\n
//! Server:  OKOK | FAIL
//! ```
//!
//! The payload is not framed again: the client already knows how many bytes
//! it asked for. The checksum is XXH64 (seed 0) over the payload in the order
//! it crossed the wire, sent as the lowercase hex of its big-endian digest.
//!
//! ## Example
//!
//! ```text
//! Client:  3\n
//! Server:  \x8f\x02\x51
//! Client:  <16 hex digits of XXH64 over those 3 bytes>\n
//! Server:  OKOK
//! ```
//!
//! After the verdict either side closes the connection.

pub mod checksum;
pub mod codec;

pub use checksum::Checksum;
pub use codec::{
    encode_checksum_line, encode_size_line, parse_size_line, read_line, skip_line, Verdict,
    MAX_LINE_LENGTH, VERDICT_LEN,
};
