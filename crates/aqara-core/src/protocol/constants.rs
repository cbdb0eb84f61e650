//! Protocol constants.
//!
//! These values are fixed by the gateway firmware.  They are part of the wire
//! contract, not tunables.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

// ── Addresses and ports ───────────────────────────────────────────────────────

/// Multicast group shared by discovery and the report stream.
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 50);

/// Port the gateways listen on for `whois` queries.
pub const DISCOVERY_PORT: u16 = 4321;

/// Port the gateways multicast unsolicited reports to.
pub const REPORT_PORT: u16 = 9898;

/// Port of a gateway's point-to-point command channel.
pub const COMMAND_PORT: u16 = 9898;

/// Destination of the `whois` query.
pub const DISCOVERY_ADDR: SocketAddrV4 = SocketAddrV4::new(MULTICAST_GROUP, DISCOVERY_PORT);

/// Group/port the report listener joins.
pub const REPORT_ADDR: SocketAddrV4 = SocketAddrV4::new(MULTICAST_GROUP, REPORT_PORT);

// ── Key derivation ────────────────────────────────────────────────────────────

/// Initialization vector used by every write-key derivation.
///
/// Identical for all devices and all exchanges.
pub const AUTH_IV: [u8; 16] = [
    0x17, 0x99, 0x6d, 0x09, 0x3d, 0x28, 0xdd, 0xb3, 0xba, 0x69, 0x5a, 0x2e, 0x6f, 0x58, 0x56, 0x2e,
];

/// Required length of a gateway password, in bytes.
pub const AUTH_KEY_LEN: usize = 16;

// ── Sizes and timing ──────────────────────────────────────────────────────────

/// Receive buffer size for a single datagram.
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// How long discovery collects `iam` replies by default.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(1);

/// How long a command exchange waits for the gateway's reply by default.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

// ── Command names ─────────────────────────────────────────────────────────────

/// Values of the envelope's `cmd` field.
pub mod cmd {
    pub const WHOIS: &str = "whois";
    pub const IAM: &str = "iam";
    pub const GET_ID_LIST: &str = "get_id_list";
    pub const GET_ID_LIST_ACK: &str = "get_id_list_ack";
    pub const READ: &str = "read";
    pub const READ_ACK: &str = "read_ack";
    pub const WRITE: &str = "write";
    pub const WRITE_ACK: &str = "write_ack";
    pub const REPORT: &str = "report";
    pub const HEARTBEAT: &str = "heartbeat";
}

/// Payload field that carries the derived write key.
pub const KEY_FIELD: &str = "key";

/// Payload field a gateway uses to reject a request.
pub const ERROR_FIELD: &str = "error";
