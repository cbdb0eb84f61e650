//! Network infrastructure for the gateway client.
//!
//! # Sub-modules
//!
//! - **`interface`** – Resolves the configured interface (a name such as
//!   `eth0`, or a literal IPv4 address) to the local address sockets bind to.
//!
//! - **`gateway`** – The [`gateway::Gateway`] handle and its command channel:
//!   one lazily opened UDP socket per gateway, one exchange in flight at a
//!   time, session-token caching and write-key derivation.
//!
//! - **`discovery`** – Multicasts `whois` and collects `iam` replies until a
//!   deadline.
//!
//! - **`listener`** – Joins the report multicast group and hands decoded
//!   reports from known gateways to a [`listener::ReportSink`].

pub mod discovery;
pub mod gateway;
pub mod interface;
pub mod listener;

/// Returns `true` for OS timeout / would-block errors raised by a socket
/// read timeout.
pub(crate) fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_timeout_error_recognises_timed_out() {
        // Arrange
        let e = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");

        // Act / Assert
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_recognises_would_block() {
        let e = std::io::Error::new(std::io::ErrorKind::WouldBlock, "would block");
        assert!(is_timeout_error(&e));
    }

    #[test]
    fn test_is_timeout_error_returns_false_for_other_errors() {
        let e = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(!is_timeout_error(&e));
    }
}
