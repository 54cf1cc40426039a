//! Wake-handshake topic layout and payloads.

/// Payload asking the device to hold off deep sleep.
pub const WAKE_ON: &str = "ON";

/// Payload releasing the device back to its sleep cycle.
pub const WAKE_OFF: &str = "OFF";

/// Payload the device publishes once it is awake and holding.
pub const READY: &str = "READY";

/// Topic name builders for the wake handshake.
pub struct Topics;

impl Topics {
    /// Supervisor-side request topic (retained ON/OFF/empty payloads).
    pub fn request(prefix: &str, device: &str) -> String {
        format!("{}{}/ota-req", prefix, device)
    }

    /// Device-side answer topic (READY payload, best effort).
    pub fn ready(prefix: &str, device: &str) -> String {
        format!("{}{}/ota", prefix, device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_generation() {
        assert_eq!(Topics::request("home/", "pool-probe"), "home/pool-probe/ota-req");
        assert_eq!(Topics::ready("home/", "pool-probe"), "home/pool-probe/ota");
    }

    #[test]
    fn test_empty_prefix() {
        assert_eq!(Topics::request("", "dev"), "dev/ota-req");
    }
}
