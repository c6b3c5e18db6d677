use std::time::Duration;

use crate::value_objects::{ParticipantName, Timestamp};

/// 聊天室中的在线参与者。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Participant {
    pub name: ParticipantName,
    pub last_seen_at: Timestamp,
}

impl Participant {
    pub fn register(name: ParticipantName, now: Timestamp) -> Self {
        Self {
            name,
            last_seen_at: now,
        }
    }

    pub fn touch(&mut self, now: Timestamp) {
        self.last_seen_at = now;
    }

    /// `now - last_seen_at >= ttl` 时视为过期。
    pub fn is_expired(&self, now: Timestamp, ttl: Duration) -> bool {
        expiry_cutoff(now, ttl).is_some_and(|cutoff| self.last_seen_at <= cutoff)
    }
}

/// 过期判定的时间分界线，`last_seen_at` 不晚于该时间的参与者均已过期。
///
/// `ttl` 超出可表示的时间范围时返回 `None`，此时没有参与者过期。
pub fn expiry_cutoff(now: Timestamp, ttl: Duration) -> Option<Timestamp> {
    checked_before(now, ttl)
}

/// `now - span`，溢出时返回 `None`
pub(crate) fn checked_before(now: Timestamp, span: Duration) -> Option<Timestamp> {
    time::Duration::try_from(span)
        .ok()
        .and_then(|span| now.checked_sub(span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn alice(at: Timestamp) -> Participant {
        Participant::register(ParticipantName::parse("alice").unwrap(), at)
    }

    #[test]
    fn expires_exactly_at_ttl() {
        let joined = datetime!(2024-01-01 12:00:00 UTC);
        let participant = alice(joined);
        let ttl = Duration::from_secs(10);

        assert!(!participant.is_expired(joined + Duration::from_secs(9), ttl));
        assert!(participant.is_expired(joined + Duration::from_secs(10), ttl));
        assert!(participant.is_expired(joined + Duration::from_secs(30), ttl));
    }

    #[test]
    fn touch_postpones_expiry() {
        let joined = datetime!(2024-01-01 12:00:00 UTC);
        let mut participant = alice(joined);
        participant.touch(joined + Duration::from_secs(8));

        assert!(!participant.is_expired(joined + Duration::from_secs(12), Duration::from_secs(10)));
    }

    #[test]
    fn huge_ttl_never_expires() {
        let joined = datetime!(2024-01-01 12:00:00 UTC);
        let ttl = Duration::from_secs(400_000_000_000);

        assert_eq!(expiry_cutoff(joined, ttl), None);
        assert_eq!(expiry_cutoff(joined, Duration::MAX), None);
        assert!(!alice(joined).is_expired(joined + Duration::from_secs(60), ttl));
    }
}
