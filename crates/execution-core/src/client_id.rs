//! Deterministic client order ids.
//!
//! Format: `{prefix}-{cycle}-{L|S}-{kind}{n}`, e.g. `hg-3fa9c1d2-L-tp4`.
//! The venue limits ids to 36 characters from `[.A-Z:/a-z0-9_-]`.

use model::PositionSide;
use uuid::Uuid;

/// Role of an order within a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRole {
    Entry,
    Stop,
    TakeProfit,
    Flatten,
}

impl OrderRole {
    fn tag(&self) -> &'static str {
        match self {
            Self::Entry => "en",
            Self::Stop => "sl",
            Self::TakeProfit => "tp",
            Self::Flatten => "fx",
        }
    }
}

/// Short random cycle identifier (8 hex chars).
pub fn new_cycle_id() -> String {
    Uuid::new_v4().as_simple().to_string()[..8].to_string()
}

pub fn client_order_id(
    prefix: &str,
    cycle_id: &str,
    side: PositionSide,
    role: OrderRole,
    seq: u32,
) -> String {
    format!(
        "{}-{}-{}-{}{}",
        prefix,
        cycle_id,
        side.tag(),
        role.tag(),
        seq
    )
}

/// Parsed form of an id built by [`client_order_id`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedClientId<'a> {
    pub cycle_id: &'a str,
    pub side: PositionSide,
    pub role: OrderRole,
    pub seq: u32,
}

/// Parse an id produced for `prefix`; foreign ids yield `None`.
pub fn parse_client_order_id<'a>(prefix: &str, id: &'a str) -> Option<ParsedClientId<'a>> {
    let rest = id.strip_prefix(prefix)?.strip_prefix('-')?;
    let mut parts = rest.splitn(3, '-');
    let cycle_id = parts.next()?;
    let side = match parts.next()? {
        "L" => PositionSide::Long,
        "S" => PositionSide::Short,
        _ => return None,
    };
    let tail = parts.next()?;
    if tail.len() < 3 {
        return None;
    }
    let (tag, seq) = tail.split_at(2);
    let role = match tag {
        "en" => OrderRole::Entry,
        "sl" => OrderRole::Stop,
        "tp" => OrderRole::TakeProfit,
        "fx" => OrderRole::Flatten,
        _ => return None,
    };
    Some(ParsedClientId {
        cycle_id,
        side,
        role,
        seq: seq.parse().ok()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let id = client_order_id("hg", "3fa9c1d2", PositionSide::Long, OrderRole::TakeProfit, 4);
        assert_eq!(id, "hg-3fa9c1d2-L-tp4");

        let parsed = parse_client_order_id("hg", &id).unwrap();
        assert_eq!(parsed.cycle_id, "3fa9c1d2");
        assert_eq!(parsed.side, PositionSide::Long);
        assert_eq!(parsed.role, OrderRole::TakeProfit);
        assert_eq!(parsed.seq, 4);
    }

    #[test]
    fn test_foreign_ids_rejected() {
        assert!(parse_client_order_id("hg", "web_abc123").is_none());
        assert!(parse_client_order_id("hg", "hg-3fa9c1d2-X-tp1").is_none());
        assert!(parse_client_order_id("hg", "hg-3fa9c1d2-L-zz1").is_none());
        assert!(parse_client_order_id("hg", "hgx-3fa9c1d2-L-tp1").is_none());
    }

    #[test]
    fn test_cycle_id_fits_venue_limit() {
        let cycle = new_cycle_id();
        assert_eq!(cycle.len(), 8);
        let id = client_order_id("hedgegrid", &cycle, PositionSide::Short, OrderRole::Stop, 999);
        assert!(id.len() <= 36);
    }
}
