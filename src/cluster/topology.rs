//! `CLUSTER SLOTS` reply parsing.
//!
//! The reply is an array of groups `[begin, end, [host, port, ...], ...]`.
//! Only the slot bounds and the first `[host, port]` pair (the master) are
//! used; replica entries and node ids are ignored.

use crate::proto::error::{Error, Result};
use crate::proto::frame::Reply;

/// A contiguous slot range served by one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    /// First slot of the range (inclusive).
    pub start: u16,
    /// Last slot of the range (inclusive).
    pub end: u16,
    /// The serving node as `host:port`.
    pub addr: String,
}

/// Parses a `CLUSTER SLOTS` reply into slot ranges.
pub fn parse_slots(reply: &Reply) -> Result<Vec<SlotRange>> {
    let groups = reply.as_array().ok_or_else(|| Error::Protocol {
        message: "CLUSTER SLOTS reply is not an array".to_string(),
    })?;

    let mut ranges = Vec::with_capacity(groups.len());
    for group in groups {
        ranges.push(parse_group(group)?);
    }
    Ok(ranges)
}

fn parse_group(group: &Reply) -> Result<SlotRange> {
    let items = group.as_array().ok_or_else(|| Error::Protocol {
        message: "CLUSTER SLOTS group is not an array".to_string(),
    })?;

    if items.len() < 3 {
        return Err(Error::Protocol {
            message: "CLUSTER SLOTS group is too short".to_string(),
        });
    }

    let start = slot_bound(&items[0])?;
    let end = slot_bound(&items[1])?;
    let addr = node_addr(&items[2])?;

    Ok(SlotRange { start, end, addr })
}

fn slot_bound(reply: &Reply) -> Result<u16> {
    match reply.as_int() {
        Some(k) if (0..16384).contains(&k) => Ok(k as u16),
        _ => Err(Error::Protocol {
            message: "invalid slot bound in CLUSTER SLOTS reply".to_string(),
        }),
    }
}

fn node_addr(reply: &Reply) -> Result<String> {
    let node = reply.as_array().ok_or_else(|| Error::Protocol {
        message: "CLUSTER SLOTS node is not an array".to_string(),
    })?;

    let host = node
        .first()
        .and_then(|r| r.as_bytes())
        .ok_or_else(|| Error::Protocol {
            message: "CLUSTER SLOTS node host missing".to_string(),
        })?;
    let port = node
        .get(1)
        .and_then(|r| r.as_int())
        .ok_or_else(|| Error::Protocol {
            message: "CLUSTER SLOTS node port missing".to_string(),
        })?;

    Ok(format!("{}:{}", String::from_utf8_lossy(host), port))
}
