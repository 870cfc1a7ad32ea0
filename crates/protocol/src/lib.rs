//! Parser and formatter for the vehicle's ASCII line protocol.
//!
//! Lines are space-separated, `\n`-terminated ASCII. See `Message` for the
//! inbound variants and the `format_*` functions for outbound lines.

use thiserror::Error;
use types::{Complex, Contacts, Timestamp};

#[derive(Debug, Error, PartialEq)]
#[error("malformed {prefix} message, bad field {field:?}: {raw:?}")]
pub struct MalformedMessage {
    pub prefix: String,
    pub field: String,
    pub raw: String,
}

/// Vehicle-reported status, decoded from an `st` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusLine {
    pub remote_ts: Timestamp,
    pub x: f64,
    pub y: f64,
    pub yaw_deg: f64,
    pub sensor_deg: f64,
    pub distance_m: f64,
    pub left_pps: f64,
    pub right_pps: f64,
    pub contacts: Contacts,
    pub voltage: f64,
    pub can_fwd: bool,
    pub can_bwd: bool,
    pub imu_fail: bool,
    pub halted: bool,
    /// Front ultrasonic obstacle flag, independent of the contact bitmask.
    pub front_sensor: bool,
}

/// Legacy proxy sample, decoded from a `pr` line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProxyLine {
    pub remote_ts: Timestamp,
    pub rel_dir_deg: f64,
    pub distance_m: f64,
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

/// A `ck` clock-sync line. `recv_remote`/`xmit_remote` are present only on
/// the echoed reply, absent on the originating probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockLine {
    pub local_ts: Timestamp,
    pub recv_remote: Option<Timestamp>,
    pub xmit_remote: Option<Timestamp>,
}

/// A `cs` cycles-per-second diagnostic line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContactRateLine {
    pub remote_ts: Timestamp,
    pub cps: f64,
}

/// Every inbound message the vehicle can send.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message {
    Status(StatusLine),
    Proxy(ProxyLine),
    Clock(ClockLine),
    ContactRate(ContactRateLine),
}

/// Parse one line (without its trailing `\n`). Returns `Ok(None)` for
/// unrecognised prefixes — the caller logs and drops these.
pub fn parse(line: &str) -> Result<Option<Message>, MalformedMessage> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut fields = line.split(' ').filter(|f| !f.is_empty());
    let prefix = match fields.next() {
        Some(p) => p,
        None => return Ok(None),
    };
    let rest: Vec<&str> = fields.collect();

    match prefix {
        "st" => parse_status(&rest, line).map(|s| Some(Message::Status(s))),
        "pr" => parse_proxy(&rest, line).map(|p| Some(Message::Proxy(p))),
        "ck" => parse_clock(&rest, line).map(|c| Some(Message::Clock(c))),
        "cs" => parse_contact_rate(&rest, line).map(|c| Some(Message::ContactRate(c))),
        _ => Ok(None),
    }
}

fn field<T: std::str::FromStr>(
    fields: &[&str],
    idx: usize,
    name: &str,
    prefix: &str,
    raw: &str,
) -> Result<T, MalformedMessage> {
    fields
        .get(idx)
        .ok_or_else(|| MalformedMessage {
            prefix: prefix.to_string(),
            field: name.to_string(),
            raw: raw.to_string(),
        })?
        .parse::<T>()
        .map_err(|_| MalformedMessage {
            prefix: prefix.to_string(),
            field: name.to_string(),
            raw: raw.to_string(),
        })
}

fn bool_field(
    fields: &[&str],
    idx: usize,
    name: &str,
    prefix: &str,
    raw: &str,
) -> Result<bool, MalformedMessage> {
    let v: i64 = field(fields, idx, name, prefix, raw)?;
    Ok(v != 0)
}

fn parse_status(fields: &[&str], raw: &str) -> Result<StatusLine, MalformedMessage> {
    if fields.len() < 15 {
        return Err(MalformedMessage {
            prefix: "st".into(),
            field: "<arity>".into(),
            raw: raw.to_string(),
        });
    }
    let contacts_bits: u8 = field(fields, 8, "contacts", "st", raw)?;
    Ok(StatusLine {
        remote_ts: field(fields, 0, "remote_ts", "st", raw)?,
        x: field(fields, 1, "x", "st", raw)?,
        y: field(fields, 2, "y", "st", raw)?,
        yaw_deg: field(fields, 3, "yaw_deg", "st", raw)?,
        sensor_deg: field(fields, 4, "sensor_deg", "st", raw)?,
        distance_m: field(fields, 5, "distance_m", "st", raw)?,
        left_pps: field(fields, 6, "left_pps", "st", raw)?,
        right_pps: field(fields, 7, "right_pps", "st", raw)?,
        contacts: Contacts::from_bits_truncate(contacts_bits),
        voltage: field(fields, 9, "voltage", "st", raw)?,
        can_fwd: bool_field(fields, 10, "can_fwd", "st", raw)?,
        can_bwd: bool_field(fields, 11, "can_bwd", "st", raw)?,
        imu_fail: bool_field(fields, 12, "imu_fail", "st", raw)?,
        halted: bool_field(fields, 13, "halted", "st", raw)?,
        front_sensor: bool_field(fields, 14, "front_sensor", "st", raw)?,
    })
}

fn parse_proxy(fields: &[&str], raw: &str) -> Result<ProxyLine, MalformedMessage> {
    if fields.len() < 6 {
        return Err(MalformedMessage {
            prefix: "pr".into(),
            field: "<arity>".into(),
            raw: raw.to_string(),
        });
    }
    Ok(ProxyLine {
        remote_ts: field(fields, 0, "remote_ts", "pr", raw)?,
        rel_dir_deg: field(fields, 1, "rel_dir_deg", "pr", raw)?,
        distance_m: field(fields, 2, "distance_m", "pr", raw)?,
        x: field(fields, 3, "x", "pr", raw)?,
        y: field(fields, 4, "y", "pr", raw)?,
        heading_deg: field(fields, 5, "heading_deg", "pr", raw)?,
    })
}

fn parse_clock(fields: &[&str], raw: &str) -> Result<ClockLine, MalformedMessage> {
    if fields.is_empty() {
        return Err(MalformedMessage {
            prefix: "ck".into(),
            field: "<arity>".into(),
            raw: raw.to_string(),
        });
    }
    let local_ts = field(fields, 0, "local_ts", "ck", raw)?;
    if fields.len() == 1 {
        return Ok(ClockLine {
            local_ts,
            recv_remote: None,
            xmit_remote: None,
        });
    }
    if fields.len() < 3 {
        return Err(MalformedMessage {
            prefix: "ck".into(),
            field: "<arity>".into(),
            raw: raw.to_string(),
        });
    }
    Ok(ClockLine {
        local_ts,
        recv_remote: Some(field(fields, 1, "recv_remote", "ck", raw)?),
        xmit_remote: Some(field(fields, 2, "xmit_remote", "ck", raw)?),
    })
}

fn parse_contact_rate(fields: &[&str], raw: &str) -> Result<ContactRateLine, MalformedMessage> {
    if fields.len() < 2 {
        return Err(MalformedMessage {
            prefix: "cs".into(),
            field: "<arity>".into(),
            raw: raw.to_string(),
        });
    }
    Ok(ContactRateLine {
        remote_ts: field(fields, 0, "remote_ts", "cs", raw)?,
        cps: field(fields, 1, "cps", "cs", raw)?,
    })
}

/// Format an outbound `mv` motion command line (no trailing `\n`).
pub fn format_move(direction: Complex, speed_pps: f64) -> String {
    format!("mv {:.1} {:.1}", direction.to_deg(), speed_pps)
}

/// Format an outbound `sc` scan command line.
pub fn format_scan(sensor_direction: Complex) -> String {
    format!("sc {:.1}", sensor_direction.to_deg())
}

/// Format the outbound `al` halt command line.
pub fn format_halt() -> String {
    "al".to_string()
}

/// Format an outbound status-request (`sq`) line.
pub fn format_status_request(interval_ms: i64) -> String {
    format!("sq {interval_ms}")
}

/// Format an outbound clock probe (`ck`) line.
pub fn format_clock_probe(local_ts: Timestamp) -> String {
    format!("ck {local_ts}")
}
