//! # Stats Record
//!
//! Single-line text form of an aggregator, exchanged between processes:
//!
//! ```text
//! name,sequences,blocks_in,bytes_in,block_errors,sequence_errors,
//! send_bytes,send_blocks,inject_errors,queue_size,encode_time,send_time,
//! pkt_time,latency,rssi
//! ```
//!
//! Counters are decimal `u32`. Smoothed fields are printed like C `%g`
//! with 6 significant digits (`980`, `1.96`, `1.23457e+06`) and must be
//! finite on input: `nan`, `inf` and literals that overflow `f32` are
//! rejected. The name is not escaped and must not contain commas.

use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

/// Field names in wire order.
pub const FIELDS: [&str; 15] = [
    "name",
    "sequences",
    "blocks_in",
    "bytes_in",
    "block_errors",
    "sequence_errors",
    "send_bytes",
    "send_blocks",
    "inject_errors",
    "queue_size",
    "encode_time",
    "send_time",
    "pkt_time",
    "latency",
    "rssi",
];

/// Significant digits used for floating fields.
pub const FLOAT_PRECISION: usize = 6;

/// Decoded form of one stats record, in wire order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatsRecord {
    pub name: String,
    pub sequences: u32,
    pub blocks_in: u32,
    pub bytes_in: u32,
    pub block_errors: u32,
    pub sequence_errors: u32,
    pub send_bytes: u32,
    pub send_blocks: u32,
    pub inject_errors: u32,
    pub queue_size: f32,
    pub encode_time: f32,
    pub send_time: f32,
    pub pkt_time: f32,
    pub latency: f32,
    pub rssi: f32,
}

impl fmt::Display for StatsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            self.name,
            self.sequences,
            self.blocks_in,
            self.bytes_in,
            self.block_errors,
            self.sequence_errors,
            self.send_bytes,
            self.send_blocks,
            self.inject_errors,
            Significant(self.queue_size),
            Significant(self.encode_time),
            Significant(self.send_time),
            Significant(self.pkt_time),
            Significant(self.latency),
            Significant(self.rssi),
        )
    }
}

impl FromStr for StatsRecord {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != FIELDS.len() {
            return Err(StatsError::FieldCount {
                expected: FIELDS.len(),
                found: fields.len(),
            });
        }

        Ok(StatsRecord {
            name: fields[0].to_string(),
            sequences: parse_field(&fields, 1)?,
            blocks_in: parse_field(&fields, 2)?,
            bytes_in: parse_field(&fields, 3)?,
            block_errors: parse_field(&fields, 4)?,
            sequence_errors: parse_field(&fields, 5)?,
            send_bytes: parse_field(&fields, 6)?,
            send_blocks: parse_field(&fields, 7)?,
            inject_errors: parse_field(&fields, 8)?,
            queue_size: parse_finite(&fields, 9)?,
            encode_time: parse_finite(&fields, 10)?,
            send_time: parse_finite(&fields, 11)?,
            pkt_time: parse_finite(&fields, 12)?,
            latency: parse_finite(&fields, 13)?,
            rssi: parse_finite(&fields, 14)?,
        })
    }
}

fn parse_field<T: FromStr>(fields: &[&str], idx: usize) -> Result<T, StatsError> {
    let raw = fields[idx];
    raw.parse().map_err(|_| StatsError::InvalidField {
        field: FIELDS[idx],
        value: raw.to_string(),
    })
}

fn parse_finite(fields: &[&str], idx: usize) -> Result<f32, StatsError> {
    let v: f32 = parse_field(fields, idx)?;
    if !v.is_finite() {
        return Err(StatsError::InvalidField {
            field: FIELDS[idx],
            value: fields[idx].to_string(),
        });
    }
    Ok(v)
}

/// `%g`-style formatting with [`FLOAT_PRECISION`] significant digits.
///
/// Fixed notation when the decimal exponent lies in `-4..6`, scientific
/// (`d.ddddde±XX`) otherwise; trailing zeros are removed in both forms.
#[derive(Debug, Clone, Copy)]
pub struct Significant(pub f32);

impl fmt::Display for Significant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = self.0 as f64;
        if v.is_nan() {
            return f.write_str("nan");
        }
        if v.is_infinite() {
            return f.write_str(if v < 0.0 { "-inf" } else { "inf" });
        }
        if v == 0.0 {
            return f.write_str(if v.is_sign_negative() { "-0" } else { "0" });
        }

        // Round once in scientific form; the exponent after rounding
        // decides the notation (999999.5 prints as 1e+06).
        let sci = format!("{:.*e}", FLOAT_PRECISION - 1, v);
        let Some((mantissa, exp)) = sci.split_once('e') else {
            return f.write_str(&sci);
        };
        let Ok(exp) = exp.parse::<i32>() else {
            return f.write_str(&sci);
        };

        if exp < -4 || exp >= FLOAT_PRECISION as i32 {
            let sign = if exp < 0 { '-' } else { '+' };
            write!(f, "{}e{}{:02}", strip_zeros(mantissa), sign, exp.abs())
        } else {
            let decimals = (FLOAT_PRECISION as i32 - 1 - exp) as usize;
            let fixed = format!("{:.*}", decimals, v);
            f.write_str(strip_zeros(&fixed))
        }
    }
}

fn strip_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
