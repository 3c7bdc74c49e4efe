//! Sensor notification payload formats.
//!
//! The Mijia sensor pushes its measurement as ASCII text, e.g.
//! `T=23.5 H=41.0\0`. Two ways of reading that text exist in the wild, each
//! exposed as a [`PayloadParser`] so a reader can be built with either.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/// Turns a raw notification payload into `(temperature, humidity)`.
pub trait PayloadParser: Send + Sync {
    /// Parse one payload.
    fn parse(&self, payload: &[u8]) -> Result<(f64, f64)>;
}

fn text_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^T=(-?[0-9]+(?:\.[0-9]+)?)\s+H=(-?[0-9]+(?:\.[0-9]+)?)")
            .expect("payload pattern is a valid regex")
    })
}

fn parse_float(text: &str, field: &str) -> Result<f64> {
    text.trim()
        .parse::<f64>()
        .map_err(|_| Error::parse(format!("{} is not a number: {:?}", field, text)))
}

/// Parses a payload starting with `T=<float> H=<float>`, ignoring anything
/// after the humidity.
///
/// This is the default format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextPayloadParser;

impl PayloadParser for TextPayloadParser {
    fn parse(&self, payload: &[u8]) -> Result<(f64, f64)> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| Error::parse(format!("payload is not UTF-8: {}", e)))?;

        let captures = text_pattern()
            .captures(text)
            .ok_or_else(|| Error::parse(format!("no T=/H= fields in {:?}", text)))?;

        match (captures.get(1), captures.get(2)) {
            (Some(temperature), Some(humidity)) => Ok((
                parse_float(temperature.as_str(), "temperature")?,
                parse_float(humidity.as_str(), "humidity")?,
            )),
            _ => Err(Error::parse(format!(
                "expected two numeric fields in {:?}",
                text
            ))),
        }
    }
}

/// Parses the temperature from bytes `2..6` and the humidity from `9..13`.
///
/// Historical format, only correct when both values are exactly four
/// characters wide (e.g. `23.5`, `41.0`).
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOffsetPayloadParser;

impl FixedOffsetPayloadParser {
    const TEMPERATURE: std::ops::Range<usize> = 2..6;
    const HUMIDITY: std::ops::Range<usize> = 9..13;

    fn field<'a>(payload: &'a [u8], range: std::ops::Range<usize>, name: &str) -> Result<&'a str> {
        let bytes = payload.get(range.clone()).ok_or_else(|| {
            Error::parse(format!(
                "payload of {} bytes has no {} at {:?}",
                payload.len(),
                name,
                range
            ))
        })?;

        std::str::from_utf8(bytes)
            .map_err(|_| Error::parse(format!("{} at {:?} is not text", name, range)))
    }
}

impl PayloadParser for FixedOffsetPayloadParser {
    fn parse(&self, payload: &[u8]) -> Result<(f64, f64)> {
        let temperature = Self::field(payload, Self::TEMPERATURE, "temperature")?;
        let humidity = Self::field(payload, Self::HUMIDITY, "humidity")?;

        Ok((
            parse_float(temperature, "temperature")?,
            parse_float(humidity, "humidity")?,
        ))
    }
}

/// Adapts a closure into a [`PayloadParser`].
#[derive(Clone)]
pub struct FnPayloadParser<F>(F);

impl<F> FnPayloadParser<F>
where
    F: Fn(&[u8]) -> Result<(f64, f64)> + Send + Sync,
{
    /// Wrap `parse`.
    pub fn new(parse: F) -> Self {
        Self(parse)
    }
}

impl<F> PayloadParser for FnPayloadParser<F>
where
    F: Fn(&[u8]) -> Result<(f64, f64)> + Send + Sync,
{
    fn parse(&self, payload: &[u8]) -> Result<(f64, f64)> {
        (self.0)(payload)
    }
}

impl<P: PayloadParser + ?Sized> PayloadParser for Box<P> {
    fn parse(&self, payload: &[u8]) -> Result<(f64, f64)> {
        (**self).parse(payload)
    }
}

/// Decode a battery level read.
///
/// An empty read is reported by some sensors right after boot and counts as
/// 0%. Otherwise the first byte is the percentage.
pub fn decode_battery_level(data: &[u8]) -> Result<u8> {
    match data.first() {
        None => Ok(0),
        Some(&level) if level <= 100 => Ok(level),
        Some(&level) => Err(Error::io(format!(
            "battery level {} out of range 0-100",
            level
        ))),
    }
}
