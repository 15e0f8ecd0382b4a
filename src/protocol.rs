//! Line-oriented sample protocol parser using nom.
//!
//! A datagram holds newline-delimited records of two shapes:
//!
//! ```text
//! service=srvA1;host=hostA                 shared labels
//! requests_total|c|12.345                  name|kind|value
//! latency_seconds|g|labelA=valueA|7.3      name|kind|labels|value
//! duration_ms|hl|3.3;2.0;5|17.3            name|kind|histdef|[labels|]value
//! ```
//!
//! Shared labels apply to every following sample record until another
//! shared-label record replaces them. Parsing is best effort: a record that
//! matches neither shape is skipped and never aborts the rest of the input.

use crate::core::types::parse_decimal;
use crate::core::{HistogramDef, Labels, Sample, SampleKind};
use nom::{
    bytes::complete::{take_while1, take_while_m_n},
    character::complete::char,
    combinator::{all_consuming, map, opt, recognize},
    multi::separated_list1,
    sequence::{separated_pair, terminated, tuple},
    IResult,
};

/// Parser state across the records of one input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    /// No shared labels seen yet
    Searching,
    /// A shared-label record is in effect
    InScope,
}

/// One record after syntactic parsing, borrowing from the line
#[derive(Debug, PartialEq)]
enum Record<'a> {
    SharedLabels(Vec<(&'a str, &'a str)>),
    Sample(SampleRecord<'a>),
}

#[derive(Debug, PartialEq)]
struct SampleRecord<'a> {
    name: &'a str,
    kind: &'a str,
    histogram_def: Option<(&'a str, &'a str, &'a str)>,
    labels: Vec<(&'a str, &'a str)>,
    value: &'a str,
}

/// Stateful parser for one input stream.
///
/// Shared labels live only as long as the parser, so each datagram gets a
/// fresh one.
#[derive(Debug)]
pub struct SampleParser {
    state: ParserState,
    shared_labels: Labels,
}

impl Default for SampleParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleParser {
    pub fn new() -> Self {
        Self {
            state: ParserState::Searching,
            shared_labels: Labels::new(),
        }
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn shared_labels(&self) -> &Labels {
        &self.shared_labels
    }

    /// Feed one line (without the newline). Returns a sample if the line was
    /// a well-formed sample record.
    pub fn feed_line(&mut self, line: &str) -> Option<Sample> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        match parse_record(line)? {
            Record::SharedLabels(pairs) => {
                self.shared_labels = pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                self.state = ParserState::InScope;
                None
            },
            Record::Sample(record) => self.build_sample(record),
        }
    }

    /// Parse every line of `input`, preserving order
    pub fn parse(&mut self, input: &[u8]) -> Vec<Sample> {
        input
            .split(|b| *b == b'\n')
            .filter_map(|line| std::str::from_utf8(line).ok())
            .filter_map(|line| self.feed_line(line))
            .collect()
    }

    fn build_sample(&self, record: SampleRecord<'_>) -> Option<Sample> {
        let kind = SampleKind::from_symbol(record.kind);

        let histogram_def = match (kind, record.histogram_def) {
            (SampleKind::HistogramLinear, Some((start, width, count))) => {
                Some(HistogramDef::new(start, width, count))
            },
            // a linear histogram cannot be built without its bucket layout
            (SampleKind::HistogramLinear, None) => return None,
            (_, _) => None,
        };

        let mut labels = self.shared_labels.clone();
        for (k, v) in record.labels {
            labels.insert(k.to_string(), v.to_string());
        }

        Some(Sample {
            name: record.name.to_string(),
            kind,
            labels,
            value: parse_decimal(record.value),
            histogram_def,
        })
    }
}

/// Parse a whole datagram into samples
pub fn parse_samples(input: &[u8]) -> Vec<Sample> {
    SampleParser::new().parse(input)
}

fn parse_record(line: &str) -> Option<Record<'_>> {
    if let Ok((_, pairs)) = all_consuming(label_list)(line) {
        return Some(Record::SharedLabels(pairs));
    }
    all_consuming(sample_record)(line)
        .ok()
        .map(|(_, record)| Record::Sample(record))
}

fn is_label_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric()
}

fn is_label_value_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.'
}

fn is_metric_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn is_numeric_char(c: char) -> bool {
    c.is_ascii_digit() || c == '.'
}

/// `key=value`
fn label(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(take_while1(is_label_key_char), char('='), take_while1(is_label_value_char))(
        input,
    )
}

/// `key=value;key=value...`
fn label_list(input: &str) -> IResult<&str, Vec<(&str, &str)>> {
    separated_list1(char(';'), label)(input)
}

fn numeric(input: &str) -> IResult<&str, &str> {
    take_while1(is_numeric_char)(input)
}

/// `start;width;count`
fn histogram_def(input: &str) -> IResult<&str, (&str, &str, &str)> {
    map(
        tuple((numeric, char(';'), numeric, char(';'), numeric)),
        |(start, _, width, _, count)| (start, width, count),
    )(input)
}

fn kind_symbol(input: &str) -> IResult<&str, &str> {
    recognize(take_while_m_n(1, 2, |c: char| c.is_ascii_lowercase()))(input)
}

/// `name|kind|[histdef|][labels|]value`
fn sample_record(input: &str) -> IResult<&str, SampleRecord<'_>> {
    map(
        tuple((
            terminated(take_while1(is_metric_name_char), char('|')),
            terminated(kind_symbol, char('|')),
            opt(terminated(histogram_def, char('|'))),
            opt(terminated(label_list, char('|'))),
            numeric,
        )),
        |(name, kind, histogram_def, labels, value)| SampleRecord {
            name,
            kind,
            histogram_def,
            labels: labels.unwrap_or_default(),
            value,
        },
    )(input)
}
