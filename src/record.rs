//! Line-oriented record format consumed by the downstream classifier.
//!
//! Every 8-channel reading becomes one line on stdout:
//!
//! ```text
//! _DATA_: <ch0> <ch1> <ch2> <ch3> <ch4> <ch5> <ch6> <ch7>\n
//! ```
//!
//! Sentinel token, a literal space, space-separated decimal integers,
//! newline-terminated. The consumer keys on the sentinel and takes the first
//! eight values, so a filtered notification (two packed readings) yields two
//! lines and a rectified notification yields one.

use std::io::{self, Write};

use crate::types::EmgSample;

/// Prefix marking a line as sample data for the consumer.
pub const DATA_SENTINEL: &str = "_DATA_:";

/// Write the record line(s) for one decoded sample.
pub fn write_sample<W: Write>(out: &mut W, sample: &EmgSample) -> io::Result<()> {
    match sample {
        EmgSample::Filtered { channels } => {
            write_line(out, channels[..8].iter().map(|&v| i32::from(v)))?;
            write_line(out, channels[8..].iter().map(|&v| i32::from(v)))
        }
        EmgSample::Rectified { channels, .. } => {
            write_line(out, channels.iter().map(|&v| i32::from(v)))
        }
    }
}

fn write_line<W: Write>(out: &mut W, values: impl Iterator<Item = i32>) -> io::Result<()> {
    write!(out, "{DATA_SENTINEL}")?;
    for value in values {
        write!(out, " {value}")?;
    }
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_sample_emits_two_lines() {
        let sample = EmgSample::Filtered {
            channels: [1, -2, 3, -4, 5, -6, 7, -8, 9, -10, 11, -12, 13, -14, 15, -16],
        };
        let mut buf = Vec::new();
        write_sample(&mut buf, &sample).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "_DATA_: 1 -2 3 -4 5 -6 7 -8\n_DATA_: 9 -10 11 -12 13 -14 15 -16\n"
        );
    }

    #[test]
    fn rectified_sample_emits_one_line() {
        let sample = EmgSample::Rectified {
            channels: [0, 1, 512, 65535, 4, 5, 6, 7],
            classifier_armed: true,
        };
        let mut buf = Vec::new();
        write_sample(&mut buf, &sample).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "_DATA_: 0 1 512 65535 4 5 6 7\n"
        );
    }
}
