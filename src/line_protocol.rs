//! Line-protocol encoding.
//!
//! Each [`Measurement`] becomes one record of the form
//! `name[,tag=value...] field=value[,field=value...] [timestamp]`, and a batch
//! is the concatenation of its records, each terminated by `\n`.

use crate::measurement::{FieldValue, Measurement};
use std::fmt::{self, Display, Formatter, Write};

/// Encodes measurements into a write payload, one newline-terminated record per
/// measurement, in iteration order.
///
/// Newlines inside names, keys and values are written as `\n`, so a record
/// never spans more than one line.
///
/// # Example
/// ```rust
/// use influx_line_client::{Measurement, line_protocol};
/// let payload = line_protocol::encode(&[
///     Measurement::new("cpu").tag("host", "a").field("value", 0.5),
///     Measurement::new("mem").field("used", 10).timestamp(3),
/// ]);
/// assert_eq!(payload, "cpu,host=a value=0.5\nmem used=10i 3\n");
/// ```
pub fn encode<'a, I>(measurements: I) -> String
where
    I: IntoIterator<Item = &'a Measurement>,
{
    let mut payload = String::new();
    for measurement in measurements {
        // Writing into a String cannot fail.
        let _ = writeln!(payload, "{measurement}");
    }
    payload
}

impl Display for Measurement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write_escaped(f, self.name(), &[',', ' '])?;

        for (key, value) in self.tags().iter().filter(|(_, v)| !v.is_empty()) {
            f.write_char(',')?;
            write_escaped(f, key, &[',', '=', ' '])?;
            f.write_char('=')?;
            write_escaped(f, value, &[',', '=', ' '])?;
        }

        for (i, (key, value)) in self.fields().iter().enumerate() {
            f.write_char(if i == 0 { ' ' } else { ',' })?;
            write_escaped(f, key, &[',', '=', ' '])?;
            f.write_char('=')?;
            write!(f, "{value}")?;
        }

        if let Some(timestamp) = self.get_timestamp() {
            write!(f, " {timestamp}")?;
        }
        Ok(())
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}i"),
            Self::UInteger(u) => write!(f, "{u}u"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => {
                f.write_char('"')?;
                write_escaped(f, s, &['"', '\\'])?;
                f.write_char('"')
            }
        }
    }
}

fn write_escaped(f: &mut Formatter<'_>, value: &str, special: &[char]) -> fmt::Result {
    for c in value.chars() {
        if c == '\n' {
            f.write_str("\\n")?;
            continue;
        }
        if special.contains(&c) {
            f.write_char('\\')?;
        }
        f.write_char(c)?;
    }
    Ok(())
}
