//! Time code parsing.
//!
//! Timecodes are counted from 1958-01-01 treated as a plain calendar instant, i.e., no
//! leap-second adjustment is applied when converting to calendar or Unix time.
//!
//! Reference: [CCSDS Time Code Formats](https://public.ccsds.org/Pubs/301x0b4e1.pdf)
use std::fmt::Display;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::prelude::*;

/// Seconds from the Unix epoch (1970) to the CCSDS epoch (1958).
pub const EPOCH_UNIX_OFFSET: i64 = -378_691_200;

const NANOS_PER_SEC: u64 = 1_000_000_000;
const NANOS_PER_DAY: u64 = 86_400 * NANOS_PER_SEC;

/// Supported timecode formats.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Format {
    /// [Cds]
    Cds,
    /// [EosCuc]
    EosCuc,
}

impl Format {
    /// Number of bytes required to decode this format.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        match self {
            Format::Cds => Cds::LEN,
            Format::EosCuc => EosCuc::LEN,
        }
    }
}

fn check_len(buf: &[u8], minimum: usize) -> Result<()> {
    if buf.len() < minimum {
        return Err(Error::Timecode {
            actual: buf.len(),
            minimum,
        });
    }
    Ok(())
}

/// CCSDS Day-Segmented timecode with 2 bytes of days, 4 bytes of milliseconds of day and
/// 2 bytes of microseconds of millisecond, followed by 1 reserved byte.
///
/// The reserved byte is kept so the timecode can be re-encoded as it was received. It
/// plays no part in the time value.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cds {
    pub days: u16,
    pub millis: u32,
    pub micros: u16,
    pub reserved: u8,
}

impl Cds {
    pub const LEN: usize = 9;

    /// # Errors
    /// [Error::Timecode] if `buf` is shorter than [Cds::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, Self::LEN)?;
        Ok(Cds {
            days: u16::from_be_bytes([buf[0], buf[1]]),
            millis: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            micros: u16::from_be_bytes([buf[6], buf[7]]),
            reserved: buf[8],
        })
    }

    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let [d0, d1] = self.days.to_be_bytes();
        let [m0, m1, m2, m3] = self.millis.to_be_bytes();
        let [u0, u1] = self.micros.to_be_bytes();
        [d0, d1, m0, m1, m2, m3, u0, u1, self.reserved]
    }

    #[must_use]
    pub fn nanos_since_epoch(&self) -> u64 {
        u64::from(self.days) * NANOS_PER_DAY
            + u64::from(self.millis) * 1_000_000
            + u64::from(self.micros) * 1_000
    }
}

/// NASA EOS (Terra/Aqua) unsegmented timecode: a 2 byte P-field, 4 bytes of seconds and
/// 2 bytes of fine time with a resolution of 15.2 microseconds.
///
/// The second P-field byte carries the number of leap seconds, which is available via
/// [EosCuc::leap_seconds] but not applied.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct EosCuc {
    pub pfield: [u8; 2],
    pub coarse: u32,
    pub fine: u16,
}

impl EosCuc {
    pub const LEN: usize = 8;
    /// Nanoseconds per unit of fine time
    pub const FINE_NANOS: u64 = 15_200;

    /// # Errors
    /// [Error::Timecode] if `buf` is shorter than [EosCuc::LEN].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        check_len(buf, Self::LEN)?;
        Ok(EosCuc {
            pfield: [buf[0], buf[1]],
            coarse: u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]),
            fine: u16::from_be_bytes([buf[6], buf[7]]),
        })
    }

    #[must_use]
    pub fn leap_seconds(&self) -> u8 {
        self.pfield[1]
    }

    #[must_use]
    pub fn nanos_since_epoch(&self) -> u64 {
        u64::from(self.coarse) * NANOS_PER_SEC + u64::from(self.fine) * Self::FINE_NANOS
    }
}

/// A decoded timecode.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timecode {
    Cds(Cds),
    EosCuc(EosCuc),
}

impl Timecode {
    #[must_use]
    pub fn format(&self) -> Format {
        match self {
            Timecode::Cds(_) => Format::Cds,
            Timecode::EosCuc(_) => Format::EosCuc,
        }
    }

    /// Nanoseconds since 1958-01-01.
    #[must_use]
    pub fn nanos_since_epoch(&self) -> u64 {
        match self {
            Timecode::Cds(cds) => cds.nanos_since_epoch(),
            Timecode::EosCuc(cuc) => cuc.nanos_since_epoch(),
        }
    }

    /// Nanoseconds since the Unix epoch. Every representable timecode fits in an i64.
    #[must_use]
    pub fn unix_nanos(&self) -> i64 {
        // max nanos is 65535 days, well below i64::MAX
        self.nanos_since_epoch() as i64 + EPOCH_UNIX_OFFSET * NANOS_PER_SEC as i64
    }

    /// Seconds since the Unix epoch, exact to the microsecond.
    #[must_use]
    pub fn unix_seconds(&self) -> f64 {
        let nanos = self.unix_nanos();
        let micros = nanos.div_euclid(1_000);
        let sub_micros = nanos.rem_euclid(1_000);
        micros as f64 / 1e6 + sub_micros as f64 / 1e9
    }

    #[must_use]
    pub fn datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_nanos(self.unix_nanos())
    }
}

impl Display for Timecode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.datetime().format("%Y-%m-%dT%H:%M:%S%.9f UTC"))
    }
}

/// Decode a 9 byte CCSDS Day-Segmented timecode. See [Cds].
///
/// # Example
/// ```
/// use spacelink::timecode::decode_timecode;
///
/// let tc = decode_timecode(&[0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, 0xff]).unwrap();
/// assert_eq!(tc.to_string(), "2016-01-01T00:00:00.167219000 UTC");
/// assert_eq!(tc.unix_seconds(), 1451606400.167219);
/// ```
///
/// # Errors
/// [Error::Timecode] if there are fewer than 9 bytes.
pub fn decode_timecode(buf: &[u8]) -> Result<Timecode> {
    Ok(Timecode::Cds(Cds::decode(buf)?))
}

/// Decode `buf` as `format`.
///
/// # Errors
/// [Error::Timecode] if there is not enough data for the provided format.
pub fn decode(format: Format, buf: &[u8]) -> Result<Timecode> {
    match format {
        Format::Cds => decode_timecode(buf),
        Format::EosCuc => Ok(Timecode::EosCuc(EosCuc::decode(buf)?)),
    }
}

#[cfg(test)]
mod test {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn cds() {
        let buf = [0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, 0xff];

        let tc = decode_timecode(&buf).unwrap();

        assert_eq!(tc.unix_seconds(), 1451606400.167219);
        assert_eq!(tc.to_string(), "2016-01-01T00:00:00.167219000 UTC");
        let dt = tc.datetime();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2016, 1, 1));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
        assert_eq!(dt.timestamp_micros(), 1_451_606_400_167_219);
    }

    #[test]
    fn cds_2024() {
        let buf = [0x5f, 0x5b, 0x00, 0x00, 0x06, 0x94, 0x02, 0x07, 0x00];

        let tc = decode(Format::Cds, &buf).unwrap();

        assert_eq!(tc.to_string(), "2024-11-01T00:00:01.684519000 UTC");
    }

    #[test]
    fn cds_reencodes_reserved_byte() {
        for reserved in [0x00, 0x5a, 0xff] {
            let buf = [0x52, 0xc0, 0x0, 0x0, 0x0, 0xa7, 0x0, 0xdb, reserved];
            let Timecode::Cds(cds) = decode_timecode(&buf).unwrap() else {
                panic!("expected cds");
            };
            assert_eq!(cds.encode(), buf);
        }
    }

    #[test]
    fn cds_epoch() {
        let tc = decode_timecode(&[0u8; 9]).unwrap();

        assert_eq!(tc.unix_nanos(), EPOCH_UNIX_OFFSET * 1_000_000_000);
        assert_eq!(tc.to_string(), "1958-01-01T00:00:00.000000000 UTC");
    }

    #[test]
    fn eos_cuc() {
        // NASA EOS Spacecraft (BGAD) data
        let buf = [0xae, 0x25, 0x7d, 0xb5, 0xbf, 0x2f, 0x80, 0x1f];

        let tc = decode(Format::EosCuc, &buf).unwrap();

        assert_eq!(tc.format(), Format::EosCuc);
        assert_eq!(tc.to_string(), "2024-10-31T10:49:19.498544800 UTC");
        let Timecode::EosCuc(cuc) = tc else {
            panic!("expected eos cuc");
        };
        assert_eq!(cuc.leap_seconds(), 37);
    }

    #[test]
    fn short_input_is_err() {
        let zult = decode_timecode(&[0x52, 0xc0, 0x0]);
        assert!(matches!(
            zult,
            Err(Error::Timecode {
                actual: 3,
                minimum: 9
            })
        ));

        let zult = decode(Format::EosCuc, &[0u8; 7]);
        assert!(matches!(zult, Err(Error::Timecode { minimum: 8, .. })));
    }
}
