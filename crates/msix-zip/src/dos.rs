//! MS-DOS date and time as stored in ZIP headers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DAYS_IN_MONTH: [u32; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

/// A DOS timestamp: two-second resolution, years 1980 to 2107, no zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    pub time: u16,
    pub date: u16,
}

impl Default for DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable instant.
    fn default() -> Self {
        Self {
            time: 0,
            date: (1 << 5) | 1,
        }
    }
}

impl DosDateTime {
    pub fn new(time: u16, date: u16) -> Self {
        Self { time, date }
    }

    /// The current time, read as UTC.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Convert a system time, read as UTC. Instants outside the DOS range
    /// are clamped to its ends.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = time.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
        let mut days = secs / 86400;
        let rem = secs % 86400;

        let mut year = 1970;
        loop {
            let len = if is_leap_year(year) { 366 } else { 365 };
            if days < len {
                break;
            }
            days -= len;
            year += 1;
        }

        if year < 1980 {
            return Self::default();
        }
        if year > 2107 {
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }

        let mut month = 1;
        while month < 12 {
            let len = days_in_month(year, month) as u64;
            if days < len {
                break;
            }
            days -= len;
            month += 1;
        }

        let hour = rem / 3600;
        let minute = (rem % 3600) / 60;
        let second = rem % 60;

        Self {
            time: ((hour << 11) | (minute << 5) | (second / 2)) as u16,
            date: (((year - 1980) << 9) as u64 | ((month as u64) << 5) | (days + 1)) as u16,
        }
    }

    /// Convert to a system time, read as UTC. Returns `None` for fields out
    /// of range.
    pub fn to_system_time(self) -> Option<SystemTime> {
        let year = 1980 + ((self.date >> 9) & 0x7F) as i32;
        let month = ((self.date >> 5) & 0x0F) as u32;
        let day = (self.date & 0x1F) as u32;
        let hour = ((self.time >> 11) & 0x1F) as u32;
        let minute = ((self.time >> 5) & 0x3F) as u32;
        let second = ((self.time & 0x1F) * 2) as u32;

        if !(1..=12).contains(&month) || hour > 23 || minute > 59 || second > 59 {
            return None;
        }
        if day == 0 || day > days_in_month(year, month) {
            return None;
        }

        let mut days = 0i64;
        for y in 1970..year {
            days += if is_leap_year(y) { 366 } else { 365 };
        }
        for m in 1..month {
            days += days_in_month(year, m) as i64;
        }
        days += (day - 1) as i64;

        let secs = days * 86400 + hour as i64 * 3600 + minute as i64 * 60 + second as i64;
        UNIX_EPOCH.checked_add(Duration::from_secs(secs as u64))
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let days = DAYS_IN_MONTH[(month - 1) as usize];
    if month == 2 && is_leap_year(year) {
        days + 1
    } else {
        days
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
