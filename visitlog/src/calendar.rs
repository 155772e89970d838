use serde_derive::{Deserialize, Serialize};

/// The serialized form of a calendar, the day table is rebuilt on load
#[derive(Clone, Copy, Serialize, Deserialize)]
pub struct CalendarSpan {
    pub start_year: u32,
    pub end_year: u32,
    pub key_width: usize,
}

/// Every calendar day of a span of years, numbered chronologically.
///
/// The id of a day is its position in the span, so iterating ids in order
/// yields the days in chronological order. Keys are looked up arithmetically
/// from the digits, the per-month offsets are precomputed once.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(into = "CalendarSpan", from = "CalendarSpan")]
pub struct Calendar {
    start_year: u32,
    end_year: u32,
    key_width: usize,
    /// Id of the first day of every month in the span, plus the total day count
    month_start: Vec<u32>,
    labels: Vec<String>,
}

#[inline(always)]
pub fn is_leap_year(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[inline(always)]
pub fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if is_leap_year(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

#[inline(always)]
fn parse_digits(digits: &[u8]) -> Option<u32> {
    let mut value = 0;
    for &d in digits {
        if !d.is_ascii_digit() {
            return None;
        }
        value = value * 10 + (d - b'0') as u32;
    }
    Some(value)
}

impl Calendar {
    /// Build the calendar for `start_year ..= end_year` with `YYYY-MM-DD` keys
    pub fn new(start_year: u32, end_year: u32) -> Self {
        Self::with_key_width(start_year, end_year, 10)
    }

    /// Build the calendar with either 10 byte (`YYYY-MM-DD`) or 8 byte
    /// (`YY-MM-DD`) keys. Labels are always the full `YYYY-MM-DD` form.
    pub fn with_key_width(start_year: u32, end_year: u32, key_width: usize) -> Self {
        let mut month_start = vec![0];
        let mut labels = vec![];
        for year in start_year..=end_year {
            for month in 1..=12 {
                let days = days_in_month(year, month);
                for day in 1..=days {
                    labels.push(format!("{:04}-{:02}-{:02}", year, month, day));
                }
                month_start.push(labels.len() as u32);
            }
        }
        Self {
            start_year,
            end_year,
            key_width,
            month_start,
            labels,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn key_width(&self) -> usize {
        self.key_width
    }

    pub fn span(&self) -> (u32, u32) {
        (self.start_year, self.end_year)
    }

    /// The `YYYY-MM-DD` form of a day
    pub fn label(&self, id: u32) -> Option<&str> {
        self.labels.get(id as usize).map(AsRef::as_ref)
    }

    /// The day as it is spelled in the log
    pub fn key(&self, id: u32) -> Option<&str> {
        let label = self.label(id)?;
        match self.key_width {
            8 => Some(&label[2..]),
            _ => Some(label),
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.labels.iter().map(AsRef::as_ref)
    }

    /// Find the id of a date key, `None` if it is malformed or outside of the span
    #[inline(always)]
    pub fn lookup(&self, key: &[u8]) -> Option<u32> {
        if key.len() != self.key_width {
            return None;
        }
        let year_len = match self.key_width {
            10 => 4,
            8 => 2,
            _ => return None,
        };
        if key[year_len] != b'-' || key[year_len + 3] != b'-' {
            return None;
        }
        let year = parse_digits(&key[..year_len])?;
        let month = parse_digits(&key[year_len + 1..year_len + 3])?;
        let day = parse_digits(&key[year_len + 4..])?;

        let year = if year_len == 2 {
            let century = self.start_year - self.start_year % 100;
            let year = century + year;
            if year < self.start_year {
                year + 100
            } else {
                year
            }
        } else {
            year
        };

        if year < self.start_year || month == 0 || month > 12 || day == 0 {
            return None;
        }
        if day > days_in_month(year, month) {
            return None;
        }
        let month_idx = ((year - self.start_year) * 12 + month - 1) as usize;
        let first = *self.month_start.get(month_idx)?;
        if month_idx + 1 >= self.month_start.len() {
            return None;
        }
        Some(first + day - 1)
    }
}

impl From<CalendarSpan> for Calendar {
    fn from(span: CalendarSpan) -> Self {
        Self::with_key_width(span.start_year, span.end_year, span.key_width)
    }
}

impl From<Calendar> for CalendarSpan {
    fn from(calendar: Calendar) -> Self {
        Self {
            start_year: calendar.start_year,
            end_year: calendar.end_year,
            key_width: calendar.key_width,
        }
    }
}
