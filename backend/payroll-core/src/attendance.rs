// src/attendance.rs
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// --- Attendance Codes ---

const FULL_DAY: Decimal = dec!(1);
const HALF_DAY: Decimal = dec!(0.5);

/// The aggregate buckets a mark can count towards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Present,
    CasualLeave,
    WeekOff,
    PaidHoliday,
    OnDuty,
    LossOfPay,
}

/// Every mark an attendance sheet may legitimately contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttendanceCode {
    Present,           // P
    Absent,            // A
    CasualLeave,       // CL
    HalfCasualLeave,   // HCL
    HalfPresent,       // HP
    HalfLeave,         // HL
    WeekOff,           // WO
    WeekOffWorked,     // WW
    PaidHoliday,       // PH (also written pH)
    PaidHolidayWorked, // PHW
    OnDuty,            // OD
    WorkFromHome,      // WFH
}

pub const ALL_CODES: [AttendanceCode; 12] = [
    AttendanceCode::Present,
    AttendanceCode::Absent,
    AttendanceCode::CasualLeave,
    AttendanceCode::HalfCasualLeave,
    AttendanceCode::HalfPresent,
    AttendanceCode::HalfLeave,
    AttendanceCode::WeekOff,
    AttendanceCode::WeekOffWorked,
    AttendanceCode::PaidHoliday,
    AttendanceCode::PaidHolidayWorked,
    AttendanceCode::OnDuty,
    AttendanceCode::WorkFromHome,
];

impl AttendanceCode {
    /// Parses a sheet mark. Matching is case-sensitive; `pH` is the only
    /// alternate spelling in circulation and maps to `PH`.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = match raw.trim() {
            "P" => Self::Present,
            "A" => Self::Absent,
            "CL" => Self::CasualLeave,
            "HCL" => Self::HalfCasualLeave,
            "HP" => Self::HalfPresent,
            "HL" => Self::HalfLeave,
            "WO" => Self::WeekOff,
            "WW" => Self::WeekOffWorked,
            "PH" | "pH" => Self::PaidHoliday,
            "PHW" => Self::PaidHolidayWorked,
            "OD" => Self::OnDuty,
            "WFH" => Self::WorkFromHome,
            _ => return None,
        };
        Some(code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Present => "P",
            Self::Absent => "A",
            Self::CasualLeave => "CL",
            Self::HalfCasualLeave => "HCL",
            Self::HalfPresent => "HP",
            Self::HalfLeave => "HL",
            Self::WeekOff => "WO",
            Self::WeekOffWorked => "WW",
            Self::PaidHoliday => "PH",
            Self::PaidHolidayWorked => "PHW",
            Self::OnDuty => "OD",
            Self::WorkFromHome => "WFH",
        }
    }

    /// Weighted bucket contributions of one day carrying this code.
    pub fn weights(self) -> &'static [(Bucket, Decimal)] {
        match self {
            Self::Present => &[(Bucket::Present, FULL_DAY)],
            Self::Absent => &[(Bucket::LossOfPay, FULL_DAY)],
            Self::CasualLeave => &[(Bucket::CasualLeave, FULL_DAY)],
            Self::HalfCasualLeave => &[
                (Bucket::CasualLeave, HALF_DAY),
                (Bucket::Present, HALF_DAY),
            ],
            Self::HalfPresent => &[(Bucket::Present, HALF_DAY)],
            Self::HalfLeave => &[(Bucket::CasualLeave, HALF_DAY)],
            Self::WeekOff | Self::WeekOffWorked => &[(Bucket::WeekOff, FULL_DAY)],
            Self::PaidHoliday | Self::PaidHolidayWorked => &[(Bucket::PaidHoliday, FULL_DAY)],
            Self::OnDuty | Self::WorkFromHome => &[(Bucket::OnDuty, FULL_DAY)],
        }
    }
}

impl fmt::Display for AttendanceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Marks & Records ---

/// One cell of an attendance sheet.
///
/// Historical sheets can carry marks that are no longer recognized. They are
/// kept verbatim so that loading and saving never rewrites stored data, and
/// they are skipped during aggregation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AttendanceMark {
    #[default]
    Empty,
    Code(AttendanceCode),
    Unrecognized(String),
}

impl AttendanceMark {
    pub fn parse(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return Self::Empty;
        }
        match AttendanceCode::parse(raw) {
            Some(code) => Self::Code(code),
            None => Self::Unrecognized(raw.to_string()),
        }
    }

    pub fn code(&self) -> Option<AttendanceCode> {
        match self {
            Self::Code(code) => Some(*code),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Empty => "",
            Self::Code(code) => code.as_str(),
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl From<AttendanceCode> for AttendanceMark {
    fn from(code: AttendanceCode) -> Self {
        Self::Code(code)
    }
}

impl Serialize for AttendanceMark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AttendanceMark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Older sheets wrote `null` for untouched days.
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map(|r| Self::parse(&r)).unwrap_or_default())
    }
}

/// One employee's marks for the active month, one entry per calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttendanceRecord(Vec<AttendanceMark>);

impl AttendanceRecord {
    pub fn with_days(days: usize) -> Self {
        Self(vec![AttendanceMark::Empty; days])
    }

    pub fn from_marks(marks: Vec<AttendanceMark>) -> Self {
        Self(marks)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, day_index: usize) -> Option<&AttendanceMark> {
        self.0.get(day_index)
    }

    pub fn marks(&self) -> &[AttendanceMark] {
        &self.0
    }

    /// Pads with empty marks up to `days`. Never shrinks.
    pub fn ensure_len(&mut self, days: usize) {
        if self.0.len() < days {
            self.0.resize(days, AttendanceMark::Empty);
        }
    }

    /// Writes one cell, padding short historical records first.
    pub fn set(&mut self, day_index: usize, mark: AttendanceMark) {
        self.ensure_len(day_index + 1);
        self.0[day_index] = mark;
    }
}

// --- Aggregation ---

/// Month totals for one employee, always derived from an [`AttendanceRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttendanceSummary {
    pub present_days: Decimal,
    pub casual_leave: Decimal,
    pub week_off: Decimal,
    pub paid_holiday: Decimal,
    pub on_duty: Decimal,
    pub loss_of_pay: Decimal,
    pub payable_days: Decimal,
}

impl AttendanceSummary {
    fn add(&mut self, bucket: Bucket, weight: Decimal) {
        let slot = match bucket {
            Bucket::Present => &mut self.present_days,
            Bucket::CasualLeave => &mut self.casual_leave,
            Bucket::WeekOff => &mut self.week_off,
            Bucket::PaidHoliday => &mut self.paid_holiday,
            Bucket::OnDuty => &mut self.on_duty,
            Bucket::LossOfPay => &mut self.loss_of_pay,
        };
        *slot += weight;
    }
}

/// Bucket contributions of a single mark. Empty and unrecognized marks
/// contribute nothing.
pub fn classify(mark: &AttendanceMark) -> &'static [(Bucket, Decimal)] {
    match mark.code() {
        Some(code) => code.weights(),
        None => &[],
    }
}

/// Reduces a month of marks into an [`AttendanceSummary`]. Total: bad input is
/// skipped rather than rejected.
pub fn aggregate(record: &AttendanceRecord) -> AttendanceSummary {
    let mut summary = AttendanceSummary::default();
    for mark in record.marks() {
        for (bucket, weight) in classify(mark) {
            summary.add(*bucket, *weight);
        }
    }
    summary.payable_days = summary.present_days
        + summary.casual_leave
        + summary.week_off
        + summary.paid_holiday
        + summary.on_duty;
    summary
}
