//! Capability and schedule checks for one (ride, driver) pair.
//!
//! Everything here is pure: the dispatcher gathers profiles and assignments
//! up front and the evaluator only looks at what it is handed.

use crate::entities::{Assignment, DriverProfile, RideRequest};
use crate::matching::rules::windows_conflict;
use ridematch_sdk::objects::{AccessibilityFeature, DayOfWeek, VehicleClass, WorkingSlot};
use std::fmt;
use time::{Date, Duration, PrimitiveDateTime, Time, Weekday};
use uuid::Uuid;

/// What the evaluator knows about a driver.
#[derive(Debug, Clone, Copy)]
pub struct DriverCandidate<'a> {
    pub profile: &'a DriverProfile,
    /// Active assignments of this driver inside [`EligibilityEvaluator::assignment_horizon`].
    pub assignments: &'a [Assignment],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Lower ranks are offered first.
    Eligible { rank: u32 },
    Ineligible(Ineligibility),
}

impl Evaluation {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Evaluation::Eligible { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ineligibility {
    MissingFeatures(Vec<AccessibilityFeature>),
    VehicleMismatch {
        required: VehicleClass,
        actual: VehicleClass,
    },
    OutsideWorkingHours,
    ScheduleConflict { ride_id: Uuid },
}

impl Ineligibility {
    pub fn code(&self) -> &'static str {
        match self {
            Ineligibility::MissingFeatures(_) => "missing_features",
            Ineligibility::VehicleMismatch { .. } => "vehicle_mismatch",
            Ineligibility::OutsideWorkingHours => "outside_working_hours",
            Ineligibility::ScheduleConflict { .. } => "schedule_conflict",
        }
    }
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ineligibility::MissingFeatures(missing) => {
                write!(f, "missing_features:")?;
                for feature in missing {
                    write!(f, " {feature}")?;
                }
                Ok(())
            }
            Ineligibility::VehicleMismatch { required, actual } => {
                write!(f, "vehicle_mismatch: needs {required}, has {actual}")
            }
            Ineligibility::OutsideWorkingHours => write!(f, "outside_working_hours"),
            Ineligibility::ScheduleConflict { ride_id } => {
                write!(f, "schedule_conflict with ride {ride_id}")
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EligibilityEvaluator {
    schedule_buffer: Duration,
}

impl EligibilityEvaluator {
    pub fn new(schedule_buffer: Duration) -> Self {
        Self { schedule_buffer }
    }

    /// Decide whether `driver` may be offered `ride`.
    ///
    /// The rank is the number of active assignments the driver already has
    /// in the ISO week of the ride, so less loaded drivers come first.
    pub fn evaluate(&self, ride: &RideRequest, driver: &DriverCandidate<'_>) -> Evaluation {
        let profile = driver.profile;

        let missing: Vec<AccessibilityFeature> = ride
            .accessibility
            .difference(&profile.features)
            .copied()
            .collect();
        if !missing.is_empty() {
            return Evaluation::Ineligible(Ineligibility::MissingFeatures(missing));
        }

        match ride.required_vehicle {
            Some(required) if required != profile.vehicle => {
                return Evaluation::Ineligible(Ineligibility::VehicleMismatch {
                    required,
                    actual: profile.vehicle,
                });
            }
            _ => {}
        }

        if !covered_by_working_hours(&profile.working_hours, ride.window_start, ride.window_end) {
            return Evaluation::Ineligible(Ineligibility::OutsideWorkingHours);
        }

        let active = driver
            .assignments
            .iter()
            .filter(|a| a.is_active() && a.ride_id != ride.ride_id);

        let mut rank = 0u32;
        let week = week_start(ride.window_start.date());
        for assignment in active {
            if windows_conflict(
                (assignment.window_start, assignment.window_end),
                (ride.window_start, ride.window_end),
                self.schedule_buffer,
            ) {
                return Evaluation::Ineligible(Ineligibility::ScheduleConflict {
                    ride_id: assignment.ride_id,
                });
            }
            if week_start(assignment.window_start.date()) == week {
                rank += 1;
            }
        }

        Evaluation::Eligible { rank }
    }

    /// Time range whose assignments [`evaluate`](Self::evaluate) needs to see:
    /// the ride's ISO week, widened by the buffer around the ride window.
    pub fn assignment_horizon(&self, ride: &RideRequest) -> (PrimitiveDateTime, PrimitiveDateTime) {
        let monday = PrimitiveDateTime::new(week_start(ride.window_start.date()), Time::MIDNIGHT);
        let next_monday = monday + Duration::weeks(1);
        let from = monday.min(ride.window_start - self.schedule_buffer);
        let to = next_monday.max(ride.window_end + self.schedule_buffer);
        (from, to)
    }
}

fn week_start(date: Date) -> Date {
    date - Duration::days(i64::from(date.weekday().number_days_from_monday()))
}

fn day_of_week(weekday: Weekday) -> DayOfWeek {
    match weekday {
        Weekday::Monday => DayOfWeek::Monday,
        Weekday::Tuesday => DayOfWeek::Tuesday,
        Weekday::Wednesday => DayOfWeek::Wednesday,
        Weekday::Thursday => DayOfWeek::Thursday,
        Weekday::Friday => DayOfWeek::Friday,
        Weekday::Saturday => DayOfWeek::Saturday,
        Weekday::Sunday => DayOfWeek::Sunday,
    }
}

fn minute_of_day(t: Time) -> u16 {
    u16::from(t.hour()) * 60 + u16::from(t.minute())
}

/// Whether `[start, end)` lies inside one working slot.
///
/// Slots never span midnight, so a window that does is never covered. A
/// window ending in the middle of a minute needs that whole minute.
pub fn covered_by_working_hours(
    slots: &[WorkingSlot],
    start: PrimitiveDateTime,
    end: PrimitiveDateTime,
) -> bool {
    if end <= start {
        return false;
    }
    let day = start.date();
    let start_minute = minute_of_day(start.time());
    let end_minute = if end.date() == day {
        let partial = end.second() > 0 || end.nanosecond() > 0;
        minute_of_day(end.time()) + u16::from(partial)
    } else if day.next_day() == Some(end.date()) && end.time() == Time::MIDNIGHT {
        24 * 60
    } else {
        return false;
    };
    let weekday = day_of_week(day.weekday());
    slots.iter().any(|slot| {
        slot.day == weekday && slot.start_minute <= start_minute && end_minute <= slot.end_minute
    })
}
