use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, TimeZone, Utc};

use crate::data_types::samad_data_types::MealTime;

/// Asia/Tehran without daylight saving, which is what the portal renders.
const PORTAL_UTC_OFFSET_SECS: i32 = 3 * 3600 + 30 * 60;

pub fn portal_timezone() -> FixedOffset {
    FixedOffset::east_opt(PORTAL_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Parses the portal's `YYYY/MM/DD` Jalali date header.
pub fn parse_jalali_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    let year = text.get(0..4)?.parse().ok()?;
    let month = text.get(5..7)?.parse().ok()?;
    let day = text.get(8..10)?.parse().ok()?;

    jalali_to_gregorian(year, month, day)
}

pub fn jalali_to_gregorian(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || (month > 6 && day > 30) {
        return None;
    }

    let jy = year + 1595;
    let (month, day) = (month as i32, day as i32);
    let mut days = -355668 + 365 * jy + (jy / 33) * 8 + ((jy % 33) + 3) / 4 + day;
    days += if month < 7 {
        (month - 1) * 31
    } else {
        (month - 7) * 30 + 186
    };

    let mut gy = 400 * (days / 146097);
    days %= 146097;
    if days > 36524 {
        days -= 1;
        gy += 100 * (days / 36524);
        days %= 36524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    // days is now the zero based ordinal within gy
    let date = NaiveDate::from_yo_opt(gy, u32::try_from(days + 1).ok()?)?;

    // Esfand 30 only exists in leap years, otherwise it rolls over into Farvardin 1
    (gregorian_to_jalali(date) == (year, month as u32, day as u32)).then_some(date)
}

/// (year, month, day) in the Jalali calendar
pub fn gregorian_to_jalali(date: NaiveDate) -> (i32, u32, u32) {
    const DAYS_BEFORE_MONTH: [i32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

    let (gy, gm, gd) = (date.year(), date.month() as i32, date.day() as i32);
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let mut days = 355666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
        + gd
        + DAYS_BEFORE_MONTH[(gm - 1) as usize];

    let mut jy = -1595 + 33 * (days / 12053);
    days %= 12053;
    jy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };

    (jy, jm as u32, jd as u32)
}

/// Fixed serving time of a slot on `date`, in the portal's timezone.
pub fn meal_date(date: NaiveDate, meal_time: MealTime) -> Option<DateTime<FixedOffset>> {
    let (hour, minute) = match meal_time {
        MealTime::Breakfast => (7, 0),
        MealTime::Lunch => (11, 30),
        MealTime::Dinner => (19, 0),
    };

    portal_timezone()
        .from_local_datetime(&date.and_hms_opt(hour, minute, 0)?)
        .single()
}
