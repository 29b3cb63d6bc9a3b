use chrono::{DateTime, FixedOffset, Local};

use super::{
    extractor::{extract_form_snapshot, extract_rejection, extract_reserve_rows},
    fetcher::fetch_next_week,
    session::Session,
};
use crate::{
    constants::{DEFAULT_OPTION_VALUE, DO_RESERVE_FIELD, REMAIN_CREDIT_FIELD, SUBMIT_VALUE},
    data_types::samad_data_types::{FormSnapshot, ReserveRow, ToggleOutcome},
    errors::{Rejection, SelfServiceError},
};

/// Reserves the meal `meal_id` served at `date`, or cancels it if it is already reserved.
///
/// The meal is looked up in the running week first and in the next week second. Meals the portal
/// no longer accepts changes for come back as `toggled: false` without any write.
pub async fn toggle_food_reservation(
    session: &mut Session,
    date: &DateTime<FixedOffset>,
    meal_id: &str,
) -> Result<ToggleOutcome, SelfServiceError> {
    let url = session.portal().reservation_url.clone();
    let current_html = session.get_page(&url, "current week").await?;

    let (page, row) = match find_row(&current_html, date, meal_id)? {
        Some(row) => (current_html, row),
        None => {
            let (next_html, _) = fetch_next_week(session, &current_html).await?;
            match find_row(&next_html, date, meal_id)? {
                Some(row) => (next_html, row),
                None => {
                    return Err(SelfServiceError::MealNotFound {
                        id: meal_id.to_string(),
                        date: *date,
                    })
                }
            }
        }
    };

    let Some(mut form) = toggled_snapshot(&extract_form_snapshot(&page), &row)? else {
        log::info!(
            "{}: {} at {} is not reservable",
            session.username(),
            meal_id,
            date
        );
        return Ok(ToggleOutcome {
            toggled: false,
            rejection: None,
        });
    };
    form.set(DO_RESERVE_FIELD, SUBMIT_VALUE);

    let response = session.post_form(&url, &form, "reserve").await?;

    if let Some(message) = extract_rejection(&response) {
        log::warn!("{}: portal rejected toggle: {}", session.username(), message);
        return Ok(ToggleOutcome {
            toggled: false,
            rejection: Some(Rejection {
                message,
                at: Local::now(),
            }),
        });
    }

    log::info!(
        "{}: {} {} at {}",
        session.username(),
        if row.checked { "cancelled" } else { "reserved" },
        row.entry.name,
        date
    );
    Ok(ToggleOutcome {
        toggled: true,
        rejection: None,
    })
}

fn find_row(
    html: &str,
    date: &DateTime<FixedOffset>,
    meal_id: &str,
) -> Result<Option<ReserveRow>, SelfServiceError> {
    Ok(extract_reserve_rows(html)?
        .into_iter()
        .find(|row| row.entry.id == meal_id && row.entry.date == *date))
}

/// The form that flips `row` and books its price against the remaining credit.
/// `None` when the row can't be changed.
pub fn toggled_snapshot(
    snapshot: &FormSnapshot,
    row: &ReserveRow,
) -> Result<Option<FormSnapshot>, SelfServiceError> {
    if row.disabled {
        return Ok(None);
    }

    let credit_text = snapshot
        .get(REMAIN_CREDIT_FIELD)
        .ok_or_else(|| SelfServiceError::scrape("reservation form has no remaining credit"))?;
    let credit: i64 = credit_text.trim().parse().map_err(|_| {
        SelfServiceError::scrape(format!("unparseable remaining credit {:?}", credit_text))
    })?;

    let mut toggled = snapshot.clone();
    if row.checked {
        toggled.remove(&row.checkbox_field);
        if let Some(count) = &row.count_field {
            toggled.set(count.as_str(), "0");
        }
        if let Some(select) = &row.select_field {
            toggled.remove(select);
        }
        toggled.set(REMAIN_CREDIT_FIELD, (credit + row.entry.price).to_string());
    } else {
        toggled.set(row.checkbox_field.as_str(), "true");
        if let Some(count) = &row.count_field {
            toggled.set(count.as_str(), "1");
        }
        if let Some(select) = &row.select_field {
            toggled.set(select.as_str(), DEFAULT_OPTION_VALUE);
        }
        toggled.set(REMAIN_CREDIT_FIELD, (credit - row.entry.price).to_string());
    }

    Ok(Some(toggled))
}
