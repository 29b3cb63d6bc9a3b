use super::{
    extractor::{extract_form_snapshot, extract_meals},
    session::Session,
};
use crate::{
    constants::{SHOW_NEXT_WEEK_FIELD, SUBMIT_VALUE},
    data_types::samad_data_types::MealEntry,
    errors::SelfServiceError,
};

/// Reservation page of the running week.
pub async fn fetch_current_week(
    session: &mut Session,
) -> Result<(String, Vec<MealEntry>), SelfServiceError> {
    let url = session.portal().reservation_url.clone();
    let html = session.get_page(&url, "current week").await?;
    let meals = extract_meals(&html)?;

    Ok((html, meals))
}

/// Pages forward from `current_html` by resubmitting its form with the "next week" button.
pub async fn fetch_next_week(
    session: &mut Session,
    current_html: &str,
) -> Result<(String, Vec<MealEntry>), SelfServiceError> {
    let mut form = extract_form_snapshot(current_html);
    form.set(SHOW_NEXT_WEEK_FIELD, SUBMIT_VALUE);

    let url = session.portal().reservation_url.clone();
    let html = session.post_form(&url, &form, "next week").await?;
    let meals = extract_meals(&html)?;

    Ok((html, meals))
}
