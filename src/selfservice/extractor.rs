use std::collections::BTreeSet;

use regex_lite::Regex;
use scraper::{ElementRef, Html, Selector};
use selectors::Element;
use static_init::dynamic;

use super::calendar::{meal_date, parse_jalali_date};
use crate::{
    constants::DEFAULT_OPTION_VALUE,
    data_types::samad_data_types::{FormSnapshot, MealEntry, MealStatus, MealTime, ReserveRow},
    errors::SelfServiceError,
};

#[dynamic]
static CSRF_RE: Regex = Regex::new(r"'X-CSRF-TOKEN'\s*:\s*'([^']*)'").unwrap();

#[dynamic]
static CHECKBOX_SEL: Selector = Selector::parse(r#"input[type="checkbox"]"#).unwrap();
#[dynamic]
static HIDDEN_SEL: Selector = Selector::parse(r#"input[type="hidden"]"#).unwrap();
#[dynamic]
static SELECT_SEL: Selector = Selector::parse("select").unwrap();
#[dynamic]
static ERROR_MESSAGES_SEL: Selector = Selector::parse("#errorMessages").unwrap();
#[dynamic]
static CREDIT_SEL: Selector = Selector::parse("#creditId").unwrap();
#[dynamic]
static LOGIN_FORM_SEL: Selector =
    Selector::parse(r#"form[action*="j_security_check"], input[name="captcha_input"]"#).unwrap();
#[dynamic]
static LOGIN_ERROR_SEL: Selector = Selector::parse("#errorMessages, .alert-danger").unwrap();

pub fn extract_csrf(html: &str) -> Option<String> {
    CSRF_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|token| token.as_str().to_string())
        .filter(|token| !token.is_empty())
}

/// Every meal checkbox on a reservation page, in page order.
pub fn extract_meals(html: &str) -> Result<Vec<MealEntry>, SelfServiceError> {
    Ok(extract_reserve_rows(html)?
        .into_iter()
        .map(|row| row.entry)
        .collect())
}

/// Meal entries together with the names of the form fields bound to them.
pub fn extract_reserve_rows(html: &str) -> Result<Vec<ReserveRow>, SelfServiceError> {
    let document = Html::parse_document(html);

    let mut rows = document
        .select(&CHECKBOX_SEL)
        .map(reserve_row)
        .collect::<Result<Vec<_>, _>>()?;

    // a slot with a reserved meal turns its other options into second options
    let reserved_slots: BTreeSet<_> = rows
        .iter()
        .filter(|row| row.checked)
        .map(|row| row.entry.date)
        .collect();
    for row in rows.iter_mut() {
        if row.entry.status == MealStatus::Reservable && reserved_slots.contains(&row.entry.date) {
            row.entry.status = MealStatus::SecondOptionReserved;
        }
    }

    Ok(rows)
}

/// All fields needed to resubmit the page: hidden inputs, checked checkboxes and the option
/// select of every checked row.
pub fn extract_form_snapshot(html: &str) -> FormSnapshot {
    let document = Html::parse_document(html);
    let mut snapshot = FormSnapshot::new();

    for input in document.select(&HIDDEN_SEL) {
        if let (Some(name), Some(value)) = (input.value().attr("name"), input.value().attr("value"))
        {
            snapshot.set(name, value);
        }
    }

    for checkbox in document.select(&CHECKBOX_SEL) {
        if let Some(name) = checkbox.value().attr("name") {
            if checkbox.value().attr("checked").is_some() {
                snapshot.set(name, "true");
            }
        }
    }

    for select in document.select(&SELECT_SEL) {
        let Some(name) = select.value().attr("name") else {
            continue;
        };
        let indicator_checked = select
            .parent_element()
            .and_then(|cell| sibling_children(cell).next())
            .is_some_and(|indicator| indicator.value().attr("checked").is_some());
        if indicator_checked {
            snapshot.set(name, DEFAULT_OPTION_VALUE);
        }
    }

    snapshot
}

/// Text of the error banner rendered after a write, if any.
pub fn extract_rejection(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let message = document
        .select(&ERROR_MESSAGES_SEL)
        .map(element_text)
        .find(|text| !text.is_empty());
    message
}

/// Remaining credit in Rial.
pub fn extract_credit(html: &str) -> Result<i64, SelfServiceError> {
    let document = Html::parse_document(html);
    let text = document
        .select(&CREDIT_SEL)
        .next()
        .map(element_text)
        .ok_or_else(|| SelfServiceError::scrape("no credit element on reservation page"))?;

    parse_amount(&text)
        .ok_or_else(|| SelfServiceError::scrape(format!("unparseable credit {:?}", text)))
}

/// `Some(reason)` when the page is still the login form.
pub fn extract_login_rejection(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    document.select(&LOGIN_FORM_SEL).next()?;

    let reason = document
        .select(&LOGIN_ERROR_SEL)
        .map(element_text)
        .find(|text| !text.is_empty())
        .unwrap_or_else(|| "login form was rendered again".to_string());
    Some(reason)
}

fn reserve_row(checkbox: ElementRef) -> Result<ReserveRow, SelfServiceError> {
    let input = checkbox.value();

    let id = input
        .attr("id")
        .filter(|id| !id.is_empty())
        .ok_or_else(|| SelfServiceError::scrape("meal checkbox without id"))?;
    let checkbox_field = input
        .attr("name")
        .ok_or_else(|| SelfServiceError::scrape(format!("meal checkbox {} without name", id)))?;

    // checkbox -> food cell -> row -> (tbody) -> meal table -> meal-time cell -> day row
    let meal_table = checkbox
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "table" && el.value().attr("align") == Some("center"))
        .ok_or_else(|| SelfServiceError::scrape(format!("meal {} outside a meal table", id)))?;
    let slot_cell = meal_table
        .parent_element()
        .ok_or_else(|| SelfServiceError::scrape(format!("meal table of {} has no cell", id)))?;
    let day_row = slot_cell
        .parent_element()
        .ok_or_else(|| SelfServiceError::scrape(format!("meal cell of {} has no row", id)))?;

    let meal_time = child_elements(day_row)
        .filter(|cell| !is_date_cell(cell))
        .position(|cell| cell.id() == slot_cell.id())
        .and_then(MealTime::from_index)
        .ok_or_else(|| SelfServiceError::scrape(format!("unknown meal time column of {}", id)))?;

    let date_text = child_elements(day_row)
        .find(is_date_cell)
        .and_then(|cell| child_elements(cell).find(|el| el.value().name() == "div"))
        .map(element_text)
        .ok_or_else(|| SelfServiceError::scrape(format!("no date header for meal {}", id)))?;
    let date = parse_jalali_date(&date_text)
        .and_then(|day| meal_date(day, meal_time))
        .ok_or_else(|| SelfServiceError::scrape(format!("unparseable date {:?}", date_text)))?;

    let food_cell = checkbox
        .parent_element()
        .ok_or_else(|| SelfServiceError::scrape(format!("meal {} has no cell", id)))?;

    let label = child_text(food_cell, "span");
    let mut label_parts = label.split(" | ").map(str::trim);
    let (name, side_dish) = match (label_parts.next(), label_parts.next(), label_parts.next()) {
        (Some(_code), Some(name), side_dish) => (
            name.to_string(),
            side_dish.filter(|s| !s.is_empty()).map(str::to_string),
        ),
        _ => {
            return Err(SelfServiceError::scrape(format!(
                "unexpected meal label {:?}",
                label
            )))
        }
    };

    let price_text = child_text(food_cell, "div");
    let price = price_text
        .split_whitespace()
        .next()
        .and_then(parse_amount)
        .ok_or_else(|| SelfServiceError::scrape(format!("unparseable price {:?}", price_text)))?;

    let checked = input.attr("checked").is_some();
    let disabled = input.attr("disabled").is_some();
    let status = if disabled {
        MealStatus::Unavailable
    } else if checked {
        MealStatus::Reserved
    } else {
        MealStatus::Reservable
    };

    // quantity input is the first element of the neighbouring cells, the option select sits
    // next to it
    let count_field = sibling_children(food_cell)
        .next()
        .filter(|el| el.value().name() == "input")
        .and_then(|el| el.value().attr("name"))
        .map(str::to_string);
    let select_field = sibling_children(food_cell)
        .find(|el| el.value().name() == "select")
        .and_then(|el| el.value().attr("name"))
        .map(str::to_string);

    Ok(ReserveRow {
        entry: MealEntry {
            id: id.to_string(),
            name,
            side_dish,
            price,
            meal_time,
            date,
            status,
        },
        checked,
        disabled,
        checkbox_field: checkbox_field.to_string(),
        count_field,
        select_field,
    })
}

fn child_elements<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    element.children().filter_map(ElementRef::wrap)
}

/// Children of every sibling of `element`, in document order.
fn sibling_children<'a>(element: ElementRef<'a>) -> impl Iterator<Item = ElementRef<'a>> {
    let own_id = element.id();
    element
        .parent_element()
        .into_iter()
        .flat_map(child_elements)
        .filter(move |sibling| sibling.id() != own_id)
        .flat_map(child_elements)
}

fn is_date_cell(cell: &ElementRef) -> bool {
    cell.value().name() == "td" && cell.value().attr("valign") == Some("middle")
}

fn child_text(element: ElementRef, tag: &str) -> String {
    child_elements(element)
        .filter(|el| el.value().name() == tag)
        .map(element_text)
        .collect::<Vec<_>>()
        .join(" ")
}

fn element_text(element: ElementRef) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_amount(text: &str) -> Option<i64> {
    text.trim().replace(',', "").parse().ok()
}
