use std::{sync::Arc, time::Instant};

use reqwest::header::CONTENT_TYPE;

use super::{
    captcha::{solve_captcha, CaptchaSolver},
    extractor::{extract_csrf, extract_login_rejection},
    session::{checked_body, Session},
    PortalConfig,
};
use crate::{
    constants::{CSRF_FIELD, CSRF_HEADER},
    data_types::samad_data_types::FormSnapshot,
    errors::{AuthError, SelfServiceError},
};

/// Logs `username` into the portal and returns a session holding its cookies and current CSRF
/// token.
///
/// The captcha guess can't be checked before it is used: a wrong guess surfaces as
/// [`AuthError::LoginRejected`], exactly like a wrong password.
pub async fn login(
    portal: &PortalConfig,
    solver: Arc<dyn CaptchaSolver>,
    username: &str,
    password: &str,
) -> Result<Session, SelfServiceError> {
    let now = Instant::now();
    let client = portal.build_client()?;

    let resp = client.get(&portal.login_page_url).send().await?;
    if !resp.status().is_success() {
        return Err(AuthError::LoginPageFailed(resp.status().as_u16()).into());
    }
    let login_page = resp.text().await?;
    let csrf = extract_csrf(&login_page).ok_or(AuthError::MissingCsrf)?;

    let resp = client
        .get(&portal.captcha_url)
        .header(CSRF_HEADER, &csrf)
        .send()
        .await?;
    let captcha_image = if resp.status().is_success() {
        resp.bytes().await?.to_vec()
    } else {
        return Err(SelfServiceError::HttpStatus {
            status: resp.status().as_u16(),
            context: "captcha",
        });
    };
    let captcha_guess = solve_captcha(solver, captcha_image).await?;
    log::debug!("{} captcha solved: {:.2?}", username, now.elapsed());

    let mut form = FormSnapshot::new();
    form.set(CSRF_FIELD, csrf.as_str());
    form.set("username", username);
    form.set("password", password);
    form.set("captcha_input", captcha_guess);

    let resp = client
        .post(&portal.login_action_url)
        .header(CSRF_HEADER, &csrf)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(form.encode())
        .send()
        .await?;
    if !resp.status().is_success() {
        return Err(AuthError::LoginRequestFailed(resp.status().as_u16()).into());
    }
    let landing = checked_body(resp, "login").await?;

    if let Some(reason) = extract_login_rejection(&landing) {
        log::info!("Login of {} rejected: {}", username, reason);
        return Err(AuthError::LoginRejected(reason).into());
    }

    let mut session = Session::new(portal.clone(), client, csrf, username, password);
    session.capture_csrf(&landing)?;

    log::info!("{} logged in: {:.2?}", username, now.elapsed());
    Ok(session)
}
