use std::time::Instant;

use reqwest::{header::CONTENT_TYPE, Client, Response};

use super::{extractor::extract_csrf, PortalConfig};
use crate::{
    constants::CSRF_HEADER, data_types::samad_data_types::FormSnapshot, errors::SelfServiceError,
};

/// Cookie jar, rotating CSRF token and credentials of one portal user.
///
/// Every request takes `&mut self`: the token of each response is needed for the next request,
/// so a session can't be shared between concurrent operations.
pub struct Session {
    client: Client,
    portal: PortalConfig,
    csrf: String,
    username: String,
    password: String,
}

impl Session {
    pub(super) fn new(
        portal: PortalConfig,
        client: Client,
        csrf: String,
        username: &str,
        password: &str,
    ) -> Self {
        Session {
            client,
            portal,
            csrf,
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn csrf(&self) -> &str {
        &self.csrf
    }

    pub fn portal(&self) -> &PortalConfig {
        &self.portal
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// Replaces the stored token with the one rendered into `html`.
    pub(super) fn capture_csrf(&mut self, html: &str) -> Result<(), SelfServiceError> {
        match extract_csrf(html) {
            Some(token) => {
                self.csrf = token;
                Ok(())
            }
            None => Err(SelfServiceError::scrape("page has no CSRF token")),
        }
    }

    /// GET `url`, fails on non-2xx, refreshes the CSRF token from the body.
    pub(super) async fn get_page(
        &mut self,
        url: &str,
        context: &'static str,
    ) -> Result<String, SelfServiceError> {
        let now = Instant::now();
        let resp = self
            .client
            .get(url)
            .header(CSRF_HEADER, &self.csrf)
            .send()
            .await?;
        let body = checked_body(resp, context).await?;
        log::debug!("{} {}: {:.2?}", self.username, context, now.elapsed());

        self.capture_csrf(&body)?;
        Ok(body)
    }

    /// POST `form` url-encoded to `url`, fails on non-2xx, refreshes the CSRF token from the
    /// response body.
    pub(super) async fn post_form(
        &mut self,
        url: &str,
        form: &FormSnapshot,
        context: &'static str,
    ) -> Result<String, SelfServiceError> {
        let now = Instant::now();
        let resp = self
            .client
            .post(url)
            .header(CSRF_HEADER, &self.csrf)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(form.encode())
            .send()
            .await?;
        let body = checked_body(resp, context).await?;
        log::debug!("{} {}: {:.2?}", self.username, context, now.elapsed());

        self.capture_csrf(&body)?;
        Ok(body)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("portal", &self.portal)
            .finish_non_exhaustive()
    }
}

pub(super) async fn checked_body(
    resp: Response,
    context: &'static str,
) -> Result<String, SelfServiceError> {
    if !resp.status().is_success() {
        return Err(SelfServiceError::HttpStatus {
            status: resp.status().as_u16(),
            context,
        });
    }
    Ok(resp.text().await?)
}
