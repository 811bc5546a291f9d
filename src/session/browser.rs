//! Headless-browser login automation.
//!
//! Drives a Chromium instance through the origin's login form and harvests
//! the resulting session cookies. The browser is torn down on every path,
//! success or failure.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;

use crate::config::OriginConfig;
use crate::error::{Error, Result};

/// Page load timeout for the login flow.
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Candidate selectors for the email/username field.
const EMAIL_SELECTORS: &[&str] = &[
    "input[type='email']",
    "input[name='email']",
    "input[name='username']",
];

/// Candidate selectors for the submit control.
const SUBMIT_SELECTORS: &[&str] = &["button[type='submit']", "input[type='submit']"];

/// Browser-driven login against the origin site.
pub struct BrowserLogin {
    user_agent: String,
    chrome_path: Option<String>,
}

impl BrowserLogin {
    pub fn new(user_agent: String, chrome_path: Option<String>) -> Self {
        Self {
            user_agent,
            chrome_path,
        }
    }

    /// Log in with the given credentials and return a cookie header.
    ///
    /// Fails closed when the authenticated marker never appears or any
    /// required cookie is missing from the harvest.
    pub async fn login(
        &self,
        origin: &OriginConfig,
        email: &str,
        password: &str,
    ) -> Result<String> {
        let mut config_builder = BrowserConfig::builder()
            .request_timeout(PAGE_TIMEOUT)
            .no_sandbox()
            .arg("--headless=new")
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--mute-audio")
            .arg(format!("--user-agent={}", self.user_agent));

        if let Some(ref chrome_path) = self.chrome_path {
            config_builder = config_builder.chrome_executable(chrome_path);
        }

        let browser_config = config_builder
            .build()
            .map_err(|e| Error::Browser(format!("Failed to build browser config: {}", e)))?;

        let (mut browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::Browser(format!("Failed to launch browser: {}", e)))?;

        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        let result = run_login(&browser, origin, email, password).await;

        // Scoped teardown: runs for the error path too.
        if let Err(e) = browser.close().await {
            tracing::debug!("Browser close failed: {}", e);
        }
        let _ = browser.wait().await;
        handler_task.abort();

        result
    }
}

async fn run_login(
    browser: &Browser,
    origin: &OriginConfig,
    email: &str,
    password: &str,
) -> Result<String> {
    let login_url = format!("{}{}", origin.base_url, origin.login_path);
    tracing::debug!("Navigating to login form: {}", login_url);

    let page = browser
        .new_page(&login_url)
        .await
        .map_err(|e| Error::Browser(format!("Failed to open login page: {}", e)))?;

    page.wait_for_navigation()
        .await
        .map_err(|e| Error::Browser(format!("Login page did not load: {}", e)))?;

    let email_field = find_first(&page, EMAIL_SELECTORS)
        .await
        .ok_or_else(|| Error::Browser("Login form has no recognizable email field".into()))?;
    email_field
        .click()
        .await
        .map_err(|e| Error::Browser(format!("Failed to focus email field: {}", e)))?;
    email_field
        .type_str(email)
        .await
        .map_err(|e| Error::Browser(format!("Failed to fill email field: {}", e)))?;

    let password_field = page
        .find_element("input[type='password']")
        .await
        .map_err(|_| Error::Browser("Login form has no password field".into()))?;
    password_field
        .click()
        .await
        .map_err(|e| Error::Browser(format!("Failed to focus password field: {}", e)))?;
    password_field
        .type_str(password)
        .await
        .map_err(|e| Error::Browser(format!("Failed to fill password field: {}", e)))?;

    let submit = find_first(&page, SUBMIT_SELECTORS)
        .await
        .ok_or_else(|| Error::Browser("Login form has no submit control".into()))?;
    submit
        .click()
        .await
        .map_err(|e| Error::Browser(format!("Failed to submit login form: {}", e)))?;

    page.wait_for_navigation()
        .await
        .map_err(|e| Error::Browser(format!("Post-login navigation failed: {}", e)))?;

    let content = page
        .content()
        .await
        .map_err(|e| Error::Browser(format!("Failed to read rendered page: {}", e)))?;

    if !content.contains(&origin.authenticated_marker) {
        return Err(Error::Authentication(
            "Login did not reach an authenticated page (marker not found)".into(),
        ));
    }

    let cookies = page
        .get_cookies()
        .await
        .map_err(|e| Error::Browser(format!("Failed to read cookies: {}", e)))?;

    // Fail closed when a required session cookie is missing.
    for required in &origin.required_cookies {
        if !cookies.iter().any(|c| &c.name == required) {
            return Err(Error::Authentication(format!(
                "Login succeeded but required cookie '{}' was not set",
                required
            )));
        }
    }

    let header = cookies
        .iter()
        .map(|c| format!("{}={}", c.name, c.value))
        .collect::<Vec<_>>()
        .join("; ");

    tracing::debug!("Harvested {} cookies from login", cookies.len());

    Ok(header)
}

/// Try a list of selectors, returning the first element found.
async fn find_first(
    page: &chromiumoxide::Page,
    selectors: &[&str],
) -> Option<chromiumoxide::Element> {
    for selector in selectors {
        if let Ok(element) = page.find_element(*selector).await {
            return Some(element);
        }
    }
    None
}
