//! Content automation: best-effort login form filling.
//!
//! A `LOGIN_WEB` command asks the agent to sign in to whatever page a display
//! is currently showing.  The agent does not understand the page; it runs a
//! small script in the surface that looks for a password field, fills the
//! nearest account field, and submits the form.  There is no success or
//! failure signal back to the control server.

use std::fmt;

use serde_json::Value;
use tracing::{debug, warn};

use crate::application::surface::Surface;

/// Account name and password supplied by the control server.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub account: String,
    pub password: String,
}

impl Credentials {
    pub fn new(account: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Performs content-level actions on a live surface.
pub trait ContentAutomation: Send + Sync {
    /// Fills and submits the login form shown on `surface`.  Fire-and-forget.
    fn login(&self, surface: &mut dyn Surface, credentials: &Credentials);
}

/// [`ContentAutomation`] that injects a form-filling script.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptedLogin;

impl ContentAutomation for ScriptedLogin {
    fn login(&self, surface: &mut dyn Surface, credentials: &Credentials) {
        match surface.execute_script(&login_script(credentials)) {
            Ok(()) => debug!("login script injected for account {}", credentials.account),
            Err(e) => warn!("could not inject login script: {e}"),
        }
    }
}

/// Builds the form-filling script for `credentials`.
///
/// Values are embedded as JSON string literals, which are also valid
/// JavaScript string literals, so quotes and backslashes in a password cannot
/// break out of the script.
pub fn login_script(credentials: &Credentials) -> String {
    let account = Value::String(credentials.account.clone());
    let password = Value::String(credentials.password.clone());
    format!(
        r#"(() => {{
  const account = {account};
  const password = {password};
  const setValue = (el, value) => {{
    const setter = Object.getOwnPropertyDescriptor(HTMLInputElement.prototype, 'value').set;
    setter.call(el, value);
    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
    el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  }};
  const pass = document.querySelector('input[type="password"]');
  if (!pass) return;
  const scope = pass.form || document;
  const user = scope.querySelector('input[type="email"], input[type="text"], input:not([type])');
  if (user) setValue(user, account);
  setValue(pass, password);
  const submit = scope.querySelector('button[type="submit"], input[type="submit"], button:not([type])');
  if (submit) submit.click();
  else if (pass.form) pass.form.requestSubmit();
}})();"#
    )
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_script_embeds_credentials_as_string_literals() {
        // Arrange
        let creds = Credentials::new("ops@example.com", "pa\"ss\\word");

        // Act
        let script = login_script(&creds);

        // Assert
        assert!(script.contains(r#"const account = "ops@example.com";"#));
        assert!(script.contains(r#"const password = "pa\"ss\\word";"#));
    }

    #[test]
    fn test_login_script_escapes_script_terminators() {
        let creds = Credentials::new("a\nb", "x");
        let script = login_script(&creds);
        assert!(script.contains(r#"const account = "a\nb";"#));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("lobby", "s3cret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("lobby"));
        assert!(!rendered.contains("s3cret"));
    }
}
