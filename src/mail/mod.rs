pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Templates the platform sends. Wire names match the template ids the
/// frontend links were built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmailTemplate {
    VerifyEmail,
    ResetPassword,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailContext {
    /// Action link embedded in the mail body.
    pub link: String,
    /// Support address rendered into the footer.
    pub contact_email: String,
}

/// A queued outbound mail. This is the `sendEmail` job payload, so it
/// must stay serializable and carry no live resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    pub template: EmailTemplate,
    pub to: String,
    pub subject: String,
    pub context: EmailContext,
}

impl Email {
    pub fn verify_email(to: &str, link: String, contact_email: &str) -> Self {
        Email {
            template: EmailTemplate::VerifyEmail,
            to: to.to_string(),
            subject: "Verify your email address".to_string(),
            context: EmailContext {
                link,
                contact_email: contact_email.to_string(),
            },
        }
    }

    pub fn reset_password(to: &str, link: String, contact_email: &str) -> Self {
        Email {
            template: EmailTemplate::ResetPassword,
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            context: EmailContext {
                link,
                contact_email: contact_email.to_string(),
            },
        }
    }

    /// Render the HTML body for this mail.
    pub fn render(&self) -> String {
        match self.template {
            EmailTemplate::VerifyEmail => format!(
                "<html><body>\
                 <h2>Confirm your email address</h2>\
                 <p>Thanks for signing up. Click the link below to verify this address. \
                 The link expires in one hour.</p>\
                 <p><a href=\"{link}\">Verify email</a></p>\
                 <p>If the button does not work, open this URL:<br>{link}</p>\
                 <hr><p>Questions? Write to {contact}.</p>\
                 </body></html>",
                link = self.context.link,
                contact = self.context.contact_email,
            ),
            EmailTemplate::ResetPassword => format!(
                "<html><body>\
                 <h2>Reset your password</h2>\
                 <p>We received a request to reset the password for this account. \
                 The link below is valid for ten minutes.</p>\
                 <p><a href=\"{link}\">Choose a new password</a></p>\
                 <p>If you did not request this, you can ignore this mail.</p>\
                 <hr><p>Questions? Write to {contact}.</p>\
                 </body></html>",
                link = self.context.link,
                contact = self.context.contact_email,
            ),
        }
    }
}

/// Outbound mail transport.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> anyhow::Result<()>;
}

// ── Tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_template_renders_link_and_contact() {
        let mail = Email::verify_email(
            "new@user.io",
            "https://app.example.com/verify-email?token=abc".into(),
            "support@example.com",
        );
        let html = mail.render();
        assert!(html.contains("https://app.example.com/verify-email?token=abc"));
        assert!(html.contains("support@example.com"));
        assert_eq!(mail.subject, "Verify your email address");
    }

    #[test]
    fn test_reset_template_renders_link() {
        let mail = Email::reset_password(
            "a@b.c",
            "https://app.example.com/reset-password?token=xyz".into(),
            "support@example.com",
        );
        assert!(mail.render().contains("token=xyz"));
    }

    #[test]
    fn test_template_wire_names() {
        assert_eq!(
            serde_json::to_string(&EmailTemplate::VerifyEmail).unwrap(),
            "\"verify-email\""
        );
        assert_eq!(
            serde_json::to_string(&EmailTemplate::ResetPassword).unwrap(),
            "\"reset-password\""
        );
    }
}
