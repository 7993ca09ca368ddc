//! SMTP credential validation (spec.md §7 "configuration/validation ...
//! surfaced at Create/Update time").
//!
//! The generated Go program sends mail itself (`go-runtime/email.go`);
//! this module exists so an `email_output` node's credentials can be
//! checked *before* a job is ever packaged and run, the same way a
//! db_input/db_output connection would be checked against its
//! identifier pattern up front rather than discovered at run time.

use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport as _, Tokio1Executor};

use crate::errors::Result;
use crate::model::job::SmtpConfig;

/// Opens a connection to the configured SMTP relay and tears it down
/// without sending anything. Returns the underlying transport error
/// (wrapped as [`crate::errors::FlowsmithError::Smtp`]) if the relay
/// refuses the connection or the credentials are rejected.
pub async fn validate_connection(cfg: &SmtpConfig) -> Result<()> {
    let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.host)?.port(cfg.port);
    if !cfg.username.is_empty() {
        builder = builder.credentials(Credentials::new(cfg.username.clone(), cfg.password.clone()));
    }
    let mailer = builder.build();
    mailer.test_connection().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_surfaces_as_smtp_error() {
        let cfg = SmtpConfig {
            host: "smtp.invalid.example".into(),
            port: 2525,
            username: String::new(),
            password: String::new(),
            from: "jobs@example.com".into(),
        };
        let err = validate_connection(&cfg).await.unwrap_err();
        assert!(matches!(err, crate::errors::FlowsmithError::Smtp(_)));
    }
}
