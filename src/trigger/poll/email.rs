//! Email (IMAP) trigger polling (spec.md §4.8 "Email polling").

use async_imap::types::Fetch;
use futures::TryStreamExt;
use serde_json::{json, Value};
use tokio::net::TcpStream;

use super::PollOutcome;
use crate::errors::Result;
use crate::model::trigger::EmailTriggerConfig;

/// Polls an IMAP mailbox for messages with UID greater than the
/// stored last-seen UID, returning them in ascending-UID order along
/// with the new max UID to persist.
pub async fn poll(cfg: &EmailTriggerConfig) -> Result<(PollOutcome, Option<u32>)> {
    let tcp = TcpStream::connect((cfg.host.as_str(), cfg.port)).await?;

    let mut events = Vec::new();
    let last_uid = cfg.last_seen_uid.unwrap_or(0);
    let range = format!("{}:*", last_uid + 1);

    let new_max = if cfg.use_tls {
        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls.connect(cfg.host.as_str(), tcp).await?;
        let client = async_imap::Client::new(tls_stream);
        let mut session = client
            .login(&cfg.username, &cfg.password)
            .await
            .map_err(|(e, _)| e)?;
        session.select(&cfg.folder).await?;
        let max = fetch_uids(&mut session, &range, &mut events).await?;
        session.logout().await?;
        max
    } else {
        let client = async_imap::Client::new(tcp);
        let mut session = client
            .login(&cfg.username, &cfg.password)
            .await
            .map_err(|(e, _)| e)?;
        session.select(&cfg.folder).await?;
        let max = fetch_uids(&mut session, &range, &mut events).await?;
        session.logout().await?;
        max
    };

    Ok((PollOutcome { events }, new_max.filter(|&m| m > last_uid)))
}

async fn fetch_uids<S>(
    session: &mut async_imap::Session<S>,
    range: &str,
    events: &mut Vec<Value>,
) -> Result<Option<u32>>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send,
{
    let mut max_uid = None;
    let mut stream = session.uid_fetch(range, "(UID ENVELOPE)").await?;
    while let Some(msg) = stream.try_next().await? {
        if let Some(uid) = msg.uid {
            max_uid = Some(max_uid.map_or(uid, |m: u32| m.max(uid)));
            events.push(envelope_to_json(uid, &msg));
        }
    }
    drop(stream);
    Ok(max_uid)
}

fn envelope_to_json(uid: u32, msg: &Fetch) -> Value {
    let envelope = msg.envelope();
    let subject = envelope
        .and_then(|e| e.subject.as_ref())
        .map(|s| String::from_utf8_lossy(s).to_string());
    let from = envelope
        .and_then(|e| e.from.as_ref())
        .and_then(|addrs| addrs.first())
        .and_then(|a| a.mailbox.as_ref())
        .map(|m| String::from_utf8_lossy(m).to_string());
    json!({ "uid": uid, "subject": subject, "from": from })
}

/// Primes an email trigger's UID high-water mark on activation
/// (spec.md §4.8 "Activation hooks"): fetches `UIDNEXT` and stores
/// `UIDNEXT - 1`. If the server returns `UIDNEXT = 0`, the stored UID
/// is left unchanged (spec.md §9, resolved open question).
pub async fn prime(cfg: &EmailTriggerConfig) -> Result<Option<u32>> {
    let tcp = TcpStream::connect((cfg.host.as_str(), cfg.port)).await?;
    let uidnext = if cfg.use_tls {
        let tls = async_native_tls::TlsConnector::new();
        let tls_stream = tls.connect(cfg.host.as_str(), tcp).await?;
        let client = async_imap::Client::new(tls_stream);
        let mut session = client
            .login(&cfg.username, &cfg.password)
            .await
            .map_err(|(e, _)| e)?;
        let mailbox = session.select(&cfg.folder).await?;
        session.logout().await?;
        mailbox.uid_next
    } else {
        let client = async_imap::Client::new(tcp);
        let mut session = client
            .login(&cfg.username, &cfg.password)
            .await
            .map_err(|(e, _)| e)?;
        let mailbox = session.select(&cfg.folder).await?;
        session.logout().await?;
        mailbox.uid_next
    };

    match uidnext {
        Some(0) | None => Ok(cfg.last_seen_uid),
        Some(next) => Ok(Some(next - 1)),
    }
}
