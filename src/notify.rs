// notify.rs
// Fire-and-forget user notifications.

use futures::future::BoxFuture;
use mongodb::{
    Collection,
    bson::{doc, oid::ObjectId},
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    error::{CoreError, CoreResult},
    models::User,
    state::AppState,
};

/// Delivers a subject and HTML body to a user's registered address.
pub trait Notifier: Send + Sync {
    fn send<'a>(
        &'a self,
        user_id: &'a ObjectId,
        subject: &'a str,
        html: &'a str,
    ) -> BoxFuture<'a, CoreResult<()>>;
}

/// Posts mail through an HTTP relay after resolving the address from `users`.
pub struct MailRelayNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
    users: Collection<User>,
}

#[derive(Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: String,
}

impl MailRelayNotifier {
    pub fn new(endpoint: &str, from: &str, users: Collection<User>) -> Self {
        MailRelayNotifier {
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            from: from.to_string(),
            users,
        }
    }

    async fn deliver(&self, user_id: &ObjectId, subject: &str, html: &str) -> CoreResult<()> {
        let user = self
            .users
            .find_one(doc! { "_id": user_id })
            .await?
            .ok_or_else(|| CoreError::Notification(format!("no email found for user {user_id}")))?;

        let message = RelayMessage {
            from: &self.from,
            to: &user.email,
            subject,
            html: render_html(subject, html),
        };
        self.client
            .post(&self.endpoint)
            .json(&message)
            .send()
            .await
            .and_then(|resp| resp.error_for_status())
            .map_err(|err| CoreError::Notification(err.to_string()))?;

        info!(to = %user.email, subject, "email sent");
        Ok(())
    }
}

impl Notifier for MailRelayNotifier {
    fn send<'a>(
        &'a self,
        user_id: &'a ObjectId,
        subject: &'a str,
        html: &'a str,
    ) -> BoxFuture<'a, CoreResult<()>> {
        Box::pin(self.deliver(user_id, subject, html))
    }
}

/// Used when no mail relay is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn send<'a>(
        &'a self,
        user_id: &'a ObjectId,
        subject: &'a str,
        _html: &'a str,
    ) -> BoxFuture<'a, CoreResult<()>> {
        Box::pin(async move {
            info!(%user_id, subject, "notification (mail relay not configured)");
            Ok(())
        })
    }
}

/// Sends a notification and swallows any failure after logging it. The
/// state change that triggered the notification is never affected.
pub async fn notify(state: &AppState, user_id: &ObjectId, subject: &str, html: &str) {
    if let Err(err) = state.notifier.send(user_id, subject, html).await {
        warn!(%user_id, subject, error = %err, "notification failed");
    }
}

pub fn render_html(subject: &str, message: &str) -> String {
    format!(
        r#"<div style="font-family: Arial, sans-serif; padding: 20px; border-radius: 8px; background: #f9f9f9;">
<h2 style="color: #007BFF;">{subject}</h2>
<div style="color: #333;">{message}</div>
<br>
<p style="color: #666;">If you have any questions, contact support.</p>
</div>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_frame_wraps_subject_and_message() {
        let html = render_html("Budget Alert", "<p>Food at 85%</p>");
        assert!(html.contains("<h2 style=\"color: #007BFF;\">Budget Alert</h2>"));
        assert!(html.contains("<p>Food at 85%</p>"));
    }
}
