use async_trait::async_trait;
use notifyhub_core::providers::{EmailCredentials, ProviderConfig};
use notifyhub_core::types::Channel;
use serde_json::{json, Value};

use super::{OutboundMessage, Provider, ProviderError, ProviderResponse};

/// Transactional email over a SendGrid-style v3 `mail/send` JSON API.
pub struct HttpEmail {
    client: reqwest::Client,
}

impl HttpEmail {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn looks_like_html(body: &str) -> bool {
    body.find('<')
        .is_some_and(|start| body[start..].contains('>'))
}

fn strip_tags(body: &str) -> String {
    let mut text = String::with_capacity(body.len());
    let mut in_tag = false;
    for c in body.chars() {
        match c {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    text
}

pub(crate) fn payload(creds: &EmailCredentials, message: &OutboundMessage) -> Value {
    let mut content = vec![json!({"type": "text/plain", "value": strip_tags(&message.body)})];
    if looks_like_html(&message.body) {
        content.push(json!({"type": "text/html", "value": message.body}));
    }

    let mut body = json!({
        "personalizations": [{"to": [{"email": message.to}]}],
        "from": {"email": creds.from_email, "name": creds.from_name},
        "subject": message.subject.clone().unwrap_or_default(),
        "content": content,
    });

    let attachments: Vec<Value> = message
        .attachments
        .iter()
        .filter_map(|att| {
            att.content.as_ref().map(|content| {
                json!({
                    "content": content,
                    "filename": att.filename,
                    "type": att.content_type,
                    "disposition": "attachment",
                })
            })
        })
        .collect();
    if !attachments.is_empty() {
        body["attachments"] = Value::Array(attachments);
    }
    body
}

#[async_trait]
impl Provider for HttpEmail {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(
        &self,
        config: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<ProviderResponse, ProviderError> {
        let creds = config.email()?;
        let resp = self
            .client
            .post(&creds.api_url)
            .bearer_auth(&creds.api_key)
            .json(&payload(&creds, message))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Rejected(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        Ok(ProviderResponse {
            raw: (!body.is_empty()).then_some(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notifyhub_core::types::Attachment;

    fn creds() -> EmailCredentials {
        EmailCredentials {
            api_url: "https://mail.example.com/v3/mail/send".to_string(),
            api_key: "key".to_string(),
            from_email: "noreply@example.com".to_string(),
            from_name: "Acme".to_string(),
        }
    }

    fn message(body: &str, attachments: Vec<Attachment>) -> OutboundMessage {
        OutboundMessage {
            channel: Channel::Email,
            to: "jane@example.com".to_string(),
            subject: Some("Invoice".to_string()),
            body: body.to_string(),
            attachments,
        }
    }

    #[test]
    fn test_plain_text_body() {
        let body = payload(&creds(), &message("Your invoice is ready", vec![]));
        assert_eq!(body["from"]["name"], "Acme");
        assert_eq!(body["personalizations"][0]["to"][0]["email"], "jane@example.com");
        assert_eq!(body["content"].as_array().unwrap().len(), 1);
        assert!(body.get("attachments").is_none());
    }

    #[test]
    fn test_html_body_gets_text_alternative() {
        let body = payload(&creds(), &message("<p>Hello <b>Jane</b></p>", vec![]));
        let content = body["content"].as_array().unwrap();
        assert_eq!(content[0]["value"], "Hello Jane");
        assert_eq!(content[1]["type"], "text/html");
    }

    #[test]
    fn test_only_attachments_with_content_are_sent() {
        let attachments = vec![
            Attachment {
                filename: "a.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content: Some("JVBERi0=".to_string()),
            },
            Attachment {
                filename: "b.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content: None,
            },
        ];
        let body = payload(&creds(), &message("See attached", attachments));
        let sent = body["attachments"].as_array().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["filename"], "a.pdf");
        assert_eq!(sent[0]["type"], "application/pdf");
    }
}
