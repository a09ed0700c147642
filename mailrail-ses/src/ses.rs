use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_sesv2::{
    Client,
    config::http::HttpResponse,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    operation::RequestId,
    types::{Body, Content, Destination, EmailContent, Message},
};
use mailrail_common::internal;

use crate::{CHARSET, ServiceError, TransmissionRequest, TransmissionService};

/// Amazon SES v2 transmission service
///
/// Credentials come from the standard AWS provider chain (environment,
/// profile, instance metadata).
#[derive(Debug, Clone)]
pub struct SesService {
    client: Client,
}

impl SesService {
    /// Build a client for `region` from the ambient AWS configuration
    pub async fn from_region(region: impl Into<String>) -> Self {
        let region = region.into();
        internal!(level = DEBUG, "Configuring SES client for {region}");

        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region))
            .load()
            .await;

        Self::from_client(Client::new(&config))
    }

    #[must_use]
    pub const fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn content(data: &str) -> Result<Content, ServiceError> {
    Content::builder()
        .data(data)
        .charset(CHARSET)
        .build()
        .map_err(|e| ServiceError::Build(e.to_string()))
}

/// The SES representation of a request's subject and bodies
///
/// Absent bodies are left unset rather than sent empty.
fn email_content(request: &TransmissionRequest) -> Result<EmailContent, ServiceError> {
    let body = Body::builder()
        .set_text(request.text.as_deref().map(content).transpose()?)
        .set_html(request.html.as_deref().map(content).transpose()?)
        .build();

    let message = Message::builder()
        .subject(content(&request.subject)?)
        .body(body)
        .build();

    Ok(EmailContent::builder().simple(message).build())
}

/// Map an SDK failure onto the service error taxonomy
///
/// Anything that carries an error code is an API error; everything else
/// (timeouts, dispatch failures, unparseable responses) is transport.
fn service_error<E>(err: &SdkError<E, HttpResponse>) -> ServiceError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());

    match err.code() {
        Some(code) => ServiceError::Api {
            code: code.to_string(),
            message: err.message().unwrap_or_default().to_string(),
            request_id: err.request_id().map(str::to_string),
            status,
        },
        None => ServiceError::Transport(DisplayErrorContext(err).to_string()),
    }
}

#[async_trait]
impl TransmissionService for SesService {
    async fn send_email(&self, request: &TransmissionRequest) -> Result<String, ServiceError> {
        let output = self
            .client
            .send_email()
            .from_email_address(&request.source)
            .destination(
                Destination::builder()
                    .to_addresses(&request.destination)
                    .build(),
            )
            .content(email_content(request)?)
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        output
            .message_id()
            .map(str::to_string)
            .ok_or_else(|| ServiceError::Transport("response carried no message id".to_string()))
    }

    async fn max_send_rate(&self) -> Result<f64, ServiceError> {
        let output = self
            .client
            .get_account()
            .send()
            .await
            .map_err(|e| service_error(&e))?;

        output
            .send_quota()
            .map(|quota| quota.max_send_rate())
            .ok_or_else(|| ServiceError::Transport("account has no send quota".to_string()))
    }
}
