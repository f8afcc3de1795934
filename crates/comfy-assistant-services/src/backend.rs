//! The backend contract and the closed set of implementations.

use crate::{Conversation, G4fBackend, QianwenBackend, ServiceError};
use async_trait::async_trait;
use comfy_assistant_protocol::{AiParams, Feature, ModelInfo, ServiceId, ServiceInfo};
use futures_util::stream::BoxStream;
use log::debug;

/// Stream of reply text deltas.
pub type TextStream = BoxStream<'static, Result<String, ServiceError>>;

/// Contract shared by every model backend.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Descriptor shown in the service listing.
    fn info(&self) -> ServiceInfo;

    /// Parameters this backend ignores.
    fn unsupported_features(&self) -> &'static [Feature];

    /// Models the backend can serve.
    async fn models(&self) -> Result<Vec<ModelInfo>, ServiceError>;

    /// Send one message and wait for the full reply.
    async fn send(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<String, ServiceError>;

    /// Send one message and stream the reply as it is generated.
    async fn stream(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<TextStream, ServiceError>;
}

/// One of the supported backends.
#[derive(Debug, Clone)]
pub enum Backend {
    G4f(G4fBackend),
    Qianwen(QianwenBackend),
}

impl Backend {
    pub fn id(&self) -> ServiceId {
        match self {
            Backend::G4f(_) => ServiceId::G4f,
            Backend::Qianwen(_) => ServiceId::Qianwen,
        }
    }

    /// Whether the backend ignores `feature`.
    pub fn supports(&self, feature: Feature) -> bool {
        !self.unsupported_features().contains(&feature)
    }
}

#[async_trait]
impl ChatBackend for Backend {
    fn info(&self) -> ServiceInfo {
        match self {
            Backend::G4f(backend) => backend.info(),
            Backend::Qianwen(backend) => backend.info(),
        }
    }

    fn unsupported_features(&self) -> &'static [Feature] {
        match self {
            Backend::G4f(backend) => backend.unsupported_features(),
            Backend::Qianwen(backend) => backend.unsupported_features(),
        }
    }

    async fn models(&self) -> Result<Vec<ModelInfo>, ServiceError> {
        match self {
            Backend::G4f(backend) => backend.models().await,
            Backend::Qianwen(backend) => backend.models().await,
        }
    }

    async fn send(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<String, ServiceError> {
        debug!(
            "sending chat (service={}, history_len={}, images={})",
            self.id(),
            conversation.history().len(),
            conversation.image_urls().len()
        );
        match self {
            Backend::G4f(backend) => backend.send(conversation, params).await,
            Backend::Qianwen(backend) => backend.send(conversation, params).await,
        }
    }

    async fn stream(
        &self,
        conversation: &Conversation,
        params: &AiParams,
    ) -> Result<TextStream, ServiceError> {
        debug!(
            "streaming chat (service={}, history_len={})",
            self.id(),
            conversation.history().len()
        );
        match self {
            Backend::G4f(backend) => backend.stream(conversation, params).await,
            Backend::Qianwen(backend) => backend.stream(conversation, params).await,
        }
    }
}

/// Registry holding one instance of every backend.
#[derive(Debug, Clone)]
pub struct Backends {
    g4f: Backend,
    qianwen: Backend,
}

impl Backends {
    pub fn new(g4f: G4fBackend, qianwen: QianwenBackend) -> Self {
        Self {
            g4f: Backend::G4f(g4f),
            qianwen: Backend::Qianwen(qianwen),
        }
    }

    pub fn get(&self, id: ServiceId) -> &Backend {
        match id {
            ServiceId::G4f => &self.g4f,
            ServiceId::Qianwen => &self.qianwen,
        }
    }

    /// Resolve a wire id such as `"qianwen"`.
    pub fn resolve(&self, id: &str) -> Result<&Backend, ServiceError> {
        Ok(self.get(id.parse::<ServiceId>()?))
    }

    /// Descriptors of every backend in display order.
    pub fn infos(&self) -> Vec<ServiceInfo> {
        ServiceId::ALL
            .iter()
            .map(|id| self.get(*id).info())
            .collect()
    }
}

/// Build an HTTP client honouring the caller's timeout and proxy.
pub(crate) fn http_client(params: &AiParams) -> Result<reqwest::Client, ServiceError> {
    let mut builder = reqwest::Client::builder();
    if params.timeout > 0 {
        builder = builder.timeout(params.timeout());
    }
    builder = match params.proxy() {
        Some(proxy) => builder.proxy(reqwest::Proxy::all(proxy)?),
        None => builder.no_proxy(),
    };
    Ok(builder.build()?)
}

/// Read the body of a failed response into a status error.
pub(crate) async fn status_error(service: ServiceId, response: reqwest::Response) -> ServiceError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    ServiceError::Status {
        service,
        status,
        body,
    }
}
