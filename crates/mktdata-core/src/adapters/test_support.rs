use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use crate::http_client::{HttpClient, HttpError, HttpRequest, HttpResponse};
use crate::retry::{RetryConfig, RetryingClient};
use crate::ProviderId;

/// Answers each request with the first route whose needle occurs in the URL,
/// 404 otherwise, and records every request.
#[derive(Default)]
pub(crate) struct RecordingHttpClient {
    routes: Vec<(&'static str, u16, &'static str)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingHttpClient {
    pub(crate) fn with(routes: Vec<(&'static str, u16, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            routes,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn requests(&self) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .clone()
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.url).collect()
    }
}

impl HttpClient for RecordingHttpClient {
    fn execute<'a>(
        &'a self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, HttpError>> + Send + 'a>> {
        let response = self
            .routes
            .iter()
            .find(|(needle, _, _)| request.url.contains(needle))
            .map(|(_, status, body)| HttpResponse::new(*status, *body))
            .unwrap_or_else(|| HttpResponse::new(404, "{}"));
        self.requests
            .lock()
            .expect("request store should not be poisoned")
            .push(request);
        Box::pin(async move { Ok(response) })
    }
}

pub(crate) fn client(provider: ProviderId, http: &Arc<RecordingHttpClient>) -> RetryingClient {
    let http: Arc<dyn HttpClient> = Arc::clone(http) as Arc<dyn HttpClient>;
    RetryingClient::new(provider, http, RetryConfig::no_retry())
}
