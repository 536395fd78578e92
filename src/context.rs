use std::future::Future;

tokio::task_local! {
  static REQUEST_CONTEXT: RequestContext;
}

/// Request-scoped values a `Logger` can pick up through `Logger::with_context`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
  pub request_id: Option<String>,
  pub user_id: Option<i64>,
}

impl RequestContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
    self.request_id = Some(request_id.into());
    self
  }

  pub fn with_user_id(mut self, user_id: i64) -> Self {
    self.user_id = Some(user_id);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.request_id.is_none() && self.user_id.is_none()
  }

  /// Runs `future` with this context installed as the ambient context of the current task.
  pub async fn scope<F: Future>(self, future: F) -> F::Output {
    REQUEST_CONTEXT.scope(self, future).await
  }

  /// The ambient context of the current task, if one was installed with `scope`.
  pub fn current() -> Option<RequestContext> {
    REQUEST_CONTEXT.try_with(|ctx| ctx.clone()).ok()
  }
}
