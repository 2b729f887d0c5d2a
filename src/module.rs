use crate::engine::vu::VuContext;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use std::sync::Arc;

pub type IterationError = Box<dyn std::error::Error + Send + Sync>;
pub type IterationResult = Result<(), IterationError>;

/// A loaded test module. The engine invokes [`TestModule::call`] once per
/// iteration with the VU's context; a returned error fails that iteration and
/// nothing else.
pub trait TestModule: Send + Sync + 'static {
    fn call(&self, ctx: VuContext, vu_id: u64, iteration: u64) -> BoxFuture<'static, IterationResult>;
}

/// Closure-based module, for embedding the engine as a library.
pub struct FnModule<F>(pub F);

impl<F> TestModule for FnModule<F>
where
    F: Fn(VuContext, u64, u64) -> BoxFuture<'static, IterationResult> + Send + Sync + 'static,
{
    fn call(&self, ctx: VuContext, vu_id: u64, iteration: u64) -> BoxFuture<'static, IterationResult> {
        (self.0)(ctx, vu_id, iteration)
    }
}

/// Wrap a closure as a shareable [`TestModule`].
pub fn from_fn<F>(f: F) -> Arc<dyn TestModule>
where
    F: Fn(VuContext, u64, u64) -> BoxFuture<'static, IterationResult> + Send + Sync + 'static,
{
    Arc::new(FnModule(f))
}

/// One request template from the script's `[[requests]]` array.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub name: Option<String>,
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// The built-in module behind a TOML script: each iteration performs the
/// declared requests in order through the VU's instrumented fetch. HTTP error
/// statuses are recorded in the `fetch` trend but do not fail the iteration;
/// transport and abort errors do.
#[derive(Debug)]
pub struct RequestPlan {
    requests: Arc<[RequestSpec]>,
}

impl RequestPlan {
    pub fn new(requests: Vec<RequestSpec>) -> Self {
        Self {
            requests: requests.into(),
        }
    }
}

impl TestModule for RequestPlan {
    fn call(&self, ctx: VuContext, vu_id: u64, iteration: u64) -> BoxFuture<'static, IterationResult> {
        let requests = self.requests.clone();
        async move {
            for spec in requests.iter() {
                let url = interpolate_vars(&spec.url, vu_id, iteration);
                let mut request = ctx.request(spec.method.clone(), &url);
                for (key, value) in &spec.headers {
                    request = request.header(key.as_str(), interpolate_vars(value, vu_id, iteration));
                }
                if let Some(body) = &spec.body {
                    request = request.body(interpolate_vars(body, vu_id, iteration));
                }
                ctx.fetch(request).await?;
            }
            Ok(())
        }
        .boxed()
    }
}

fn interpolate_vars(s: &str, vu_id: u64, iteration: u64) -> String {
    s.replace("${VU_ID}", &vu_id.to_string())
        .replace("${ITERATION}", &iteration.to_string())
}
