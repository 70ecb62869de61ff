// 转发服务 - 通过上游代理把请求转发到固定源站

use anyhow::{Context, Result};
use bytes::Bytes;
use futures::TryStreamExt;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Request, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::{Body, Frame};
use std::convert::Infallible;
use std::io;
use tracing::{debug, warn};
use url::Url;

use super::headers::{copy_request_headers, copy_response_headers, rewrite_url};
use crate::config::ForwardConfig;
use crate::tls;

/// 返回给客户端的响应体
pub type ForwardBody = UnsyncBoxBody<Bytes, io::Error>;

pub struct ForwardService {
    client: reqwest::Client,
    target: Url,
}

impl ForwardService {
    pub fn new(config: &ForwardConfig) -> Result<Self> {
        Ok(Self {
            client: build_client(config)?,
            target: config.target_url.clone(),
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// 转发一个请求，上游失败时返回 502
    pub async fn forward<B>(&self, req: Request<B>) -> Response<ForwardBody>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        match self.try_forward(req).await {
            Ok(response) => {
                debug!("{} {} -> {}", method, path, response.status());
                response
            }
            Err(e) => {
                warn!("Failed to forward {} {}: {}", method, path, e);
                bad_gateway(&e)
            }
        }
    }

    async fn try_forward<B>(&self, req: Request<B>) -> Result<Response<ForwardBody>, reqwest::Error>
    where
        B: Body<Data = Bytes> + Send + Sync + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let (parts, body) = req.into_parts();
        let url = rewrite_url(&self.target, parts.uri.path_and_query());

        let mut headers = http::HeaderMap::new();
        copy_request_headers(&parts.headers, &mut headers);

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(body.into_data_stream()))
            .send()
            .await?;

        let mut response = Response::new(());
        *response.status_mut() = upstream.status();
        copy_response_headers(upstream.headers(), response.headers_mut());

        let stream = upstream
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(io::Error::other);
        Ok(response.map(|_| StreamBody::new(stream).boxed_unsync()))
    }
}

/// 502 响应，正文为简短的纯文本说明
fn bad_gateway(error: &reqwest::Error) -> Response<ForwardBody> {
    let message = format!("Bad Gateway: {}\n", error);
    let mut response = Response::new(full(message));
    *response.status_mut() = StatusCode::BAD_GATEWAY;
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

fn full(text: String) -> ForwardBody {
    Full::new(Bytes::from(text))
        .map_err(|never: Infallible| match never {})
        .boxed_unsync()
}

/// 创建经由上游代理的 HTTP 客户端
///
/// 不跟随重定向，不解压响应体
fn build_client(config: &ForwardConfig) -> Result<reqwest::Client> {
    let mut proxy = reqwest::Proxy::all(config.proxy_url.url_without_credentials())
        .context("Invalid proxy URL")?;
    if let Some(credentials) = config.proxy_url.credentials() {
        proxy = proxy.basic_auth(&credentials.username, &credentials.password);
    }

    let tls_config = tls::load_client_config(&config.tls)?;

    let mut builder = reqwest::Client::builder()
        .proxy(proxy)
        .redirect(reqwest::redirect::Policy::none())
        .use_preconfigured_tls((*tls_config).clone());
    if let Some(timeout) = config.timeouts.connect() {
        builder = builder.connect_timeout(timeout);
    }

    builder.build().context("Failed to build HTTP client")
}
