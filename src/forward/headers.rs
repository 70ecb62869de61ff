// 转发模式的头部与 URL 处理

use http::header::{HeaderMap, HeaderName, CONNECTION, HOST};
use http::uri::PathAndQuery;
use url::Url;

/// 逐跳头部，只对单个连接有效，不向下一跳转发
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

/// `Connection` 头中额外声明的逐跳头部
fn connection_listed(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|s| s.trim().to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

fn copy_headers(src: &HeaderMap, dst: &mut HeaderMap, skip_host: bool) {
    let listed = connection_listed(src);
    for (name, value) in src {
        if is_hop_by_hop(name) || (skip_host && *name == HOST) {
            continue;
        }
        if listed.iter().any(|l| l == name.as_str()) {
            continue;
        }
        dst.append(name.clone(), value.clone());
    }
}

/// 复制请求头，去掉逐跳头部和 `Host`（由客户端按目标地址重新生成）
pub fn copy_request_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    copy_headers(src, dst, true);
}

/// 复制响应头，去掉逐跳头部
pub fn copy_response_headers(src: &HeaderMap, dst: &mut HeaderMap) {
    copy_headers(src, dst, false);
}

/// 用请求的路径和查询替换目标 URL 的路径和查询
pub fn rewrite_url(target: &Url, path_and_query: Option<&PathAndQuery>) -> Url {
    let mut url = target.clone();
    match path_and_query {
        Some(pq) => {
            url.set_path(pq.path());
            url.set_query(pq.query());
        }
        None => {
            url.set_path("/");
            url.set_query(None);
        }
    }
    url
}
