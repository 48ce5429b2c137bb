use std::io::Read;
use std::net::{IpAddr, Ipv6Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tiny_http::{Header, Method, Response, Server, StatusCode};
use tracing::{debug, info, warn};

use crate::chart::render::Layout;
use crate::injection::gates::{compute_gate_table, parse_gate_text};
use crate::pipeline::{ChartRequest, render_chart};
use crate::schedule::expander::DayOrder;
use crate::schedule::model::ScheduleEntry;
use crate::schedule::table::write_rows;
use crate::session::Session;

pub const DEFAULT_API_PORT: u16 = 8099;
const MAX_BODY_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub bind_addr: String,
    pub port: u16,
}

pub struct ApiServer {
    stop: Arc<AtomicBool>,
    http_join: Option<JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(config: ApiServerConfig, session: Session) -> Result<Self> {
        let bind = format!("{}:{}", config.bind_addr, config.port);
        let server = Server::http(&bind)
            .map_err(|err| anyhow::anyhow!("failed to start API server on {bind}: {err}"))?;
        info!("API listening on http://{bind}");
        let session = Arc::new(Mutex::new(session));
        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);
        let http_join = thread::spawn(move || run_server_loop(server, session, stop_for_thread));

        Ok(Self {
            stop,
            http_join: Some(http_join),
        })
    }

    /// Blocks until the server thread exits.
    pub fn wait(mut self) {
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(join) = self.http_join.take() {
            let _ = join.join();
        }
    }
}

fn run_server_loop(server: Server, session: Arc<Mutex<Session>>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match server.recv_timeout(Duration::from_millis(200)) {
            Ok(Some(request)) => handle_request(request, &session),
            Ok(None) => continue,
            Err(_) => continue,
        }
    }
}

/// A fully built reply, kept apart from `tiny_http` so routes are testable.
#[derive(Debug, Clone, PartialEq)]
struct ApiResponse {
    status: u16,
    content_type: &'static str,
    /// File name offered to the client as a download.
    attachment: Option<String>,
    body: Vec<u8>,
}

impl ApiResponse {
    fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain; charset=utf-8",
            attachment: None,
            body: body.as_bytes().to_vec(),
        }
    }

    fn json<T: Serialize>(status: u16, payload: &T) -> Self {
        match serde_json::to_vec(payload) {
            Ok(body) => Self {
                status,
                content_type: "application/json; charset=utf-8",
                attachment: None,
                body,
            },
            Err(err) => Self::text(500, &format!("failed to encode response: {err}")),
        }
    }
}

fn handle_request(mut request: tiny_http::Request, session: &Arc<Mutex<Session>>) {
    let Some(remote_addr) = request.remote_addr() else {
        let _ = send_text(request, StatusCode(400), "missing remote address");
        return;
    };
    if !is_local_network_ip(remote_addr.ip()) {
        let _ = send_text(request, StatusCode(403), "forbidden: local network only");
        return;
    }

    let method = request.method().clone();
    let url = request.url().to_string();
    let mut body = Vec::new();
    if matches!(method, Method::Put | Method::Post) {
        let read = request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body);
        if let Err(err) = read {
            let _ = send_text(request, StatusCode(400), &format!("unreadable body: {err}"));
            return;
        }
    }

    let base_url = request_base_url(&request);
    let response = {
        let mut guard = match session.lock() {
            Ok(guard) => guard,
            Err(_) => {
                let _ = send_text(request, StatusCode(500), "internal state lock error");
                return;
            }
        };
        route(&method, &url, &body, &base_url, &mut guard)
    };
    debug!("{method} {url} -> {}", response.status);
    if let Err(err) = send_response(request, response) {
        warn!("failed to send response for {url}: {err:#}");
    }
}

fn route(
    method: &Method,
    url: &str,
    body: &[u8],
    base_url: &str,
    session: &mut Session,
) -> ApiResponse {
    let (path, query) = split_path_query(url);
    let segments = path
        .trim_matches('/')
        .split('/')
        .map(percent_decode)
        .collect::<Vec<_>>();
    let segments = segments.iter().map(String::as_str).collect::<Vec<_>>();

    match (method, segments.as_slice()) {
        (Method::Get, ["healthz"]) => ApiResponse::text(200, "ok"),
        (Method::Get, ["v1"]) => {
            #[derive(Serialize)]
            struct ApiIndexResponse {
                api_base: String,
                health_url: String,
                children_url: String,
                gates_url: String,
            }

            ApiResponse::json(
                200,
                &ApiIndexResponse {
                    health_url: format!("{base_url}/healthz"),
                    children_url: format!("{base_url}/v1/children"),
                    gates_url: format!("{base_url}/v1/gates"),
                    api_base: base_url.to_string(),
                },
            )
        }
        (Method::Get, ["v1", "children"]) => {
            #[derive(Serialize)]
            struct ChildrenResponse {
                count: usize,
                children: Vec<String>,
            }

            let children = session.child_names();
            ApiResponse::json(
                200,
                &ChildrenResponse {
                    count: children.len(),
                    children,
                },
            )
        }
        (Method::Get, ["v1", "children", name, "rows"]) => match session.child(name) {
            Ok(child) => ApiResponse::json(200, &child.entries),
            Err(err) => ApiResponse::text(404, &err.to_string()),
        },
        (Method::Put, ["v1", "children", name, "rows"]) => {
            let rows = match serde_json::from_slice::<Vec<ScheduleEntry>>(body) {
                Ok(rows) => rows,
                Err(err) => {
                    return ApiResponse::text(
                        400,
                        &format!(
                            "invalid JSON at line {}, column {}: {err}",
                            err.line(),
                            err.column()
                        ),
                    );
                }
            };
            let count = rows.len();
            match session.replace_entries(name, rows) {
                Ok(()) => {
                    info!("Replaced {count} rows for {name}");
                    let child = session.child(name);
                    match child {
                        Ok(child) => ApiResponse::json(200, &session.expand_child(child)),
                        Err(err) => ApiResponse::text(404, &err.to_string()),
                    }
                }
                Err(err) => ApiResponse::text(404, &err.to_string()),
            }
        }
        (Method::Get, ["v1", "children", name, "expand"]) => match session.child(name) {
            Ok(child) => ApiResponse::json(200, &session.expand_child(child)),
            Err(err) => ApiResponse::text(404, &err.to_string()),
        },
        (Method::Get, ["v1", "children", name, "rows.csv"]) => {
            let child = match session.child(name) {
                Ok(child) => child,
                Err(err) => return ApiResponse::text(404, &err.to_string()),
            };
            let mut buffer = Vec::new();
            match write_rows(&child.entries, &mut buffer) {
                Ok(()) => ApiResponse {
                    status: 200,
                    content_type: "text/csv; charset=utf-8",
                    attachment: None,
                    body: buffer,
                },
                Err(err) => ApiResponse::text(500, &format!("{err:#}")),
            }
        }
        (Method::Get, ["v1", "children", name, "chart.png"]) => {
            chart_response(session, name, query)
        }
        (Method::Post, ["v1", "gates"]) => {
            let text = match std::str::from_utf8(body) {
                Ok(text) => text,
                Err(_) => return ApiResponse::text(400, "body is not valid UTF-8"),
            };
            let input = match parse_gate_text(text) {
                Ok(input) => input,
                Err(err) => return ApiResponse::text(400, &format!("{err:#}")),
            };
            match compute_gate_table(&input.profile, &input.rows, input.strict_positions) {
                Ok(table) => ApiResponse::json(200, &table),
                Err(err) => ApiResponse::text(422, &err.to_string()),
            }
        }
        (_, ["healthz"] | ["v1"] | ["v1", "children"] | ["v1", "gates"])
        | (_, ["v1", "children", _, "rows" | "expand" | "rows.csv" | "chart.png"]) => {
            ApiResponse::text(405, "method not allowed")
        }
        _ => ApiResponse::text(404, "not found"),
    }
}

fn chart_response(session: &Session, name: &str, query: &str) -> ApiResponse {
    let child = match session.child(name) {
        Ok(child) => child,
        Err(err) => return ApiResponse::text(404, &err.to_string()),
    };
    let layout_token = query_param(query, "layout").unwrap_or("weekly");
    let Some(layout) = Layout::from_token(layout_token) else {
        return ApiResponse::text(400, &format!("unknown layout '{layout_token}'"));
    };
    let day = match query_param(query, "day").map(percent_decode) {
        Some(token) => match DayOrder::full_week().lookup(&token) {
            Some((day, _)) => Some(day),
            None => return ApiResponse::text(400, &format!("unknown day '{token}'")),
        },
        None => None,
    };
    let partner = query_param(query, "with").map(percent_decode);
    let request = ChartRequest {
        partner: partner.as_deref(),
        day,
    };
    match render_chart(session, child, layout, request) {
        Ok(chart) => ApiResponse {
            status: 200,
            content_type: "image/png",
            attachment: Some(chart.file_name),
            body: chart.png,
        },
        Err(err) => ApiResponse::text(422, &format!("{err:#}")),
    }
}

fn send_response(request: tiny_http::Request, response: ApiResponse) -> Result<()> {
    let content_type = Header::from_str(&format!("Content-Type: {}", response.content_type))
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    let mut reply = Response::from_data(response.body)
        .with_status_code(StatusCode(response.status))
        .with_header(content_type);
    if let Some(file_name) = &response.attachment {
        let disposition = Header::from_str(&content_disposition(file_name))
            .map_err(|_| anyhow::anyhow!("failed to build content-disposition header"))?;
        reply = reply.with_header(disposition);
    }
    request.respond(reply)?;
    Ok(())
}

/// RFC 6266 attachment header; the name is UTF-8, so it goes in `filename*`.
fn content_disposition(file_name: &str) -> String {
    format!(
        "Content-Disposition: attachment; filename*=UTF-8''{}",
        percent_encode(file_name)
    )
}

fn percent_encode(input: &str) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte));
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn send_text(request: tiny_http::Request, status: StatusCode, body: &str) -> Result<()> {
    let content_type = Header::from_str("Content-Type: text/plain; charset=utf-8")
        .map_err(|_| anyhow::anyhow!("failed to build content-type header"))?;
    request.respond(
        Response::from_string(body.to_string())
            .with_status_code(status)
            .with_header(content_type),
    )?;
    Ok(())
}

fn split_path_query(url: &str) -> (&str, &str) {
    match url.split_once('?') {
        Some((path, query)) => (path, query),
        None => (url, ""),
    }
}

fn request_base_url(request: &tiny_http::Request) -> String {
    for header in request.headers() {
        if header.field.equiv("Host") {
            let host = header.value.as_str().trim();
            if !host.is_empty() {
                return format!("http://{host}");
            }
        }
    }
    format!("http://127.0.0.1:{DEFAULT_API_PORT}")
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        if k == key {
            return Some(v);
        }
    }
    None
}

/// Decodes `%XX` escapes so Hangul child names survive the URL.
fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut index = 0;
    while index < bytes.len() {
        match bytes[index] {
            b'%' if index + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[index + 1..index + 3]).unwrap_or("");
                match u8::from_str_radix(hex, 16) {
                    Ok(byte) => {
                        decoded.push(byte);
                        index += 3;
                    }
                    Err(_) => {
                        decoded.push(b'%');
                        index += 1;
                    }
                }
            }
            b'+' => {
                decoded.push(b' ');
                index += 1;
            }
            byte => {
                decoded.push(byte);
                index += 1;
            }
        }
    }
    String::from_utf8_lossy(&decoded).into_owned()
}

fn is_local_network_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback()
                || v6.is_unique_local()
                || v6.is_unicast_link_local()
                || is_ipv4_mapped_local(v6)
        }
    }
}

fn is_ipv4_mapped_local(v6: Ipv6Addr) -> bool {
    match v6.to_ipv4_mapped() {
        Some(v4) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        None => false,
    }
}
