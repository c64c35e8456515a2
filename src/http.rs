//! HTTP/1.1 request-line dispatch and reply templating, layered directly
//! on top of [`crate::tcp`].
//!
//! Grounded in `www_server.c`/`www_server.h`: `handle_request` preparing a
//! TCP reply and bumping the ack by the request length before anything
//! else runs; `fill_buffer`/`fill_buffer_n`/`fill_buffer_p` appending bytes
//! through a cursor while counting the total (`rbuffer`/`rlength` in the
//! original, a `ReplyCursor` here since Rust has no raw pointer into a
//! shared global to lean on); `www_server_reply`'s status-line/
//! content-type/blank-line structure. The original's `if (0) {} else {
//! 404 }` is a placeholder for the real per-path dispatch `www_server.h`
//! declares (`www_server_register_path`) but never implements — that part
//! is built from spec.md §4.3/§4.8's description of the path table.

use crate::buffers::PacketBuffers;
use crate::port_service::PortService;
use crate::tcp::{self, TcpState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Unknown,
    Head,
    Get,
    Post,
    Put,
    Delete,
}

/// Switch on the first (and, for `POST`/`PUT`, second) byte of the request
/// line. Unknown methods map to [`HttpMethod::Unknown`].
fn parse_method(request: &[u8]) -> HttpMethod {
    match request.first() {
        Some(b'H') => HttpMethod::Head,
        Some(b'G') => HttpMethod::Get,
        Some(b'D') => HttpMethod::Delete,
        Some(b'P') => match request.get(1) {
            Some(b'O') => HttpMethod::Post,
            Some(b'U') => HttpMethod::Put,
            _ => HttpMethod::Unknown,
        },
        _ => HttpMethod::Unknown,
    }
}

/// Scan the request line for the path: starts after the method and a
/// single space, ends at the first byte `<= 0x20`. Returns the path slice
/// and the index right after it (where the HTTP version token starts).
fn parse_path(request: &[u8]) -> (&[u8], usize) {
    let Some(space) = request.iter().position(|&b| b == b' ') else {
        return (&request[0..0], request.len());
    };
    let path_start = space + 1;
    let mut end = path_start;
    while end < request.len() && request[end] > 0x20 {
        end += 1;
    }
    (&request[path_start..end], end)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatus {
    Ok200,
    Created201,
    Accepted202,
    NoContent204,
    NotFound404,
}

impl HttpStatus {
    fn status_line(self) -> &'static str {
        match self {
            HttpStatus::Ok200 => "200 OK",
            HttpStatus::Created201 => "201 Created",
            HttpStatus::Accepted202 => "202 Accepted",
            HttpStatus::NoContent204 => "204 No Content",
            HttpStatus::NotFound404 => "404 Not Found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Plain,
    Html,
    Json,
}

impl ContentType {
    fn mime(self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain",
            ContentType::Html => "text/html",
            ContentType::Json => "application/json",
        }
    }
}

/// Tracks how many bytes of an HTTP reply have been appended into
/// `buffer_out` since [`tcp::prepare_data_reply`] returned `start`.
/// Replaces the original's file-scope `rbuffer`/`rlength` pointer+counter
/// pair with an owned value threaded by `&mut`.
pub struct ReplyCursor {
    start: usize,
    cursor: usize,
}

impl ReplyCursor {
    fn at(start: usize) -> Self {
        ReplyCursor { start, cursor: start }
    }

    /// Append raw bytes.
    pub fn add<const BI: usize, const BO: usize>(&mut self, buffers: &mut PacketBuffers<BI, BO>, data: &[u8]) {
        self.add_n(buffers, data, data.len());
    }

    /// Append at most `length` bytes of `data`.
    pub fn add_n<const BI: usize, const BO: usize>(
        &mut self,
        buffers: &mut PacketBuffers<BI, BO>,
        data: &[u8],
        length: usize,
    ) {
        let n = data.len().min(length);
        buffers.buffer_out[self.cursor..self.cursor + n].copy_from_slice(&data[..n]);
        self.cursor += n;
    }

    /// Append a `&'static str` — the Rust stand-in for `fill_buffer_p`'s
    /// program-memory string read, since this isn't a Harvard-architecture
    /// target with a separate address space to read from.
    pub fn add_str<const BI: usize, const BO: usize>(
        &mut self,
        buffers: &mut PacketBuffers<BI, BO>,
        data: &'static str,
    ) {
        self.add(buffers, data.as_bytes());
    }

    /// Emit the status line, `Content-Type` header, and the blank line
    /// that ends the header block.
    pub fn header<const BI: usize, const BO: usize>(
        &mut self,
        buffers: &mut PacketBuffers<BI, BO>,
        status: HttpStatus,
        content_type: ContentType,
    ) {
        self.add_str(buffers, "HTTP/1.1 ");
        self.add_str(buffers, status.status_line());
        self.add_str(buffers, "\r\n");
        self.add_str(buffers, "Content-Type: ");
        self.add_str(buffers, content_type.mime());
        self.add_str(buffers, "\r\n\r\n");
    }

    /// Append the body plus the two trailing CRLFs and hand the finished
    /// segment to [`tcp::send`].
    pub fn send<const BI: usize, const BO: usize>(
        &mut self,
        buffers: &mut PacketBuffers<BI, BO>,
        body: &'static str,
    ) -> u16 {
        if !body.is_empty() {
            self.add_str(buffers, body);
        }
        self.add_str(buffers, "\r\n\r\n");
        let length = (self.cursor - self.start) as u16;
        tcp::send(buffers, length)
    }
}

/// A registered path handler: given the parsed method, path, and the full
/// request-line-and-beyond bytes, write its reply through `cursor` and
/// return the frame length from [`ReplyCursor::send`].
pub type HttpPathCallback<const BI: usize, const BO: usize> = fn(
    &mut PacketBuffers<BI, BO>,
    &mut ReplyCursor,
    method: HttpMethod,
    path: &[u8],
    request: &[u8],
) -> u16;

/// Handle one received HTTP request over an already-open TCP segment:
/// template the reply, bump the ack by the request length, parse the
/// request line, dispatch by path, and fall back to a 404 on a miss.
///
/// Mirrors `handle_request`'s shape (reply keyed first, then dispatch)
/// but the 404 branch is the real path-table lookup spec.md describes
/// rather than the surviving `if (0) {} else { 404 }` stub.
pub fn handle_request<const BI: usize, const BO: usize, const N: usize>(
    buffers: &mut PacketBuffers<BI, BO>,
    tcp_state: &mut TcpState,
    my_mac: &[u8; 6],
    my_ip: &[u8; 4],
    request: &[u8],
    table: &PortService<&'static str, HttpPathCallback<BI, BO>, N>,
) -> u16 {
    let start = tcp::prepare_data_reply(buffers, tcp_state, my_mac, my_ip, request.len() as u16);

    let method = parse_method(request);
    let (path, _) = parse_path(request);

    // The path table is keyed by `&'static str`; a request path is only
    // ever matched against known routes, so a lossy-but-harmless
    // best-effort UTF-8 view is fine here — a non-UTF-8 path simply never
    // matches and falls through to 404.
    let path_str = core::str::from_utf8(path).unwrap_or("");
    if let Some(callback) = table.get_path(path_str) {
        log::debug!("http: dispatching {} to registered handler", path_str);
        let mut cursor = ReplyCursor::at(start);
        return callback(buffers, &mut cursor, method, path, request);
    }

    log::debug!("http: no handler for {}, replying 404", path_str);
    let mut cursor = ReplyCursor::at(start);
    cursor.header(buffers, HttpStatus::NotFound404, ContentType::Plain);
    cursor.send(buffers, "Not found")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_method_recognizes_all_five() {
        assert_eq!(parse_method(b"HEAD / HTTP/1.1\r\n"), HttpMethod::Head);
        assert_eq!(parse_method(b"GET / HTTP/1.1\r\n"), HttpMethod::Get);
        assert_eq!(parse_method(b"POST / HTTP/1.1\r\n"), HttpMethod::Post);
        assert_eq!(parse_method(b"PUT / HTTP/1.1\r\n"), HttpMethod::Put);
        assert_eq!(parse_method(b"DELETE / HTTP/1.1\r\n"), HttpMethod::Delete);
        assert_eq!(parse_method(b"PATCH / HTTP/1.1\r\n"), HttpMethod::Unknown);
        assert_eq!(parse_method(b"TRACE / HTTP/1.1\r\n"), HttpMethod::Unknown);
    }

    #[test]
    fn parse_path_extracts_between_method_and_version() {
        let (path, _) = parse_path(b"GET /status HTTP/1.1\r\n\r\n");
        assert_eq!(path, b"/status");
    }

    #[test]
    fn parse_path_handles_root() {
        let (path, _) = parse_path(b"GET / HTTP/1.1\r\n\r\n");
        assert_eq!(path, b"/");
    }

    fn status_handler<const BI: usize, const BO: usize>(
        buffers: &mut PacketBuffers<BI, BO>,
        cursor: &mut ReplyCursor,
        _method: HttpMethod,
        _path: &[u8],
        _request: &[u8],
    ) -> u16 {
        cursor.header(buffers, HttpStatus::Ok200, ContentType::Json);
        cursor.send(buffers, "{}")
    }

    #[test]
    fn dispatch_hits_registered_path() {
        let mut buffers: PacketBuffers<256, 256> = PacketBuffers::new();
        let mut tcp_state = TcpState::new();
        let mut table: PortService<&'static str, HttpPathCallback<256, 256>, 4> = PortService::new();
        table.set("/status", status_handler);

        let request = b"GET /status HTTP/1.1\r\n\r\n";
        build_get_request(&mut buffers, request);

        let len = handle_request(&mut buffers, &mut tcp_state, &[0; 6], &[0; 4], request, &table);
        assert!(len > 0);
        let body = core::str::from_utf8(&buffers.buffer_out[..len as usize]).unwrap();
        assert!(body.contains("200 OK"));
        assert!(body.contains("application/json"));
        assert!(body.ends_with("{}\r\n\r\n"));
    }

    fn empty_handler<const BI: usize, const BO: usize>(
        buffers: &mut PacketBuffers<BI, BO>,
        cursor: &mut ReplyCursor,
        _method: HttpMethod,
        _path: &[u8],
        _request: &[u8],
    ) -> u16 {
        cursor.header(buffers, HttpStatus::Ok200, ContentType::Plain);
        cursor.send(buffers, "")
    }

    #[test]
    fn send_appends_trailing_crlfs_with_empty_body() {
        let mut buffers: PacketBuffers<256, 256> = PacketBuffers::new();
        let mut tcp_state = TcpState::new();
        let mut table: PortService<&'static str, HttpPathCallback<256, 256>, 4> = PortService::new();
        table.set("/empty", empty_handler);

        let request = b"GET /empty HTTP/1.1\r\n\r\n";
        build_get_request(&mut buffers, request);

        let len = handle_request(&mut buffers, &mut tcp_state, &[0; 6], &[0; 4], request, &table);
        let body = core::str::from_utf8(&buffers.buffer_out[..len as usize]).unwrap();
        assert!(body.ends_with("text/plain\r\n\r\n\r\n\r\n"));
    }

    #[test]
    fn dispatch_falls_back_to_404_on_miss() {
        let mut buffers: PacketBuffers<256, 256> = PacketBuffers::new();
        let mut tcp_state = TcpState::new();
        let table: PortService<&'static str, HttpPathCallback<256, 256>, 4> = PortService::new();

        build_get_request(&mut buffers, b"GET /nope HTTP/1.1\r\n\r\n");
        let request = b"GET /nope HTTP/1.1\r\n\r\n";

        let len = handle_request(&mut buffers, &mut tcp_state, &[0; 6], &[0; 4], request, &table);
        let body = core::str::from_utf8(&buffers.buffer_out[..len as usize]).unwrap();
        assert!(body.starts_with("HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\n\r\nNot found\r\n\r\n"));
    }

    fn build_get_request(buffers: &mut PacketBuffers<256, 256>, request: &[u8]) {
        use crate::wire::*;
        buffers.ip_prepare(IP_PROTO_TCP, &[10, 0, 0, 7], &[0x02, 0, 0, 0, 0, 1], &[10, 0, 0, 9], &[0xAA; 6]);
        buffers.buffer_in[TCP_PORT_SRC_H..TCP_PORT_SRC_H + 2].copy_from_slice(&40000u16.to_be_bytes());
        buffers.buffer_in[TCP_PORT_DST_H..TCP_PORT_DST_H + 2].copy_from_slice(&80u16.to_be_bytes());
        buffers.buffer_in[TCP_SEQ_NR..TCP_SEQ_NR + 4].copy_from_slice(&1u32.to_be_bytes());
        buffers.buffer_in[TCP_ACK_NR..TCP_ACK_NR + 4].copy_from_slice(&[0; 4]);
        buffers.buffer_in[TCP_DATA_OFFSET] = 0x05 << 4;
        buffers.buffer_in[TCP_FLAGS] = TCP_FLAG_ACK | TCP_FLAG_PUSH;
        let ip_total = (IP_LEN_HEADER + TCP_LEN_HEADER + request.len()) as u16;
        buffers.buffer_in[IP_LENGTH_H..IP_LENGTH_H + 2].copy_from_slice(&ip_total.to_be_bytes());
        buffers.buffer_in[TCP_DATA_NO_OPTS..TCP_DATA_NO_OPTS + request.len()].copy_from_slice(request);
    }
}
