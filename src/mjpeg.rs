//! MJPEG-over-HTTP support
//!
//! Frames are delivered as a `multipart/x-mixed-replace` response: each
//! JPEG is its own part, separated by a boundary marker the browser
//! understands natively (`<img src="/mjpeg">`).

use std::convert::Infallible;

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

/// Boundary separating MJPEG parts. Unique enough to never appear inside
/// JPEG entropy-coded data.
const MJPEG_BOUNDARY: &str = "mjpeg_frame_5a2e91c7";

/// Frame one JPEG as a multipart part.
pub fn encode_part(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{boundary}\r\n\
         Content-Type: image/jpeg\r\n\
         Content-Length: {len}\r\n\
         \r\n",
        boundary = MJPEG_BOUNDARY,
        len = jpeg.len()
    );

    let mut bytes = Vec::with_capacity(head.len() + jpeg.len() + 2);
    bytes.extend_from_slice(head.as_bytes());
    bytes.extend_from_slice(jpeg);
    bytes.extend_from_slice(b"\r\n");
    Bytes::from(bytes)
}

/// Build the long-lived multipart response fed from a frame queue.
///
/// The queue is filled by the frame broadcaster; when the client goes away
/// axum drops the stream, the receiver closes, and the broadcaster sees the
/// closed channel on its next send.
pub fn into_response(rx: mpsc::Receiver<Bytes>) -> Response {
    let stream =
        ReceiverStream::new(rx).map(|jpeg| Ok::<_, Infallible>(encode_part(&jpeg)));

    Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}"),
        )
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .body(Body::from_stream(stream))
        .expect("static MJPEG response parts are valid")
}
