use std::future::poll_fn;
use std::time::Duration;

use bytes::Bytes;
use gotham::hyper::body::Sender;
use gotham::hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use gotham::hyper::{Body, Response, StatusCode};
use gotham::prelude::*;
use gotham::state::State;
use tracing::{debug, error};

use crate::config::StreamConfig;
use crate::frame::{encode_jpeg, multipart_chunk};
use crate::store::FrameStore;

pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Read side of the frame store as seen by stream handlers.
#[derive(Clone, StateData)]
pub struct VideoFeed {
    frames: FrameStore,
    quality: u8,
    interval: Duration,
}

impl VideoFeed {
    pub fn new(frames: FrameStore, config: &StreamConfig) -> Self {
        VideoFeed {
            frames,
            quality: config.jpeg_quality,
            interval: config.interval(),
        }
    }

    /// Encodes the latest frame as one multipart chunk. Returns `None` when
    /// nothing has been published yet or encoding failed.
    pub async fn next_chunk(&self) -> Option<Bytes> {
        let frame = self.frames.snapshot()?;
        let quality = self.quality;
        match tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await {
            Ok(Ok(jpeg)) => Some(multipart_chunk(&jpeg)),
            Ok(Err(err)) => {
                debug!("Skipping frame: {err}");
                None
            }
            Err(err) => {
                error!("Encoder task failed: {err}");
                None
            }
        }
    }

    /// Feeds one client until it disconnects.
    async fn pump(self, mut sender: Sender) {
        loop {
            if poll_fn(|cx| sender.poll_ready(cx)).await.is_err() {
                break;
            }
            if let Some(chunk) = self.next_chunk().await {
                if sender.send_data(chunk).await.is_err() {
                    break;
                }
            }
            tokio::time::sleep(self.interval).await;
        }
        debug!("stream client disconnected");
    }
}

/// `GET /video_image`: endless MJPEG body fed from the frame store.
pub fn video_image(state: State) -> (State, Response<Body>) {
    let feed = VideoFeed::borrow_from(&state).clone();
    let (sender, body) = Body::channel();
    tokio::spawn(feed.pump(sender));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(STREAM_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    debug!("stream client connected");
    (state, response)
}
