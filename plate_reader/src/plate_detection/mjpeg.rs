//! Motion JPEG framing for the video feed.

use bytes::{BufMut, Bytes, BytesMut};
use opencv::core::Vector;
use opencv::imgcodecs::imencode;
use opencv::prelude::Mat;
use tokio::sync::watch;

use super::pipeline::FrameSink;
use crate::error::{PlateError, Result};

pub const BOUNDARY: &str = "frame";
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

pub fn encode_jpeg(frame: &Mat) -> Result<Vec<u8>> {
    let mut buffer = Vector::<u8>::new();
    if !imencode(".jpg", frame, &mut buffer, &Vector::new())? {
        return Err(PlateError::Encode("jpeg"));
    }
    Ok(buffer.to_vec())
}

/// Wraps one JPEG image as a part of a `multipart/x-mixed-replace` body.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let header = format!("--{BOUNDARY}\r\nContent-Type: image/jpeg\r\n\r\n");
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Publishing side of the feed: always holds the latest annotated frame.
pub struct MjpegFeed {
    sender: watch::Sender<Option<Bytes>>,
}

/// Receiving side, cloned once per viewer. Ends when the feed is dropped.
#[derive(Clone)]
pub struct FrameFeed {
    receiver: watch::Receiver<Option<Bytes>>,
}

impl FrameFeed {
    pub fn subscribe(&self) -> watch::Receiver<Option<Bytes>> {
        self.receiver.clone()
    }

    pub fn latest(&self) -> Option<Bytes> {
        self.receiver.borrow().clone()
    }
}

pub fn mjpeg_feed() -> (MjpegFeed, FrameFeed) {
    let (sender, receiver) = watch::channel(None);
    (MjpegFeed { sender }, FrameFeed { receiver })
}

impl FrameSink for MjpegFeed {
    fn publish(&mut self, frame: &Mat) -> Result<()> {
        let part = multipart_part(&encode_jpeg(frame)?);
        // No viewers is fine, the frame is still kept as the latest one.
        self.sender.send_replace(Some(part));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC3};

    #[test]
    fn test_multipart_part_layout() {
        let part = multipart_part(&[0xff, 0xd8, 0xff, 0xd9]);

        let mut expected = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xff, 0xd8, 0xff, 0xd9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(part.as_ref(), expected.as_slice());
    }

    #[test]
    fn test_content_type_names_the_boundary() {
        assert!(MJPEG_CONTENT_TYPE.ends_with(&format!("boundary={BOUNDARY}")));
    }

    #[test]
    fn test_feed_keeps_latest_frame() {
        let (mut feed, frames) = mjpeg_feed();
        assert!(frames.latest().is_none());

        let frame =
            Mat::new_rows_cols_with_default(48, 64, CV_8UC3, Scalar::all(30.0)).unwrap();
        feed.publish(&frame).unwrap();

        let part = frames.latest().unwrap();
        let header = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
        assert!(part.starts_with(header));
        // JPEG start of image marker
        assert_eq!(&part[header.len()..header.len() + 2], &[0xff, 0xd8]);
        assert!(part.ends_with(b"\r\n"));
    }
}
